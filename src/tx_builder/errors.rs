//! Error types for message compilation and signing
//!
//! Construction errors here indicate a caller bug (an account set that
//! cannot be addressed, an unsigned message) and are never retried. Only
//! anchor and RPC failures are transient.

use solana_sdk::pubkey::Pubkey;
use thiserror::Error;

use crate::rpc::RpcError;

#[derive(Error, Debug)]
pub enum TransactionBuilderError {
    /// A message needs at least one instruction
    #[error("No instructions supplied")]
    EmptyInstructions,

    /// The distinct account set cannot be indexed by a single message
    #[error("Too many accounts: {count} distinct accounts, at most {max} addressable")]
    TooManyAccounts {
        /// Distinct accounts referenced by payer, programs and instructions
        count: usize,
        /// Maximum addressable by 8-bit account indices
        max: usize,
    },

    /// A supplied lookup table snapshot exceeds the on-chain capacity
    #[error("Lookup table {table} holds {len} addresses, capacity is {max}")]
    TableOverCapacity { table: Pubkey, len: usize, max: usize },

    /// The v0 compiler rejected the message
    #[error("Message compile error: {0}")]
    Compile(String),

    /// A compiled message could not be decoded against the supplied tables
    #[error("Account resolution error: {0}")]
    Resolution(String),

    /// Failed to sign the compiled message
    #[error("Signing failed: {0}")]
    Signing(String),

    /// Fetching a fresh validity anchor failed
    #[error("Blockhash error: {0}")]
    Blockhash(#[source] RpcError),
}

impl TransactionBuilderError {
    /// Check if this error is potentially retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Blockhash(err) => err.is_retryable(),

            Self::EmptyInstructions => false,
            Self::TooManyAccounts { .. } => false,
            Self::TableOverCapacity { .. } => false,
            Self::Compile(_) => false,
            Self::Resolution(_) => false,
            Self::Signing(_) => false,
        }
    }

    /// Get the error category for metrics and observability
    pub fn category(&self) -> &'static str {
        match self {
            Self::EmptyInstructions => "instruction",
            Self::TooManyAccounts { .. } | Self::TableOverCapacity { .. } => "capacity",
            Self::Compile(_) => "compile",
            Self::Resolution(_) => "resolution",
            Self::Signing(_) => "signing",
            Self::Blockhash(_) => "blockhash",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TransactionBuilderError::TooManyAccounts { count: 300, max: 256 };
        assert_eq!(
            err.to_string(),
            "Too many accounts: 300 distinct accounts, at most 256 addressable"
        );
    }

    #[test]
    fn test_construction_errors_are_fatal() {
        assert!(!TransactionBuilderError::EmptyInstructions.is_retryable());
        assert!(!TransactionBuilderError::Compile("x".to_string()).is_retryable());
        assert!(!TransactionBuilderError::Signing("x".to_string()).is_retryable());
        assert!(!TransactionBuilderError::TooManyAccounts { count: 1, max: 0 }.is_retryable());
    }

    #[test]
    fn test_blockhash_follows_rpc_classification() {
        let transient = TransactionBuilderError::Blockhash(RpcError::Timeout {
            endpoint: "e".to_string(),
            timeout_ms: 1,
        });
        assert!(transient.is_retryable());
        assert_eq!(transient.category(), "blockhash");

        let fatal = TransactionBuilderError::Blockhash(RpcError::Internal("x".to_string()));
        assert!(!fatal.is_retryable());
    }
}
