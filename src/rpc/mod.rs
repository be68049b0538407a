//! Ledger RPC seam
//!
//! Every component talks to the cluster through the [`LedgerRpc`] trait. One
//! client handle is built at startup and passed down explicitly; there is no
//! process-wide client. All methods are fallible and eventually consistent:
//! `Ok(None)` means "not visible yet", never "failed".

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use solana_sdk::{
    address_lookup_table::AddressLookupTableAccount,
    clock::Slot,
    commitment_config::{CommitmentConfig, CommitmentLevel},
    hash::Hash,
    pubkey::Pubkey,
    signature::Signature,
    transaction::{TransactionError, VersionedTransaction},
};

pub mod rpc_client;
pub mod rpc_errors;

pub use rpc_client::SolanaRpc;
pub use rpc_errors::{RpcError, RpcResult};

/// Recent blockhash plus the last block height at which a transaction
/// referencing it can still land.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockhashAnchor {
    pub blockhash: Hash,
    pub last_valid_block_height: u64,
}

impl BlockhashAnchor {
    /// True once the cluster has moved past the last valid block height
    pub fn is_expired_at(&self, block_height: u64) -> bool {
        block_height > self.last_valid_block_height
    }
}

/// Ledger-reported status of a signature
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureStatus {
    pub slot: Slot,
    pub confirmation: CommitmentLevel,
    pub err: Option<TransactionError>,
}

impl SignatureStatus {
    /// True once the status has reached at least the requested commitment
    pub fn satisfies(&self, requested: CommitmentLevel) -> bool {
        commitment_rank(self.confirmation) >= commitment_rank(requested)
    }
}

fn commitment_rank(level: CommitmentLevel) -> u8 {
    match level {
        CommitmentLevel::Processed => 0,
        CommitmentLevel::Confirmed => 1,
        CommitmentLevel::Finalized => 2,
    }
}

/// The subset of the JSON-RPC surface the flow depends on
#[async_trait]
pub trait LedgerRpc: Send + Sync {
    /// Endpoint label used in errors and logs
    fn endpoint(&self) -> &str;

    async fn get_latest_blockhash(&self, commitment: CommitmentConfig)
        -> RpcResult<BlockhashAnchor>;

    async fn get_block_height(&self, commitment: CommitmentConfig) -> RpcResult<u64>;

    async fn get_slot(&self, commitment: CommitmentConfig) -> RpcResult<Slot>;

    /// Submit signed bytes; preflight runs at `preflight_commitment`
    async fn send_transaction(
        &self,
        tx: &VersionedTransaction,
        preflight_commitment: CommitmentConfig,
    ) -> RpcResult<Signature>;

    /// `Ok(None)` while the ledger has not processed the signature
    async fn get_signature_status(&self, signature: &Signature)
        -> RpcResult<Option<SignatureStatus>>;

    /// Full `jsonParsed` transaction record, `Ok(None)` until queryable
    async fn get_parsed_transaction(
        &self,
        signature: &Signature,
        commitment: CommitmentConfig,
    ) -> RpcResult<Option<serde_json::Value>>;

    /// Materialized lookup table, `Ok(None)` until the account is visible
    async fn get_address_lookup_table(
        &self,
        address: &Pubkey,
        commitment: CommitmentConfig,
    ) -> RpcResult<Option<AddressLookupTableAccount>>;

    async fn get_balance(&self, pubkey: &Pubkey, commitment: CommitmentConfig) -> RpcResult<u64>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_satisfies_commitment_ordering() {
        let status = SignatureStatus {
            slot: 10,
            confirmation: CommitmentLevel::Confirmed,
            err: None,
        };
        assert!(status.satisfies(CommitmentLevel::Processed));
        assert!(status.satisfies(CommitmentLevel::Confirmed));
        assert!(!status.satisfies(CommitmentLevel::Finalized));
    }

    #[test]
    fn test_anchor_expiry_boundary() {
        let anchor = BlockhashAnchor {
            blockhash: Hash::new_unique(),
            last_valid_block_height: 100,
        };
        assert!(!anchor.is_expired_at(99));
        assert!(!anchor.is_expired_at(100));
        assert!(anchor.is_expired_at(101));
    }

    #[test]
    fn test_processed_never_satisfies_confirmed() {
        let status = SignatureStatus {
            slot: 1,
            confirmation: CommitmentLevel::Processed,
            err: None,
        };
        assert!(!status.satisfies(CommitmentLevel::Confirmed));
    }
}
