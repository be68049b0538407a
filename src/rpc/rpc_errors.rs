use solana_client::client_error::ClientError;
use thiserror::Error;

/// RPC error taxonomy for the ledger client seam
#[derive(Debug, Clone, Error)]
pub enum RpcError {
    /// Transport-level errors (network, connection)
    #[error("Transport error: {message} (endpoint: {endpoint})")]
    Transport { endpoint: String, message: String },

    /// Timeout errors
    #[error("Timeout after {timeout_ms}ms (endpoint: {endpoint})")]
    Timeout { endpoint: String, timeout_ms: u64 },

    /// RPC response errors (from the RPC server)
    #[error("RPC response error: {message} (endpoint: {endpoint}, code: {code:?})")]
    RpcResponse {
        endpoint: String,
        message: String,
        code: Option<i64>,
    },

    /// Rate limit exceeded
    #[error("Rate limit exceeded (endpoint: {endpoint})")]
    RateLimitExceeded { endpoint: String },

    #[error("Blockhash not found (endpoint: {endpoint})")]
    BlockhashNotFound { endpoint: String },

    /// The cluster already holds a transaction with this signature
    #[error("Transaction already processed (endpoint: {endpoint})")]
    AlreadyProcessed { endpoint: String },

    /// Preflight or submission rejected the transaction outright
    #[error("Transaction rejected: {message} (endpoint: {endpoint})")]
    SendRejected { endpoint: String, message: String },

    #[error("Insufficient funds (endpoint: {endpoint})")]
    InsufficientFunds { endpoint: String },

    /// Account data could not be decoded into the expected layout
    #[error("Failed to decode {what} for {account}: {message}")]
    Decode {
        what: &'static str,
        account: String,
        message: String,
    },

    /// Internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl RpcError {
    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            RpcError::Transport { .. } => true,
            RpcError::Timeout { .. } => true,
            RpcError::RateLimitExceeded { .. } => true,

            // Resending bytes signed over an unknown blockhash cannot succeed
            RpcError::BlockhashNotFound { .. } => false,
            RpcError::AlreadyProcessed { .. } => false,
            RpcError::SendRejected { .. } => false,
            RpcError::InsufficientFunds { .. } => false,
            RpcError::Decode { .. } => false,
            RpcError::Internal(_) => false,

            // Retry on server errors (5xx)
            RpcError::RpcResponse { code, .. } => {
                matches!(code, Some(c) if (500..600).contains(c))
            }
        }
    }

    /// Get the error category for metrics and logs
    pub fn category(&self) -> &'static str {
        match self {
            RpcError::Transport { .. } => "transport",
            RpcError::Timeout { .. } => "timeout",
            RpcError::RpcResponse { .. } => "rpc_response",
            RpcError::RateLimitExceeded { .. } => "rate_limit",
            RpcError::BlockhashNotFound { .. } => "blockhash",
            RpcError::AlreadyProcessed { .. } => "already_processed",
            RpcError::SendRejected { .. } => "send_rejected",
            RpcError::InsufficientFunds { .. } => "funds",
            RpcError::Decode { .. } => "decode",
            RpcError::Internal(_) => "internal",
        }
    }

    /// Get the endpoint associated with this error, if any
    pub fn endpoint(&self) -> Option<&str> {
        match self {
            RpcError::Transport { endpoint, .. }
            | RpcError::Timeout { endpoint, .. }
            | RpcError::RpcResponse { endpoint, .. }
            | RpcError::RateLimitExceeded { endpoint }
            | RpcError::BlockhashNotFound { endpoint }
            | RpcError::AlreadyProcessed { endpoint }
            | RpcError::SendRejected { endpoint, .. }
            | RpcError::InsufficientFunds { endpoint } => Some(endpoint),
            _ => None,
        }
    }

    /// Classify a `ClientError` by its message
    pub fn from_client_error(err: ClientError, endpoint: &str) -> Self {
        Self::classify(&err.to_string(), endpoint)
    }

    pub(crate) fn classify(message: &str, endpoint: &str) -> Self {
        let err_str = message.to_lowercase();
        let endpoint = endpoint.to_string();

        if err_str.contains("already been processed") || err_str.contains("alreadyprocessed") {
            RpcError::AlreadyProcessed { endpoint }
        } else if err_str.contains("blockhash not found") {
            RpcError::BlockhashNotFound { endpoint }
        } else if err_str.contains("insufficient funds")
            || err_str.contains("insufficient lamports")
        {
            RpcError::InsufficientFunds { endpoint }
        } else if err_str.contains("rate limit")
            || err_str.contains("too many requests")
            || err_str.contains("429")
        {
            RpcError::RateLimitExceeded { endpoint }
        } else if err_str.contains("timeout") || err_str.contains("timed out") {
            RpcError::Timeout {
                endpoint,
                timeout_ms: 0,
            }
        } else if err_str.contains("transaction simulation failed")
            || err_str.contains("preflight")
        {
            RpcError::SendRejected {
                endpoint,
                message: message.to_string(),
            }
        } else if err_str.contains("connection")
            || err_str.contains("error sending request")
            || err_str.contains("dns")
        {
            RpcError::Transport {
                endpoint,
                message: message.to_string(),
            }
        } else {
            let code = err_str
                .split("code:")
                .nth(1)
                .and_then(|s| s.split_whitespace().next())
                .and_then(|s| s.trim_end_matches(|c: char| !c.is_ascii_digit()).parse::<i64>().ok());

            RpcError::RpcResponse {
                endpoint,
                message: message.to_string(),
                code,
            }
        }
    }
}

pub type RpcResult<T> = std::result::Result<T, RpcError>;
