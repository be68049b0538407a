//! Execution context for transaction building
//!
//! An [`ExecutionContext`] pins the validity anchor a message is compiled
//! against. It is fetched fresh for every signing attempt; a context whose
//! anchor has expired must be discarded, not reused.

use solana_sdk::commitment_config::CommitmentConfig;
use tracing::debug;

use super::errors::TransactionBuilderError;
use crate::observability::TraceContext;
use crate::rpc::{BlockhashAnchor, LedgerRpc};

pub struct ExecutionContext {
    /// Blockhash and its last valid block height
    pub anchor: BlockhashAnchor,

    /// Commitment the anchor was fetched at
    pub commitment: CommitmentConfig,

    /// Optional trace context for correlating build, submit and confirm
    pub trace_context: Option<TraceContext>,
}

impl std::fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("blockhash", &self.anchor.blockhash)
            .field("last_valid_block_height", &self.anchor.last_valid_block_height)
            .field("commitment", &self.commitment.commitment)
            .field(
                "trace_context",
                &self
                    .trace_context
                    .as_ref()
                    .map(|ctx| ctx.to_string()),
            )
            .finish()
    }
}

impl ExecutionContext {
    /// Fetch a fresh anchor at the given commitment
    pub async fn fetch(
        rpc: &dyn LedgerRpc,
        commitment: CommitmentConfig,
        trace_context: Option<TraceContext>,
    ) -> Result<Self, TransactionBuilderError> {
        let anchor = rpc
            .get_latest_blockhash(commitment)
            .await
            .map_err(TransactionBuilderError::Blockhash)?;

        debug!(
            blockhash = %anchor.blockhash,
            last_valid_block_height = anchor.last_valid_block_height,
            "fetched validity anchor"
        );

        Ok(Self {
            anchor,
            commitment,
            trace_context,
        })
    }

    pub fn from_anchor(anchor: BlockhashAnchor, commitment: CommitmentConfig) -> Self {
        Self {
            anchor,
            commitment,
            trace_context: None,
        }
    }
}
