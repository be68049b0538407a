//! Confirmation polling
//!
//! `SUBMITTED -> (poll) -> CONFIRMED | FAILED | EXPIRED | TIMEOUT`
//!
//! A missing status is "not processed yet", never a failure. Expiry is only
//! declared once the cluster's block height has passed the anchor's last
//! valid block height and a final status check still finds nothing.

use std::sync::Arc;

use solana_sdk::{
    commitment_config::CommitmentConfig,
    signature::Signature,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::errors::PipelineError;
use super::status::{ConfirmationRecord, Stage, TxOutcome};
use crate::metrics::{metrics, Timer};
use crate::retry::{poll_until, PollError, PollPolicy};
use crate::rpc::{BlockhashAnchor, LedgerRpc, RpcError, RpcResult, SignatureStatus};

/// Poll `signature` until it reaches a terminal outcome at `commitment`
pub async fn await_confirmation(
    rpc: &Arc<dyn LedgerRpc>,
    signature: Signature,
    anchor: BlockhashAnchor,
    commitment: CommitmentConfig,
    stage: Stage,
    policy: &PollPolicy,
    cancel: &CancellationToken,
) -> Result<ConfirmationRecord, PipelineError> {
    let timer = Timer::new();
    let requested = commitment.commitment;

    let result = poll_until("await_confirmation", policy, cancel, |attempt| {
        let rpc = Arc::clone(rpc);
        async move {
            metrics().confirmation_polls.inc();
            if let Some(outcome) = check_status(rpc.as_ref(), &signature, commitment).await? {
                return Ok(Some(outcome));
            }

            let height = rpc.get_block_height(commitment).await?;
            if !anchor.is_expired_at(height) {
                debug!(
                    signature = %signature,
                    attempt = attempt + 1,
                    block_height = height,
                    last_valid_block_height = anchor.last_valid_block_height,
                    "signature pending"
                );
                return Ok(None);
            }

            // The signature may have landed between the two queries
            if let Some(outcome) = check_status(rpc.as_ref(), &signature, commitment).await? {
                return Ok(Some(outcome));
            }

            Ok::<_, RpcError>(Some(TxOutcome::Expired {
                last_valid_block_height: anchor.last_valid_block_height,
                observed_block_height: height,
            }))
        }
    })
    .await;

    let outcome = match result {
        Ok(outcome) => outcome,
        Err(PollError::Exhausted {
            attempts, elapsed, ..
        }) => TxOutcome::Timeout {
            attempts,
            elapsed_ms: elapsed.as_millis() as u64,
        },
        Err(PollError::Cancelled { .. }) => {
            warn!(signature = %signature, %stage, "confirmation polling cancelled");
            return Err(PipelineError::Cancelled {
                stage,
                signature: Some(signature),
            });
        }
        Err(PollError::Fatal(source)) => {
            return Err(PipelineError::Status {
                stage,
                signature,
                source,
            });
        }
    };

    timer.observe_duration(&metrics().confirmation_latency);
    metrics().record_outcome(&outcome);

    if outcome.is_success() {
        info!(signature = %signature, %stage, %outcome, "transaction confirmed");
    } else {
        warn!(signature = %signature, %stage, %outcome, "transaction reached non-success terminal state");
    }

    Ok(ConfirmationRecord {
        signature,
        stage,
        commitment: requested,
        outcome,
    })
}

/// `Some` once the status satisfies the requested commitment
async fn check_status(
    rpc: &dyn LedgerRpc,
    signature: &Signature,
    commitment: CommitmentConfig,
) -> RpcResult<Option<TxOutcome>> {
    let status = rpc.get_signature_status(signature).await?;
    Ok(status.and_then(|status| terminal_outcome(&status, commitment)))
}

fn terminal_outcome(status: &SignatureStatus, commitment: CommitmentConfig) -> Option<TxOutcome> {
    if !status.satisfies(commitment.commitment) {
        return None;
    }
    Some(match &status.err {
        Some(error) => TxOutcome::Failed {
            slot: status.slot,
            error: error.clone(),
        },
        None => TxOutcome::Confirmed { slot: status.slot },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use solana_sdk::{commitment_config::CommitmentLevel, transaction::TransactionError};

    #[test]
    fn test_status_below_commitment_is_not_terminal() {
        let status = SignatureStatus {
            slot: 3,
            confirmation: CommitmentLevel::Processed,
            err: None,
        };
        assert_eq!(terminal_outcome(&status, CommitmentConfig::confirmed()), None);
        assert_eq!(
            terminal_outcome(&status, CommitmentConfig::processed()),
            Some(TxOutcome::Confirmed { slot: 3 })
        );
    }

    #[test]
    fn test_error_status_is_failed_not_confirmed() {
        let status = SignatureStatus {
            slot: 8,
            confirmation: CommitmentLevel::Finalized,
            err: Some(TransactionError::AccountNotFound),
        };
        assert_eq!(
            terminal_outcome(&status, CommitmentConfig::confirmed()),
            Some(TxOutcome::Failed {
                slot: 8,
                error: TransactionError::AccountNotFound
            })
        );
    }
}
