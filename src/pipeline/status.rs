//! Terminal outcomes and confirmation records

use std::fmt;

use serde::{Serialize, Serializer};
use solana_sdk::{
    clock::Slot,
    commitment_config::CommitmentLevel,
    signature::Signature,
    transaction::TransactionError,
};

use super::errors::PipelineError;

/// Which step of the flow a transaction belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "stage")]
pub enum Stage {
    Fund,
    CreateTable,
    ExtendTable { batch: usize },
    Execute,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Fund => write!(f, "fund"),
            Stage::CreateTable => write!(f, "create_table"),
            Stage::ExtendTable { batch } => write!(f, "extend_table[{}]", batch),
            Stage::Execute => write!(f, "execute"),
        }
    }
}

/// Terminal status of one signed transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum TxOutcome {
    /// Reached the requested commitment without error
    Confirmed { slot: Slot },

    /// Reached the requested commitment, but execution failed on chain
    Failed { slot: Slot, error: TransactionError },

    /// The anchor's last valid block height passed without the signature landing.
    /// Needs a fresh anchor and a new signature.
    Expired {
        last_valid_block_height: u64,
        observed_block_height: u64,
    },

    /// Polling budget ran out with the signature still unknown or below commitment
    Timeout { attempts: u32, elapsed_ms: u64 },
}

impl TxOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, TxOutcome::Confirmed { .. })
    }

    pub fn label(&self) -> &'static str {
        match self {
            TxOutcome::Confirmed { .. } => "confirmed",
            TxOutcome::Failed { .. } => "failed",
            TxOutcome::Expired { .. } => "expired",
            TxOutcome::Timeout { .. } => "timeout",
        }
    }
}

impl fmt::Display for TxOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TxOutcome::Confirmed { slot } => write!(f, "confirmed at slot {}", slot),
            TxOutcome::Failed { slot, error } => {
                write!(f, "failed at slot {}: {}", slot, error)
            }
            TxOutcome::Expired {
                last_valid_block_height,
                observed_block_height,
            } => write!(
                f,
                "expired (last valid block height {}, observed {})",
                last_valid_block_height, observed_block_height
            ),
            TxOutcome::Timeout {
                attempts,
                elapsed_ms,
            } => write!(f, "timed out after {} polls ({}ms)", attempts, elapsed_ms),
        }
    }
}

/// What the pipeline knows about a submitted signature once polling stops
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfirmationRecord {
    #[serde(serialize_with = "as_display")]
    pub signature: Signature,
    pub stage: Stage,
    pub commitment: CommitmentLevel,
    pub outcome: TxOutcome,
}

impl ConfirmationRecord {
    pub fn is_success(&self) -> bool {
        self.outcome.is_success()
    }

    /// Turn any non-success outcome into a terminal error carrying signature and stage
    pub fn into_result(self) -> Result<ConfirmationRecord, PipelineError> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(PipelineError::Terminal(Box::new(self)))
        }
    }
}

/// Everything known about a stage that ended without success, whether it
/// was refused at submit, lost while polling, or reached a non-success outcome
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageFailure {
    #[serde(serialize_with = "as_display")]
    pub signature: Signature,
    pub stage: Stage,
    pub category: &'static str,
    /// Raw error as reported by the endpoint or the cluster
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<TxOutcome>,
}

impl From<&ConfirmationRecord> for StageFailure {
    fn from(record: &ConfirmationRecord) -> Self {
        Self {
            signature: record.signature,
            stage: record.stage,
            category: record.outcome.label(),
            error: match &record.outcome {
                TxOutcome::Failed { error, .. } => error.to_string(),
                other => other.to_string(),
            },
            outcome: Some(record.outcome.clone()),
        }
    }
}

fn as_display<T: fmt::Display, S: Serializer>(value: &T, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use solana_sdk::instruction::InstructionError;

    fn record(outcome: TxOutcome) -> ConfirmationRecord {
        ConfirmationRecord {
            signature: Signature::from([3u8; 64]),
            stage: Stage::Execute,
            commitment: CommitmentLevel::Confirmed,
            outcome,
        }
    }

    #[test]
    fn test_expired_is_distinct_from_failed() {
        let expired = TxOutcome::Expired {
            last_valid_block_height: 10,
            observed_block_height: 11,
        };
        let failed = TxOutcome::Failed {
            slot: 5,
            error: TransactionError::InstructionError(0, InstructionError::Custom(6000)),
        };
        assert_ne!(expired.label(), failed.label());
        assert!(!expired.is_success());
        assert!(!failed.is_success());
    }

    #[test]
    fn test_into_result_carries_signature_and_stage() {
        let err = record(TxOutcome::Timeout {
            attempts: 4,
            elapsed_ms: 1000,
        })
        .into_result()
        .unwrap_err();

        let text = err.to_string();
        assert!(text.contains("execute"));
        assert!(text.contains(&Signature::from([3u8; 64]).to_string()));
        assert!(text.contains("timed out"));
    }

    #[test]
    fn test_record_serializes_signature_as_base58() {
        let json = serde_json::to_value(record(TxOutcome::Confirmed { slot: 9 })).unwrap();
        assert_eq!(json["signature"], Signature::from([3u8; 64]).to_string());
        assert_eq!(json["outcome"]["status"], "confirmed");
        assert_eq!(json["stage"]["stage"], "execute");
    }
}
