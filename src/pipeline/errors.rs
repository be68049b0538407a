use solana_sdk::signature::Signature;
use thiserror::Error;

use super::status::{ConfirmationRecord, Stage, StageFailure};
use crate::rpc::RpcError;
use crate::tx_builder::TransactionBuilderError;
use crate::wallet::WalletError;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// Compile or sign failed before anything was sent
    #[error("build failed: {0}")]
    Build(#[from] TransactionBuilderError),

    #[error("wallet error: {0}")]
    Wallet(#[from] WalletError),

    /// The endpoint refused the signed bytes, preflight simulation included
    #[error("submit failed at {stage} for {signature}: {source}")]
    Submit {
        stage: Stage,
        signature: Signature,
        #[source]
        source: RpcError,
    },

    /// A non-retryable RPC error while polling a submitted signature
    #[error("status query failed at {stage} for {signature}: {source}")]
    Status {
        stage: Stage,
        signature: Signature,
        #[source]
        source: RpcError,
    },

    #[error("cancelled at {stage}{}", awaiting(.signature))]
    Cancelled {
        stage: Stage,
        signature: Option<Signature>,
    },

    /// Polling ended in a non-success terminal state
    #[error("{}", describe_terminal(.0))]
    Terminal(Box<ConfirmationRecord>),
}

fn awaiting(signature: &Option<Signature>) -> String {
    signature
        .map(|s| format!(" while awaiting {}", s))
        .unwrap_or_default()
}

fn describe_terminal(record: &ConfirmationRecord) -> String {
    format!("{} at {}: {}", record.signature, record.stage, record.outcome)
}

impl PipelineError {
    /// Terminal record, if polling got that far
    pub fn record(&self) -> Option<&ConfirmationRecord> {
        match self {
            PipelineError::Terminal(record) => Some(record),
            _ => None,
        }
    }

    /// Signature, stage and raw error of a stage that got as far as signing
    pub fn failure(&self) -> Option<StageFailure> {
        match self {
            PipelineError::Terminal(record) => Some(StageFailure::from(record.as_ref())),
            PipelineError::Submit {
                stage,
                signature,
                source,
            }
            | PipelineError::Status {
                stage,
                signature,
                source,
            } => Some(StageFailure {
                signature: *signature,
                stage: *stage,
                category: self.category(),
                error: source.to_string(),
                outcome: None,
            }),
            _ => None,
        }
    }

    pub fn category(&self) -> &'static str {
        match self {
            PipelineError::Build(err) => err.category(),
            PipelineError::Wallet(_) => "wallet",
            PipelineError::Submit { .. } => "submit",
            PipelineError::Status { .. } => "status",
            PipelineError::Cancelled { .. } => "cancelled",
            PipelineError::Terminal(record) => record.outcome.label(),
        }
    }
}
