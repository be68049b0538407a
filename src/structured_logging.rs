//! Structured logging for flow stages

use solana_sdk::{pubkey::Pubkey, signature::Signature};

use crate::observability::CorrelationId;
use crate::pipeline::{ConfirmationRecord, Stage};

/// Stage-level events of one flow run, all tagged with its correlation id
#[derive(Debug, Clone)]
pub struct FlowLogger {
    context_id: CorrelationId,
}

impl FlowLogger {
    pub fn new(context_id: CorrelationId) -> Self {
        Self { context_id }
    }

    pub fn context_id(&self) -> CorrelationId {
        self.context_id
    }

    pub fn log_funded(&self, payer: &Pubkey, lamports: u64) {
        tracing::info!(
            context_id = %self.context_id,
            payer = %payer,
            lamports = lamports,
            "Payer funded"
        );
    }

    pub fn log_flow_start(&self, payer: &Pubkey, program_id: &Pubkey, accounts: usize) {
        tracing::info!(
            context_id = %self.context_id,
            payer = %payer,
            program_id = %program_id,
            accounts = accounts,
            "Starting lookup table flow"
        );
    }

    pub fn log_stage_start(&self, stage: Stage) {
        tracing::debug!(
            context_id = %self.context_id,
            stage = %stage,
            "Stage started"
        );
    }

    pub fn log_stage_record(&self, record: &ConfirmationRecord, latency_ms: u64) {
        if record.is_success() {
            tracing::info!(
                context_id = %self.context_id,
                stage = %record.stage,
                signature = %record.signature,
                outcome = %record.outcome,
                latency_ms = latency_ms,
                "Stage confirmed"
            );
        } else {
            tracing::warn!(
                context_id = %self.context_id,
                stage = %record.stage,
                signature = %record.signature,
                outcome = %record.outcome,
                latency_ms = latency_ms,
                "Stage ended without success"
            );
        }
    }

    pub fn log_table_ready(&self, table: &Pubkey, entries: usize) {
        tracing::info!(
            context_id = %self.context_id,
            table = %table,
            entries = entries,
            "Lookup table ready"
        );
    }

    pub fn log_recorded(&self, signature: &Signature, path: &str) {
        tracing::info!(
            context_id = %self.context_id,
            signature = %signature,
            path = %path,
            "Flow result recorded"
        );
    }

    pub fn error(&self, stage: Option<Stage>, category: &str, message: &str) {
        tracing::error!(
            context_id = %self.context_id,
            stage = ?stage.map(|s| s.to_string()),
            category = %category,
            message = %message,
            "Flow failed"
        );
    }
}
