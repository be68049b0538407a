//! End-to-end lookup table flow
//!
//! fund payer → create table + first batch → remaining batches → fetch →
//! compile program instruction against the table → submit → confirm → record.
//!
//! Every step waits for the previous step's confirmation. The table snapshot
//! is fetched once and used read-only afterwards.

use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use solana_sdk::{
    instruction::{AccountMeta, Instruction},
    pubkey::Pubkey,
    signature::{Keypair, Signature, Signer},
    system_program,
};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::lookup_table::{LookupTableError, LookupTableManager};
use crate::metrics::Timer;
use crate::observability::{CorrelationId, TraceContext};
use crate::pipeline::{
    ConfirmationPipeline, ConfirmationRecord, PipelineError, PipelineSettings, Stage, StageFailure,
};
use crate::recorder::{RecorderError, ResultRecorder};
use crate::retry::PollPolicy;
use crate::rpc::{LedgerRpc, RpcError};
use crate::structured_logging::FlowLogger;
use crate::wallet::{EphemeralSigner, FundingWallet};

#[derive(Debug, Error)]
pub enum FlowError {
    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error(transparent)]
    LookupTable(#[from] LookupTableError),

    #[error(transparent)]
    Recorder(#[from] RecorderError),

    #[error("payer {payer} holds {observed} lamports after funding, expected at least {expected}")]
    Underfunded {
        payer: Pubkey,
        expected: u64,
        observed: u64,
    },

    #[error("balance query for {payer} failed: {source}")]
    Balance {
        payer: Pubkey,
        #[source]
        source: RpcError,
    },
}

impl FlowError {
    /// Non-success terminal record behind this error, if any
    pub fn terminal_record(&self) -> Option<&ConfirmationRecord> {
        match self {
            FlowError::Pipeline(err) | FlowError::LookupTable(LookupTableError::Pipeline(err)) => err.record(),
            _ => None,
        }
    }

    /// What to persist as `<label>.failed.json`, when a signed stage failed
    pub fn failure(&self) -> Option<StageFailure> {
        match self {
            FlowError::Pipeline(err) | FlowError::LookupTable(LookupTableError::Pipeline(err)) => err.failure(),
            _ => None,
        }
    }

    pub fn category(&self) -> &'static str {
        match self {
            FlowError::Pipeline(err) => err.category(),
            FlowError::LookupTable(err) => err.category(),
            FlowError::Recorder(_) => "recorder",
            FlowError::Underfunded { .. } => "underfunded",
            FlowError::Balance { .. } => "balance",
        }
    }
}

/// What to run: one opaque program instruction over `accounts`
#[derive(Debug, Clone)]
pub struct FlowRequest {
    pub program_id: Pubkey,
    pub instruction_data: Vec<u8>,
    pub accounts: Vec<Pubkey>,
    pub label: String,
    pub fund_lamports: u64,
}

impl FlowRequest {
    /// `count` freshly generated accounts, as used for table-capacity runs
    pub fn with_generated_accounts(
        program_id: Pubkey,
        instruction_data: Vec<u8>,
        count: usize,
        label: impl Into<String>,
        fund_lamports: u64,
    ) -> Self {
        Self {
            program_id,
            instruction_data,
            accounts: (0..count).map(|_| Keypair::new().pubkey()).collect(),
            label: label.into(),
            fund_lamports,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FlowSettings {
    pub pipeline: PipelineSettings,
    pub extend_batch_size: usize,
    pub table_fetch_policy: PollPolicy,
    pub record_fetch_policy: PollPolicy,
    pub output_dir: PathBuf,
}

impl FlowSettings {
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        Ok(Self {
            pipeline: config.pipeline_settings()?,
            extend_batch_size: config.lookup_table.extend_batch_size,
            table_fetch_policy: config.table_fetch_policy(),
            record_fetch_policy: config.record_fetch_policy(),
            output_dir: PathBuf::from(&config.recorder.output_dir),
        })
    }
}

/// Summary of a completed run
#[derive(Debug, Clone, Serialize)]
pub struct FlowReport {
    pub correlation_id: CorrelationId,
    #[serde(serialize_with = "as_display")]
    pub payer: Pubkey,
    #[serde(serialize_with = "as_display")]
    pub table: Pubkey,
    pub table_len: usize,
    /// Payer balance observed right after the fund stage confirmed
    pub payer_balance: u64,
    #[serde(serialize_with = "as_display")]
    pub signature: Signature,
    pub record_path: PathBuf,
    pub stages: Vec<ConfirmationRecord>,
}

pub struct FlowRunner {
    rpc: Arc<dyn LedgerRpc>,
    settings: FlowSettings,
    cancel: CancellationToken,
}

impl FlowRunner {
    pub fn new(rpc: Arc<dyn LedgerRpc>, settings: FlowSettings, cancel: CancellationToken) -> Self {
        Self { rpc, settings, cancel }
    }

    pub async fn run(&self, wallet: &FundingWallet, request: &FlowRequest) -> Result<FlowReport, FlowError> {
        let correlation_id = CorrelationId::new();
        let logger = FlowLogger::new(correlation_id);
        let trace = TraceContext::root("lut_flow", correlation_id);

        let pipeline = ConfirmationPipeline::new(
            Arc::clone(&self.rpc),
            self.settings.pipeline.clone(),
            self.cancel.clone(),
        )
        .with_trace(trace);
        let recorder = ResultRecorder::new(
            self.rpc.as_ref(),
            self.settings.output_dir.clone(),
            self.settings.pipeline.commitment,
            self.settings.record_fetch_policy.clone(),
            self.cancel.clone(),
        );

        let result = self.execute(&pipeline, &recorder, &logger, wallet, request).await;
        if let Err(err) = &result {
            let failure = err.failure();
            if let Some(failure) = &failure {
                // Best effort; the terminal error is what the caller needs
                if let Err(write_err) = recorder.record_failure(failure, &request.label).await {
                    logger.error(Some(failure.stage), "recorder", &write_err.to_string());
                }
            }
            logger.error(failure.map(|f| f.stage), err.category(), &err.to_string());
        }
        result
    }

    async fn execute(
        &self,
        pipeline: &ConfirmationPipeline,
        recorder: &ResultRecorder<'_>,
        logger: &FlowLogger,
        wallet: &FundingWallet,
        request: &FlowRequest,
    ) -> Result<FlowReport, FlowError> {
        let payer = EphemeralSigner::generate();
        logger.log_flow_start(&payer.pubkey(), &request.program_id, request.accounts.len());
        let mut stages = Vec::new();

        logger.log_stage_start(Stage::Fund);
        let timer = Timer::new();
        let funded = pipeline
            .fund(wallet, &payer.pubkey(), request.fund_lamports)
            .await?
            .into_result()?;
        logger.log_stage_record(&funded, elapsed_ms(&timer));
        stages.push(funded);

        let payer_balance = self
            .rpc
            .get_balance(&payer.pubkey(), self.settings.pipeline.commitment)
            .await
            .map_err(|source| FlowError::Balance {
                payer: payer.pubkey(),
                source,
            })?;
        if payer_balance < request.fund_lamports {
            return Err(FlowError::Underfunded {
                payer: payer.pubkey(),
                expected: request.fund_lamports,
                observed: payer_balance,
            });
        }
        logger.log_funded(&payer.pubkey(), payer_balance);

        logger.log_stage_start(Stage::CreateTable);
        let manager = LookupTableManager::new(
            pipeline,
            self.settings.extend_batch_size,
            self.settings.table_fetch_policy.clone(),
        );
        let addresses = table_addresses(&payer.pubkey(), &request.accounts);
        let handle = manager.create_and_extend(&payer, &addresses).await?;
        let snapshot = manager.fetch_table(&handle).await?;
        logger.log_table_ready(&snapshot.address(), snapshot.len());

        logger.log_stage_start(Stage::Execute);
        let timer = Timer::new();
        let ix = program_instruction(&payer.pubkey(), request);
        let executed = pipeline
            .send_and_confirm(&payer, &[ix], std::slice::from_ref(&snapshot), Stage::Execute)
            .await?
            .into_result()?;
        logger.log_stage_record(&executed, elapsed_ms(&timer));

        let signature = executed.signature;
        let record_path = recorder.record(&signature, &request.label).await?;
        logger.log_recorded(&signature, &record_path.display().to_string());
        stages.push(executed);

        Ok(FlowReport {
            correlation_id: logger.context_id(),
            payer: payer.pubkey(),
            table: snapshot.address(),
            table_len: snapshot.len(),
            payer_balance,
            signature,
            record_path,
            stages,
        })
    }
}

/// Table contents: payer and system program first, then every request account
pub fn table_addresses(payer: &Pubkey, accounts: &[Pubkey]) -> Vec<Pubkey> {
    let mut addresses = Vec::with_capacity(accounts.len() + 2);
    addresses.push(*payer);
    addresses.push(system_program::id());
    addresses.extend_from_slice(accounts);
    addresses
}

/// The program call: payer signs and pays, every request account read-only
pub fn program_instruction(payer: &Pubkey, request: &FlowRequest) -> Instruction {
    let mut metas = Vec::with_capacity(request.accounts.len() + 2);
    metas.push(AccountMeta::new(*payer, true));
    metas.push(AccountMeta::new_readonly(system_program::id(), false));
    metas.extend(request.accounts.iter().map(|a| AccountMeta::new_readonly(*a, false)));
    Instruction::new_with_bytes(request.program_id, &request.instruction_data, metas)
}

fn elapsed_ms(timer: &Timer) -> u64 {
    (timer.elapsed_secs() * 1000.0) as u64
}

fn as_display<T: std::fmt::Display, S: serde::Serializer>(value: &T, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lookup_table::TableSnapshot;

    #[test]
    fn test_table_addresses_order() {
        let payer = Pubkey::new_unique();
        let accounts: Vec<Pubkey> = (0..3).map(|_| Pubkey::new_unique()).collect();
        let addresses = table_addresses(&payer, &accounts);

        assert_eq!(addresses[0], payer);
        assert_eq!(addresses[1], system_program::id());
        assert_eq!(&addresses[2..], accounts.as_slice());
    }

    #[test]
    fn test_generated_accounts_are_real_keys() {
        let first = FlowRequest::with_generated_accounts(Pubkey::new_unique(), vec![], 40, "a", 0);
        let second = FlowRequest::with_generated_accounts(Pubkey::new_unique(), vec![], 40, "b", 0);

        // keypair public keys are always curve points
        assert!(first.accounts.iter().all(|key| key.is_on_curve()));
        assert!(first.accounts.iter().all(|key| !second.accounts.contains(key)));
    }

    #[test]
    fn test_program_instruction_payer_is_only_signer() {
        let payer = Pubkey::new_unique();
        let request = FlowRequest::with_generated_accounts(Pubkey::new_unique(), vec![7], 40, "t", 1);
        let ix = program_instruction(&payer, &request);

        assert_eq!(ix.accounts.len(), 42);
        assert_eq!(ix.data, vec![7]);
        let signers: Vec<_> = ix.accounts.iter().filter(|m| m.is_signer).collect();
        assert_eq!(signers.len(), 1);
        assert_eq!(signers[0].pubkey, payer);

        let snapshot = TableSnapshot::new(Pubkey::new_unique(), table_addresses(&payer, &request.accounts));
        assert!(ix.accounts.iter().all(|m| snapshot.position(&m.pubkey).is_some()));
    }
}
