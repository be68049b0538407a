//! Submission and confirmation pipeline
//!
//! Strictly sequential: a stage's transaction is submitted, then polled to a
//! terminal outcome, before anything else is sent. An `Expired` outcome is
//! answered by compiling against a fresh anchor and signing again, never by
//! resending the old bytes.

use std::sync::Arc;
use std::time::Duration;

use solana_sdk::{
    commitment_config::CommitmentConfig,
    instruction::Instruction,
    pubkey::Pubkey,
    signature::Signature,
    transaction::VersionedTransaction,
};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

mod confirm;
pub mod errors;
pub mod status;

pub use confirm::await_confirmation;
pub use errors::PipelineError;
pub use status::{ConfirmationRecord, Stage, StageFailure, TxOutcome};

use crate::lookup_table::TableSnapshot;
use crate::metrics::metrics;
use crate::observability::TraceContext;
use crate::retry::{poll_until, PollError, PollPolicy};
use crate::rpc::{LedgerRpc, RpcError};
use crate::tx_builder::{ExecutionContext, SignedTransaction, TxBuilder};
use crate::wallet::{EphemeralSigner, FundingWallet};

/// Tunables for submission and confirmation
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Requested commitment for preflight, status and anchors
    pub commitment: CommitmentConfig,
    /// Confirmation poll spacing and deadline
    pub confirm_policy: PollPolicy,
    /// Resend policy for transport failures on submit
    pub submit_policy: PollPolicy,
    /// Fresh-anchor re-signs allowed after an `Expired` outcome
    pub max_resign_attempts: u32,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            commitment: CommitmentConfig::confirmed(),
            confirm_policy: PollPolicy::default(),
            submit_policy: PollPolicy {
                initial_delay: Duration::from_millis(250),
                max_attempts: Some(3),
                deadline: None,
                ..PollPolicy::default()
            },
            max_resign_attempts: 2,
        }
    }
}

pub struct ConfirmationPipeline {
    rpc: Arc<dyn LedgerRpc>,
    builder: TxBuilder,
    settings: PipelineSettings,
    cancel: CancellationToken,
}

impl ConfirmationPipeline {
    pub fn new(rpc: Arc<dyn LedgerRpc>, settings: PipelineSettings, cancel: CancellationToken) -> Self {
        let builder = TxBuilder::new(Arc::clone(&rpc), settings.commitment);
        Self {
            rpc,
            builder,
            settings,
            cancel,
        }
    }

    /// Attach a trace context to every build this pipeline performs
    pub fn with_trace(mut self, trace: TraceContext) -> Self {
        self.builder = self.builder.with_trace(trace);
        self
    }

    pub fn rpc(&self) -> &Arc<dyn LedgerRpc> {
        &self.rpc
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Send signed bytes. Transport failures resend the same bytes, which is
    /// idempotent under one signature: a node that already holds them answers
    /// `AlreadyProcessed`, which counts as submitted. An unknown blockhash or
    /// any other rejection ends the submit on first sight.
    pub async fn submit(&self, signed: &SignedTransaction, stage: Stage) -> Result<Signature, PipelineError> {
        let tx = signed.tx();
        let commitment = self.settings.commitment;
        let rpc = &self.rpc;

        let result = poll_until("submit", &self.settings.submit_policy, &self.cancel, |_| async move {
            rpc.send_transaction(tx, commitment).await.map(Some)
        })
        .await;

        match result {
            Ok(signature) => {
                metrics().submissions.inc();
                info!(signature = %signature, %stage, "transaction submitted");
                Ok(signature)
            }
            // An earlier attempt landed even though its response was lost
            Err(PollError::Fatal(RpcError::AlreadyProcessed { .. })) => {
                let signature = signed.signature();
                metrics().submissions.inc();
                info!(signature = %signature, %stage, "transaction already processed, awaiting its status");
                Ok(signature)
            }
            Err(PollError::Fatal(source)) => Err(PipelineError::Submit {
                stage,
                signature: signed.signature(),
                source,
            }),
            Err(PollError::Exhausted { last_error, .. }) => Err(PipelineError::Submit {
                stage,
                signature: signed.signature(),
                source: last_error
                    .unwrap_or_else(|| RpcError::Internal("submit budget exhausted".to_string())),
            }),
            Err(PollError::Cancelled { .. }) => Err(PipelineError::Cancelled {
                stage,
                signature: None,
            }),
        }
    }

    /// Submit and poll one signed transaction to its terminal outcome
    pub async fn submit_and_confirm(
        &self,
        signed: &SignedTransaction,
        stage: Stage,
    ) -> Result<ConfirmationRecord, PipelineError> {
        let signature = match self.submit(signed, stage).await {
            Ok(signature) => signature,
            // Preflight saw an anchor the cluster no longer knows
            Err(PipelineError::Submit {
                source: RpcError::BlockhashNotFound { .. },
                ..
            }) => {
                let observed = self
                    .rpc
                    .get_block_height(self.settings.commitment)
                    .await
                    .unwrap_or(signed.anchor().last_valid_block_height + 1);
                let outcome = TxOutcome::Expired {
                    last_valid_block_height: signed.anchor().last_valid_block_height,
                    observed_block_height: observed,
                };
                warn!(signature = %signed.signature(), %stage, %outcome, "anchor rejected at submit");
                metrics().record_outcome(&outcome);
                return Ok(ConfirmationRecord {
                    signature: signed.signature(),
                    stage,
                    commitment: self.settings.commitment.commitment,
                    outcome,
                });
            }
            Err(err) => return Err(err),
        };

        await_confirmation(
            &self.rpc,
            signature,
            *signed.anchor(),
            self.settings.commitment,
            stage,
            &self.settings.confirm_policy,
            &self.cancel,
        )
        .await
    }

    /// Compile, sign, submit and confirm; re-sign against a fresh anchor on expiry.
    ///
    /// Returns the terminal record of the last attempt, which may still be
    /// `Expired` once the re-sign budget is spent.
    pub async fn send_and_confirm(
        &self,
        payer: &EphemeralSigner,
        instructions: &[Instruction],
        tables: &[TableSnapshot],
        stage: Stage,
    ) -> Result<ConfirmationRecord, PipelineError> {
        let mut attempt = 0;
        loop {
            let signed = self.builder.build_signed(payer, instructions, tables).await?;
            let record = self.submit_and_confirm(&signed, stage).await?;

            if !matches!(record.outcome, TxOutcome::Expired { .. })
                || attempt >= self.settings.max_resign_attempts
            {
                return Ok(record);
            }

            attempt += 1;
            metrics().resigns.inc();
            warn!(
                %stage,
                expired_signature = %record.signature,
                attempt,
                max = self.settings.max_resign_attempts,
                "anchor expired, re-signing with a fresh blockhash"
            );
        }
    }

    /// Move lamports from the funding wallet to the flow's payer.
    ///
    /// The wallet signs a complete legacy transfer; it never hands out its key.
    pub async fn fund(
        &self,
        wallet: &FundingWallet,
        recipient: &Pubkey,
        lamports: u64,
    ) -> Result<ConfirmationRecord, PipelineError> {
        let mut attempt = 0;
        loop {
            let ctx = ExecutionContext::fetch(self.rpc.as_ref(), self.settings.commitment, None)
                .await?;
            let tx = wallet.funding_transaction(recipient, lamports, ctx.anchor.blockhash)?;
            let signed = SignedTransaction::new(VersionedTransaction::from(tx), ctx.anchor);
            let record = self.submit_and_confirm(&signed, Stage::Fund).await?;

            if !matches!(record.outcome, TxOutcome::Expired { .. })
                || attempt >= self.settings.max_resign_attempts
            {
                return Ok(record);
            }
            attempt += 1;
            metrics().resigns.inc();
        }
    }
}
