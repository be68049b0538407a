//! Compile-and-sign front end over the compiler
//!
//! `TxBuilder` owns nothing but the client handle and commitment; every call
//! fetches its own anchor so a retried build never reuses stale bytes.

use std::sync::Arc;

use solana_sdk::{
    commitment_config::CommitmentConfig,
    instruction::Instruction,
    transaction::VersionedTransaction,
};
use tracing::debug;

use super::compiler::compile;
use super::context::ExecutionContext;
use super::errors::TransactionBuilderError;
use super::output::SignedTransaction;
use crate::lookup_table::TableSnapshot;
use crate::metrics::{metrics, Timer};
use crate::observability::TraceContext;
use crate::rpc::LedgerRpc;
use crate::wallet::EphemeralSigner;

pub struct TxBuilder {
    rpc: Arc<dyn LedgerRpc>,
    commitment: CommitmentConfig,
    trace: Option<TraceContext>,
}

impl TxBuilder {
    pub fn new(rpc: Arc<dyn LedgerRpc>, commitment: CommitmentConfig) -> Self {
        Self {
            rpc,
            commitment,
            trace: None,
        }
    }

    /// Run every build in a child span of `trace`
    pub fn with_trace(mut self, trace: TraceContext) -> Self {
        self.trace = Some(trace);
        self
    }

    /// Fetch a fresh anchor, compile against `tables`, and sign with `payer`
    pub async fn build_signed(
        &self,
        payer: &EphemeralSigner,
        instructions: &[Instruction],
        tables: &[TableSnapshot],
    ) -> Result<SignedTransaction, TransactionBuilderError> {
        let span = self.trace.as_ref().map(|t| t.child_span("build_signed"));
        let ctx = ExecutionContext::fetch(self.rpc.as_ref(), self.commitment, span).await?;
        sign_with_context(&ctx, payer, instructions, tables)
    }
}

/// Compile and sign against an already fetched context
pub fn sign_with_context(
    ctx: &ExecutionContext,
    payer: &EphemeralSigner,
    instructions: &[Instruction],
    tables: &[TableSnapshot],
) -> Result<SignedTransaction, TransactionBuilderError> {
    let timer = Timer::new();
    let message = compile(&payer.pubkey(), &ctx.anchor, instructions, tables)?;

    let tx = VersionedTransaction::try_new(message, &[payer.signer()])
        .map_err(|e| TransactionBuilderError::Signing(e.to_string()))?;
    timer.observe_duration(&metrics().build_latency);

    let signed = SignedTransaction::new(tx, ctx.anchor);
    debug!(
        signature = %signed.signature(),
        trace = ctx.trace_context.as_ref().map(tracing::field::display),
        instructions = instructions.len(),
        tables = tables.len(),
        loaded_addresses = crate::compat::count_loaded_addresses(&signed.tx().message),
        message_bytes = signed.message_bytes().len(),
        "compiled and signed v0 transaction"
    );
    Ok(signed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::BlockhashAnchor;
    use solana_sdk::{
        hash::Hash,
        instruction::AccountMeta,
        message::VersionedMessage,
        pubkey::Pubkey,
    };

    fn ctx() -> ExecutionContext {
        ExecutionContext::from_anchor(
            BlockhashAnchor {
                blockhash: Hash::new_unique(),
                last_valid_block_height: 300,
            },
            CommitmentConfig::confirmed(),
        )
    }

    fn ix(payer: &EphemeralSigner) -> Instruction {
        Instruction::new_with_bytes(
            Pubkey::new_unique(),
            &[1],
            vec![
                AccountMeta::new(payer.pubkey(), true),
                AccountMeta::new(Pubkey::new_unique(), false),
            ],
        )
    }

    #[test]
    fn test_signed_transaction_verifies() {
        let payer = EphemeralSigner::generate();
        let signed = sign_with_context(&ctx(), &payer, &[ix(&payer)], &[]).unwrap();

        assert!(signed.verify());
        assert_eq!(signed.required_signers(), &[payer.pubkey()]);
        assert!(matches!(signed.tx().message, VersionedMessage::V0(_)));
    }

    #[test]
    fn test_mutating_message_invalidates_signature() {
        let payer = EphemeralSigner::generate();
        let signed = sign_with_context(&ctx(), &payer, &[ix(&payer)], &[]).unwrap();

        let mut tx = signed.into_tx();
        tx.message.set_recent_blockhash(Hash::new_unique());
        let tampered = SignedTransaction::new(
            tx,
            BlockhashAnchor {
                blockhash: Hash::default(),
                last_valid_block_height: 0,
            },
        );
        assert!(!tampered.verify());
    }

    #[test]
    fn test_missing_signer_fails_to_sign() {
        let payer = EphemeralSigner::generate();
        let outsider = Pubkey::new_unique();
        let needs_outsider = Instruction::new_with_bytes(
            Pubkey::new_unique(),
            &[],
            vec![AccountMeta::new(outsider, true)],
        );

        let err = sign_with_context(&ctx(), &payer, &[needs_outsider], &[]).unwrap_err();
        assert!(matches!(err, TransactionBuilderError::Signing(_)));
    }
}
