//! Shared fixtures for the cross-module tests

use std::sync::Arc;
use std::time::Duration;

use solana_sdk::{
    instruction::{AccountMeta, Instruction},
    pubkey::Pubkey,
};
use tokio_util::sync::CancellationToken;

use crate::pipeline::{ConfirmationPipeline, PipelineSettings};
use crate::retry::PollPolicy;
use crate::rpc::LedgerRpc;
use crate::test_utils::{MockLedger, MockLedgerConfig};

/// Tight polling so paused-clock tests stay short
pub fn fast_policy(max_attempts: u32) -> PollPolicy {
    PollPolicy::fixed(Duration::from_millis(200), max_attempts)
}

pub fn fast_settings() -> PipelineSettings {
    PipelineSettings {
        confirm_policy: fast_policy(20),
        submit_policy: PollPolicy::fixed(Duration::from_millis(50), 3),
        ..PipelineSettings::default()
    }
}

pub fn ledger() -> Arc<MockLedger> {
    Arc::new(MockLedger::new())
}

pub fn ledger_with(config: MockLedgerConfig) -> Arc<MockLedger> {
    Arc::new(MockLedger::with_config(config))
}

/// Failing programs land on chain with an error instead of failing preflight
pub fn ledger_without_preflight() -> Arc<MockLedger> {
    ledger_with(MockLedgerConfig {
        preflight: false,
        ..MockLedgerConfig::default()
    })
}

pub fn pipeline(ledger: &Arc<MockLedger>, settings: PipelineSettings) -> ConfirmationPipeline {
    let rpc: Arc<dyn LedgerRpc> = ledger.clone();
    ConfirmationPipeline::new(rpc, settings, CancellationToken::new())
}

/// One instruction against an arbitrary program that the payer signs
pub fn noop_instruction(payer: &Pubkey, program_id: Pubkey) -> Instruction {
    Instruction::new_with_bytes(
        program_id,
        &[0],
        vec![
            AccountMeta::new(*payer, true),
            AccountMeta::new_readonly(Pubkey::new_unique(), false),
        ],
    )
}

pub fn unique_keys(count: usize) -> Vec<Pubkey> {
    (0..count).map(|_| Pubkey::new_unique()).collect()
}
