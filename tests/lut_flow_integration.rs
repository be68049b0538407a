//! Public API integration tests
//!
//! Run with `--features test_utils`.

use std::sync::Arc;
use std::time::Duration;

use solana_sdk::{pubkey::Pubkey, signature::Keypair};
use tokio_util::sync::CancellationToken;

use lut_flow::config::Config;
use lut_flow::pipeline::TxOutcome;
use lut_flow::retry::PollPolicy;
use lut_flow::rpc::LedgerRpc;
use lut_flow::test_utils::{MockLedger, MockLedgerConfig};
use lut_flow::wallet::FundingWallet;
use lut_flow::{FlowRequest, FlowRunner, FlowSettings};

fn settings_from_config(output_dir: &std::path::Path) -> FlowSettings {
    let mut config = Config::default();
    config.recorder.output_dir = output_dir.display().to_string();
    config.confirmation.poll_initial_ms = 100;
    config.confirmation.poll_max_ms = 400;
    config.validate().unwrap();
    FlowSettings::from_config(&config).unwrap()
}

#[tokio::test(start_paused = true)]
async fn flow_survives_slow_visibility_and_a_dropped_send() {
    let ledger = Arc::new(MockLedger::with_config(MockLedgerConfig {
        validity_window: 6,
        status_lag: 2,
        table_lag: 3,
        record_lag: 5,
        ..MockLedgerConfig::default()
    }));
    // The funding transfer is lost and has to be re-signed
    ledger.drop_next_sends(1);

    let wallet = FundingWallet::from_keypair(Keypair::new());
    ledger.set_balance(wallet.pubkey(), 5_000_000_000);

    let dir = tempfile::tempdir().unwrap();
    let rpc: Arc<dyn LedgerRpc> = ledger.clone();
    let runner = FlowRunner::new(rpc, settings_from_config(dir.path()), CancellationToken::new());
    let request = FlowRequest::with_generated_accounts(Pubkey::new_unique(), vec![1], 40, "lut_tx", 1_000_000_000);

    let report = runner.run(&wallet, &request).await.unwrap();

    assert_eq!(report.table_len, 42);
    assert_eq!(report.payer_balance, 1_000_000_000);
    assert!(report.record_path.ends_with("lut_tx.json"));
    assert!(matches!(report.stages[0].outcome, TxOutcome::Confirmed { .. }));
    // dropped fund, re-signed fund, three table transactions, execute
    assert_eq!(ledger.sent_transactions().len(), 6);

    let rendered = serde_json::to_value(&report).unwrap();
    assert_eq!(rendered["signature"], report.signature.to_string());
    assert_eq!(rendered["table_len"], 42);
}

#[tokio::test(start_paused = true)]
async fn cancelled_flow_reports_cancellation() {
    let ledger = Arc::new(MockLedger::new());
    ledger.stall_at_processed(true);
    let wallet = FundingWallet::from_keypair(Keypair::new());

    let dir = tempfile::tempdir().unwrap();
    let mut settings = settings_from_config(dir.path());
    settings.pipeline.confirm_policy = PollPolicy::fixed(Duration::from_millis(100), 10_000);

    let cancel = CancellationToken::new();
    let rpc: Arc<dyn LedgerRpc> = ledger.clone();
    let runner = FlowRunner::new(rpc, settings, cancel.clone());
    let request = FlowRequest::with_generated_accounts(Pubkey::new_unique(), vec![], 2, "cancelled", 1);

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(1)).await;
        cancel.cancel();
    });

    let err = runner.run(&wallet, &request).await.unwrap_err();
    assert_eq!(err.category(), "cancelled");
    assert!(err.terminal_record().is_none());
    assert!(err.failure().is_none());
}
