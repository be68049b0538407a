//! Table creation, sequential extension and retry-until-visible fetch

use solana_sdk::pubkey::Pubkey;

use super::test_helpers::{fast_policy, fast_settings, ledger, ledger_with, pipeline, unique_keys};
use crate::lookup_table::{LookupTableError, LookupTableManager, LOOKUP_TABLE_MAX_ADDRESSES};
use crate::test_utils::MockLedgerConfig;
use crate::wallet::EphemeralSigner;

#[tokio::test(start_paused = true)]
async fn test_two_batches_materialize_in_order_with_duplicates() {
    let ledger = ledger();
    let pipeline = pipeline(&ledger, fast_settings());
    let manager = LookupTableManager::new(&pipeline, 20, fast_policy(20));
    let authority = EphemeralSigner::generate();

    let b1 = unique_keys(20);
    let mut b2 = unique_keys(18);
    // Repeats are kept, not collapsed
    b2.push(b1[0]);
    b2.push(b1[0]);

    let mut handle = manager.create_and_extend(&authority, &b1).await.unwrap();
    manager.extend(&authority, &mut handle, &b2).await.unwrap();
    assert_eq!(handle.committed_len, 40);

    let snapshot = manager.fetch_table(&handle).await.unwrap();
    let expected: Vec<Pubkey> = b1.iter().chain(b2.iter()).copied().collect();
    assert_eq!(snapshot.addresses(), expected.as_slice());
    assert_eq!(snapshot.address(), handle.address);
    assert_eq!(snapshot.position(&b1[0]), Some(0));
}

#[tokio::test(start_paused = true)]
async fn test_create_carries_first_batch_and_splits_the_rest() {
    let ledger = ledger();
    let pipeline = pipeline(&ledger, fast_settings());
    let manager = LookupTableManager::new(&pipeline, 20, fast_policy(20));
    let authority = EphemeralSigner::generate();
    let addresses = unique_keys(42);

    let handle = manager.create_and_extend(&authority, &addresses).await.unwrap();

    // create+20, 20, 2
    assert_eq!(ledger.sent_transactions().len(), 3);
    assert_eq!(handle.committed_len, 42);
    assert!(handle.last_extended_slot.is_some());
    assert_eq!(ledger.table_entries(&handle.address), Some(addresses));
}

#[tokio::test(start_paused = true)]
async fn test_fetch_waits_for_lagging_visibility() {
    let ledger = ledger_with(MockLedgerConfig {
        table_lag: 8,
        ..MockLedgerConfig::default()
    });
    let pipeline = pipeline(&ledger, fast_settings());
    let manager = LookupTableManager::new(&pipeline, 30, fast_policy(20));
    let authority = EphemeralSigner::generate();
    let addresses = unique_keys(30);

    let handle = manager.create_and_extend(&authority, &addresses).await.unwrap();
    let snapshot = manager.fetch_table(&handle).await.unwrap();
    assert_eq!(snapshot.len(), 30);
}

#[tokio::test(start_paused = true)]
async fn test_fetch_of_missing_table_times_out() {
    let ledger = ledger();
    let pipeline = pipeline(&ledger, fast_settings());
    let manager = LookupTableManager::new(&pipeline, 20, fast_policy(3));

    let err = manager.fetch_with_len(&Pubkey::new_unique(), 0).await.unwrap_err();
    match err {
        LookupTableError::FetchTimeout { attempts, seen, .. } => {
            assert_eq!(attempts, 3);
            assert_eq!(seen, None);
        }
        other => panic!("expected FetchTimeout, got {:?}", other),
    }
}

#[tokio::test(start_paused = true)]
async fn test_over_capacity_rejected_before_submission() {
    let ledger = ledger();
    let pipeline = pipeline(&ledger, fast_settings());
    let manager = LookupTableManager::new(&pipeline, 20, fast_policy(3));
    let authority = EphemeralSigner::generate();

    let err = manager
        .create_and_extend(&authority, &unique_keys(LOOKUP_TABLE_MAX_ADDRESSES + 1))
        .await
        .unwrap_err();
    assert!(matches!(err, LookupTableError::TooManyAddresses { .. }));
    assert_eq!(err.category(), "construction");
    assert!(ledger.sent_transactions().is_empty());
}
