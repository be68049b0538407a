//! Test Utilities Module
//!
//! [`MockLedger`] is an in-memory, eventually consistent stand-in for a
//! cluster behind the [`LedgerRpc`] trait. It understands the handful of
//! programs the flow touches (system transfers and the address lookup table
//! program), lags visibility the way a real node does, simulates before
//! accepting a submission, and can be told to drop submissions, lose send
//! responses, fail programs, or stall confirmation.
//!
//! Only compiled when running tests or when the `test_utils` feature is
//! enabled.

#![cfg(any(test, feature = "test_utils"))]

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use serde_json::json;
use solana_sdk::{
    address_lookup_table::{self, AddressLookupTableAccount},
    clock::Slot,
    commitment_config::{CommitmentConfig, CommitmentLevel},
    hash::Hash,
    instruction::InstructionError,
    message::VersionedMessage,
    pubkey::Pubkey,
    signature::Signature,
    system_instruction::SystemInstruction,
    system_program,
    transaction::{TransactionError, VersionedTransaction},
};

use crate::lookup_table::TableSnapshot;
use crate::rpc::{BlockhashAnchor, LedgerRpc, RpcError, RpcResult, SignatureStatus};
use crate::tx_builder::resolve_account_keys;

const ENDPOINT: &str = "mock://ledger";

// Instruction tags of the lookup table program
const ALT_CREATE: u32 = 0;
const ALT_EXTEND: u32 = 2;

/// Knobs for [`MockLedger`]; every lag is counted in slots
#[derive(Debug, Clone)]
pub struct MockLedgerConfig {
    /// Block heights a fresh blockhash stays valid for
    pub validity_window: u64,
    /// Slots between submission and the status becoming visible
    pub status_lag: u64,
    /// Slots between landing and the lookup table state becoming visible
    pub table_lag: u64,
    /// Slots between landing and `getTransaction` returning the record
    pub record_lag: u64,
    /// Slots after landing at which a status reaches `confirmed`
    pub confirm_depth: u64,
    /// Slots after landing at which a status reaches `finalized`
    pub finalize_depth: u64,
    /// Simulate before accepting; off lands failing programs with an error
    pub preflight: bool,
}

impl Default for MockLedgerConfig {
    fn default() -> Self {
        Self {
            validity_window: 150,
            status_lag: 1,
            table_lag: 1,
            record_lag: 2,
            confirm_depth: 1,
            finalize_depth: 32,
            preflight: true,
        }
    }
}

#[derive(Debug, Clone)]
struct Landed {
    slot: Slot,
    err: Option<TransactionError>,
    account_keys: Vec<Pubkey>,
    logs: Vec<String>,
}

#[derive(Debug, Clone)]
struct MockTable {
    created_slot: Slot,
    /// Entry and the slot its extend landed in
    entries: Vec<(Pubkey, Slot)>,
}

#[derive(Default)]
struct LedgerState {
    slot: Slot,
    blockhashes: HashMap<Hash, u64>,
    landed: HashMap<Signature, Landed>,
    tables: HashMap<Pubkey, MockTable>,
    balances: HashMap<Pubkey, u64>,
    sent: Vec<VersionedTransaction>,
    failing_programs: HashSet<Pubkey>,
    drop_sends: u32,
    lost_send_responses: u32,
    send_attempts: u32,
    transient_failures: u32,
    stall_at_processed: bool,
}

pub struct MockLedger {
    config: MockLedgerConfig,
    state: Mutex<LedgerState>,
}

impl Default for MockLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl MockLedger {
    pub fn new() -> Self {
        Self::with_config(MockLedgerConfig::default())
    }

    pub fn with_config(config: MockLedgerConfig) -> Self {
        Self {
            config,
            state: Mutex::new(LedgerState {
                slot: 100,
                ..LedgerState::default()
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, LedgerState> {
        self.state.lock().expect("mock ledger lock poisoned")
    }

    /// Every query moves the cluster forward by one slot
    fn tick(&self) -> MutexGuard<'_, LedgerState> {
        let mut state = self.state();
        state.slot += 1;
        state
    }

    fn transient(state: &mut LedgerState) -> RpcResult<()> {
        if state.transient_failures > 0 {
            state.transient_failures -= 1;
            return Err(RpcError::Transport {
                endpoint: ENDPOINT.to_string(),
                message: "connection reset by peer".to_string(),
            });
        }
        Ok(())
    }

    pub fn current_slot(&self) -> Slot {
        self.state().slot
    }

    pub fn advance_slots(&self, slots: u64) {
        self.state().slot += slots;
    }

    /// Accept the next `count` submissions without ever landing them
    pub fn drop_next_sends(&self, count: u32) {
        self.state().drop_sends = count;
    }

    /// Land the next `count` submissions but answer them with a transport error
    pub fn lose_next_send_responses(&self, count: u32) {
        self.state().lost_send_responses = count;
    }

    /// Every `send_transaction` call, rejected ones included
    pub fn send_attempts(&self) -> u32 {
        self.state().send_attempts
    }

    /// Fail the next `count` RPC calls with a transport error
    pub fn fail_next_calls(&self, count: u32) {
        self.state().transient_failures = count;
    }

    /// Instructions invoking `program_id` fail, at preflight when it is on
    pub fn fail_program(&self, program_id: Pubkey) {
        self.state().failing_programs.insert(program_id);
    }

    /// Keep every status at `processed`
    pub fn stall_at_processed(&self, stall: bool) {
        self.state().stall_at_processed = stall;
    }

    pub fn set_balance(&self, pubkey: Pubkey, lamports: u64) {
        self.state().balances.insert(pubkey, lamports);
    }

    /// Every transaction accepted by `send_transaction`, in order
    pub fn sent_transactions(&self) -> Vec<VersionedTransaction> {
        self.state().sent.clone()
    }

    /// Table contents regardless of visibility lag
    pub fn table_entries(&self, table: &Pubkey) -> Option<Vec<Pubkey>> {
        self.state()
            .tables
            .get(table)
            .map(|t| t.entries.iter().map(|(key, _)| *key).collect())
    }

    fn account_keys(state: &LedgerState, tx: &VersionedTransaction, slot: Slot) -> RpcResult<Vec<Pubkey>> {
        Ok(match &tx.message {
            VersionedMessage::Legacy(message) => message.account_keys.clone(),
            VersionedMessage::V0(message) => {
                // Lookups only see entries activated before this slot
                let tables: Vec<TableSnapshot> = message
                    .address_table_lookups
                    .iter()
                    .filter_map(|lookup| {
                        state.tables.get(&lookup.account_key).map(|t| {
                            let active = t
                                .entries
                                .iter()
                                .filter(|(_, added)| *added < slot)
                                .map(|(key, _)| *key)
                                .collect();
                            TableSnapshot::new(lookup.account_key, active)
                        })
                    })
                    .collect();
                resolve_account_keys(message, &tables).map_err(|e| mock_error(&e.to_string()))?
            }
        })
    }

    /// Preflight: the first instruction that would fail, as a node reports it
    fn simulate(state: &LedgerState, tx: &VersionedTransaction, slot: Slot) -> RpcResult<Option<String>> {
        let account_keys = Self::account_keys(state, tx, slot)?;
        Ok(tx
            .message
            .instructions()
            .iter()
            .enumerate()
            .find(|(_, ix)| state.failing_programs.contains(&account_keys[ix.program_id_index as usize]))
            .map(|(index, _)| {
                format!(
                    "Transaction simulation failed: Error processing Instruction {}: custom program error: 0x1",
                    index
                )
            }))
    }

    fn execute(&self, state: &mut LedgerState, tx: &VersionedTransaction, slot: Slot) -> RpcResult<Landed> {
        let account_keys = Self::account_keys(state, tx, slot)?;

        let mut logs = Vec::new();
        for (index, ix) in tx.message.instructions().iter().enumerate() {
            let program_id = account_keys[ix.program_id_index as usize];
            let accounts: Vec<Pubkey> = ix
                .accounts
                .iter()
                .map(|i| account_keys[*i as usize])
                .collect();
            logs.push(format!("Program {} invoke [1]", program_id));

            if state.failing_programs.contains(&program_id) {
                logs.push(format!("Program {} failed: custom program error: 0x1", program_id));
                return Ok(Landed {
                    slot,
                    err: Some(TransactionError::InstructionError(
                        index as u8,
                        InstructionError::Custom(1),
                    )),
                    account_keys,
                    logs,
                });
            }

            if program_id == address_lookup_table::program::id() {
                apply_lookup_table(state, &ix.data, &accounts, slot);
            } else if program_id == system_program::id() {
                if let Ok(SystemInstruction::Transfer { lamports }) = bincode::deserialize(&ix.data) {
                    let from = state.balances.entry(accounts[0]).or_default();
                    *from = from.saturating_sub(lamports);
                    *state.balances.entry(accounts[1]).or_default() += lamports;
                }
            }
            logs.push(format!("Program {} success", program_id));
        }

        Ok(Landed {
            slot,
            err: None,
            account_keys,
            logs,
        })
    }
}

fn apply_lookup_table(state: &mut LedgerState, data: &[u8], accounts: &[Pubkey], slot: Slot) {
    let Some(table) = accounts.first().copied() else {
        return;
    };
    match bincode::deserialize::<u32>(data) {
        Ok(ALT_CREATE) => {
            state.tables.entry(table).or_insert(MockTable {
                created_slot: slot,
                entries: Vec::new(),
            });
        }
        Ok(ALT_EXTEND) => {
            if let Ok((_, new_addresses)) = bincode::deserialize::<(u32, Vec<Pubkey>)>(data) {
                if let Some(t) = state.tables.get_mut(&table) {
                    t.entries.extend(new_addresses.into_iter().map(|key| (key, slot)));
                }
            }
        }
        _ => {}
    }
}

fn mock_error(message: &str) -> RpcError {
    RpcError::SendRejected {
        endpoint: ENDPOINT.to_string(),
        message: message.to_string(),
    }
}

#[async_trait]
impl LedgerRpc for MockLedger {
    fn endpoint(&self) -> &str {
        ENDPOINT
    }

    async fn get_latest_blockhash(&self, _commitment: CommitmentConfig) -> RpcResult<BlockhashAnchor> {
        let mut state = self.tick();
        Self::transient(&mut state)?;
        let blockhash = Hash::new_unique();
        let last_valid_block_height = state.slot + self.config.validity_window;
        state.blockhashes.insert(blockhash, last_valid_block_height);
        Ok(BlockhashAnchor {
            blockhash,
            last_valid_block_height,
        })
    }

    async fn get_block_height(&self, _commitment: CommitmentConfig) -> RpcResult<u64> {
        let mut state = self.tick();
        Self::transient(&mut state)?;
        Ok(state.slot)
    }

    async fn get_slot(&self, _commitment: CommitmentConfig) -> RpcResult<Slot> {
        let mut state = self.tick();
        Self::transient(&mut state)?;
        Ok(state.slot)
    }

    async fn send_transaction(
        &self,
        tx: &VersionedTransaction,
        _preflight_commitment: CommitmentConfig,
    ) -> RpcResult<Signature> {
        let mut state = self.tick();
        state.send_attempts += 1;
        Self::transient(&mut state)?;

        if !tx.verify_with_results().iter().all(|ok| *ok) {
            return Err(mock_error("transaction signature verification failure"));
        }
        let signature = tx.signatures.first().copied().ok_or_else(|| mock_error("unsigned"))?;

        let blockhash = *tx.message.recent_blockhash();
        match state.blockhashes.get(&blockhash) {
            Some(&last_valid) if state.slot <= last_valid => {}
            _ => {
                return Err(RpcError::BlockhashNotFound {
                    endpoint: ENDPOINT.to_string(),
                })
            }
        }

        if state.landed.contains_key(&signature) {
            return Err(RpcError::AlreadyProcessed {
                endpoint: ENDPOINT.to_string(),
            });
        }

        let slot = state.slot + self.config.status_lag;
        if self.config.preflight {
            if let Some(message) = Self::simulate(&state, tx, slot)? {
                return Err(mock_error(&message));
            }
        }

        state.sent.push(tx.clone());
        if state.drop_sends > 0 {
            state.drop_sends -= 1;
            return Ok(signature);
        }

        let landed = self.execute(&mut state, tx, slot)?;
        state.landed.insert(signature, landed);

        if state.lost_send_responses > 0 {
            state.lost_send_responses -= 1;
            return Err(RpcError::Transport {
                endpoint: ENDPOINT.to_string(),
                message: "connection closed before response".to_string(),
            });
        }
        Ok(signature)
    }

    async fn get_signature_status(&self, signature: &Signature) -> RpcResult<Option<SignatureStatus>> {
        let mut state = self.tick();
        Self::transient(&mut state)?;
        let current = state.slot;

        Ok(state.landed.get(signature).and_then(|landed| {
            if current < landed.slot {
                return None;
            }
            let depth = current - landed.slot;
            let confirmation = if state.stall_at_processed || depth < self.config.confirm_depth {
                CommitmentLevel::Processed
            } else if depth < self.config.finalize_depth {
                CommitmentLevel::Confirmed
            } else {
                CommitmentLevel::Finalized
            };
            Some(SignatureStatus {
                slot: landed.slot,
                confirmation,
                err: landed.err.clone(),
            })
        }))
    }

    async fn get_parsed_transaction(
        &self,
        signature: &Signature,
        _commitment: CommitmentConfig,
    ) -> RpcResult<Option<serde_json::Value>> {
        let mut state = self.tick();
        Self::transient(&mut state)?;
        let current = state.slot;

        Ok(state
            .landed
            .get(signature)
            .filter(|landed| current >= landed.slot + self.config.record_lag)
            .map(|landed| {
                json!({
                    "slot": landed.slot,
                    "blockTime": 1_700_000_000 + landed.slot as i64,
                    "version": 0,
                    "meta": {
                        "err": landed.err,
                        "fee": 5000,
                        "logMessages": landed.logs,
                    },
                    "transaction": {
                        "signatures": [signature.to_string()],
                        "message": {
                            "accountKeys": landed
                                .account_keys
                                .iter()
                                .map(|k| k.to_string())
                                .collect::<Vec<_>>(),
                        },
                    },
                })
            }))
    }

    async fn get_address_lookup_table(
        &self,
        address: &Pubkey,
        _commitment: CommitmentConfig,
    ) -> RpcResult<Option<AddressLookupTableAccount>> {
        let mut state = self.tick();
        Self::transient(&mut state)?;
        let visible_at = state.slot.saturating_sub(self.config.table_lag);

        Ok(state.tables.get(address).and_then(|table| {
            (table.created_slot <= visible_at).then(|| AddressLookupTableAccount {
                key: *address,
                addresses: table
                    .entries
                    .iter()
                    .filter(|(_, added)| *added <= visible_at)
                    .map(|(key, _)| *key)
                    .collect(),
            })
        }))
    }

    async fn get_balance(&self, pubkey: &Pubkey, _commitment: CommitmentConfig) -> RpcResult<u64> {
        let mut state = self.tick();
        Self::transient(&mut state)?;
        Ok(state.balances.get(pubkey).copied().unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lookup_table::{create_table, extend_table};
    use solana_sdk::{
        message::Message,
        signature::{Keypair, Signer},
        system_instruction,
        transaction::Transaction,
    };

    async fn legacy_tx(ledger: &MockLedger, payer: &Keypair, ixs: &[solana_sdk::instruction::Instruction]) -> VersionedTransaction {
        let anchor = ledger.get_latest_blockhash(CommitmentConfig::confirmed()).await.unwrap();
        let message = Message::new(ixs, Some(&payer.pubkey()));
        VersionedTransaction::from(Transaction::new(&[payer], message, anchor.blockhash))
    }

    #[tokio::test]
    async fn test_status_lags_submission() {
        let ledger = MockLedger::new();
        let payer = Keypair::new();
        let to = Pubkey::new_unique();
        ledger.set_balance(payer.pubkey(), 10);

        let tx = legacy_tx(&ledger, &payer, &[system_instruction::transfer(&payer.pubkey(), &to, 4)]).await;
        let sig = ledger.send_transaction(&tx, CommitmentConfig::confirmed()).await.unwrap();

        // landed one slot after submission; the status query itself ticks once
        let first = ledger.get_signature_status(&sig).await.unwrap().unwrap();
        assert_eq!(first.confirmation, CommitmentLevel::Processed);
        let second = ledger.get_signature_status(&sig).await.unwrap().unwrap();
        assert_eq!(second.confirmation, CommitmentLevel::Confirmed);
        assert_eq!(ledger.get_balance(&to, CommitmentConfig::confirmed()).await.unwrap(), 4);
    }

    #[tokio::test]
    async fn test_lookup_table_program_is_applied() {
        let ledger = MockLedger::new();
        let payer = Keypair::new();
        let (create, table) = create_table(&payer.pubkey(), &payer.pubkey(), ledger.current_slot());
        let entries = vec![Pubkey::new_unique(), Pubkey::new_unique()];
        let extend = extend_table(&table, &payer.pubkey(), &payer.pubkey(), &entries).unwrap();

        let tx = legacy_tx(&ledger, &payer, &[create, extend]).await;
        ledger.send_transaction(&tx, CommitmentConfig::confirmed()).await.unwrap();

        assert_eq!(ledger.table_entries(&table), Some(entries.clone()));
        ledger.advance_slots(5);
        let fetched = ledger
            .get_address_lookup_table(&table, CommitmentConfig::confirmed())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(fetched.addresses, entries);
    }

    #[tokio::test]
    async fn test_unknown_blockhash_is_rejected() {
        let ledger = MockLedger::new();
        let payer = Keypair::new();
        let message = Message::new(
            &[system_instruction::transfer(&payer.pubkey(), &Pubkey::new_unique(), 1)],
            Some(&payer.pubkey()),
        );
        let tx = VersionedTransaction::from(Transaction::new(&[&payer], message, Hash::new_unique()));

        let err = ledger.send_transaction(&tx, CommitmentConfig::confirmed()).await.unwrap_err();
        assert!(matches!(err, RpcError::BlockhashNotFound { .. }));
    }

    #[tokio::test]
    async fn test_resend_of_landed_bytes_is_already_processed() {
        let ledger = MockLedger::new();
        let payer = Keypair::new();
        let tx = legacy_tx(&ledger, &payer, &[system_instruction::transfer(&payer.pubkey(), &Pubkey::new_unique(), 1)]).await;

        ledger.send_transaction(&tx, CommitmentConfig::confirmed()).await.unwrap();
        let err = ledger.send_transaction(&tx, CommitmentConfig::confirmed()).await.unwrap_err();

        assert!(matches!(err, RpcError::AlreadyProcessed { .. }));
        assert_eq!(ledger.sent_transactions().len(), 1);
        assert_eq!(ledger.send_attempts(), 2);
    }

    #[tokio::test]
    async fn test_preflight_rejects_failing_program_without_landing() {
        let ledger = MockLedger::new();
        let payer = Keypair::new();
        let program = Pubkey::new_unique();
        ledger.fail_program(program);
        let ix = solana_sdk::instruction::Instruction::new_with_bytes(program, &[], vec![]);
        let tx = legacy_tx(&ledger, &payer, &[ix]).await;

        let err = ledger.send_transaction(&tx, CommitmentConfig::confirmed()).await.unwrap_err();
        match err {
            RpcError::SendRejected { message, .. } => assert!(message.contains("custom program error")),
            other => panic!("expected SendRejected, got {:?}", other),
        }
        assert!(ledger.sent_transactions().is_empty());
        assert!(ledger.get_signature_status(&tx.signatures[0]).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_without_preflight_failing_program_lands_with_error() {
        let ledger = MockLedger::with_config(MockLedgerConfig {
            preflight: false,
            ..MockLedgerConfig::default()
        });
        let payer = Keypair::new();
        let program = Pubkey::new_unique();
        ledger.fail_program(program);
        let ix = solana_sdk::instruction::Instruction::new_with_bytes(program, &[], vec![]);
        let tx = legacy_tx(&ledger, &payer, &[ix]).await;

        let sig = ledger.send_transaction(&tx, CommitmentConfig::confirmed()).await.unwrap();
        ledger.advance_slots(2);
        let status = ledger.get_signature_status(&sig).await.unwrap().unwrap();
        assert!(status.err.is_some());
    }
}
