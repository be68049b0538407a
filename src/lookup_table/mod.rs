//! Address lookup table management
//!
//! Instruction builders for the address-lookup-table program, batching of
//! large address sets, and the [`LookupTableManager`] that drives creation,
//! sequential extension and the retry-until-visible fetch.

use solana_sdk::{
    address_lookup_table::{
        instruction::{close_lookup_table, create_lookup_table, deactivate_lookup_table, extend_lookup_table},
        AddressLookupTableAccount,
    },
    clock::Slot,
    instruction::Instruction,
    pubkey::Pubkey,
};

mod errors;
mod manager;

pub use errors::LookupTableError;
pub use manager::{LookupTableManager, TableHandle};

/// On-chain capacity of one lookup table
pub const LOOKUP_TABLE_MAX_ADDRESSES: usize = 256;

/// Most addresses one extend instruction can carry inside a packet
pub const MAX_EXTEND_BATCH: usize = 30;

/// Materialized table contents as fetched from the ledger.
///
/// Treated as immutable for the rest of the flow once fetched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSnapshot {
    address: Pubkey,
    addresses: Vec<Pubkey>,
}

impl TableSnapshot {
    pub fn new(address: Pubkey, addresses: Vec<Pubkey>) -> Self {
        Self { address, addresses }
    }

    pub fn address(&self) -> Pubkey {
        self.address
    }

    pub fn addresses(&self) -> &[Pubkey] {
        &self.addresses
    }

    pub fn len(&self) -> usize {
        self.addresses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.addresses.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<Pubkey> {
        self.addresses.get(index).copied()
    }

    /// First position of `key`, matching how lookups resolve ties
    pub fn position(&self, key: &Pubkey) -> Option<usize> {
        self.addresses.iter().position(|a| a == key)
    }

    pub fn to_account(&self) -> AddressLookupTableAccount {
        AddressLookupTableAccount {
            key: self.address,
            addresses: self.addresses.clone(),
        }
    }
}

impl From<AddressLookupTableAccount> for TableSnapshot {
    fn from(account: AddressLookupTableAccount) -> Self {
        Self {
            address: account.key,
            addresses: account.addresses,
        }
    }
}

/// Create instruction plus the table address derived from `(authority, recent_slot)`.
///
/// Slot freshness is checked by the network at submission, not here.
pub fn create_table(authority: &Pubkey, payer: &Pubkey, recent_slot: Slot) -> (Instruction, Pubkey) {
    create_lookup_table(*authority, *payer, recent_slot)
}

/// Append `addresses` to `table`; the authority must sign
pub fn extend_table(
    table: &Pubkey,
    authority: &Pubkey,
    payer: &Pubkey,
    addresses: &[Pubkey],
) -> Result<Instruction, LookupTableError> {
    if addresses.is_empty() {
        return Err(LookupTableError::EmptyBatch);
    }
    if addresses.len() > MAX_EXTEND_BATCH {
        return Err(LookupTableError::BatchTooLarge {
            len: addresses.len(),
            max: MAX_EXTEND_BATCH,
        });
    }
    Ok(extend_lookup_table(
        *table,
        *authority,
        Some(*payer),
        addresses.to_vec(),
    ))
}

/// Stop new lookups through the table; it can be closed once deactivation cools down
pub fn deactivate_table(table: &Pubkey, authority: &Pubkey) -> Instruction {
    deactivate_lookup_table(*table, *authority)
}

/// Reclaim a deactivated table's rent to `recipient`
pub fn close_table(table: &Pubkey, authority: &Pubkey, recipient: &Pubkey) -> Instruction {
    close_lookup_table(*table, *authority, *recipient)
}

/// Split `addresses` into ordered batches of at most `batch_size` (clamped to `1..=MAX_EXTEND_BATCH`).
/// Duplicates are kept.
pub fn chunk_addresses(addresses: &[Pubkey], batch_size: usize) -> Vec<Vec<Pubkey>> {
    let size = batch_size.clamp(1, MAX_EXTEND_BATCH);
    addresses.chunks(size).map(<[Pubkey]>::to_vec).collect()
}
