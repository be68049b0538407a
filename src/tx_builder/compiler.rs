//! Versioned (v0) message compilation against lookup table snapshots
//!
//! Compilation is a pure function of (payer, anchor, instructions, tables).
//! Accounts found in a supplied table are encoded as (table, index) pairs,
//! the first table in supplied order winning ties. Signers, the fee payer
//! and invoked program ids always stay in the static key list.

use std::collections::BTreeSet;

use solana_sdk::{
    address_lookup_table::AddressLookupTableAccount,
    instruction::Instruction,
    message::{v0, VersionedMessage},
    pubkey::Pubkey,
};

use super::errors::TransactionBuilderError;
use crate::lookup_table::{TableSnapshot, LOOKUP_TABLE_MAX_ADDRESSES};
use crate::rpc::BlockhashAnchor;

/// Account indices in a compiled message are a single byte
pub const MAX_ACCOUNTS_PER_MESSAGE: usize = 256;

/// Compile a v0 message
pub fn compile(
    payer: &Pubkey,
    anchor: &BlockhashAnchor,
    instructions: &[Instruction],
    tables: &[TableSnapshot],
) -> Result<VersionedMessage, TransactionBuilderError> {
    if instructions.is_empty() {
        return Err(TransactionBuilderError::EmptyInstructions);
    }

    for table in tables {
        if table.len() > LOOKUP_TABLE_MAX_ADDRESSES {
            return Err(TransactionBuilderError::TableOverCapacity {
                table: table.address(),
                len: table.len(),
                max: LOOKUP_TABLE_MAX_ADDRESSES,
            });
        }
    }

    let count = distinct_accounts(payer, instructions).len();
    if count > MAX_ACCOUNTS_PER_MESSAGE {
        return Err(TransactionBuilderError::TooManyAccounts {
            count,
            max: MAX_ACCOUNTS_PER_MESSAGE,
        });
    }

    let accounts: Vec<AddressLookupTableAccount> =
        tables.iter().map(TableSnapshot::to_account).collect();

    let message = v0::Message::try_compile(payer, instructions, &accounts, anchor.blockhash)
        .map_err(|e| TransactionBuilderError::Compile(e.to_string()))?;

    Ok(VersionedMessage::V0(message))
}

/// Every account a message for these instructions must address
pub fn distinct_accounts(payer: &Pubkey, instructions: &[Instruction]) -> BTreeSet<Pubkey> {
    let mut keys = BTreeSet::new();
    keys.insert(*payer);
    for ix in instructions {
        keys.insert(ix.program_id);
        keys.extend(ix.accounts.iter().map(|meta| meta.pubkey));
    }
    keys
}

/// Full account list of a v0 message: static keys, then every table's
/// writable lookups, then every table's readonly lookups.
pub fn resolve_account_keys(
    message: &v0::Message,
    tables: &[TableSnapshot],
) -> Result<Vec<Pubkey>, TransactionBuilderError> {
    let mut writable = Vec::new();
    let mut readonly = Vec::new();

    for lookup in &message.address_table_lookups {
        let table = tables
            .iter()
            .find(|t| t.address() == lookup.account_key)
            .ok_or_else(|| {
                TransactionBuilderError::Resolution(format!(
                    "lookup table {} not supplied",
                    lookup.account_key
                ))
            })?;

        for (indexes, out) in [
            (&lookup.writable_indexes, &mut writable),
            (&lookup.readonly_indexes, &mut readonly),
        ] {
            for &index in indexes.iter() {
                let key = table.get(index as usize).ok_or_else(|| {
                    TransactionBuilderError::Resolution(format!(
                        "index {} out of range for table {} ({} entries)",
                        index,
                        table.address(),
                        table.len()
                    ))
                })?;
                out.push(key);
            }
        }
    }

    let mut keys = message.account_keys.clone();
    keys.extend(writable);
    keys.extend(readonly);
    Ok(keys)
}

/// Account keys of one compiled instruction, resolved against static keys and tables
pub fn decode_instruction_accounts(
    message: &v0::Message,
    tables: &[TableSnapshot],
    ix_index: usize,
) -> Result<(Pubkey, Vec<Pubkey>), TransactionBuilderError> {
    let keys = resolve_account_keys(message, tables)?;
    let ix = message.instructions.get(ix_index).ok_or_else(|| {
        TransactionBuilderError::Resolution(format!("no instruction at index {}", ix_index))
    })?;

    let lookup = |index: u8| {
        keys.get(index as usize).copied().ok_or_else(|| {
            TransactionBuilderError::Resolution(format!(
                "account index {} out of range ({} keys)",
                index,
                keys.len()
            ))
        })
    };

    let program_id = lookup(ix.program_id_index)?;
    let accounts = ix
        .accounts
        .iter()
        .map(|&i| lookup(i))
        .collect::<Result<Vec<_>, _>>()?;
    Ok((program_id, accounts))
}
