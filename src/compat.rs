//! Version-agnostic accessors over `VersionedMessage`
//!
//! Funding transfers are legacy messages while every other flow transaction
//! is v0. Code that inspects signed transactions (signer checks, audit
//! logging, tests) goes through these helpers instead of matching on the
//! message version at each call site.

use solana_sdk::{
    message::{v0::MessageAddressTableLookup, MessageHeader, VersionedMessage},
    pubkey::Pubkey,
};

#[inline]
#[must_use]
pub fn get_message_header(message: &VersionedMessage) -> &MessageHeader {
    match message {
        VersionedMessage::Legacy(legacy_msg) => &legacy_msg.header,
        VersionedMessage::V0(v0_msg) => &v0_msg.header,
    }
}

/// Keys embedded in the message itself.
///
/// For v0 messages this excludes everything loaded through lookup tables.
#[inline]
#[must_use]
pub fn get_static_account_keys(message: &VersionedMessage) -> &[Pubkey] {
    match message {
        VersionedMessage::Legacy(legacy_msg) => &legacy_msg.account_keys,
        VersionedMessage::V0(v0_msg) => &v0_msg.account_keys,
    }
}

/// The leading static keys that must sign, fee payer first
#[inline]
#[must_use]
pub fn get_required_signers(message: &VersionedMessage) -> &[Pubkey] {
    let keys = get_static_account_keys(message);
    let count = usize::from(get_message_header(message).num_required_signatures).min(keys.len());
    &keys[..count]
}

/// Table lookups carried by the message; always empty for legacy messages
#[inline]
#[must_use]
pub fn get_address_table_lookups(message: &VersionedMessage) -> &[MessageAddressTableLookup] {
    match message {
        VersionedMessage::Legacy(_) => &[],
        VersionedMessage::V0(v0_msg) => &v0_msg.address_table_lookups,
    }
}

/// Number of accounts the message loads through lookup tables
#[must_use]
pub fn count_loaded_addresses(message: &VersionedMessage) -> usize {
    get_address_table_lookups(message)
        .iter()
        .map(|lookup| lookup.writable_indexes.len() + lookup.readonly_indexes.len())
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use solana_sdk::{
        hash::Hash,
        instruction::{AccountMeta, Instruction},
        message::{v0, Message},
    };

    fn ix(payer: Pubkey, others: &[Pubkey]) -> Instruction {
        let mut accounts = vec![AccountMeta::new(payer, true)];
        accounts.extend(others.iter().map(|k| AccountMeta::new_readonly(*k, false)));
        Instruction::new_with_bytes(Pubkey::new_unique(), &[0], accounts)
    }

    #[test]
    fn test_legacy_message_has_no_lookups() {
        let payer = Pubkey::new_unique();
        let msg = VersionedMessage::Legacy(Message::new(&[ix(payer, &[Pubkey::new_unique()])], Some(&payer)));

        assert_eq!(get_required_signers(&msg), &[payer]);
        assert!(get_address_table_lookups(&msg).is_empty());
        assert_eq!(count_loaded_addresses(&msg), 0);
        assert_eq!(get_static_account_keys(&msg).len(), 3);
    }

    #[test]
    fn test_v0_loaded_addresses_counted_from_lookups() {
        let payer = Pubkey::new_unique();
        let resident: Vec<Pubkey> = (0..5).map(|_| Pubkey::new_unique()).collect();
        let table = solana_sdk::address_lookup_table::AddressLookupTableAccount {
            key: Pubkey::new_unique(),
            addresses: resident.clone(),
        };

        let msg = v0::Message::try_compile(&payer, &[ix(payer, &resident)], &[table], Hash::new_unique()).unwrap();
        let msg = VersionedMessage::V0(msg);

        assert_eq!(get_message_header(&msg).num_required_signatures, 1);
        assert_eq!(get_required_signers(&msg), &[payer]);
        assert_eq!(get_address_table_lookups(&msg).len(), 1);
        assert_eq!(count_loaded_addresses(&msg), resident.len());
        // payer and program id only
        assert_eq!(get_static_account_keys(&msg).len(), 2);
    }
}
