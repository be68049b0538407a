//! Signed transaction output
//!
//! A [`SignedTransaction`] carries the signed bytes together with the anchor
//! they were signed against. The signatures bind the exact message bytes: the
//! only way to change the message is to compile and sign a new one.

use solana_sdk::{
    pubkey::Pubkey,
    signature::Signature,
    transaction::VersionedTransaction,
};

use crate::rpc::BlockhashAnchor;

#[derive(Debug, Clone)]
pub struct SignedTransaction {
    tx: VersionedTransaction,

    /// Anchor the message was compiled against
    anchor: BlockhashAnchor,

    /// Extracted from message.header.num_required_signatures
    required_signers: Vec<Pubkey>,
}

impl SignedTransaction {
    pub fn new(tx: VersionedTransaction, anchor: BlockhashAnchor) -> Self {
        let required_signers = crate::compat::get_required_signers(&tx.message).to_vec();
        Self {
            tx,
            anchor,
            required_signers,
        }
    }

    pub fn tx(&self) -> &VersionedTransaction {
        &self.tx
    }

    pub fn anchor(&self) -> &BlockhashAnchor {
        &self.anchor
    }

    pub fn required_signers(&self) -> &[Pubkey] {
        &self.required_signers
    }

    /// Fee payer signature, which is also the transaction id
    pub fn signature(&self) -> Signature {
        self.tx.signatures.first().copied().unwrap_or_default()
    }

    /// Serialized message bytes that every signature binds to
    pub fn message_bytes(&self) -> Vec<u8> {
        self.tx.message.serialize()
    }

    /// Check every signature against the current message bytes
    pub fn verify(&self) -> bool {
        self.tx.signatures.len() == self.required_signers.len()
            && self.tx.verify_with_results().iter().all(|ok| *ok)
    }

    pub fn into_tx(self) -> VersionedTransaction {
        self.tx
    }
}
