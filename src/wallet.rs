//! Signer capabilities
//!
//! Two distinct capabilities are modelled:
//! - [`FundingWallet`]: a long-lived wallet that only ever signs whole legacy
//!   transactions handed to it. Its key material is never exposed.
//! - [`EphemeralSigner`]: a throwaway keypair created for one flow. It pays for
//!   and signs every versioned transaction of that flow.

use std::sync::Arc;

use anyhow::{Context, Result};
use solana_sdk::{
    hash::Hash,
    instruction::Instruction,
    message::Message,
    pubkey::Pubkey,
    signature::{Keypair, Signer},
    system_instruction,
    transaction::Transaction,
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WalletError {
    #[error("wallet {wallet} is not a signer of this transaction")]
    NotASigner { wallet: Pubkey },

    #[error("signing failed: {0}")]
    Signing(String),
}

/// Wallet that can authorize transactions but cannot lend out its key
pub struct FundingWallet {
    keypair: Arc<Keypair>,
}

impl FundingWallet {
    /// Load from a keypair file (JSON byte array or raw 64 bytes)
    pub fn from_file(path: &str) -> Result<Self> {
        let keypair_bytes = std::fs::read(path)
            .with_context(|| format!("Failed to read keypair file: {}", path))?;

        let bytes: Vec<u8> = if keypair_bytes.len() == 64 {
            keypair_bytes
        } else {
            serde_json::from_slice(&keypair_bytes).context("Failed to parse keypair JSON")?
        };

        if bytes.len() != 64 {
            anyhow::bail!("Invalid keypair length: expected 64 bytes, got {}", bytes.len());
        }
        if bytes.iter().all(|&b| b == 0) {
            anyhow::bail!("Invalid keypair: all-zero key rejected");
        }

        let keypair = Keypair::try_from(bytes.as_slice()).context("Invalid keypair bytes")?;
        Ok(Self::from_keypair(keypair))
    }

    pub fn from_keypair(keypair: Keypair) -> Self {
        Self {
            keypair: Arc::new(keypair),
        }
    }

    pub fn pubkey(&self) -> Pubkey {
        self.keypair.pubkey()
    }

    /// Sign a legacy transaction in place, leaving other signer slots untouched
    pub fn sign_transaction(&self, tx: &mut Transaction, blockhash: Hash) -> Result<(), WalletError> {
        let me = self.pubkey();
        let is_signer = tx
            .message
            .account_keys
            .iter()
            .take(tx.message.header.num_required_signatures as usize)
            .any(|key| *key == me);
        if !is_signer {
            return Err(WalletError::NotASigner { wallet: me });
        }

        tx.try_partial_sign(&[self.keypair.as_ref()], blockhash)
            .map_err(|e| WalletError::Signing(e.to_string()))
    }

    /// Build and sign a legacy transfer funding `recipient`, with this wallet as fee payer
    pub fn funding_transaction(
        &self,
        recipient: &Pubkey,
        lamports: u64,
        blockhash: Hash,
    ) -> Result<Transaction, WalletError> {
        let ix: Instruction = system_instruction::transfer(&self.pubkey(), recipient, lamports);
        let message = Message::new(&[ix], Some(&self.pubkey()));
        let mut tx = Transaction::new_unsigned(message);
        self.sign_transaction(&mut tx, blockhash)?;
        Ok(tx)
    }
}

impl std::fmt::Debug for FundingWallet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FundingWallet")
            .field("pubkey", &self.pubkey())
            .finish()
    }
}

/// Throwaway keypair that pays for and signs the flow's versioned transactions
pub struct EphemeralSigner {
    keypair: Keypair,
}

impl EphemeralSigner {
    pub fn generate() -> Self {
        Self {
            keypair: Keypair::new(),
        }
    }

    pub fn from_keypair(keypair: Keypair) -> Self {
        Self { keypair }
    }

    pub fn pubkey(&self) -> Pubkey {
        self.keypair.pubkey()
    }

    /// Direct signing authority, usable by `VersionedTransaction::try_new`
    pub fn signer(&self) -> &dyn Signer {
        &self.keypair
    }
}

impl std::fmt::Debug for EphemeralSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EphemeralSigner")
            .field("pubkey", &self.pubkey())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_funding_transaction_is_fully_signed() {
        let wallet = FundingWallet::from_keypair(Keypair::new());
        let recipient = EphemeralSigner::generate();
        let blockhash = Hash::new_unique();

        let tx = wallet
            .funding_transaction(&recipient.pubkey(), 1_000_000_000, blockhash)
            .unwrap();

        assert!(tx.is_signed());
        assert_eq!(tx.message.account_keys[0], wallet.pubkey());
        assert_eq!(tx.message.recent_blockhash, blockhash);
        assert!(tx.verify().is_ok());
    }

    #[test]
    fn test_wallet_refuses_foreign_transaction() {
        let wallet = FundingWallet::from_keypair(Keypair::new());
        let other = Keypair::new();
        let ix = system_instruction::transfer(&other.pubkey(), &Pubkey::new_unique(), 1);
        let mut tx = Transaction::new_unsigned(Message::new(&[ix], Some(&other.pubkey())));

        let err = wallet.sign_transaction(&mut tx, Hash::new_unique()).unwrap_err();
        assert!(matches!(err, WalletError::NotASigner { .. }));
    }

    #[test]
    fn test_load_json_keypair_file() {
        let keypair = Keypair::new();
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let json = serde_json::to_string(&keypair.to_bytes().to_vec()).unwrap();
        file.write_all(json.as_bytes()).unwrap();

        let wallet = FundingWallet::from_file(file.path().to_str().unwrap()).unwrap();
        assert_eq!(wallet.pubkey(), keypair.pubkey());
    }

    #[test]
    fn test_reject_all_zero_keypair() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&[0u8; 64]).unwrap();

        assert!(FundingWallet::from_file(file.path().to_str().unwrap()).is_err());
    }

    #[test]
    fn test_debug_does_not_leak_secret() {
        let keypair = Keypair::new();
        let secret = keypair.to_base58_string();
        let wallet = FundingWallet::from_keypair(keypair);
        let rendered = format!("{:?}", wallet);
        assert!(!rendered.contains(&secret));
    }
}
