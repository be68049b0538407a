//! `LedgerRpc` over the nonblocking `solana-client` RPC client

use std::time::Duration;

use async_trait::async_trait;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_client::rpc_config::RpcSendTransactionConfig;
use solana_rpc_client_api::{config::RpcTransactionConfig, request::RpcRequest};
use solana_sdk::{
    address_lookup_table::{state::AddressLookupTable, AddressLookupTableAccount},
    clock::Slot,
    commitment_config::{CommitmentConfig, CommitmentLevel},
    pubkey::Pubkey,
    signature::Signature,
    transaction::VersionedTransaction,
};
use solana_transaction_status::{TransactionConfirmationStatus, UiTransactionEncoding};
use tracing::debug;

use super::{BlockhashAnchor, LedgerRpc, RpcError, RpcResult, SignatureStatus};

/// JSON-RPC backed ledger client
pub struct SolanaRpc {
    client: RpcClient,
    endpoint: String,
}

impl SolanaRpc {
    pub fn new(url: &str, timeout: Duration, commitment: CommitmentConfig) -> Self {
        Self {
            client: RpcClient::new_with_timeout_and_commitment(url.to_string(), timeout, commitment),
            endpoint: url.to_string(),
        }
    }

    fn map_err(&self, err: solana_client::client_error::ClientError) -> RpcError {
        RpcError::from_client_error(err, &self.endpoint)
    }
}

impl std::fmt::Debug for SolanaRpc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SolanaRpc")
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

#[async_trait]
impl LedgerRpc for SolanaRpc {
    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn get_latest_blockhash(
        &self,
        commitment: CommitmentConfig,
    ) -> RpcResult<BlockhashAnchor> {
        let (blockhash, last_valid_block_height) = self
            .client
            .get_latest_blockhash_with_commitment(commitment)
            .await
            .map_err(|e| self.map_err(e))?;
        Ok(BlockhashAnchor {
            blockhash,
            last_valid_block_height,
        })
    }

    async fn get_block_height(&self, commitment: CommitmentConfig) -> RpcResult<u64> {
        self.client
            .get_block_height_with_commitment(commitment)
            .await
            .map_err(|e| self.map_err(e))
    }

    async fn get_slot(&self, commitment: CommitmentConfig) -> RpcResult<Slot> {
        self.client
            .get_slot_with_commitment(commitment)
            .await
            .map_err(|e| self.map_err(e))
    }

    async fn send_transaction(
        &self,
        tx: &VersionedTransaction,
        preflight_commitment: CommitmentConfig,
    ) -> RpcResult<Signature> {
        let config = RpcSendTransactionConfig {
            skip_preflight: false,
            preflight_commitment: Some(preflight_commitment.commitment),
            // Rebroadcast is owned by the confirmation pipeline
            max_retries: Some(0),
            ..RpcSendTransactionConfig::default()
        };
        self.client
            .send_transaction_with_config(tx, config)
            .await
            .map_err(|e| self.map_err(e))
    }

    async fn get_signature_status(
        &self,
        signature: &Signature,
    ) -> RpcResult<Option<SignatureStatus>> {
        let response = self
            .client
            .get_signature_statuses(&[*signature])
            .await
            .map_err(|e| self.map_err(e))?;

        let status = response.value.into_iter().next().flatten().map(|status| {
            let confirmation = match status.confirmation_status {
                Some(TransactionConfirmationStatus::Processed) => CommitmentLevel::Processed,
                Some(TransactionConfirmationStatus::Confirmed) => CommitmentLevel::Confirmed,
                Some(TransactionConfirmationStatus::Finalized) => CommitmentLevel::Finalized,
                // Nodes that omit confirmationStatus report rooted slots with no confirmation count
                None if status.confirmations.is_none() => CommitmentLevel::Finalized,
                None => CommitmentLevel::Processed,
            };
            SignatureStatus {
                slot: status.slot,
                confirmation,
                err: status.err,
            }
        });
        Ok(status)
    }

    async fn get_parsed_transaction(
        &self,
        signature: &Signature,
        commitment: CommitmentConfig,
    ) -> RpcResult<Option<serde_json::Value>> {
        let config = RpcTransactionConfig {
            encoding: Some(UiTransactionEncoding::JsonParsed),
            commitment: Some(commitment),
            max_supported_transaction_version: Some(0),
        };
        // Sent raw so that a null result stays distinguishable from a decode failure
        self.client
            .send::<Option<serde_json::Value>>(
                RpcRequest::GetTransaction,
                serde_json::json!([signature.to_string(), config]),
            )
            .await
            .map_err(|e| self.map_err(e))
    }

    async fn get_address_lookup_table(
        &self,
        address: &Pubkey,
        commitment: CommitmentConfig,
    ) -> RpcResult<Option<AddressLookupTableAccount>> {
        let account = self
            .client
            .get_account_with_commitment(address, commitment)
            .await
            .map_err(|e| self.map_err(e))?
            .value;

        let Some(account) = account else {
            debug!(table = %address, "lookup table account not visible yet");
            return Ok(None);
        };

        let table = AddressLookupTable::deserialize(&account.data).map_err(|e| {
            RpcError::Decode {
                what: "address lookup table",
                account: address.to_string(),
                message: e.to_string(),
            }
        })?;

        Ok(Some(AddressLookupTableAccount {
            key: *address,
            addresses: table.addresses.to_vec(),
        }))
    }

    async fn get_balance(&self, pubkey: &Pubkey, commitment: CommitmentConfig) -> RpcResult<u64> {
        self.client
            .get_balance_with_commitment(pubkey, commitment)
            .await
            .map(|response| response.value)
            .map_err(|e| self.map_err(e))
    }
}
