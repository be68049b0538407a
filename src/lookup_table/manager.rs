//! Table lifecycle driver: create, extend batch by batch, fetch until visible

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use solana_sdk::{clock::Slot, pubkey::Pubkey};
use tracing::{debug, info};

use super::{
    chunk_addresses, create_table, extend_table, LookupTableError, TableSnapshot,
    LOOKUP_TABLE_MAX_ADDRESSES,
};
use crate::metrics::metrics;
use crate::pipeline::{ConfirmationPipeline, Stage};
use crate::retry::{poll_until, PollError, PollPolicy};
use crate::rpc::RpcError;
use crate::wallet::EphemeralSigner;

/// A created table and what has been committed to it so far
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableHandle {
    pub address: Pubkey,
    pub authority: Pubkey,
    /// Entries committed by confirmed extends
    pub committed_len: usize,
    /// Slot of the last confirmed extend; new entries are usable only after it
    pub last_extended_slot: Option<Slot>,
}

pub struct LookupTableManager<'a> {
    pipeline: &'a ConfirmationPipeline,
    batch_size: usize,
    fetch_policy: PollPolicy,
}

impl<'a> LookupTableManager<'a> {
    pub fn new(pipeline: &'a ConfirmationPipeline, batch_size: usize, fetch_policy: PollPolicy) -> Self {
        Self {
            pipeline,
            batch_size,
            fetch_policy,
        }
    }

    /// Create a table owned by `authority` and fill it with `addresses`.
    ///
    /// The create instruction travels with the first batch; every further batch
    /// is its own transaction, confirmed before the next is sent.
    pub async fn create_and_extend(
        &self,
        authority: &EphemeralSigner,
        addresses: &[Pubkey],
    ) -> Result<TableHandle, LookupTableError> {
        if addresses.len() > LOOKUP_TABLE_MAX_ADDRESSES {
            return Err(LookupTableError::TooManyAddresses {
                len: addresses.len(),
                max: LOOKUP_TABLE_MAX_ADDRESSES,
            });
        }

        let commitment = self.pipeline.settings().commitment;
        let recent_slot = self.pipeline.rpc().get_slot(commitment).await?;
        let (create_ix, address) = create_table(&authority.pubkey(), &authority.pubkey(), recent_slot);
        info!(table = %address, recent_slot, addresses = addresses.len(), "creating lookup table");

        let mut batches = chunk_addresses(addresses, self.batch_size).into_iter();
        let mut instructions = vec![create_ix];
        let first_len = match batches.next() {
            Some(first) => {
                instructions.push(extend_table(&address, &authority.pubkey(), &authority.pubkey(), &first)?);
                first.len()
            }
            None => 0,
        };

        let record = self
            .pipeline
            .send_and_confirm(authority, &instructions, &[], Stage::CreateTable)
            .await?
            .into_result()?;

        let mut handle = TableHandle {
            address,
            authority: authority.pubkey(),
            committed_len: first_len,
            last_extended_slot: None,
        };
        if first_len > 0 {
            handle.last_extended_slot = confirmed_slot(&record.outcome);
            metrics().table_extensions.inc();
        }

        let rest: Vec<Vec<Pubkey>> = batches.collect();
        self.extend_batches(authority, &mut handle, rest, 1).await?;
        Ok(handle)
    }

    /// Append `addresses` to an existing table in confirmed batches
    pub async fn extend(
        &self,
        authority: &EphemeralSigner,
        handle: &mut TableHandle,
        addresses: &[Pubkey],
    ) -> Result<(), LookupTableError> {
        let total = handle.committed_len + addresses.len();
        if total > LOOKUP_TABLE_MAX_ADDRESSES {
            return Err(LookupTableError::TooManyAddresses {
                len: total,
                max: LOOKUP_TABLE_MAX_ADDRESSES,
            });
        }
        let batches = chunk_addresses(addresses, self.batch_size);
        self.extend_batches(authority, handle, batches, 0).await
    }

    async fn extend_batches(
        &self,
        authority: &EphemeralSigner,
        handle: &mut TableHandle,
        batches: Vec<Vec<Pubkey>>,
        first_index: usize,
    ) -> Result<(), LookupTableError> {
        for (i, batch) in batches.into_iter().enumerate() {
            let stage = Stage::ExtendTable {
                batch: first_index + i,
            };
            let ix = extend_table(&handle.address, &authority.pubkey(), &authority.pubkey(), &batch)?;

            let record = self
                .pipeline
                .send_and_confirm(authority, &[ix], &[], stage)
                .await?
                .into_result()?;

            handle.committed_len += batch.len();
            handle.last_extended_slot = confirmed_slot(&record.outcome).or(handle.last_extended_slot);
            metrics().table_extensions.inc();
            info!(
                table = %handle.address,
                %stage,
                added = batch.len(),
                committed = handle.committed_len,
                "lookup table extended"
            );
        }
        Ok(())
    }

    /// Fetch the materialized table, polling until it is visible and holds
    /// every committed entry, then until the cluster has moved past the last
    /// extend slot so that the entries can be used in lookups.
    pub async fn fetch_table(&self, handle: &TableHandle) -> Result<TableSnapshot, LookupTableError> {
        let snapshot = self.fetch_with_len(&handle.address, handle.committed_len).await?;
        if let Some(slot) = handle.last_extended_slot {
            self.wait_past_slot(&handle.address, slot).await?;
        }
        Ok(snapshot)
    }

    /// Fetch `address` until it holds at least `expected` entries
    pub async fn fetch_with_len(
        &self,
        address: &Pubkey,
        expected: usize,
    ) -> Result<TableSnapshot, LookupTableError> {
        let rpc = self.pipeline.rpc();
        let commitment = self.pipeline.settings().commitment;
        let seen = Arc::new(AtomicUsize::new(usize::MAX));

        let result = poll_until("fetch_lookup_table", &self.fetch_policy, self.pipeline.cancel_token(), |_| {
            let seen = Arc::clone(&seen);
            async move {
                match rpc.get_address_lookup_table(address, commitment).await? {
                    Some(account) if account.addresses.len() >= expected => Ok::<_, RpcError>(Some(account)),
                    Some(account) => {
                        debug!(
                            table = %address,
                            visible = account.addresses.len(),
                            expected,
                            "lookup table visible but lagging"
                        );
                        seen.store(account.addresses.len(), Ordering::Relaxed);
                        Ok(None)
                    }
                    None => Ok(None),
                }
            }
        })
        .await;

        match result {
            Ok(account) => {
                let snapshot = TableSnapshot::from(account);
                info!(table = %address, entries = snapshot.len(), "lookup table fetched");
                Ok(snapshot)
            }
            Err(PollError::Exhausted { attempts, .. }) => {
                let seen = seen.load(Ordering::Relaxed);
                Err(LookupTableError::FetchTimeout {
                    table: *address,
                    expected,
                    attempts,
                    seen: (seen != usize::MAX).then_some(seen),
                })
            }
            Err(PollError::Cancelled { .. }) => Err(LookupTableError::Cancelled { table: *address }),
            Err(PollError::Fatal(err)) => Err(err.into()),
        }
    }

    async fn wait_past_slot(&self, table: &Pubkey, slot: Slot) -> Result<(), LookupTableError> {
        let rpc = self.pipeline.rpc();
        let commitment = self.pipeline.settings().commitment;

        let result = poll_until("lookup_table_activation", &self.fetch_policy, self.pipeline.cancel_token(), |_| async move {
            let current = rpc.get_slot(commitment).await?;
            Ok::<_, RpcError>((current > slot).then_some(current))
        })
        .await;

        match result {
            Ok(current) => {
                debug!(table = %table, last_extended_slot = slot, current, "lookup table entries active");
                Ok(())
            }
            Err(PollError::Exhausted { attempts, .. }) => Err(LookupTableError::FetchTimeout {
                table: *table,
                expected: 0,
                attempts,
                seen: None,
            }),
            Err(PollError::Cancelled { .. }) => Err(LookupTableError::Cancelled { table: *table }),
            Err(PollError::Fatal(err)) => Err(err.into()),
        }
    }
}

fn confirmed_slot(outcome: &crate::pipeline::TxOutcome) -> Option<Slot> {
    match outcome {
        crate::pipeline::TxOutcome::Confirmed { slot } => Some(*slot),
        _ => None,
    }
}
