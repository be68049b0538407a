use solana_sdk::pubkey::Pubkey;
use thiserror::Error;

use crate::pipeline::PipelineError;
use crate::rpc::RpcError;

#[derive(Debug, Error)]
pub enum LookupTableError {
    #[error("extend batch is empty")]
    EmptyBatch,

    #[error("extend batch of {len} addresses exceeds the per-transaction limit of {max}")]
    BatchTooLarge { len: usize, max: usize },

    #[error("{len} addresses exceed lookup table capacity of {max}")]
    TooManyAddresses { len: usize, max: usize },

    #[error("lookup table {table} not visible with {expected} entries after {attempts} attempts (last seen: {seen:?})")]
    FetchTimeout {
        table: Pubkey,
        expected: usize,
        attempts: u32,
        seen: Option<usize>,
    },

    #[error("lookup table operation on {table} cancelled")]
    Cancelled { table: Pubkey },

    #[error(transparent)]
    Rpc(#[from] RpcError),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}

impl LookupTableError {
    pub fn category(&self) -> &'static str {
        match self {
            LookupTableError::EmptyBatch
            | LookupTableError::BatchTooLarge { .. }
            | LookupTableError::TooManyAddresses { .. } => "construction",
            LookupTableError::FetchTimeout { .. } => "fetch_timeout",
            LookupTableError::Cancelled { .. } => "cancelled",
            LookupTableError::Rpc(err) => err.category(),
            LookupTableError::Pipeline(err) => err.category(),
        }
    }
}
