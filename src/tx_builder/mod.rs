//! Versioned transaction builder
//!
//! - **compiler**: deterministic v0 compilation against lookup table snapshots,
//!   plus decoding helpers to resolve a compiled message back to full keys
//! - **context**: validity anchor for one signing attempt
//! - **builder**: fetch anchor, compile, sign
//! - **output**: signed transaction bound to its anchor
//! - **errors**: construction error taxonomy
//!
//! ```rust,no_run
//! # use lut_flow::tx_builder::{compile, TransactionBuilderError};
//! # use lut_flow::rpc::BlockhashAnchor;
//! # fn compile_with_table(
//! #     payer: solana_sdk::pubkey::Pubkey,
//! #     anchor: BlockhashAnchor,
//! #     ixs: Vec<solana_sdk::instruction::Instruction>,
//! #     table: lut_flow::lookup_table::TableSnapshot,
//! # ) -> Result<(), TransactionBuilderError> {
//! let message = compile(&payer, &anchor, &ixs, &[table])?;
//! # Ok(())
//! # }
//! ```

pub mod errors;
pub use errors::TransactionBuilderError;

mod builder;
mod compiler;
mod context;
mod output;

pub use builder::{sign_with_context, TxBuilder};
pub use compiler::{
    compile, decode_instruction_accounts, distinct_accounts, resolve_account_keys,
    MAX_ACCOUNTS_PER_MESSAGE,
};
pub use context::ExecutionContext;
pub use output::SignedTransaction;
