//! lut-flow - address lookup table lifecycle and v0 transaction pipeline
//!
//! Creates and fills an address lookup table, compiles a versioned message
//! against it, drives the signed transaction to a terminal confirmation
//! outcome, and records the parsed result.

pub mod compat;
pub mod config;
pub mod flow;
pub mod lookup_table;
pub mod metrics;
pub mod observability;
pub mod pipeline;
pub mod recorder;
pub mod retry;
pub mod rpc;
pub mod structured_logging;
pub mod test_utils;
pub mod tx_builder;
pub mod wallet;

pub use flow::{FlowError, FlowReport, FlowRequest, FlowRunner, FlowSettings};
pub use solana_sdk::{message::VersionedMessage, pubkey::Pubkey, signature::Signature};
