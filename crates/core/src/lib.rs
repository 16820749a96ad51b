//! Core types for strata-stm
//!
//! This crate defines the vocabulary shared by every layer of the
//! transactional memory runtime:
//! - TxId: identity of a transaction instance
//! - TransactionKind / Capabilities: variant taxonomy
//! - TransactionStatus: commit life-cycle
//! - StmError / StmResult: error model, including restart depths
//! - StmConfig: runtime configuration (TOML + environment)

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod types;

pub use config::{GcConfig, ParallelConfig, StmConfig};
pub use error::{StmError, StmResult, TransactionalError};
pub use types::{
    Capabilities, TransactionKind, TransactionStatus, TxId, INITIAL_VERSION, SENTINEL_NUMBER,
};
