//! # Strata STM
//!
//! Multi-version software transactional memory for in-process concurrency
//! control.
//!
//! Shared state lives in versioned cells ([`VBox`], [`VArray`]). Code that
//! touches them runs inside transactions that observe a consistent snapshot
//! and commit atomically, or not at all.
//!
//! ## Quick Start
//!
//! ```ignore
//! use strata_stm::prelude::*;
//!
//! let from = VBox::new(100u64);
//! let to = VBox::new(0u64);
//!
//! atomically(|| {
//!     let amount = 30;
//!     from.put(from.get()? - amount)?;
//!     to.put(to.get()? + amount)?;
//!     Ok::<_, Error>(())
//! })?;
//! ```
//!
//! ## Transaction variants
//!
//! | Variant | Begin with | Notes |
//! |---------|------------|-------|
//! | Read-write | [`Transaction::begin`] | validated at commit, retried by [`atomically`] |
//! | Read-only | [`Transaction::begin_read_only`] | never conflicts |
//! | Linear nested | `begin` while a transaction is current | merges into its parent |
//! | Parallel nested | [`manage_nested_parallel_tasks`] | children on scoped threads |
//! | Inevitable | [`Transaction::begin_inevitable`] | cannot abort, writes in place |
//! | Unsafe single-threaded | [`Transaction::begin_unsafe_single_threaded`] | no validation |
//!
//! ## Runtime
//!
//! The runtime is process-wide. It is created from the environment on first
//! use, or installed explicitly with [`Stm::builder`]. A background thread
//! reclaims versions no running transaction can read; set
//! `STRATA_STM_DISABLE_GC=1` to run without it.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod error;
mod stm;

pub mod prelude;

// Re-export main entry points
pub use error::{Error, Result};
pub use stm::{Stm, StmBuilder};

// Transactions and cells
pub use strata_stm_concurrency::{
    stack_depth, CommitListener, GcStats, SuspendedTransaction, Transaction, TxHandle, VArray,
    VBox, GC_THREAD_NAME,
};

// Retry loops and parallel nesting
pub use strata_stm_engine::{
    atomically, atomically_read_only, atomically_with, manage_nested_parallel_tasks, RetryPolicy,
    TxOptions,
};

// Core types
pub use strata_stm_core::{
    Capabilities, GcConfig, ParallelConfig, StmConfig, StmError, StmResult, TransactionKind,
    TransactionStatus, TransactionalError, TxId,
};
