//! Transactions over versioned cells
//!
//! This crate implements the multi-version commit machinery:
//! - CommitRecord / CommitQueue: lock-free total order of commits, with
//!   cooperative write-back
//! - TxContext / ContextRegistry: per-thread snapshot pins
//! - GarbageCollector: reclamation of versions no snapshot can read
//! - Transaction: top-level, read-only, nested, parallel nested, inevitable
//!   and unsafe single-threaded variants
//! - VBox / VArray: typed cells used inside transactions

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod context;
pub mod gc;
pub mod pool;
pub mod queue;
pub mod record;
pub mod runtime;
pub mod transaction;
pub mod varray;
pub mod vbox;

pub use context::{ContextRegistry, ContextScan, TxContext};
pub use gc::{CommitListener, GarbageCollector, GcStats};
pub use queue::CommitQueue;
pub use record::CommitRecord;
pub use runtime::{install, is_installed, runtime, Runtime, GC_THREAD_NAME};
pub use transaction::{stack_depth, SuspendedTransaction, Transaction, TxHandle};
pub use varray::VArray;
pub use vbox::VBox;
