//! Execution layer for strata-stm
//!
//! This crate drives transactions on behalf of user code:
//! - atomically: run a closure as a transaction, retrying on conflicts
//! - RetryPolicy: exponential backoff with jitter between attempts
//! - manage_nested_parallel_tasks: fan a batch of closures out as parallel
//!   children of the current transaction

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod atomic;
pub mod parallel;
pub mod retry;

pub use atomic::{atomically, atomically_read_only, atomically_with, TxOptions};
pub use parallel::manage_nested_parallel_tasks;
pub use retry::RetryPolicy;
