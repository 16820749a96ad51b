//! Convenient imports for Strata STM.
//!
//! This module re-exports the most commonly used types so you can get started
//! with a single import:
//!
//! ```ignore
//! use strata_stm::prelude::*;
//!
//! let counter = VBox::new(0u64);
//! atomically(|| counter.update(|n| n + 1))?;
//! ```

// Main entry point
pub use crate::stm::{Stm, StmBuilder};

// Error handling
pub use crate::error::{Error, Result};
pub use strata_stm_core::{StmError, StmResult, TransactionalError};

// Cells
pub use strata_stm_concurrency::{VArray, VBox};

// Transactions
pub use strata_stm_concurrency::{SuspendedTransaction, Transaction, TxHandle};
pub use strata_stm_core::{TransactionKind, TransactionStatus};

// Retry loops
pub use strata_stm_engine::{
    atomically, atomically_read_only, atomically_with, manage_nested_parallel_tasks, RetryPolicy,
    TxOptions,
};
