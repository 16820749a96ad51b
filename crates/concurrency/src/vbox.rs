//! Typed transactional cells

use crate::transaction::{read_cell, write_cell};
use std::marker::PhantomData;
use std::sync::Arc;
use strata_stm_core::error::{StmError, StmResult};
use strata_stm_storage::value::{downcast_ref, erase};
use strata_stm_storage::{BoxCell, CellId};

/// A transactional cell holding a `T`
///
/// Reads and writes go through the calling thread's current transaction.
/// Outside a transaction, `get` reads the newest committed value and `put`
/// commits on its own.
///
/// Cloning shares the cell.
pub struct VBox<T> {
    cell: Arc<BoxCell>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for VBox<T> {
    fn clone(&self) -> Self {
        VBox {
            cell: Arc::clone(&self.cell),
            _marker: PhantomData,
        }
    }
}

impl<T: Clone + Send + Sync + 'static> VBox<T> {
    /// Create a cell whose initial value is visible to every snapshot
    pub fn new(initial: T) -> Self {
        VBox {
            cell: BoxCell::new(erase(initial)),
            _marker: PhantomData,
        }
    }

    /// Current value
    pub fn get(&self) -> StmResult<T> {
        let value = read_cell(&self.cell)?;
        downcast_ref::<T>(&value).cloned().ok_or_else(|| {
            StmError::Internal(format!(
                "cell {} holds a value of another type",
                self.cell.id()
            ))
        })
    }

    /// Replace the value
    pub fn put(&self, value: T) -> StmResult<()> {
        write_cell(&self.cell, erase(value))
    }

    /// Read, transform and write back
    pub fn update<F>(&self, f: F) -> StmResult<()>
    where
        F: FnOnce(&T) -> T,
    {
        let current = self.get()?;
        self.put(f(&current))
    }
}

impl<T> VBox<T> {
    /// Identity of the underlying cell
    pub fn id(&self) -> CellId {
        self.cell.id()
    }

    /// Versions still kept in the chain, newest first
    pub fn committed_versions(&self) -> Vec<u64> {
        self.cell.head().versions()
    }

    /// Check if both boxes share one cell
    pub fn same_cell(&self, other: &VBox<T>) -> bool {
        Arc::ptr_eq(&self.cell, &other.cell)
    }
}

impl<T> std::fmt::Debug for VBox<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VBox").field("cell", &self.cell).finish()
    }
}
