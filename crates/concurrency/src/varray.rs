//! Fixed-length transactional arrays

use crate::transaction::{read_cell, write_cell};
use std::marker::PhantomData;
use std::sync::Arc;
use strata_stm_core::error::{StmError, StmResult};
use strata_stm_storage::value::{downcast_ref, erase};
use strata_stm_storage::BoxCell;

/// Array whose elements are read and written transactionally
///
/// Every element is its own versioned cell, so transactions touching
/// different indices never conflict. Cloning shares the elements.
pub struct VArray<T> {
    cells: Arc<[Arc<BoxCell>]>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for VArray<T> {
    fn clone(&self) -> Self {
        VArray {
            cells: Arc::clone(&self.cells),
            _marker: PhantomData,
        }
    }
}

impl<T: Clone + Send + Sync + 'static> VArray<T> {
    /// Array of `len` copies of `init`
    pub fn new(len: usize, init: T) -> Self {
        let cells: Vec<Arc<BoxCell>> = (0..len).map(|_| BoxCell::new(erase(init.clone()))).collect();
        VArray {
            cells: cells.into(),
            _marker: PhantomData,
        }
    }

    /// Array holding `values`
    pub fn from_vec(values: Vec<T>) -> Self {
        let cells: Vec<Arc<BoxCell>> = values.into_iter().map(|v| BoxCell::new(erase(v))).collect();
        VArray {
            cells: cells.into(),
            _marker: PhantomData,
        }
    }

    /// Element at `index`
    pub fn get(&self, index: usize) -> StmResult<T> {
        let cell = self.cell(index)?;
        let value = read_cell(cell)?;
        downcast_ref::<T>(&value)
            .cloned()
            .ok_or_else(|| StmError::Internal(format!("element {index} holds a value of another type")))
    }

    /// Replace the element at `index`
    pub fn put(&self, index: usize, value: T) -> StmResult<()> {
        write_cell(self.cell(index)?, erase(value))
    }

    /// Every element, in order
    pub fn to_vec(&self) -> StmResult<Vec<T>> {
        (0..self.len()).map(|i| self.get(i)).collect()
    }
}

impl<T> VArray<T> {
    /// Number of elements
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// Check if the array has no elements
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    fn cell(&self, index: usize) -> StmResult<&Arc<BoxCell>> {
        self.cells.get(index).ok_or(StmError::IndexOutOfBounds {
            index,
            len: self.cells.len(),
        })
    }
}

impl<T> std::fmt::Debug for VArray<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VArray").field("len", &self.len()).finish()
    }
}
