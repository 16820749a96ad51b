//! Thread-local read-set pool
//!
//! Read-sets are the one per-transaction collection that grows with every
//! read. Each thread keeps up to [`MAX_POOL_SIZE`] cleared buffers and
//! hands them to new transactions, so their capacity survives across
//! transactions and a warmed-up thread allocates nothing for reads.

use std::cell::RefCell;
use std::sync::Arc;
use strata_stm_storage::BoxCell;

/// Maximum buffers kept per thread
pub const MAX_POOL_SIZE: usize = 8;

/// Cells read by a transaction
pub type ReadSet = Vec<Arc<BoxCell>>;

thread_local! {
    static READ_SET_POOL: RefCell<Vec<ReadSet>> = RefCell::new(Vec::with_capacity(MAX_POOL_SIZE));
}

/// Take a cleared read-set buffer, reusing a pooled one when available
pub fn acquire() -> ReadSet {
    READ_SET_POOL
        .try_with(|pool| pool.borrow_mut().pop())
        .ok()
        .flatten()
        .unwrap_or_default()
}

/// Return a buffer to this thread's pool
///
/// The buffer is cleared (keeping its capacity); it is dropped instead if
/// the pool is full or the thread is shutting down.
pub fn release(mut reads: ReadSet) {
    reads.clear();
    let _ = READ_SET_POOL.try_with(|pool| {
        let mut pool = pool.borrow_mut();
        if pool.len() < MAX_POOL_SIZE {
            pool.push(reads);
        }
    });
}

/// Buffers currently pooled on this thread
pub fn pooled() -> usize {
    READ_SET_POOL
        .try_with(|pool| pool.borrow().len())
        .unwrap_or(0)
}
