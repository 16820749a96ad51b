//! Versioned cells
//!
//! A `BoxCell` is the shared, untyped state behind a transactional box:
//!
//! - `body`: head of the committed version chain
//! - `inplace`: the current in-place write slot
//!
//! Committed versions are appended by write-back with a CAS on `body`.
//! Write-back is idempotent: several helpers may write back the same commit,
//! and only the first one links a node.

use crate::body::VersionedNode;
use crate::inplace::InplaceWrite;
use crate::value::Value;
use arc_swap::ArcSwap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use strata_stm_core::types::INITIAL_VERSION;

/// Process-unique identity of a cell, used as write-set key
pub type CellId = u64;

static NEXT_CELL_ID: AtomicU64 = AtomicU64::new(1);

/// Shared state of one transactional cell
pub struct BoxCell {
    id: CellId,
    body: ArcSwap<VersionedNode>,
    inplace: ArcSwap<InplaceWrite>,
}

impl BoxCell {
    /// Create a cell whose initial value is visible to every snapshot
    pub fn new(value: Value) -> Arc<Self> {
        Arc::new(BoxCell {
            id: NEXT_CELL_ID.fetch_add(1, Ordering::Relaxed),
            body: ArcSwap::new(VersionedNode::new(value, INITIAL_VERSION, None)),
            inplace: ArcSwap::new(InplaceWrite::vacant()),
        })
    }

    /// Identity of this cell
    pub fn id(&self) -> CellId {
        self.id
    }

    /// Newest committed node
    pub fn head(&self) -> Arc<VersionedNode> {
        self.body.load_full()
    }

    /// Version of the newest committed node
    pub fn head_version(&self) -> u64 {
        self.body.load().version()
    }

    /// Value visible to a snapshot at `number`
    ///
    /// `None` means the versions needed were already reclaimed.
    pub fn read_at(&self, number: u64) -> Option<Value> {
        self.head()
            .visible_at(number)
            .map(|node| Arc::clone(node.value()))
    }

    /// Write back `value` as the version produced by commit `number`
    ///
    /// If that commit was already written back by another helper (or a later
    /// commit is already at the head), nothing is linked and the existing
    /// node for `number` is returned. `None` means the node was written and
    /// has since been trimmed by the collector.
    pub fn commit(&self, value: Value, number: u64) -> Option<Arc<VersionedNode>> {
        loop {
            let head = self.head();
            if head.version() >= number {
                return head.find_version(number);
            }
            let node = VersionedNode::new(Arc::clone(&value), number, Some(Arc::clone(&head)));
            let previous = self.body.compare_and_swap(&head, Arc::clone(&node));
            if Arc::ptr_eq(&*previous, &head) {
                return Some(node);
            }
        }
    }

    /// Install `value` at `number` directly, replacing an existing head
    /// written at the same version
    ///
    /// Used by transactions that hold their commit slot before executing:
    /// repeated writes to the cell overwrite the head they installed.
    pub fn install_direct(&self, value: Value, number: u64) -> Arc<VersionedNode> {
        loop {
            let head = self.head();
            debug_assert!(head.version() <= number);
            let previous = if head.version() == number {
                head.previous()
            } else {
                Some(Arc::clone(&head))
            };
            let node = VersionedNode::new(Arc::clone(&value), number, previous);
            let seen = self.body.compare_and_swap(&head, Arc::clone(&node));
            if Arc::ptr_eq(&*seen, &head) {
                return node;
            }
        }
    }

    /// Current in-place slot
    pub fn inplace(&self) -> Arc<InplaceWrite> {
        self.inplace.load_full()
    }

    /// Swap in `claimed` if the slot is still `current`
    pub fn try_claim(&self, current: &Arc<InplaceWrite>, claimed: Arc<InplaceWrite>) -> bool {
        let seen = self.inplace.compare_and_swap(current, claimed);
        Arc::ptr_eq(&*seen, current)
    }

    /// Put back the slot `mine` displaced, if `mine` is still installed
    pub fn restore_displaced(&self, mine: &Arc<InplaceWrite>) -> bool {
        match mine.displaced() {
            Some(displaced) => {
                let seen = self.inplace.compare_and_swap(mine, displaced);
                Arc::ptr_eq(&*seen, mine)
            }
            None => false,
        }
    }
}

impl std::fmt::Debug for BoxCell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoxCell")
            .field("id", &self.id)
            .field("head_version", &self.head_version())
            .finish()
    }
}
