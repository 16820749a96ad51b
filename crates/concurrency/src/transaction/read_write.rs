//! Read-write transaction state
//!
//! Shared by top-level and nested read-write transactions. Writes go to the
//! cell's in-place slot when it can be claimed, and to a private map
//! otherwise:
//!
//! | Slot owner                        | Write goes to                     |
//! |-----------------------------------|-----------------------------------|
//! | this transaction                  | the slot, overwritten in place    |
//! | finished, not newer than snapshot | a freshly claimed slot            |
//! | anyone else                       | the private write map             |
//!
//! Nested transactions only take over slots of committed owners. An
//! aborted owner may be an ancestor's sibling whose slot is about to be
//! restored, and only top-level transactions are allowed to race with that.
//!
//! Values carry a *nested version*: the owner's merge clock at the time of
//! the write. Reads inside a tree resolve to the newest nested version, and
//! a child only sees an ancestor's write if it is not newer than the
//! ancestor's clock when the child began.

use super::state::{Strategy, TxState};
use crate::pool::{self, ReadSet};
use arc_swap::ArcSwapOption;
use parking_lot::{Condvar, Mutex};
use rustc_hash::{FxHashMap, FxHashSet};
use smallvec::{smallvec, SmallVec};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use strata_stm_core::error::{StmError, StmResult};
use strata_stm_core::types::TxId;
use strata_stm_storage::{
    BoxCell, CellId, InplaceWrite, OrecState, OwnershipRecord, Value, WriteEntry,
};

/// Write kept in the private map
pub(crate) struct LocalWrite {
    pub(crate) cell: Arc<BoxCell>,
    pub(crate) value: Value,
    pub(crate) nested_version: u64,
}

/// Everything a read-write transaction accumulates
#[derive(Default)]
pub(crate) struct LocalState {
    /// Cells read from committed state
    pub(crate) reads: ReadSet,
    /// Cells read from an ancestor's writes, with the ancestor's depth
    pub(crate) nested_reads: Vec<(CellId, usize)>,
    /// Writes that could not use the in-place slot
    pub(crate) written: FxHashMap<CellId, LocalWrite>,
    /// Slots this transaction (or a merged child) claimed, in claim order
    pub(crate) inplace: Vec<(Arc<BoxCell>, Arc<InplaceWrite>)>,
    /// Ownership records to settle on commit or abort
    pub(crate) orecs: SmallVec<[Arc<OwnershipRecord>; 2]>,
}

impl LocalState {
    /// Ids of every cell read, committed or nested
    pub(crate) fn read_ids(&self) -> FxHashSet<CellId> {
        self.reads
            .iter()
            .map(|cell| cell.id())
            .chain(self.nested_reads.iter().map(|(id, _)| *id))
            .collect()
    }

    /// Ids of every cell written
    pub(crate) fn written_ids(&self) -> Vec<CellId> {
        let mut ids: Vec<CellId> = self
            .written
            .keys()
            .copied()
            .chain(self.inplace.iter().map(|(cell, _)| cell.id()))
            .collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }

    /// Void every write: orecs aborted, claimed slots handed back newest
    /// first
    pub(crate) fn revert(&self) {
        for orec in &self.orecs {
            orec.mark_aborted();
        }
        for (cell, slot) in self.inplace.iter().rev() {
            cell.restore_displaced(slot);
            slot.release();
        }
    }
}

/// A child's merge into its parent, newest first
pub(crate) struct MergedChild {
    pub(crate) nested_version: u64,
    pub(crate) depth: usize,
    /// Sorted ids of the cells the child wrote
    pub(crate) written: Vec<CellId>,
    pub(crate) next: Option<Arc<MergedChild>>,
}

impl MergedChild {
    pub(crate) fn wrote_any(&self, ids: &FxHashSet<CellId>) -> bool {
        self.written.iter().any(|id| ids.contains(id))
    }
}

impl Drop for MergedChild {
    fn drop(&mut self) {
        let mut next = self.next.take();
        while let Some(node) = next {
            match Arc::try_unwrap(node) {
                Ok(mut node) => next = node.next.take(),
                Err(_) => break,
            }
        }
    }
}

/// Read-write part of a transaction's state
pub(crate) struct ReadWriteState {
    orec: Arc<OwnershipRecord>,
    /// Clock of each ancestor when this transaction began, indexed by depth
    ancestor_versions: SmallVec<[u64; 4]>,
    nested_clock: AtomicU64,
    local: Mutex<LocalState>,
    merged: ArcSwapOption<MergedChild>,
    merge_turn: Mutex<()>,
    merge_ready: Condvar,
}

impl ReadWriteState {
    fn with_ancestors(id: TxId, ancestor_versions: SmallVec<[u64; 4]>) -> Self {
        let orec = OwnershipRecord::new(id);
        ReadWriteState {
            local: Mutex::new(LocalState {
                reads: pool::acquire(),
                orecs: smallvec![Arc::clone(&orec)],
                ..LocalState::default()
            }),
            orec,
            ancestor_versions,
            nested_clock: AtomicU64::new(0),
            merged: ArcSwapOption::empty(),
            merge_turn: Mutex::new(()),
            merge_ready: Condvar::new(),
        }
    }

    /// State of a top-level transaction
    pub(crate) fn top_level(id: TxId) -> Self {
        Self::with_ancestors(id, SmallVec::new())
    }

    /// State of a child of `parent`, capturing the ancestors' clocks
    pub(crate) fn child_of(parent: &ReadWriteState, id: TxId) -> Self {
        let mut ancestor_versions = parent.ancestor_versions.clone();
        ancestor_versions.push(parent.clock());
        Self::with_ancestors(id, ancestor_versions)
    }

    /// Merge clock: nested version of the last merged child
    pub(crate) fn clock(&self) -> u64 {
        self.nested_clock.load(Ordering::Acquire)
    }

    /// Clock of the ancestor at `depth` when this transaction began
    pub(crate) fn ancestor_version(&self, depth: usize) -> Option<u64> {
        self.ancestor_versions.get(depth).copied()
    }

    pub(crate) fn local(&self) -> parking_lot::MutexGuard<'_, LocalState> {
        self.local.lock()
    }

    /// Move the accumulated state out (merging into the parent)
    pub(crate) fn take_local(&self) -> LocalState {
        std::mem::take(&mut *self.local.lock())
    }

    /// Move the read buffer out for recycling
    pub(crate) fn take_reads(&self) -> ReadSet {
        std::mem::take(&mut self.local.lock().reads)
    }

    pub(crate) fn merged_head(&self) -> Option<Arc<MergedChild>> {
        self.merged.load_full()
    }

    /// Push a merge announcement if the list head is still `expected`
    pub(crate) fn try_push_merged(
        &self,
        expected: &Option<Arc<MergedChild>>,
        node: Arc<MergedChild>,
    ) -> bool {
        let seen = self.merged.compare_and_swap(expected, Some(node));
        match (&*seen, expected) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            (None, None) => true,
            _ => false,
        }
    }

    /// Block until the clock reaches `previous`
    pub(crate) fn wait_turn(&self, previous: u64) {
        let mut turn = self.merge_turn.lock();
        while self.clock() != previous {
            self.merge_ready.wait(&mut turn);
        }
    }

    /// Publish a finished merge and wake the next one
    pub(crate) fn advance_clock(&self, nested_version: u64) {
        let _turn = self.merge_turn.lock();
        self.nested_clock.store(nested_version, Ordering::Release);
        self.merge_ready.notify_all();
    }

    /// Read `cell` for `state`
    pub(crate) fn read(&self, state: &TxState, cell: &Arc<BoxCell>) -> StmResult<Value> {
        if let Some((value, _)) = newest_write(state.id, self, cell) {
            return Ok(value);
        }

        let mut ancestor = state.parent.as_deref();
        while let Some(a) = ancestor {
            if let Strategy::ReadWrite(arw) = &a.strategy {
                if let Some((value, version)) = newest_write(a.id, arw, cell) {
                    let bound = self.ancestor_version(a.depth).ok_or_else(|| {
                        StmError::Internal(format!("no clock captured for depth {}", a.depth))
                    })?;
                    if version > bound {
                        return Err(StmError::EarlyAbort {
                            restart_depth: a.depth + 1,
                            snapshot: bound,
                            observed: version,
                        });
                    }
                    self.local.lock().nested_reads.push((cell.id(), a.depth));
                    return Ok(value);
                }
            }
            ancestor = a.parent.as_deref();
        }

        let head = cell.head();
        if head.version() > state.number {
            return Err(StmError::EarlyAbort {
                restart_depth: 0,
                snapshot: state.number,
                observed: head.version(),
            });
        }
        self.local.lock().reads.push(Arc::clone(cell));
        Ok(head.value().clone())
    }

    /// Write `value` to `cell` for `state`
    pub(crate) fn write(&self, state: &TxState, cell: &Arc<BoxCell>, value: Value) {
        let nested = state.parent.is_some();
        let version = self.clock();
        loop {
            let slot = cell.inplace();
            let orec = slot.orec();
            if orec.is_owned_by(state.id) {
                slot.store(value, version);
                self.local.lock().written.remove(&cell.id());
                return;
            }

            let claimable = if nested {
                matches!(orec.state(), OrecState::Committed(v) if v <= state.number)
            } else {
                orec.claimable_at(state.number)
            };
            if !claimable {
                self.local.lock().written.insert(
                    cell.id(),
                    LocalWrite {
                        cell: Arc::clone(cell),
                        value,
                        nested_version: version,
                    },
                );
                return;
            }

            let mine = InplaceWrite::claimed(
                Arc::clone(&self.orec),
                value.clone(),
                version,
                Arc::clone(&slot),
            );
            if cell.try_claim(&slot, Arc::clone(&mine)) {
                slot.forget_displaced();
                let mut local = self.local.lock();
                local.written.remove(&cell.id());
                local.inplace.push((Arc::clone(cell), mine));
                return;
            }
        }
    }

    /// Newest value of every written cell, for the commit write-set
    pub(crate) fn collect_writes(&self, id: TxId) -> Vec<WriteEntry> {
        let local = self.local.lock();
        let mut newest: FxHashMap<CellId, (Arc<BoxCell>, Value, u64)> = FxHashMap::default();
        for (cell_id, write) in &local.written {
            newest.insert(
                *cell_id,
                (Arc::clone(&write.cell), write.value.clone(), write.nested_version),
            );
        }
        for (cell, slot) in &local.inplace {
            if !slot.orec().is_owned_by(id) {
                continue;
            }
            if let Some((value, version)) = slot.load() {
                let newer = newest
                    .get(&cell.id())
                    .map_or(true, |(_, _, existing)| version >= *existing);
                if newer {
                    newest.insert(cell.id(), (Arc::clone(cell), value, version));
                }
            }
        }
        newest
            .into_values()
            .map(|(cell, value, _)| WriteEntry::new(cell, value))
            .collect()
    }

    /// Make every write permanent at `number`
    pub(crate) fn settle_committed(&self, number: u64) {
        let local = self.local.lock();
        for orec in &local.orecs {
            orec.mark_committed(number);
        }
        for (_, slot) in &local.inplace {
            slot.release();
        }
    }

    /// Void every write
    pub(crate) fn revert(&self) {
        self.local.lock().revert();
    }
}

/// Newest write of `owner` to `cell`: its slot or its map entry, whichever
/// has the higher nested version (the slot on a tie)
fn newest_write(owner: TxId, rw: &ReadWriteState, cell: &BoxCell) -> Option<(Value, u64)> {
    let slot = cell.inplace();
    let in_slot = if slot.orec().is_owned_by(owner) {
        slot.load()
    } else {
        None
    };
    let in_map = rw
        .local
        .lock()
        .written
        .get(&cell.id())
        .map(|w| (w.value.clone(), w.nested_version));
    match (in_slot, in_map) {
        (Some(slot), Some(map)) if map.1 > slot.1 => Some(map),
        (Some(slot), _) => Some(slot),
        (None, map) => map,
    }
}
