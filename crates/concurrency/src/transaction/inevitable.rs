//! Inevitable transactions
//!
//! An inevitable transaction reserves its place in the commit order when it
//! begins, by linking a pending record after the queue tail. Everything
//! ordered before it is helped to commit, so its snapshot is final and it
//! can write straight into the cells at its own record number. Later
//! committers block on the pending record until the write-set is published.
//!
//! It can never fail: abort requests turn into commits.

use super::state::{Strategy, TxState};
use crate::record::CommitRecord;
use crate::runtime::{runtime, thread_context};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::sync::Arc;
use strata_stm_core::error::{StmError, StmResult};
use strata_stm_core::types::{TransactionKind, TransactionStatus};
use strata_stm_storage::{BoxCell, CellId, Value, WriteEntry, WriteSet};
use tracing::trace;

/// State of transactions writing directly into cells
pub(crate) struct DirectState {
    /// Reserved record, for inevitable transactions
    pub(crate) reserved: Option<Arc<CommitRecord>>,
    writes: Mutex<FxHashMap<CellId, WriteEntry>>,
}

impl DirectState {
    pub(crate) fn new(reserved: Option<Arc<CommitRecord>>) -> Self {
        DirectState {
            reserved,
            writes: Mutex::new(FxHashMap::default()),
        }
    }

    pub(crate) fn read(&self, number: u64, cell: &Arc<BoxCell>) -> StmResult<Value> {
        cell.read_at(number).ok_or_else(|| {
            StmError::Internal(format!("cell {} has no version visible at {}", cell.id(), number))
        })
    }

    pub(crate) fn write(&self, number: u64, cell: &Arc<BoxCell>, value: Value) {
        cell.install_direct(value.clone(), number);
        self.writes
            .lock()
            .insert(cell.id(), WriteEntry::new(Arc::clone(cell), value));
    }

    /// Write-set recording what was installed, for validation by others
    /// and for collection
    pub(crate) fn take_write_set(&self, block_size: usize) -> WriteSet {
        let entries: Vec<WriteEntry> = self.writes.lock().drain().map(|(_, e)| e).collect();
        WriteSet::new(entries, block_size)
    }
}

/// Begin an inevitable transaction
pub(crate) fn begin() -> Arc<TxState> {
    let rt = runtime();
    let context = thread_context(rt);
    let reserved = loop {
        let last = rt.queue().tail();
        let record = CommitRecord::pending(last.number() + 1);
        if last.try_link_next(Arc::clone(&record)).is_ok() {
            rt.pin(&context, last);
            break record;
        }
    };
    rt.queue().help_commit_before(&reserved);
    let id = rt.next_tx_id();
    trace!(tx = %id, commit_number = reserved.number(), "Reserved commit slot");
    TxState::new(
        id,
        TransactionKind::Inevitable,
        None,
        reserved.number(),
        Some(context),
        Strategy::Inevitable(DirectState::new(Some(reserved))),
    )
}

/// Publish the reserved record
pub(crate) fn commit(state: &Arc<TxState>, direct: &DirectState) -> StmResult<()> {
    let rt = runtime();
    let reserved = direct
        .reserved
        .as_ref()
        .ok_or_else(|| StmError::Internal("inevitable transaction without a record".to_string()))?;
    state.set_status(TransactionStatus::Enqueued);
    let write_set = Arc::new(direct.take_write_set(rt.config().write_set_block_size));
    let writes = write_set.len();
    reserved.publish(write_set);
    reserved.help_commit();
    rt.queue().advance_most_recent(reserved);
    state.finish(TransactionStatus::Committed);
    trace!(tx = %state.id, commit_number = reserved.number(), writes, "Committed");
    Ok(())
}
