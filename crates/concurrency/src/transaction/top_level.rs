//! Top-level read-write transactions
//!
//! Commit protocol:
//!
//! 1. Help every enqueued record finish, so the queue tail is committed.
//! 2. Validate: no cell in the read-set has a version newer than the
//!    snapshot.
//! 3. Try to link a record numbered `tail + 1` after the tail. On a lost
//!    race, help the winners commit and validate against their write-sets,
//!    then retry from the new tail.
//! 4. Help write back the own record, advance the queue hint and mark the
//!    ownership records committed.
//!
//! A transaction that wrote nothing commits without touching the queue:
//! its reads were a consistent snapshot already.

use super::read_write::ReadWriteState;
use super::state::{Strategy, TxState};
use crate::record::CommitRecord;
use crate::runtime::{runtime, thread_context};
use rustc_hash::FxHashSet;
use std::sync::Arc;
use strata_stm_core::error::{StmError, StmResult};
use strata_stm_core::types::{TransactionKind, TransactionStatus};
use strata_stm_storage::{CellId, WriteSet};
use tracing::trace;

/// Begin a top-level read-write transaction at the newest snapshot
pub(crate) fn begin() -> Arc<TxState> {
    let rt = runtime();
    let context = thread_context(rt);
    let snapshot = rt.pin_latest(&context);
    let id = rt.next_tx_id();
    TxState::new(
        id,
        TransactionKind::TopLevel,
        None,
        snapshot.number(),
        Some(context),
        Strategy::ReadWrite(ReadWriteState::top_level(id)),
    )
}

fn conflict(state: &TxState, rw: &ReadWriteState) -> StmError {
    rw.revert();
    state.finish(TransactionStatus::Aborted);
    trace!(tx = %state.id, snapshot = state.number, "Commit validation failed");
    StmError::CommitConflict {
        restart_depth: 0,
        snapshot: state.number,
    }
}

/// Commit a top-level read-write transaction
pub(crate) fn commit(state: &Arc<TxState>, rw: &ReadWriteState) -> StmResult<()> {
    let rt = runtime();
    state.set_status(TransactionStatus::Validating);

    let entries = rw.collect_writes(state.id);
    if entries.is_empty() {
        rw.settle_committed(state.number);
        state.finish(TransactionStatus::Committed);
        return Ok(());
    }

    let read_ids: FxHashSet<CellId> = rw.local().reads.iter().map(|cell| cell.id()).collect();

    let mut last = rt.queue().help_commit_all();
    let stale = rw
        .local()
        .reads
        .iter()
        .any(|cell| cell.head_version() > state.number);
    if stale {
        return Err(conflict(state, rw));
    }

    let write_set = Arc::new(WriteSet::new(entries, rt.config().write_set_block_size));
    let record = loop {
        let record = CommitRecord::new(last.number() + 1, Arc::clone(&write_set));
        match last.try_link_next(Arc::clone(&record)) {
            Ok(()) => break record,
            Err(_) => {
                let tail = rt.queue().help_commit_all();
                let mut cursor = Arc::clone(&last);
                while cursor.number() < tail.number() {
                    let Some(next) = cursor.next() else { break };
                    let overlaps = next
                        .write_set()
                        .is_some_and(|ws| ws.cell_ids().any(|id| read_ids.contains(&id)));
                    if overlaps {
                        return Err(conflict(state, rw));
                    }
                    cursor = next;
                }
                last = tail;
            }
        }
    };

    state.set_status(TransactionStatus::Enqueued);
    record.help_commit();
    rt.queue().advance_most_recent(&record);
    rw.settle_committed(record.number());
    state.finish(TransactionStatus::Committed);
    trace!(
        tx = %state.id,
        commit_number = record.number(),
        writes = write_set.len(),
        "Committed"
    );
    Ok(())
}
