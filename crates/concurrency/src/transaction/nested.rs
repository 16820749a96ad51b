//! Nested transactions
//!
//! A child shares its parent's snapshot and pins nothing of its own: the
//! root's context already holds the snapshot for the whole tree.
//!
//! Committing a child merges it into the parent:
//!
//! ```text
//! 1. validate    reads ∩ writes of siblings merged since the child began
//! 2. announce    push {k = newest + 1, written ids} onto the merged list
//! 3. wait        until the parent's clock reaches k - 1
//! 4. apply       retag slots to k, hand orecs and map entries to the parent
//! 5. publish     parent clock = k
//! ```
//!
//! Announcing before applying fixes the merge order up front, so a later
//! sibling validates against every earlier one even while those are still
//! applying.

use super::read_write::{MergedChild, ReadWriteState};
use super::state::{Strategy, TxState};
use crate::pool;
use std::sync::Arc;
use strata_stm_core::error::{StmError, StmResult};
use strata_stm_core::types::{TransactionKind, TransactionStatus};
use tracing::trace;

/// Create a child of `parent`
///
/// `read_only` only matters under a read-only parent: a read-write parent
/// always gets a read-write child, and a read-only parent cannot have one.
pub(crate) fn begin_child(
    parent: &Arc<TxState>,
    read_only: bool,
    kind: TransactionKind,
) -> StmResult<Arc<TxState>> {
    if parent.is_finished() {
        return Err(StmError::NoActiveTransaction);
    }
    if !parent.kind.capabilities().supports_nesting {
        return Err(StmError::unsupported(parent.kind.name(), "nesting"));
    }
    let id = crate::runtime::runtime().next_tx_id();
    match &parent.strategy {
        Strategy::ReadWrite(prw) => {
            let rw = ReadWriteState::child_of(prw, id);
            Ok(TxState::new(
                id,
                kind,
                Some(Arc::clone(parent)),
                parent.number,
                None,
                Strategy::ReadWrite(rw),
            ))
        }
        Strategy::ReadOnly if read_only => Ok(TxState::new(
            id,
            TransactionKind::ReadOnly,
            Some(Arc::clone(parent)),
            parent.number,
            None,
            Strategy::ReadOnly,
        )),
        Strategy::ReadOnly => Err(StmError::unsupported(
            TransactionKind::ReadOnly.name(),
            "read-write nesting",
        )),
        Strategy::Inevitable(_) | Strategy::Unsafe(_) => {
            Err(StmError::unsupported(parent.kind.name(), "nesting"))
        }
    }
}

/// Merge a finished child into its parent
pub(crate) fn commit(state: &Arc<TxState>, rw: &ReadWriteState) -> StmResult<()> {
    let parent = state
        .parent
        .as_ref()
        .ok_or_else(|| StmError::Internal("nested commit without a parent".to_string()))?;
    let prw = parent.read_write().ok_or_else(|| {
        StmError::Internal(format!("read-write child under a {} parent", parent.kind))
    })?;
    if parent.is_finished() {
        rw.revert();
        state.finish(TransactionStatus::Aborted);
        return Err(StmError::NoActiveTransaction);
    }
    state.set_status(TransactionStatus::Validating);

    let bound = rw
        .ancestor_version(parent.depth)
        .ok_or_else(|| StmError::Internal(format!("no clock captured for depth {}", parent.depth)))?;
    let mut local = rw.take_local();
    let read_ids = local.read_ids();
    let written = local.written_ids();

    let nested_version = loop {
        let head = prw.merged_head();
        let mut cursor = head.as_deref();
        while let Some(sibling) = cursor {
            if sibling.nested_version <= bound {
                break;
            }
            if sibling.wrote_any(&read_ids) {
                local.revert();
                pool::release(std::mem::take(&mut local.reads));
                state.finish(TransactionStatus::Aborted);
                trace!(
                    tx = %state.id,
                    depth = state.depth,
                    sibling_depth = sibling.depth,
                    "Nested validation failed"
                );
                return Err(StmError::CommitConflict {
                    restart_depth: state.depth,
                    snapshot: bound,
                });
            }
            cursor = sibling.next.as_deref();
        }
        let k = head.as_ref().map_or(0, |m| m.nested_version) + 1;
        let node = Arc::new(MergedChild {
            nested_version: k,
            depth: state.depth,
            written: written.clone(),
            next: head.clone(),
        });
        if prw.try_push_merged(&head, node) {
            break k;
        }
    };

    state.set_status(TransactionStatus::Enqueued);
    prw.wait_turn(nested_version - 1);

    for (_, slot) in &local.inplace {
        slot.set_nested_version(nested_version);
    }
    for orec in &local.orecs {
        orec.transfer_to(parent.id);
    }
    {
        let mut plocal = prw.local();
        for (id, mut write) in local.written.drain() {
            write.nested_version = nested_version;
            plocal.written.insert(id, write);
        }
        plocal.reads.append(&mut local.reads);
        plocal.nested_reads.extend(
            local
                .nested_reads
                .iter()
                .filter(|(_, depth)| *depth < parent.depth)
                .copied(),
        );
        plocal.inplace.append(&mut local.inplace);
        plocal.orecs.extend(local.orecs.drain(..));
    }
    prw.advance_clock(nested_version);

    pool::release(std::mem::take(&mut local.reads));
    state.finish(TransactionStatus::Committed);
    trace!(
        tx = %state.id,
        parent = %parent.id,
        nested_version,
        writes = written.len(),
        "Merged into parent"
    );
    Ok(())
}
