//! Unsafe single-threaded transactions
//!
//! For bulk loading and tests that own the whole memory: writes go straight
//! into the cells at `latest + 1`, nothing is validated and nothing is
//! reserved. Commit links a record so collection and later snapshots see
//! the writes. If another commit slipped in meanwhile, the commit fails
//! with `Unsupported`; the installed values are not rolled back.

use super::inevitable::DirectState;
use super::state::{Strategy, TxState};
use crate::record::CommitRecord;
use crate::runtime::{runtime, thread_context};
use std::sync::Arc;
use strata_stm_core::error::{StmError, StmResult};
use strata_stm_core::types::{TransactionKind, TransactionStatus};
use tracing::{trace, warn};

/// Begin an unsafe single-threaded transaction
pub(crate) fn begin() -> Arc<TxState> {
    let rt = runtime();
    let context = thread_context(rt);
    rt.queue().help_commit_all();
    let snapshot = rt.pin_latest(&context);
    TxState::new(
        rt.next_tx_id(),
        TransactionKind::UnsafeSingleThreaded,
        None,
        snapshot.number() + 1,
        Some(context),
        Strategy::Unsafe(DirectState::new(None)),
    )
}

pub(crate) fn commit(state: &Arc<TxState>, direct: &DirectState) -> StmResult<()> {
    let rt = runtime();
    let write_set = Arc::new(direct.take_write_set(rt.config().write_set_block_size));
    if write_set.is_empty() {
        state.finish(TransactionStatus::Committed);
        return Ok(());
    }

    let last = rt.queue().help_commit_all();
    let linked = last.number() + 1 == state.number && {
        let record = CommitRecord::new(state.number, Arc::clone(&write_set));
        match last.try_link_next(Arc::clone(&record)) {
            Ok(()) => {
                record.help_commit();
                rt.queue().advance_most_recent(&record);
                true
            }
            Err(_) => false,
        }
    };
    if !linked {
        warn!(
            tx = %state.id,
            number = state.number,
            writes = write_set.len(),
            "Concurrent commit during unsafe single-threaded transaction"
        );
        state.finish(TransactionStatus::Aborted);
        return Err(StmError::unsupported(
            TransactionKind::UnsafeSingleThreaded.name(),
            "commit alongside concurrent writers",
        ));
    }

    state.finish(TransactionStatus::Committed);
    trace!(tx = %state.id, commit_number = state.number, writes = write_set.len(), "Committed");
    Ok(())
}
