//! Read-only transactions
//!
//! Reads resolve against the pinned snapshot through the version chains.
//! Nothing is validated or recorded: a snapshot read can never conflict.

use super::state::{Strategy, TxState};
use crate::runtime::{runtime, thread_context};
use std::sync::Arc;
use strata_stm_core::error::{StmError, StmResult};
use strata_stm_core::types::TransactionKind;
use strata_stm_storage::{BoxCell, Value};

/// Begin a top-level read-only transaction at the newest snapshot
pub(crate) fn begin() -> Arc<TxState> {
    let rt = runtime();
    let context = thread_context(rt);
    let snapshot = rt.pin_latest(&context);
    TxState::new(
        rt.next_tx_id(),
        TransactionKind::ReadOnly,
        None,
        snapshot.number(),
        Some(context),
        Strategy::ReadOnly,
    )
}

pub(crate) fn read(state: &TxState, cell: &Arc<BoxCell>) -> StmResult<Value> {
    cell.read_at(state.number).ok_or_else(|| {
        StmError::Internal(format!(
            "cell {} has no version visible at {}",
            cell.id(),
            state.number
        ))
    })
}
