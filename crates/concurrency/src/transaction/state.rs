//! Shared transaction state
//!
//! `TxState` is what the thread-local transaction stack, the public
//! handles and child transactions point at. The variant-specific part lives
//! in [`Strategy`]; everything that routes a `get`/`put`/`commit`/`abort`
//! dispatches on it.

use super::inevitable::{self, DirectState};
use super::read_write::ReadWriteState;
use super::{nested, read_only, top_level, unsafe_single};
use crate::context::TxContext;
use crate::pool;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use strata_stm_core::error::{StmError, StmResult};
use strata_stm_core::types::{TransactionKind, TransactionStatus, TxId};
use strata_stm_storage::{BoxCell, Value};
use tracing::{debug, warn};

/// Variant-specific state
pub(crate) enum Strategy {
    /// Reads at a pinned snapshot, never writes
    ReadOnly,
    /// Top-level or nested read-write
    ReadWrite(ReadWriteState),
    /// Holds its commit slot from the start
    Inevitable(DirectState),
    /// Writes straight into cells, assuming no concurrency
    Unsafe(DirectState),
}

/// State of one transaction instance
pub(crate) struct TxState {
    pub(crate) id: TxId,
    pub(crate) kind: TransactionKind,
    pub(crate) depth: usize,
    pub(crate) parent: Option<Arc<TxState>>,
    /// Snapshot for reads; for inevitable and unsafe transactions also the
    /// version their writes get
    pub(crate) number: u64,
    /// Context pinning the snapshot, for top-level transactions
    pub(crate) context: Option<Arc<TxContext>>,
    status: AtomicU8,
    pub(crate) strategy: Strategy,
}

impl TxState {
    pub(crate) fn new(
        id: TxId,
        kind: TransactionKind,
        parent: Option<Arc<TxState>>,
        number: u64,
        context: Option<Arc<TxContext>>,
        strategy: Strategy,
    ) -> Arc<Self> {
        let depth = parent.as_ref().map_or(0, |p| p.depth + 1);
        Arc::new(TxState {
            id,
            kind,
            depth,
            parent,
            number,
            context,
            status: AtomicU8::new(TransactionStatus::Running as u8),
            strategy,
        })
    }

    pub(crate) fn status(&self) -> TransactionStatus {
        TransactionStatus::from_u8(self.status.load(Ordering::Acquire))
    }

    pub(crate) fn set_status(&self, status: TransactionStatus) {
        self.status.store(status as u8, Ordering::Release);
    }

    pub(crate) fn is_finished(&self) -> bool {
        self.status().is_finished()
    }

    pub(crate) fn read_write(&self) -> Option<&ReadWriteState> {
        match &self.strategy {
            Strategy::ReadWrite(rw) => Some(rw),
            _ => None,
        }
    }

    fn ensure_running(&self) -> StmResult<()> {
        if self.is_finished() {
            return Err(StmError::NoActiveTransaction);
        }
        Ok(())
    }

    /// Transactional read of `cell`
    pub(crate) fn read(&self, cell: &Arc<BoxCell>) -> StmResult<Value> {
        self.ensure_running()?;
        match &self.strategy {
            Strategy::ReadOnly => read_only::read(self, cell),
            Strategy::ReadWrite(rw) => rw.read(self, cell),
            Strategy::Inevitable(direct) | Strategy::Unsafe(direct) => direct.read(self.number, cell),
        }
    }

    /// Transactional write of `cell`
    pub(crate) fn write(&self, cell: &Arc<BoxCell>, value: Value) -> StmResult<()> {
        self.ensure_running()?;
        match &self.strategy {
            Strategy::ReadOnly => Err(StmError::WriteOnReadOnly),
            Strategy::ReadWrite(rw) => {
                rw.write(self, cell, value);
                Ok(())
            }
            Strategy::Inevitable(direct) | Strategy::Unsafe(direct) => {
                direct.write(self.number, cell, value);
                Ok(())
            }
        }
    }

    /// Commit according to the variant
    pub(crate) fn commit(self: &Arc<Self>) -> StmResult<()> {
        self.ensure_running()?;
        match &self.strategy {
            Strategy::ReadOnly => {
                self.finish(TransactionStatus::Committed);
                Ok(())
            }
            Strategy::ReadWrite(rw) if self.parent.is_none() => top_level::commit(self, rw),
            Strategy::ReadWrite(rw) => nested::commit(self, rw),
            Strategy::Inevitable(direct) => inevitable::commit(self, direct),
            Strategy::Unsafe(direct) => unsafe_single::commit(self, direct),
        }
    }

    /// Abort, or force a commit for variants that cannot abort
    ///
    /// Aborting a finished transaction is a no-op.
    pub(crate) fn abort(self: &Arc<Self>) -> StmResult<()> {
        if self.is_finished() {
            return Ok(());
        }
        if !self.kind.capabilities().can_abort && !self.kind.capabilities().is_read_only {
            debug!(tx = %self.id, kind = %self.kind, "Abort requested, forcing commit");
            return self.commit();
        }
        if let Strategy::ReadWrite(rw) = &self.strategy {
            rw.revert();
        }
        self.finish(TransactionStatus::Aborted);
        Ok(())
    }

    /// Abort from a destructor, where errors can only be logged
    pub(crate) fn abort_quietly(self: &Arc<Self>) {
        if let Err(e) = self.abort() {
            warn!(tx = %self.id, kind = %self.kind, error = %e, "Failed to finish dropped transaction");
        }
    }

    /// Final status transition: unpin and recycle buffers
    pub(crate) fn finish(&self, status: TransactionStatus) {
        self.set_status(status);
        if let Some(context) = &self.context {
            context.release();
        }
        if let Strategy::ReadWrite(rw) = &self.strategy {
            pool::release(rw.take_reads());
        }
    }
}

impl std::fmt::Debug for TxState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TxState")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("depth", &self.depth)
            .field("number", &self.number)
            .field("status", &self.status())
            .finish()
    }
}
