//! Transactions
//!
//! Each thread keeps a stack of the transactions it is running. The top of
//! the stack is the *current* transaction: every [`VBox`](crate::VBox)
//! operation on that thread goes through it, and beginning a transaction
//! while one is current creates a child.
//!
//! | Begin with                            | Creates                                |
//! |---------------------------------------|----------------------------------------|
//! | [`Transaction::begin`]                | top-level read-write, or linear child  |
//! | [`Transaction::begin_read_only`]      | top-level read-only, or linear child   |
//! | [`Transaction::begin_inevitable`]     | inevitable (top-level only)            |
//! | [`Transaction::begin_unsafe_single_threaded`] | unsafe single-threaded (top-level only) |
//! | [`Transaction::begin_parallel_nested`]| child of a [`TxHandle`], on any thread |
//!
//! A [`Transaction`] is tied to the thread that began (or resumed) it and
//! finishes exactly once: by [`commit`](Transaction::commit),
//! [`abort`](Transaction::abort), or by being dropped (which aborts).

mod inevitable;
mod nested;
mod read_only;
mod read_write;
mod state;
mod top_level;
mod unsafe_single;

pub(crate) use state::TxState;

use crate::runtime::{detach_thread_context, runtime};
use std::cell::RefCell;
use std::marker::PhantomData;
use std::sync::Arc;
use strata_stm_core::error::{StmError, StmResult};
use strata_stm_core::types::{TransactionKind, TransactionStatus, TxId};
use strata_stm_storage::{BoxCell, Value};
use tracing::debug;

thread_local! {
    static CURRENT: RefCell<Vec<Arc<TxState>>> = RefCell::new(Vec::new());
}

pub(crate) fn current_state() -> Option<Arc<TxState>> {
    CURRENT
        .try_with(|stack| stack.borrow().last().cloned())
        .ok()
        .flatten()
}

fn push(state: &Arc<TxState>) {
    let _ = CURRENT.try_with(|stack| stack.borrow_mut().push(Arc::clone(state)));
}

fn is_top(state: &Arc<TxState>) -> bool {
    current_state().is_some_and(|top| Arc::ptr_eq(&top, state))
}

fn remove(state: &Arc<TxState>) {
    let _ = CURRENT.try_with(|stack| {
        let mut stack = stack.borrow_mut();
        if let Some(pos) = stack.iter().rposition(|s| Arc::ptr_eq(s, state)) {
            stack.remove(pos);
        }
    });
}

/// Depth of this thread's transaction stack
pub fn stack_depth() -> usize {
    CURRENT.try_with(|stack| stack.borrow().len()).unwrap_or(0)
}

/// Transactional read of `cell` on the calling thread
///
/// Without a current transaction, reads the newest committed value.
pub(crate) fn read_cell(cell: &Arc<BoxCell>) -> StmResult<Value> {
    match current_state() {
        Some(state) => state.read(cell),
        None => Ok(read_latest(cell)),
    }
}

/// Transactional write of `cell` on the calling thread
///
/// Without a current transaction, the write runs in its own inevitable
/// transaction.
pub(crate) fn write_cell(cell: &Arc<BoxCell>, value: Value) -> StmResult<()> {
    match current_state() {
        Some(state) => state.write(cell, value),
        None => {
            let tx = Transaction::begin_inevitable()?;
            tx.state.write(cell, value)?;
            tx.commit()
        }
    }
}

fn read_latest(cell: &Arc<BoxCell>) -> Value {
    let queue = runtime().queue();
    let mut number = queue.most_recent().number();
    loop {
        if let Some(value) = cell.read_at(number) {
            return value;
        }
        // The hint went stale and the collector trimmed past it.
        number = queue.latest_committed().number();
    }
}

/// A running transaction, bound to the thread that began it
#[must_use = "dropping a transaction aborts it"]
pub struct Transaction {
    state: Arc<TxState>,
    finished: bool,
    _thread_bound: PhantomData<*const ()>,
}

impl Transaction {
    fn started(state: Arc<TxState>) -> Self {
        push(&state);
        Transaction {
            state,
            finished: false,
            _thread_bound: PhantomData,
        }
    }

    /// Begin a read-write transaction
    ///
    /// Nested under the current transaction if there is one.
    pub fn begin() -> StmResult<Self> {
        Self::begin_with(false)
    }

    /// Begin a read-only transaction
    ///
    /// Under a read-write parent the child is read-write: it shares the
    /// parent's tentative writes.
    pub fn begin_read_only() -> StmResult<Self> {
        Self::begin_with(true)
    }

    /// Begin a transaction, read-only or not
    pub fn begin_with(read_only: bool) -> StmResult<Self> {
        let state = match current_state() {
            Some(parent) => nested::begin_child(&parent, read_only, TransactionKind::Nested)?,
            None if read_only => read_only::begin(),
            None => top_level::begin(),
        };
        Ok(Self::started(state))
    }

    /// Begin an inevitable transaction
    ///
    /// Cannot be nested. Blocks until every earlier commit finished.
    pub fn begin_inevitable() -> StmResult<Self> {
        if let Some(current) = current_state() {
            return Err(StmError::unsupported(current.kind.name(), "inevitable nesting"));
        }
        Ok(Self::started(inevitable::begin()))
    }

    /// Begin an unsafe single-threaded transaction
    ///
    /// Only correct while no other thread commits.
    pub fn begin_unsafe_single_threaded() -> StmResult<Self> {
        if let Some(current) = current_state() {
            return Err(StmError::unsupported(current.kind.name(), "unsafe nesting"));
        }
        Ok(Self::started(unsafe_single::begin()))
    }

    /// Begin a child of `parent` on the calling thread
    ///
    /// Children of one parent may run concurrently on different threads;
    /// their merges are serialized in commit order.
    pub fn begin_parallel_nested(parent: &TxHandle) -> StmResult<Self> {
        let state = nested::begin_child(&parent.state, true, TransactionKind::ParallelNested)?;
        Ok(Self::started(state))
    }

    /// The calling thread's current transaction
    pub fn current() -> Option<TxHandle> {
        current_state().map(|state| TxHandle { state })
    }

    fn ensure_current(&self) -> StmResult<()> {
        if self.finished {
            return Err(StmError::NoActiveTransaction);
        }
        if !is_top(&self.state) {
            return Err(StmError::NotCurrent);
        }
        Ok(())
    }

    /// Commit
    ///
    /// Must be the thread's current transaction; otherwise `NotCurrent` is
    /// returned and the transaction is aborted.
    pub fn commit(mut self) -> StmResult<()> {
        self.ensure_current()?;
        self.finished = true;
        remove(&self.state);
        self.state.commit()
    }

    /// Abort, discarding every write
    ///
    /// Inevitable and unsafe transactions cannot abort; they commit instead.
    pub fn abort(mut self) -> StmResult<()> {
        self.ensure_current()?;
        self.finished = true;
        remove(&self.state);
        self.state.abort()
    }

    /// Commit and continue in a fresh transaction of the same kind
    ///
    /// Top-level read-write and read-only transactions only. If the commit
    /// fails the transaction is finished and every later operation on this
    /// handle reports `NoActiveTransaction`.
    pub fn checkpoint(&mut self) -> StmResult<()> {
        self.ensure_current()?;
        let kind = self.state.kind;
        if !matches!(kind, TransactionKind::TopLevel | TransactionKind::ReadOnly)
            || self.state.parent.is_some()
        {
            return Err(StmError::unsupported(kind.name(), "checkpoint"));
        }
        remove(&self.state);
        if let Err(e) = self.state.commit() {
            self.finished = true;
            return Err(e);
        }
        let next = match kind {
            TransactionKind::ReadOnly => read_only::begin(),
            _ => top_level::begin(),
        };
        push(&next);
        self.state = next;
        Ok(())
    }

    /// Detach from this thread so the transaction can be resumed elsewhere
    ///
    /// Top-level read-write and read-only transactions only. An inevitable
    /// transaction holds the next commit slot and an unsafe one writes
    /// straight into cells, so neither may outlive its thread; the rejected
    /// handle is consumed and commits. The snapshot stays pinned until the
    /// transaction finishes.
    pub fn suspend(mut self) -> StmResult<SuspendedTransaction> {
        self.ensure_current()?;
        let kind = self.state.kind;
        if self.state.parent.is_some()
            || matches!(kind, TransactionKind::Inevitable | TransactionKind::UnsafeSingleThreaded)
        {
            return Err(StmError::unsupported(kind.name(), "suspend"));
        }
        self.finished = true;
        remove(&self.state);
        if let Some(context) = &self.state.context {
            detach_thread_context(context);
        }
        debug!(tx = %self.state.id, kind = %self.state.kind, "Suspended");
        Ok(SuspendedTransaction {
            state: Some(Arc::clone(&self.state)),
        })
    }

    /// Handle for spawning parallel children or inspecting this transaction
    pub fn handle(&self) -> TxHandle {
        TxHandle {
            state: Arc::clone(&self.state),
        }
    }

    /// Transaction id
    pub fn id(&self) -> TxId {
        self.state.id
    }

    /// Variant
    pub fn kind(&self) -> TransactionKind {
        self.state.kind
    }

    /// Nesting depth, 0 for top-level
    pub fn depth(&self) -> usize {
        self.state.depth
    }

    /// Snapshot number
    pub fn number(&self) -> u64 {
        self.state.number
    }

    /// Current status
    pub fn status(&self) -> TransactionStatus {
        self.state.status()
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        remove(&self.state);
        self.state.abort_quietly();
    }
}

impl std::fmt::Debug for Transaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("state", &self.state)
            .field("finished", &self.finished)
            .finish()
    }
}

/// Shareable reference to a transaction
///
/// Used to begin parallel children on other threads. Holding a handle does
/// not keep the transaction alive.
#[derive(Clone)]
pub struct TxHandle {
    state: Arc<TxState>,
}

impl TxHandle {
    /// Transaction id
    pub fn id(&self) -> TxId {
        self.state.id
    }

    /// Variant
    pub fn kind(&self) -> TransactionKind {
        self.state.kind
    }

    /// Nesting depth
    pub fn depth(&self) -> usize {
        self.state.depth
    }

    /// Snapshot number
    pub fn number(&self) -> u64 {
        self.state.number
    }

    /// Current status
    pub fn status(&self) -> TransactionStatus {
        self.state.status()
    }

    /// Check if both handles refer to the same transaction
    pub fn same_transaction(&self, other: &TxHandle) -> bool {
        Arc::ptr_eq(&self.state, &other.state)
    }
}

impl std::fmt::Debug for TxHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("TxHandle").field(&self.state).finish()
    }
}

/// A top-level transaction detached from any thread
///
/// Dropping it without resuming aborts the transaction.
pub struct SuspendedTransaction {
    state: Option<Arc<TxState>>,
}

impl SuspendedTransaction {
    /// Make the transaction current on the calling thread
    pub fn resume(mut self) -> StmResult<Transaction> {
        let state = self.state.take().ok_or(StmError::NoActiveTransaction)?;
        if state.is_finished() {
            return Err(StmError::NoActiveTransaction);
        }
        debug!(tx = %state.id, kind = %state.kind, "Resumed");
        Ok(Transaction::started(state))
    }

    /// Transaction id
    pub fn id(&self) -> Option<TxId> {
        self.state.as_ref().map(|s| s.id)
    }
}

impl Drop for SuspendedTransaction {
    fn drop(&mut self) {
        if let Some(state) = self.state.take() {
            state.abort_quietly();
        }
    }
}

impl std::fmt::Debug for SuspendedTransaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SuspendedTransaction")
            .field("state", &self.state)
            .finish()
    }
}
