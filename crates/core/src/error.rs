//! Error types for the transactional memory runtime
//!
//! Every fallible operation returns [`StmResult`]. Errors fall into three
//! families:
//!
//! | Family | Variants | Caller reaction |
//! |--------|----------|-----------------|
//! | Restart | `CommitConflict`, `EarlyAbort` | retry from `restart_depth` |
//! | Misuse | `WriteOnReadOnly`, `Unsupported`, `NoActiveTransaction`, `NotCurrent`, `IndexOutOfBounds` | fix the program |
//! | Runtime | `AlreadyInstalled`, `InvalidConfig`, `TaskPanicked`, `Internal` | report |
//!
//! ## Restart depth
//!
//! Restart errors carry the nesting depth of the outermost transaction that
//! must be re-executed. `0` means the top-level transaction; `d > 0` means
//! the nested transaction at depth `d` can be retried on its own, leaving
//! its ancestors intact. A retry loop running a transaction at depth `k`
//! handles the error when [`StmError::restarts`]`(k)` holds and propagates
//! it otherwise.

use thiserror::Error;

/// Result type for transactional operations
pub type StmResult<T> = std::result::Result<T, StmError>;

/// All errors raised by the transactional memory runtime
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StmError {
    /// Commit-time validation found a newer version of a value this
    /// transaction read
    #[error("commit conflict (restart at depth {restart_depth}, snapshot {snapshot})")]
    CommitConflict {
        /// Depth of the transaction that must re-execute
        restart_depth: usize,
        /// Snapshot number the failed transaction ran against
        snapshot: u64,
    },

    /// A read observed a value newer than the transaction's snapshot
    #[error(
        "early abort: observed version {observed} newer than snapshot {snapshot} \
         (restart at depth {restart_depth})"
    )]
    EarlyAbort {
        /// Depth of the transaction that must re-execute
        restart_depth: usize,
        /// Snapshot (or ancestor nested version) the read was bound to
        snapshot: u64,
        /// Version actually found
        observed: u64,
    },

    /// `put` inside a read-only transaction
    #[error("write attempted inside a read-only transaction")]
    WriteOnReadOnly,

    /// Operation not available for this transaction variant
    #[error("{operation} is not supported by {kind} transactions")]
    Unsupported {
        /// Variant name, e.g. `"inevitable"`
        kind: &'static str,
        /// Rejected operation, e.g. `"nesting"`
        operation: &'static str,
    },

    /// An operation that requires an active transaction found none
    #[error("no active transaction on this thread")]
    NoActiveTransaction,

    /// The transaction handle is not the innermost active transaction
    #[error("transaction is not the current transaction on this thread")]
    NotCurrent,

    /// The global runtime was configured after it was already running
    #[error("runtime already installed")]
    AlreadyInstalled,

    /// Configuration value out of range or unparsable
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Transactional array index outside its bounds
    #[error("index {index} out of bounds for array of length {len}")]
    IndexOutOfBounds {
        /// Requested index
        index: usize,
        /// Array length
        len: usize,
    },

    /// A parallel child task panicked
    #[error("parallel task panicked: {0}")]
    TaskPanicked(String),

    /// Invariant violation inside the runtime
    #[error("internal error: {0}")]
    Internal(String),
}

impl StmError {
    /// Check if this error asks for a re-execution
    pub fn is_retryable(&self) -> bool {
        matches!(self, StmError::CommitConflict { .. } | StmError::EarlyAbort { .. })
    }

    /// Depth of the transaction that must re-execute, for restart errors
    pub fn restart_depth(&self) -> Option<usize> {
        match self {
            StmError::CommitConflict { restart_depth, .. }
            | StmError::EarlyAbort { restart_depth, .. } => Some(*restart_depth),
            _ => None,
        }
    }

    /// Check if a retry loop running a transaction at `depth` should handle
    /// this error
    ///
    /// True when the restart target is `depth` or something nested deeper:
    /// a child failure not handled by the child's own loop restarts the
    /// closest enclosing loop.
    pub fn restarts(&self, depth: usize) -> bool {
        self.restart_depth().is_some_and(|target| target >= depth)
    }

    /// Check if this is a commit-time conflict
    pub fn is_conflict(&self) -> bool {
        matches!(self, StmError::CommitConflict { .. })
    }

    /// Check if this error reports a programming mistake
    pub fn is_misuse(&self) -> bool {
        matches!(
            self,
            StmError::WriteOnReadOnly
                | StmError::Unsupported { .. }
                | StmError::NoActiveTransaction
                | StmError::NotCurrent
                | StmError::IndexOutOfBounds { .. }
        )
    }

    /// Check if this is a serious/unrecoverable error
    pub fn is_serious(&self) -> bool {
        matches!(self, StmError::Internal(_) | StmError::TaskPanicked(_))
    }

    /// Build an `Unsupported` error
    pub fn unsupported(kind: &'static str, operation: &'static str) -> Self {
        StmError::Unsupported { kind, operation }
    }
}

/// Error types that can carry a transactional restart signal
///
/// Retry wrappers are generic over the user's error type: user code may
/// return its own error enum as long as the runtime's restart errors can be
/// converted into it and recognized again.
pub trait TransactionalError: From<StmError> {
    /// The runtime error wrapped in this value, if any
    fn stm_error(&self) -> Option<&StmError>;

    /// Check if a retry loop at `depth` should re-execute
    fn restarts(&self, depth: usize) -> bool {
        self.stm_error().is_some_and(|e| e.restarts(depth))
    }
}

impl TransactionalError for StmError {
    fn stm_error(&self) -> Option<&StmError> {
        Some(self)
    }
}
