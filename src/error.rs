//! Unified error types for strata-stm.
//!
//! This module provides one error type for applications that do not want
//! to match on the runtime's detailed taxonomy. Every runtime error keeps
//! its original [`StmError`] so retry loops still recognize restarts.

use strata_stm_core::error::{StmError, TransactionalError};
use thiserror::Error;

/// All strata-stm errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// Concurrent update; re-running the transaction may succeed
    #[error("conflict: {0}")]
    Conflict(StmError),

    /// Transaction API used incorrectly (write in read-only, wrong nesting,
    /// finishing a transaction that is not current)
    #[error("misuse: {0}")]
    Misuse(StmError),

    /// Invalid or late runtime configuration
    #[error("configuration error: {0}")]
    Config(StmError),

    /// Any other runtime failure
    #[error(transparent)]
    Stm(StmError),

    /// Internal error (bug or invariant violation)
    #[error("internal error: {0}")]
    Internal(String),
}

/// Result type for strata-stm operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Check if this error is retryable.
    ///
    /// Retryable errors (conflicts) may succeed on retry with fresh data.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Conflict(_))
    }

    /// Check if this is a conflict error.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::Conflict(_))
    }

    /// Check if this reports a programming mistake.
    pub fn is_misuse(&self) -> bool {
        matches!(self, Error::Misuse(_))
    }

    /// Check if this is a serious/unrecoverable error.
    pub fn is_serious(&self) -> bool {
        match self {
            Error::Internal(_) => true,
            Error::Stm(e) => e.is_serious(),
            _ => false,
        }
    }
}

// Convert from the runtime's error taxonomy
impl From<StmError> for Error {
    fn from(e: StmError) -> Self {
        match e {
            StmError::CommitConflict { .. } | StmError::EarlyAbort { .. } => Error::Conflict(e),
            StmError::InvalidConfig(_) | StmError::AlreadyInstalled => Error::Config(e),
            e if e.is_misuse() => Error::Misuse(e),
            e => Error::Stm(e),
        }
    }
}

impl TransactionalError for Error {
    fn stm_error(&self) -> Option<&StmError> {
        match self {
            Error::Conflict(e) | Error::Misuse(e) | Error::Config(e) | Error::Stm(e) => Some(e),
            Error::Internal(_) => None,
        }
    }
}
