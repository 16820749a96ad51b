//! Run a closure as a transaction, retrying on conflicts
//!
//! ```text
//! loop:
//!     begin (nested if a transaction is current)
//!     run body
//!     Ok       → commit; a conflict aimed at this depth loops again
//!     Err(e)   → abort; e aimed at this depth loops again, anything else
//!                is returned unchanged
//! ```
//!
//! A conflict aimed at an outer depth is returned, so the `atomically`
//! running at that depth re-runs its whole body.

use crate::retry::RetryPolicy;
use strata_stm_concurrency::Transaction;
use strata_stm_core::error::TransactionalError;
use tracing::debug;

/// Options for [`atomically_with`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TxOptions {
    /// Begin a read-only transaction
    pub read_only: bool,
    /// Retry behaviour
    pub policy: RetryPolicy,
}

impl TxOptions {
    /// Read-write with the default policy
    pub fn new() -> Self {
        Self::default()
    }

    /// Request a read-only transaction
    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    /// Use `policy` for retries
    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }
}

/// Run `body` in a read-write transaction
pub fn atomically<T, E, F>(body: F) -> Result<T, E>
where
    F: FnMut() -> Result<T, E>,
    E: TransactionalError,
{
    atomically_with(TxOptions::new(), body)
}

/// Run `body` in a read-only transaction
pub fn atomically_read_only<T, E, F>(body: F) -> Result<T, E>
where
    F: FnMut() -> Result<T, E>,
    E: TransactionalError,
{
    atomically_with(TxOptions::new().read_only(), body)
}

/// Run `body` in a transaction configured by `options`
pub fn atomically_with<T, E, F>(options: TxOptions, mut body: F) -> Result<T, E>
where
    F: FnMut() -> Result<T, E>,
    E: TransactionalError,
{
    let mut attempts: u32 = 0;
    loop {
        let tx = Transaction::begin_with(options.read_only).map_err(E::from)?;
        let depth = tx.depth();
        attempts = attempts.saturating_add(1);

        let error = match body() {
            Ok(value) => match tx.commit() {
                Ok(()) => return Ok(value),
                Err(e) if e.restarts(depth) => E::from(e),
                Err(e) => return Err(E::from(e)),
            },
            Err(e) => {
                if let Err(abort_error) = tx.abort() {
                    debug!(depth, error = %abort_error, "Abort after failed body");
                }
                if !e.restarts(depth) {
                    return Err(e);
                }
                e
            }
        };

        if options.policy.exhausted(attempts) {
            debug!(depth, attempts, "Retry budget exhausted");
            return Err(error);
        }
        options.policy.backoff(attempts - 1);
    }
}
