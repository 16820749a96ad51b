//! Nested parallel tasks
//!
//! Runs a batch of closures as parallel children of the current
//! transaction. Tasks run on scoped threads in waves of at most
//! `parallel.max_threads`; each is retried on sibling conflicts up to
//! `parallel.max_child_attempts` times.
//!
//! Tasks that keep conflicting are deferred and re-run one after another as
//! linear children on the caller's thread, once every parallel sibling has
//! merged. Parallelism degrades to sequential execution for exactly the
//! tasks that contend.

use std::any::Any;
use strata_stm_concurrency::{runtime, Transaction, TxHandle};
use strata_stm_core::error::{StmError, StmResult};
use tracing::{debug, warn};

enum ChildOutcome<R> {
    Done(R),
    /// Still conflicting with siblings after every attempt
    Contended,
    Failed(StmError),
}

/// Run `tasks` as parallel children of the current transaction
///
/// Results come back in task order. The first failure in task order that is
/// not a sibling conflict is returned; restarts aimed at the caller or an
/// ancestor surface this way too.
pub fn manage_nested_parallel_tasks<R, F>(tasks: Vec<F>) -> StmResult<Vec<R>>
where
    F: Fn() -> StmResult<R> + Send + Sync,
    R: Send,
{
    let parent = Transaction::current().ok_or(StmError::NoActiveTransaction)?;
    if !parent.kind().capabilities().supports_nesting {
        return Err(StmError::unsupported(parent.kind().name(), "parallel nesting"));
    }
    if tasks.is_empty() {
        return Ok(Vec::new());
    }

    let parallel = &runtime().config().parallel;
    let wave_size = parallel.max_threads.max(1);
    let attempts = parallel.max_child_attempts;
    let mut results: Vec<Option<R>> = tasks.iter().map(|_| None).collect();
    let mut deferred = Vec::new();

    for (wave, chunk) in tasks.chunks(wave_size).enumerate() {
        let outcomes: Vec<ChildOutcome<R>> = std::thread::scope(|s| {
            let workers: Vec<_> = chunk
                .iter()
                .map(|task| {
                    let parent = parent.clone();
                    s.spawn(move || run_child(&parent, task, attempts))
                })
                .collect();
            workers
                .into_iter()
                .map(|worker| {
                    worker
                        .join()
                        .unwrap_or_else(|payload| {
                            ChildOutcome::Failed(StmError::TaskPanicked(panic_message(payload)))
                        })
                })
                .collect()
        });

        for (offset, outcome) in outcomes.into_iter().enumerate() {
            let index = wave * wave_size + offset;
            match outcome {
                ChildOutcome::Done(value) => results[index] = Some(value),
                ChildOutcome::Contended => {
                    warn!(
                        task = index,
                        attempts,
                        "Deferring contended task to sequential execution"
                    );
                    deferred.push(index);
                }
                ChildOutcome::Failed(e) => return Err(e),
            }
        }
    }

    let child_depth = parent.depth() + 1;
    for index in deferred {
        let value = loop {
            let child = Transaction::begin()?;
            match (tasks[index])() {
                Ok(value) => match child.commit() {
                    Ok(()) => break value,
                    Err(e) if e.restarts(child_depth) => continue,
                    Err(e) => return Err(e),
                },
                Err(e) => {
                    if let Err(abort_error) = child.abort() {
                        debug!(task = index, error = %abort_error, "Abort after failed task");
                    }
                    if !e.restarts(child_depth) {
                        return Err(e);
                    }
                }
            }
        };
        results[index] = Some(value);
    }

    results
        .into_iter()
        .enumerate()
        .map(|(index, value)| {
            value.ok_or_else(|| StmError::Internal(format!("task {index} produced no result")))
        })
        .collect()
}

fn run_child<R, F>(parent: &TxHandle, task: &F, attempts: u32) -> ChildOutcome<R>
where
    F: Fn() -> StmResult<R>,
{
    let child_depth = parent.depth() + 1;
    for _ in 0..attempts {
        let child = match Transaction::begin_parallel_nested(parent) {
            Ok(child) => child,
            Err(e) => return ChildOutcome::Failed(e),
        };
        match task() {
            Ok(value) => match child.commit() {
                Ok(()) => return ChildOutcome::Done(value),
                Err(e) if e.restarts(child_depth) => continue,
                Err(e) => return ChildOutcome::Failed(e),
            },
            Err(e) => {
                if let Err(abort_error) = child.abort() {
                    debug!(error = %abort_error, "Abort after failed task");
                }
                if !e.restarts(child_depth) {
                    return ChildOutcome::Failed(e);
                }
            }
        }
    }
    ChildOutcome::Contended
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    match payload.downcast::<String>() {
        Ok(message) => *message,
        Err(payload) => match payload.downcast::<&'static str>() {
            Ok(message) => (*message).to_string(),
            Err(_) => "task panicked".to_string(),
        },
    }
}
