//! Process-wide runtime
//!
//! Cells are plain values with no handle to a database object, so the
//! commit queue, the context registry and the collector are process
//! globals. The runtime is created on first use from
//! [`StmConfig::from_env`], or explicitly with [`install`] before any
//! transaction runs.
//!
//! # Snapshot pinning
//!
//! A transaction pins its snapshot record in a context before reading, and
//! then re-checks the collector's proposed frontier:
//!
//! ```text
//! transaction                      collector
//! ───────────                      ─────────
//! record = latest committed        proposed = latest committed
//! context.require(record)          fence(SeqCst)
//! fence(SeqCst)                    scan contexts
//! if record < proposed: retry
//! ```
//!
//! Either the transaction sees the new proposal (and re-pins something at
//! least as new), or the collector's scan sees the pin.

use crate::context::{ContextRegistry, TxContext};
use crate::gc::{CommitListener, GarbageCollector, GcStats};
use crate::queue::CommitQueue;
use crate::record::CommitRecord;
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use std::cell::RefCell;
use std::sync::atomic::{fence, AtomicU64, Ordering};
use std::sync::{Arc, Once};
use std::thread::JoinHandle;
use std::time::Duration;
use strata_stm_core::config::StmConfig;
use strata_stm_core::error::{StmError, StmResult};
use strata_stm_core::types::TxId;
use tracing::{info, warn};

/// Name of the background collector thread
pub const GC_THREAD_NAME: &str = "strata-stm-gc";

static RUNTIME: OnceCell<Runtime> = OnceCell::new();

thread_local! {
    static THREAD_CONTEXT: RefCell<Option<Arc<TxContext>>> = RefCell::new(None);
}

/// Shared state of the transactional memory
pub struct Runtime {
    config: StmConfig,
    queue: CommitQueue,
    contexts: ContextRegistry,
    gc: GarbageCollector,
    next_tx_id: AtomicU64,
    gc_started: Once,
    gc_thread: Mutex<Option<JoinHandle<()>>>,
}

impl Runtime {
    fn new(config: StmConfig) -> Self {
        let queue = CommitQueue::new();
        let gc = GarbageCollector::new(queue.most_recent());
        Runtime {
            config,
            queue,
            contexts: ContextRegistry::new(),
            gc,
            next_tx_id: AtomicU64::new(1),
            gc_started: Once::new(),
            gc_thread: Mutex::new(None),
        }
    }

    /// Active configuration
    pub fn config(&self) -> &StmConfig {
        &self.config
    }

    /// Global commit queue
    pub fn queue(&self) -> &CommitQueue {
        &self.queue
    }

    /// Registry of every context
    pub fn contexts(&self) -> &ContextRegistry {
        &self.contexts
    }

    /// Version collector
    pub fn gc(&self) -> &GarbageCollector {
        &self.gc
    }

    /// Allocate a fresh transaction id
    pub fn next_tx_id(&self) -> TxId {
        TxId::from_raw(self.next_tx_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Number of the newest committed record
    pub fn latest_version(&self) -> u64 {
        self.queue.latest_committed().number()
    }

    /// Pin the newest committed record in `context`
    pub fn pin_latest(&self, context: &TxContext) -> Arc<CommitRecord> {
        loop {
            let record = self.queue.latest_committed();
            context.require(Arc::clone(&record));
            fence(Ordering::SeqCst);
            if record.number() >= self.gc.proposed_frontier() {
                return record;
            }
        }
    }

    /// Pin `record` in `context`, for records that can never be reclaimed
    /// before the caller is done (the caller's own pending record's
    /// predecessor)
    pub fn pin(&self, context: &TxContext, record: Arc<CommitRecord>) {
        context.require(record);
        fence(Ordering::SeqCst);
    }

    /// Run one collection round now
    pub fn collect_garbage(&self) -> GcStats {
        self.gc.collect(&self.queue, &self.contexts)
    }

    /// Register a reclamation listener
    pub fn add_commit_listener(&self, listener: Arc<dyn CommitListener>) {
        self.gc.add_listener(listener);
    }

    /// Unregister a reclamation listener
    pub fn remove_commit_listener(&self, listener: &Arc<dyn CommitListener>) -> bool {
        self.gc.remove_listener(listener)
    }

    /// Check if the background collector thread is running
    pub fn is_background_gc_running(&self) -> bool {
        self.gc_thread.lock().is_some()
    }

    /// Stop the background collector and wait for it to exit
    pub fn stop_background_gc(&self) {
        self.gc.request_shutdown();
        let handle = self.gc_thread.lock().take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                warn!(thread = GC_THREAD_NAME, "Collector thread panicked");
            }
            info!(thread = GC_THREAD_NAME, "Background collector stopped");
        }
    }

    fn start_background_gc(&'static self) {
        self.gc_started.call_once(|| {
            if !self.config.gc.enabled {
                info!("Background collector disabled");
                return;
            }
            let interval = Duration::from_millis(self.config.gc.interval_ms);
            let spawned = std::thread::Builder::new()
                .name(GC_THREAD_NAME.to_string())
                .spawn(move || self.gc_loop(interval));
            match spawned {
                Ok(handle) => {
                    *self.gc_thread.lock() = Some(handle);
                    info!(
                        thread = GC_THREAD_NAME,
                        interval_ms = self.config.gc.interval_ms,
                        "Background collector started"
                    );
                }
                Err(e) => {
                    warn!(error = %e, "Failed to spawn collector thread, reclamation is manual");
                }
            }
        });
    }

    fn gc_loop(&self, interval: Duration) {
        while !self.gc.wait_for_shutdown(interval) {
            self.collect_garbage();
        }
    }
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("config", &self.config)
            .field("queue", &self.queue)
            .field("gc", &self.gc)
            .finish()
    }
}

/// The process runtime, created from the environment on first use
pub fn runtime() -> &'static Runtime {
    let runtime = RUNTIME.get_or_init(|| {
        let config = StmConfig::from_env();
        let config = match config.validate() {
            Ok(()) => config,
            Err(e) => {
                warn!(error = %e, "Invalid environment configuration, using defaults");
                StmConfig::new()
            }
        };
        announce(&config);
        Runtime::new(config)
    });
    runtime.start_background_gc();
    runtime
}

/// Create the process runtime with an explicit configuration
///
/// Fails with `AlreadyInstalled` once the runtime exists, whether it was
/// installed explicitly or created implicitly by an earlier transaction.
pub fn install(config: StmConfig) -> StmResult<&'static Runtime> {
    config.validate()?;
    let mut installed = false;
    let runtime = RUNTIME.get_or_init(|| {
        installed = true;
        announce(&config);
        Runtime::new(config)
    });
    if !installed {
        return Err(StmError::AlreadyInstalled);
    }
    runtime.start_background_gc();
    Ok(runtime)
}

/// Check if the runtime exists yet
pub fn is_installed() -> bool {
    RUNTIME.get().is_some()
}

fn announce(config: &StmConfig) {
    info!(
        gc_enabled = config.gc.enabled,
        gc_interval_ms = config.gc.interval_ms,
        write_set_block_size = config.write_set_block_size,
        max_parallel_threads = config.parallel.max_threads,
        "Transactional memory runtime installed"
    );
}

/// Context of the calling thread, registered on first use
pub(crate) fn thread_context(runtime: &Runtime) -> Arc<TxContext> {
    let existing = THREAD_CONTEXT
        .try_with(|slot| slot.borrow().clone())
        .ok()
        .flatten();
    if let Some(context) = existing {
        return context;
    }
    let context = TxContext::new();
    runtime.contexts().register(&context);
    let _ = THREAD_CONTEXT.try_with(|slot| *slot.borrow_mut() = Some(Arc::clone(&context)));
    context
}

/// Give the calling thread a fresh context on next use
///
/// The old context leaves with a suspended transaction and stays pinned
/// until that transaction finishes.
pub(crate) fn detach_thread_context(context: &Arc<TxContext>) {
    let _ = THREAD_CONTEXT.try_with(|slot| {
        let mut slot = slot.borrow_mut();
        if slot.as_ref().is_some_and(|current| Arc::ptr_eq(current, context)) {
            *slot = None;
        }
    });
}
