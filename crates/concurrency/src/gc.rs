//! Version garbage collection
//!
//! A collection round:
//!
//! 1. Reads the newest committed record and publishes its number as the
//!    *proposed* frontier. Transactions that begin concurrently re-check
//!    this value after pinning their snapshot (see `Runtime::pin_latest`).
//! 2. Scans every context for the oldest pinned record.
//! 3. Cleans every committed record up to that frontier: the record's
//!    write-set is detached and the nodes it installed lose their tails.
//! 4. Notifies commit listeners of the new frontier.
//!
//! Rounds never block committers. A slow round only delays reclamation.

use crate::context::ContextRegistry;
use crate::queue::CommitQueue;
use crate::record::CommitRecord;
use crossbeam_utils::CachePadded;
use parking_lot::{Condvar, Mutex, RwLock};
use std::sync::atomic::{fence, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Observer of reclamation progress
pub trait CommitListener: Send + Sync {
    /// Called after versions older than `frontier` were released
    fn on_reclamation(&self, frontier: u64);
}

/// Statistics of one collection round
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GcStats {
    /// Oldest record number any running transaction may still read
    pub frontier: u64,
    /// Commit records cleaned this round
    pub records_cleaned: usize,
    /// Version nodes whose older tails were released
    pub nodes_released: usize,
    /// Live contexts scanned
    pub contexts_scanned: usize,
    /// Dead contexts unlinked
    pub contexts_unlinked: usize,
}

/// Reclaims versions no running transaction can read
pub struct GarbageCollector {
    proposed: CachePadded<AtomicU64>,
    frontier: CachePadded<AtomicU64>,
    /// Newest cleaned record; the lock also serializes rounds
    cleaned_up_to: Mutex<Arc<CommitRecord>>,
    listeners: RwLock<Vec<Arc<dyn CommitListener>>>,
    shutdown: Mutex<bool>,
    wake: Condvar,
}

impl GarbageCollector {
    /// Create a collector that starts cleaning after `start`
    pub fn new(start: Arc<CommitRecord>) -> Self {
        let number = start.number();
        GarbageCollector {
            proposed: CachePadded::new(AtomicU64::new(0)),
            frontier: CachePadded::new(AtomicU64::new(number)),
            cleaned_up_to: Mutex::new(start),
            listeners: RwLock::new(Vec::new()),
            shutdown: Mutex::new(false),
            wake: Condvar::new(),
        }
    }

    /// Frontier announced by the round in progress (or the last one)
    pub fn proposed_frontier(&self) -> u64 {
        self.proposed.load(Ordering::SeqCst)
    }

    /// Frontier reached by the last completed round
    pub fn frontier(&self) -> u64 {
        self.frontier.load(Ordering::Acquire)
    }

    /// Run one collection round
    pub fn collect(&self, queue: &CommitQueue, contexts: &ContextRegistry) -> GcStats {
        let mut cursor = self.cleaned_up_to.lock();

        let latest = queue.latest_committed();
        self.proposed.store(latest.number(), Ordering::SeqCst);
        fence(Ordering::SeqCst);

        let scan = contexts.scan();
        let frontier = scan
            .min_required
            .map_or(latest.number(), |min| min.min(latest.number()));

        let mut stats = GcStats {
            frontier,
            contexts_scanned: scan.scanned,
            contexts_unlinked: scan.unlinked,
            ..GcStats::default()
        };

        while let Some(next) = cursor.next() {
            if next.number() > frontier || !next.is_committed() {
                break;
            }
            stats.nodes_released += next.clean();
            stats.records_cleaned += 1;
            *cursor = next;
        }

        self.frontier.fetch_max(frontier, Ordering::AcqRel);
        drop(cursor);

        if stats.records_cleaned > 0 {
            debug!(
                frontier = stats.frontier,
                records_cleaned = stats.records_cleaned,
                nodes_released = stats.nodes_released,
                contexts_scanned = stats.contexts_scanned,
                contexts_unlinked = stats.contexts_unlinked,
                "Reclaimed versions"
            );
            let listeners = self.listeners.read().clone();
            for listener in listeners {
                listener.on_reclamation(frontier);
            }
        }
        stats
    }

    /// Register a listener
    pub fn add_listener(&self, listener: Arc<dyn CommitListener>) {
        self.listeners.write().push(listener);
    }

    /// Unregister a listener, comparing by identity
    pub fn remove_listener(&self, listener: &Arc<dyn CommitListener>) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|l| !Arc::ptr_eq(l, listener));
        listeners.len() != before
    }

    /// Number of registered listeners
    pub fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }

    /// Sleep for `interval` or until shutdown is requested
    ///
    /// Returns `true` once shutdown was requested.
    pub fn wait_for_shutdown(&self, interval: Duration) -> bool {
        let mut shutdown = self.shutdown.lock();
        if !*shutdown {
            self.wake.wait_for(&mut shutdown, interval);
        }
        *shutdown
    }

    /// Ask a background loop to stop
    pub fn request_shutdown(&self) {
        let mut shutdown = self.shutdown.lock();
        *shutdown = true;
        self.wake.notify_all();
    }

    /// Check if shutdown was requested
    pub fn is_shutdown(&self) -> bool {
        *self.shutdown.lock()
    }
}

impl std::fmt::Debug for GarbageCollector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GarbageCollector")
            .field("proposed", &self.proposed_frontier())
            .field("frontier", &self.frontier())
            .field("listeners", &self.listener_count())
            .finish()
    }
}
