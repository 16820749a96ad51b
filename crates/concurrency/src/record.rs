//! Commit records
//!
//! Each committing transaction appends one record to the commit queue. A
//! record is immutable apart from three one-way transitions:
//!
//! - `next`: set once, by the CAS that enqueues the following record
//! - `committed`: flipped once every block of the write-set is written back
//! - `write_set`: detached by the garbage collector after the record is
//!   older than every running transaction
//!
//! Inevitable transactions enqueue a *pending* record before they execute.
//! Its write-set is published only when the transaction finishes, and any
//! thread that needs the write-set (to validate or to help write back)
//! blocks on the publication latch until then.

use arc_swap::ArcSwapOption;
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use strata_stm_core::types::SENTINEL_NUMBER;
use strata_stm_storage::WriteSet;

/// Latch guarding the write-set of a pending record
struct Publication {
    published: Mutex<bool>,
    ready: Condvar,
}

/// One entry of the commit queue
pub struct CommitRecord {
    number: u64,
    write_set: ArcSwapOption<WriteSet>,
    next: ArcSwapOption<CommitRecord>,
    committed: AtomicBool,
    cleaned: AtomicBool,
    publication: Option<Publication>,
}

impl CommitRecord {
    /// First record of every queue: committed, empty
    pub fn sentinel() -> Arc<Self> {
        let record = Self::new(SENTINEL_NUMBER, Arc::new(WriteSet::empty()));
        record.committed.store(true, Ordering::Release);
        record
    }

    /// Record for a transaction that already knows its write-set
    pub fn new(number: u64, write_set: Arc<WriteSet>) -> Arc<Self> {
        Arc::new(CommitRecord {
            number,
            write_set: ArcSwapOption::new(Some(write_set)),
            next: ArcSwapOption::empty(),
            committed: AtomicBool::new(false),
            cleaned: AtomicBool::new(false),
            publication: None,
        })
    }

    /// Record whose write-set will be published later
    pub fn pending(number: u64) -> Arc<Self> {
        Arc::new(CommitRecord {
            number,
            write_set: ArcSwapOption::empty(),
            next: ArcSwapOption::empty(),
            committed: AtomicBool::new(false),
            cleaned: AtomicBool::new(false),
            publication: Some(Publication {
                published: Mutex::new(false),
                ready: Condvar::new(),
            }),
        })
    }

    /// Transaction number of this record
    pub fn number(&self) -> u64 {
        self.number
    }

    /// Check if every write of this record is visible
    pub fn is_committed(&self) -> bool {
        self.committed.load(Ordering::Acquire)
    }

    /// Check if the collector already released this record's versions
    pub fn is_cleaned(&self) -> bool {
        self.cleaned.load(Ordering::Acquire)
    }

    /// Check if this record waits for a write-set publication
    pub fn is_pending(&self) -> bool {
        match &self.publication {
            Some(publication) => !*publication.published.lock(),
            None => false,
        }
    }

    /// Successor in the queue
    pub fn next(&self) -> Option<Arc<CommitRecord>> {
        self.next.load_full()
    }

    /// Link `record` as successor
    ///
    /// Fails with the record that won the race if a successor exists.
    pub fn try_link_next(&self, record: Arc<CommitRecord>) -> Result<(), Arc<CommitRecord>> {
        debug_assert_eq!(record.number, self.number + 1);
        let none: Option<Arc<CommitRecord>> = None;
        let previous = self.next.compare_and_swap(&none, Some(record));
        match &*previous {
            None => Ok(()),
            Some(winner) => Err(Arc::clone(winner)),
        }
    }

    /// Publish the write-set of a pending record and wake waiters
    pub fn publish(&self, write_set: Arc<WriteSet>) {
        self.write_set.store(Some(write_set));
        if let Some(publication) = &self.publication {
            let mut published = publication.published.lock();
            *published = true;
            publication.ready.notify_all();
        }
    }

    /// Write-set, waiting for publication if the record is pending
    ///
    /// `None` once the collector detached it.
    pub fn write_set(&self) -> Option<Arc<WriteSet>> {
        if let Some(publication) = &self.publication {
            let mut published = publication.published.lock();
            while !*published {
                publication.ready.wait(&mut published);
            }
        }
        self.write_set.load_full()
    }

    /// Finish this record's write-back and mark it committed
    ///
    /// Every earlier record must already be committed.
    pub fn help_commit(&self) {
        if self.is_committed() {
            return;
        }
        if let Some(write_set) = self.write_set() {
            write_set.help_write_back(self.number);
        }
        self.committed.store(true, Ordering::Release);
    }

    /// Release the versions this record superseded
    ///
    /// Returns the number of version nodes whose tails were cut. Does
    /// nothing for uncommitted or already cleaned records.
    pub fn clean(&self) -> usize {
        if !self.is_committed() || self.cleaned.swap(true, Ordering::AcqRel) {
            return 0;
        }
        match self.write_set.swap(None) {
            Some(write_set) => write_set.clean(),
            None => 0,
        }
    }
}

// The queue is a singly linked list that can grow without bound between
// collections; drop it iteratively.
impl Drop for CommitRecord {
    fn drop(&mut self) {
        let mut next = self.next.swap(None);
        while let Some(record) = next {
            match Arc::try_unwrap(record) {
                Ok(record) => next = record.next.swap(None),
                Err(_) => break,
            }
        }
    }
}

impl std::fmt::Debug for CommitRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommitRecord")
            .field("number", &self.number)
            .field("committed", &self.is_committed())
            .field("cleaned", &self.is_cleaned())
            .field("pending", &self.is_pending())
            .finish()
    }
}
