//! Commit queue
//!
//! The queue is the list of commit records starting at the sentinel. Its
//! global order is the serialization order of all read-write commits.
//!
//! ```text
//! sentinel(1) ─► rec(2) ─► rec(3) ─► rec(4) ─► rec(5) ─► ∅
//!  committed     committed  committed  enqueued   enqueued
//!                           ▲
//!                      most_recent (hint)
//! ```
//!
//! `most_recent` is only a hint: it always points at a committed record,
//! but possibly not the newest one. Walking forward from it and helping
//! every uncommitted successor is how threads both find the real tail and
//! keep the queue lock-free: nobody waits for a stalled committer, they
//! finish its write-back for it.

use crate::record::CommitRecord;
use arc_swap::ArcSwap;
use crossbeam_utils::CachePadded;
use std::sync::Arc;

/// Global ordering of commits
pub struct CommitQueue {
    most_recent: CachePadded<ArcSwap<CommitRecord>>,
}

impl CommitQueue {
    /// Create a queue holding only the sentinel
    pub fn new() -> Self {
        Self::with_sentinel(CommitRecord::sentinel())
    }

    /// Create a queue starting at an existing committed record
    pub fn with_sentinel(sentinel: Arc<CommitRecord>) -> Self {
        debug_assert!(sentinel.is_committed());
        CommitQueue {
            most_recent: CachePadded::new(ArcSwap::new(sentinel)),
        }
    }

    /// Most recently committed record known to be committed (hint)
    pub fn most_recent(&self) -> Arc<CommitRecord> {
        self.most_recent.load_full()
    }

    /// Newest committed record, without helping anyone
    pub fn latest_committed(&self) -> Arc<CommitRecord> {
        let start = self.most_recent();
        let mut record = Arc::clone(&start);
        while let Some(next) = record.next() {
            if !next.is_committed() {
                break;
            }
            record = next;
        }
        if record.number() > start.number() {
            self.advance_most_recent(&record);
        }
        record
    }

    /// Last record linked into the queue, committed or not
    pub fn tail(&self) -> Arc<CommitRecord> {
        let mut record = self.most_recent();
        while let Some(next) = record.next() {
            record = next;
        }
        record
    }

    /// Help commit every enqueued record, returning the tail
    ///
    /// On return every record up to the returned one is committed. Blocks
    /// while a pending record waits for its write-set.
    pub fn help_commit_all(&self) -> Arc<CommitRecord> {
        let mut record = self.most_recent();
        while let Some(next) = record.next() {
            next.help_commit();
            record = next;
        }
        self.advance_most_recent(&record);
        record
    }

    /// Help commit every record ordered before `stop`
    pub fn help_commit_before(&self, stop: &CommitRecord) {
        let mut record = self.most_recent();
        while let Some(next) = record.next() {
            if next.number() >= stop.number() {
                break;
            }
            next.help_commit();
            record = next;
        }
        self.advance_most_recent(&record);
    }

    /// Move the hint forward to `record`
    ///
    /// Never moves it backwards. Losing a race to a concurrent advance is
    /// fine: the hint only has to be some committed record.
    pub fn advance_most_recent(&self, record: &Arc<CommitRecord>) {
        debug_assert!(record.is_committed());
        loop {
            let current = self.most_recent.load_full();
            if current.number() >= record.number() {
                return;
            }
            let seen = self
                .most_recent
                .compare_and_swap(&current, Arc::clone(record));
            if Arc::ptr_eq(&*seen, &current) {
                return;
            }
        }
    }
}

impl Default for CommitQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CommitQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommitQueue")
            .field("most_recent", &self.most_recent.load().number())
            .finish()
    }
}
