//! Block-partitioned write-sets
//!
//! A committing transaction publishes its writes as a `WriteSet` inside its
//! commit record. The entries are split into fixed-size blocks so that every
//! thread that finds the record not yet written back can help:
//!
//! ```text
//! entries:  [e0 e1 e2 | e3 e4 e5 | e6 e7]     block_size = 3
//! blocks:   [  FREE   | CLAIMED  |  DONE ]
//! ```
//!
//! Helpers start at a random block and claim free blocks with a CAS. Once
//! every block was visited, blocks still not done (their claimer may be
//! descheduled) are written again: cell write-back is idempotent, so the
//! redo is harmless and no helper ever waits on another.

use crate::body::VersionedNode;
use crate::cell::{BoxCell, CellId};
use crate::value::Value;
use once_cell::sync::OnceCell;
use rand::Rng;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::trace;

const FREE: u8 = 0;
const CLAIMED: u8 = 1;
const DONE: u8 = 2;

/// One write of a committing transaction
#[derive(Clone)]
pub struct WriteEntry {
    /// Cell written
    pub cell: Arc<BoxCell>,
    /// Value to install
    pub value: Value,
}

impl WriteEntry {
    /// Create an entry
    pub fn new(cell: Arc<BoxCell>, value: Value) -> Self {
        WriteEntry { cell, value }
    }
}

struct Block {
    state: AtomicU8,
    /// Nodes linked by the write-back, kept for reclamation
    written: OnceCell<Vec<Arc<VersionedNode>>>,
}

/// Write-set of one commit record
pub struct WriteSet {
    entries: Vec<WriteEntry>,
    block_size: usize,
    blocks: Vec<Block>,
    remaining: AtomicUsize,
}

impl WriteSet {
    /// Partition `entries` into blocks of `block_size`
    pub fn new(entries: Vec<WriteEntry>, block_size: usize) -> Self {
        let block_size = block_size.max(1);
        let count = (entries.len() + block_size - 1) / block_size;
        let blocks = (0..count)
            .map(|_| Block {
                state: AtomicU8::new(FREE),
                written: OnceCell::new(),
            })
            .collect();
        WriteSet {
            entries,
            block_size,
            blocks,
            remaining: AtomicUsize::new(count),
        }
    }

    /// Write-set with no entries
    pub fn empty() -> Self {
        Self::new(Vec::new(), 1)
    }

    /// Number of writes
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if there are no writes
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of write-back blocks
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// The writes, in insertion order
    pub fn entries(&self) -> &[WriteEntry] {
        &self.entries
    }

    /// Identities of the cells written
    pub fn cell_ids(&self) -> impl Iterator<Item = CellId> + '_ {
        self.entries.iter().map(|e| e.cell.id())
    }

    /// Check if every block has been written back
    pub fn is_written_back(&self) -> bool {
        self.remaining.load(Ordering::Acquire) == 0
    }

    /// Write back every block as commit `number`, helping other threads
    ///
    /// Returns once all blocks are done.
    pub fn help_write_back(&self, number: u64) {
        if self.is_written_back() {
            return;
        }
        let count = self.blocks.len();
        let start = rand::thread_rng().gen_range(0..count);

        for offset in 0..count {
            let index = (start + offset) % count;
            let claimed = self.blocks[index]
                .state
                .compare_exchange(FREE, CLAIMED, Ordering::AcqRel, Ordering::Acquire)
                .is_ok();
            if claimed {
                self.write_block(index, number);
            }
        }

        for offset in 0..count {
            let index = (start + offset) % count;
            if self.blocks[index].state.load(Ordering::Acquire) != DONE {
                trace!(block = index, commit_number = number, "Helping unfinished block");
                self.write_block(index, number);
            }
        }
    }

    fn write_block(&self, index: usize, number: u64) {
        let from = index * self.block_size;
        let to = (from + self.block_size).min(self.entries.len());
        let nodes: Vec<Arc<VersionedNode>> = self.entries[from..to]
            .iter()
            .filter_map(|entry| entry.cell.commit(Arc::clone(&entry.value), number))
            .collect();
        let block = &self.blocks[index];
        // Every helper links the same nodes; the first to finish records them.
        block.written.get_or_init(|| nodes);
        if block.state.swap(DONE, Ordering::AcqRel) != DONE {
            self.remaining.fetch_sub(1, Ordering::AcqRel);
        }
    }

    /// Cut the older versions behind every node this write-set installed
    ///
    /// Only valid once no running transaction reads below this commit.
    pub fn clean(&self) -> usize {
        let mut cleaned = 0;
        for block in &self.blocks {
            if let Some(nodes) = block.written.get() {
                for node in nodes {
                    node.clear_previous();
                    cleaned += 1;
                }
            }
        }
        cleaned
    }
}

impl std::fmt::Debug for WriteSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriteSet")
            .field("len", &self.entries.len())
            .field("blocks", &self.blocks.len())
            .field("remaining", &self.remaining.load(Ordering::Relaxed))
            .finish()
    }
}
