//! Transaction contexts
//!
//! A context publishes the oldest commit record a thread (or a suspended
//! transaction) still reads from. The garbage collector never releases
//! versions that record may need.
//!
//! Contexts live in a lock-free list. Registration pushes at the head with a
//! CAS; only the collector unlinks nodes, and only nodes whose context was
//! dropped (the list holds weak references).

use crate::record::CommitRecord;
use arc_swap::ArcSwapOption;
use std::sync::{Arc, Weak};

/// Oldest record required by one thread or suspended transaction
#[derive(Default)]
pub struct TxContext {
    required: ArcSwapOption<CommitRecord>,
}

impl TxContext {
    /// Create an idle context
    pub fn new() -> Arc<Self> {
        Arc::new(TxContext::default())
    }

    /// Pin `record`
    pub fn require(&self, record: Arc<CommitRecord>) {
        self.required.store(Some(record));
    }

    /// Unpin
    pub fn release(&self) {
        self.required.store(None);
    }

    /// Number of the pinned record, if any
    pub fn required_number(&self) -> Option<u64> {
        self.required.load().as_ref().map(|record| record.number())
    }
}

impl std::fmt::Debug for TxContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TxContext")
            .field("required", &self.required_number())
            .finish()
    }
}

struct ContextNode {
    context: Weak<TxContext>,
    next: ArcSwapOption<ContextNode>,
}

/// Outcome of scanning every registered context
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ContextScan {
    /// Oldest pinned record number, `None` if nothing is pinned
    pub min_required: Option<u64>,
    /// Live contexts visited
    pub scanned: usize,
    /// Dead contexts unlinked
    pub unlinked: usize,
}

/// Registry of every live context
#[derive(Default)]
pub struct ContextRegistry {
    head: ArcSwapOption<ContextNode>,
}

impl ContextRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `context` to the registry
    pub fn register(&self, context: &Arc<TxContext>) {
        let node = Arc::new(ContextNode {
            context: Arc::downgrade(context),
            next: ArcSwapOption::empty(),
        });
        loop {
            let head = self.head.load_full();
            node.next.store(head.clone());
            let seen = self.head.compare_and_swap(&head, Some(Arc::clone(&node)));
            if ptr_eq_opt(&*seen, &head) {
                return;
            }
        }
    }

    /// Number of nodes in the list, dead ones included
    pub fn len(&self) -> usize {
        let mut count = 0;
        let mut cursor = self.head.load_full();
        while let Some(node) = cursor {
            count += 1;
            cursor = node.next.load_full();
        }
        count
    }

    /// Check if nothing was ever registered (or everything was unlinked)
    pub fn is_empty(&self) -> bool {
        self.head.load().is_none()
    }

    /// Find the oldest pinned record, unlinking dead contexts on the way
    ///
    /// Two passes: the first finds a candidate minimum and where it was
    /// found; the second re-reads only the contexts visited before that
    /// point, since they may have pinned something older after being read.
    ///
    /// Must not run concurrently with itself (the collector serializes it).
    pub fn scan(&self) -> ContextScan {
        let mut live: Vec<Arc<TxContext>> = Vec::new();
        let mut unlinked = 0;
        let mut min_required: Option<u64> = None;
        let mut min_index = 0;

        let mut previous: Option<Arc<ContextNode>> = None;
        let mut cursor = self.head.load_full();
        while let Some(node) = cursor {
            let next = node.next.load_full();
            match node.context.upgrade() {
                Some(context) => {
                    if let Some(number) = context.required_number() {
                        if min_required.map_or(true, |min| number < min) {
                            min_required = Some(number);
                            min_index = live.len();
                        }
                    }
                    live.push(context);
                    previous = Some(node);
                }
                None => {
                    if self.unlink(previous.as_ref(), &node, next.clone()) {
                        unlinked += 1;
                    } else {
                        previous = Some(node);
                    }
                }
            }
            cursor = next;
        }

        for context in &live[..min_index] {
            if let Some(number) = context.required_number() {
                if min_required.map_or(true, |min| number < min) {
                    min_required = Some(number);
                }
            }
        }

        ContextScan {
            min_required,
            scanned: live.len(),
            unlinked,
        }
    }

    fn unlink(
        &self,
        previous: Option<&Arc<ContextNode>>,
        node: &Arc<ContextNode>,
        next: Option<Arc<ContextNode>>,
    ) -> bool {
        match previous {
            Some(previous) => {
                // Only the collector rewrites interior links.
                previous.next.store(next);
                true
            }
            None => {
                // The head may race with a registration; skip it this round.
                let current = Some(Arc::clone(node));
                let seen = self.head.compare_and_swap(&current, next);
                ptr_eq_opt(&*seen, &current)
            }
        }
    }
}

fn ptr_eq_opt<T>(a: &Option<Arc<T>>, b: &Option<Arc<T>>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => Arc::ptr_eq(a, b),
        (None, None) => true,
        _ => false,
    }
}

// Registry lists are short-lived per node, but a burst of threads can
// leave a long chain; drop it without recursion.
impl Drop for ContextRegistry {
    fn drop(&mut self) {
        let mut next = self.head.swap(None);
        while let Some(node) = next {
            match Arc::try_unwrap(node) {
                Ok(node) => next = node.next.swap(None),
                Err(_) => break,
            }
        }
    }
}

impl std::fmt::Debug for ContextRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextRegistry")
            .field("len", &self.len())
            .finish()
    }
}
