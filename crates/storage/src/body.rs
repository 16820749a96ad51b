//! Versioned value nodes
//!
//! Every cell keeps a backward chain of committed values, newest first:
//!
//! ```text
//! head ──► (v=9, "c") ──► (v=4, "b") ──► (v=0, "a") ──► ∅
//! ```
//!
//! Versions are strictly descending along the chain. A node is immutable
//! once created, except that the garbage collector may cut its `previous`
//! link when no running transaction can still need the older versions.

use crate::value::Value;
use arc_swap::ArcSwapOption;
use std::sync::Arc;

/// One committed value of a cell
pub struct VersionedNode {
    value: Value,
    version: u64,
    previous: ArcSwapOption<VersionedNode>,
}

impl VersionedNode {
    /// Create a node in front of `previous`
    pub fn new(value: Value, version: u64, previous: Option<Arc<VersionedNode>>) -> Arc<Self> {
        debug_assert!(previous.as_ref().map_or(true, |p| p.version < version));
        Arc::new(VersionedNode {
            value,
            version,
            previous: ArcSwapOption::new(previous),
        })
    }

    /// Committed value
    pub fn value(&self) -> &Value {
        &self.value
    }

    /// Commit version that produced this value
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Next older node, unless reclaimed
    pub fn previous(&self) -> Option<Arc<VersionedNode>> {
        self.previous.load_full()
    }

    /// Find the newest node with `version <= number`
    ///
    /// Returns `None` when the walk runs off a reclaimed tail before reaching
    /// a visible version.
    pub fn visible_at(self: &Arc<Self>, number: u64) -> Option<Arc<VersionedNode>> {
        let mut node = Arc::clone(self);
        while node.version > number {
            node = node.previous()?;
        }
        Some(node)
    }

    /// Find the node written exactly at `version`
    pub fn find_version(self: &Arc<Self>, version: u64) -> Option<Arc<VersionedNode>> {
        self.visible_at(version).filter(|node| node.version == version)
    }

    /// Drop every older version
    pub fn clear_previous(&self) {
        self.previous.store(None);
    }

    /// Versions currently reachable from this node, newest first
    pub fn versions(self: &Arc<Self>) -> Vec<u64> {
        let mut versions = vec![self.version];
        let mut next = self.previous();
        while let Some(node) = next {
            versions.push(node.version);
            next = node.previous();
        }
        versions
    }
}

// Long chains would otherwise drop recursively, one stack frame per version.
impl Drop for VersionedNode {
    fn drop(&mut self) {
        let mut next = self.previous.swap(None);
        while let Some(node) = next {
            match Arc::try_unwrap(node) {
                Ok(node) => next = node.previous.swap(None),
                Err(_) => break,
            }
        }
    }
}

impl std::fmt::Debug for VersionedNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VersionedNode")
            .field("version", &self.version)
            .field("has_previous", &self.previous.load().is_some())
            .finish()
    }
}
