//! Ownership records
//!
//! An ownership record says which transaction owns the in-place writes that
//! reference it, and whether that transaction is still running. Each
//! read-write transaction creates one record and points every in-place slot
//! it claims at it, so committing or aborting is a single store for all of
//! its slots.
//!
//! | `version` | Meaning |
//! |-----------|---------|
//! | `0` | owner still running |
//! | `u64::MAX` | owner aborted |
//! | other | owner committed at this version |

use once_cell::sync::Lazy;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use strata_stm_core::types::{TxId, SENTINEL_NUMBER};

const RUNNING: u64 = 0;
const ABORTED: u64 = u64::MAX;

/// Shared record meaning "nobody owns this slot, committed long ago"
///
/// Every fresh cell's in-place slot points here.
pub static DEFAULT_COMMITTED_OWNER: Lazy<Arc<OwnershipRecord>> =
    Lazy::new(|| OwnershipRecord::committed_at(SENTINEL_NUMBER));

/// Decoded state of an ownership record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrecState {
    /// Owner has not finished
    Running,
    /// Owner aborted; its writes are void
    Aborted,
    /// Owner committed at this version
    Committed(u64),
}

/// Ownership record of a write transaction
#[derive(Debug)]
pub struct OwnershipRecord {
    owner: AtomicU64,
    version: AtomicU64,
}

impl OwnershipRecord {
    /// Create a running record owned by `owner`
    pub fn new(owner: TxId) -> Arc<Self> {
        Arc::new(OwnershipRecord {
            owner: AtomicU64::new(owner.as_u64()),
            version: AtomicU64::new(RUNNING),
        })
    }

    /// Create an ownerless record committed at `version`
    pub fn committed_at(version: u64) -> Arc<Self> {
        debug_assert!(version != RUNNING && version != ABORTED);
        Arc::new(OwnershipRecord {
            owner: AtomicU64::new(TxId::NONE.as_u64()),
            version: AtomicU64::new(version),
        })
    }

    /// Current owner
    pub fn owner(&self) -> TxId {
        TxId::from_raw(self.owner.load(Ordering::Acquire))
    }

    /// Check if `tx` currently owns this record
    pub fn is_owned_by(&self, tx: TxId) -> bool {
        !tx.is_none() && self.owner() == tx
    }

    /// Current state
    pub fn state(&self) -> OrecState {
        match self.version.load(Ordering::Acquire) {
            RUNNING => OrecState::Running,
            ABORTED => OrecState::Aborted,
            version => OrecState::Committed(version),
        }
    }

    /// Check if a writer with snapshot `number` may take over slots
    /// pointing at this record
    ///
    /// Finished owners can be displaced, except an owner that committed
    /// after the writer's snapshot: that writer is not allowed to see the
    /// newer value, so it must not build on it either.
    pub fn claimable_at(&self, number: u64) -> bool {
        match self.state() {
            OrecState::Running => false,
            OrecState::Aborted => true,
            OrecState::Committed(version) => version <= number,
        }
    }

    /// Make the owner's writes permanent at `version`
    pub fn mark_committed(&self, version: u64) {
        debug_assert!(version != RUNNING && version != ABORTED);
        self.version.store(version, Ordering::Release);
    }

    /// Void the owner's writes
    pub fn mark_aborted(&self) {
        self.version.store(ABORTED, Ordering::Release);
    }

    /// Hand the record to another transaction (nested commit into parent)
    pub fn transfer_to(&self, owner: TxId) {
        self.owner.store(owner.as_u64(), Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_owner_is_committed_at_sentinel() {
        assert_eq!(DEFAULT_COMMITTED_OWNER.state(), OrecState::Committed(1));
        assert!(DEFAULT_COMMITTED_OWNER.owner().is_none());
        assert!(DEFAULT_COMMITTED_OWNER.claimable_at(1));
    }

    #[test]
    fn test_running_record_not_claimable() {
        let orec = OwnershipRecord::new(TxId::from_raw(3));
        assert_eq!(orec.state(), OrecState::Running);
        assert!(orec.is_owned_by(TxId::from_raw(3)));
        assert!(!orec.claimable_at(u64::MAX - 1));
    }

    #[test]
    fn test_committed_claimable_only_from_later_snapshots() {
        let orec = OwnershipRecord::new(TxId::from_raw(3));
        orec.mark_committed(7);
        assert_eq!(orec.state(), OrecState::Committed(7));
        assert!(!orec.claimable_at(6));
        assert!(orec.claimable_at(7));
        assert!(orec.claimable_at(8));
    }

    #[test]
    fn test_aborted_always_claimable() {
        let orec = OwnershipRecord::new(TxId::from_raw(3));
        orec.mark_aborted();
        assert_eq!(orec.state(), OrecState::Aborted);
        assert!(orec.claimable_at(1));
    }

    #[test]
    fn test_transfer_changes_owner() {
        let orec = OwnershipRecord::new(TxId::from_raw(5));
        orec.transfer_to(TxId::from_raw(2));
        assert!(orec.is_owned_by(TxId::from_raw(2)));
        assert!(!orec.is_owned_by(TxId::from_raw(5)));
        assert!(!orec.is_owned_by(TxId::NONE));
    }
}
