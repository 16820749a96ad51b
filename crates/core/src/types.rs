//! Core types shared by every layer of the transactional memory
//!
//! This module defines the fundamental vocabulary of the system:
//! - [`TxId`]: identity of one transaction instance (ownership-record owner)
//! - [`TransactionKind`]: the variant taxonomy and its [`Capabilities`]
//! - [`TransactionStatus`]: the commit life-cycle
//! - version number constants shared by cells and the commit queue

use serde::{Deserialize, Serialize};

/// Commit version assigned to the initial body of every cell.
///
/// Lower than any commit number, so an initial value is visible to every
/// snapshot.
pub const INITIAL_VERSION: u64 = 0;

/// Transaction number of the commit-queue sentinel.
///
/// The sentinel counts as committed; the first real commit receives
/// `SENTINEL_NUMBER + 1`.
pub const SENTINEL_NUMBER: u64 = 1;

/// Unique identity of a transaction instance
///
/// Ids are never reused within a process. The value `0` is reserved for
/// "no owner" and is never handed out.
///
/// # Examples
///
/// ```
/// use strata_stm_core::types::TxId;
///
/// let id = TxId::from_raw(7);
/// assert_eq!(id.as_u64(), 7);
/// assert!(!id.is_none());
/// assert!(TxId::NONE.is_none());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TxId(u64);

impl TxId {
    /// Placeholder for "owned by nobody".
    pub const NONE: TxId = TxId(0);

    /// Wrap a raw id
    pub const fn from_raw(raw: u64) -> Self {
        TxId(raw)
    }

    /// Raw numeric value
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Check if this is the reserved "no owner" id
    pub const fn is_none(self) -> bool {
        self.0 == 0
    }
}

impl std::fmt::Display for TxId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "tx#{}", self.0)
    }
}

/// Capability set of a transaction variant
///
/// Replaces a deep inheritance chain: each variant is described by the
/// behaviours it supports, and the runtime dispatches on them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    /// Writes are rejected with `WriteOnReadOnly`
    pub is_read_only: bool,
    /// Transactions may be started inside this one
    pub supports_nesting: bool,
    /// The transaction can be aborted by a conflict
    pub can_abort: bool,
    /// The transaction allocates its own ownership record for in-place writes
    pub requires_own_record: bool,
}

/// Transaction variant taxonomy
///
/// | Variant | Isolation | Can abort |
/// |---------|-----------|-----------|
/// | `TopLevel` | validate + enqueue + write-back | yes |
/// | `ReadOnly` | pinned snapshot, no write-set | no |
/// | `Nested` | merges into its parent in memory | yes (own scope) |
/// | `ParallelNested` | sibling-isolated merge into its parent | yes (own scope) |
/// | `Inevitable` | claims its commit slot up front | no (forced commit) |
/// | `UnsafeSingleThreaded` | assumes no concurrency at all | no (forced commit) |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransactionKind {
    /// Top-level read-write transaction
    TopLevel,
    /// Read-only transaction (top-level or nested inside a read-only parent)
    ReadOnly,
    /// Linear nested transaction running on its parent's thread
    Nested,
    /// Nested transaction running concurrently with its siblings
    ParallelNested,
    /// Irrevocable transaction that always commits
    Inevitable,
    /// Unsynchronized transaction for single-threaded phases
    UnsafeSingleThreaded,
}

impl TransactionKind {
    /// Capability set of this variant
    pub const fn capabilities(self) -> Capabilities {
        match self {
            TransactionKind::TopLevel | TransactionKind::Nested | TransactionKind::ParallelNested => {
                Capabilities {
                    is_read_only: false,
                    supports_nesting: true,
                    can_abort: true,
                    requires_own_record: true,
                }
            }
            TransactionKind::ReadOnly => Capabilities {
                is_read_only: true,
                supports_nesting: true,
                can_abort: false,
                requires_own_record: false,
            },
            TransactionKind::Inevitable | TransactionKind::UnsafeSingleThreaded => Capabilities {
                is_read_only: false,
                supports_nesting: false,
                can_abort: false,
                requires_own_record: false,
            },
        }
    }

    /// Check if this variant is nested under a parent
    pub const fn is_nested(self) -> bool {
        matches!(self, TransactionKind::Nested | TransactionKind::ParallelNested)
    }

    /// Stable lowercase name, used in diagnostics
    pub const fn name(self) -> &'static str {
        match self {
            TransactionKind::TopLevel => "top-level",
            TransactionKind::ReadOnly => "read-only",
            TransactionKind::Nested => "nested",
            TransactionKind::ParallelNested => "parallel-nested",
            TransactionKind::Inevitable => "inevitable",
            TransactionKind::UnsafeSingleThreaded => "unsafe-single-threaded",
        }
    }
}

impl std::fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Commit life-cycle of a transaction
///
/// ```text
/// Running → Validating → Enqueued → Committed
///    └────────────┴──────────────→ Aborted
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TransactionStatus {
    /// Executing its body
    Running = 0,
    /// Checking its read-set against newer commits
    Validating = 1,
    /// Its commit record is linked into the queue
    Enqueued = 2,
    /// Its writes are visible
    Committed = 3,
    /// Its writes were discarded
    Aborted = 4,
}

impl TransactionStatus {
    /// Decode the `repr(u8)` form stored in atomics
    pub const fn from_u8(raw: u8) -> Self {
        match raw {
            0 => TransactionStatus::Running,
            1 => TransactionStatus::Validating,
            2 => TransactionStatus::Enqueued,
            3 => TransactionStatus::Committed,
            _ => TransactionStatus::Aborted,
        }
    }

    /// Check if the transaction has finished either way
    pub const fn is_finished(self) -> bool {
        matches!(self, TransactionStatus::Committed | TransactionStatus::Aborted)
    }
}

impl std::fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            TransactionStatus::Running => "running",
            TransactionStatus::Validating => "validating",
            TransactionStatus::Enqueued => "enqueued",
            TransactionStatus::Committed => "committed",
            TransactionStatus::Aborted => "aborted",
        };
        f.write_str(name)
    }
}
