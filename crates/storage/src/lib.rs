//! Storage layer for strata-stm
//!
//! This crate implements the shared mutable structures every transaction
//! contends on:
//! - VersionedNode: immutable node of a cell's backward version chain
//! - OwnershipRecord: who owns an in-place write, and whether it committed
//! - InplaceWrite: the optimistic in-place write slot of a cell
//! - BoxCell: a versioned cell (version chain head + in-place slot)
//! - WriteSet: block-partitioned write-set that any thread can help write back

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod body;
pub mod cell;
pub mod inplace;
pub mod orec;
pub mod value;
pub mod write_set;

pub use body::VersionedNode;
pub use cell::{BoxCell, CellId};
pub use inplace::{InplaceWrite, SlotValue};
pub use orec::{OrecState, OwnershipRecord, DEFAULT_COMMITTED_OWNER};
pub use value::Value;
pub use write_set::{WriteEntry, WriteSet};
