//! In-place write slots
//!
//! The fast write path: instead of recording a write in a private map, a
//! transaction swaps a fresh slot pointing at its own ownership record into
//! the cell and keeps the tentative value there. The displaced slot is kept
//! as `next` so an abort can put it back.

use crate::orec::{OwnershipRecord, DEFAULT_COMMITTED_OWNER};
use crate::value::Value;
use arc_swap::ArcSwapOption;
use parking_lot::Mutex;
use std::sync::Arc;

/// Tentative contents of a slot
#[derive(Clone, Default)]
pub struct SlotValue {
    /// Tentative value, `None` once released
    pub value: Option<Value>,
    /// Nested commit number tagging the value inside its owner's tree
    pub nested_version: u64,
}

/// In-place write slot of a cell
pub struct InplaceWrite {
    orec: Arc<OwnershipRecord>,
    temp: Mutex<SlotValue>,
    next: ArcSwapOption<InplaceWrite>,
}

impl InplaceWrite {
    /// Slot owned by nobody, as found in a fresh cell
    pub fn vacant() -> Arc<Self> {
        Arc::new(InplaceWrite {
            orec: Arc::clone(&DEFAULT_COMMITTED_OWNER),
            temp: Mutex::new(SlotValue::default()),
            next: ArcSwapOption::empty(),
        })
    }

    /// Slot claimed by `orec`, displacing `displaced`
    pub fn claimed(
        orec: Arc<OwnershipRecord>,
        value: Value,
        nested_version: u64,
        displaced: Arc<InplaceWrite>,
    ) -> Arc<Self> {
        Arc::new(InplaceWrite {
            orec,
            temp: Mutex::new(SlotValue {
                value: Some(value),
                nested_version,
            }),
            next: ArcSwapOption::new(Some(displaced)),
        })
    }

    /// Ownership record of this slot
    pub fn orec(&self) -> &Arc<OwnershipRecord> {
        &self.orec
    }

    /// Tentative value and its nested version
    pub fn load(&self) -> Option<(Value, u64)> {
        let temp = self.temp.lock();
        temp.value.clone().map(|v| (v, temp.nested_version))
    }

    /// Overwrite the tentative value
    pub fn store(&self, value: Value, nested_version: u64) {
        let mut temp = self.temp.lock();
        temp.value = Some(value);
        temp.nested_version = nested_version;
    }

    /// Retag the tentative value (nested merge)
    pub fn set_nested_version(&self, nested_version: u64) {
        self.temp.lock().nested_version = nested_version;
    }

    /// Drop the tentative value once the owner finished
    pub fn release(&self) {
        self.temp.lock().value = None;
    }

    /// Slot this one displaced
    pub fn displaced(&self) -> Option<Arc<InplaceWrite>> {
        self.next.load_full()
    }

    /// Cut the link to the slot this one displaced
    ///
    /// Called on a slot once it has itself been displaced by a new owner:
    /// only the newest slot ever needs to be restored.
    pub fn forget_displaced(&self) {
        self.next.store(None);
    }
}

impl std::fmt::Debug for InplaceWrite {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let temp = self.temp.lock();
        f.debug_struct("InplaceWrite")
            .field("owner", &self.orec.owner())
            .field("state", &self.orec.state())
            .field("has_value", &temp.value.is_some())
            .field("nested_version", &temp.nested_version)
            .finish()
    }
}
