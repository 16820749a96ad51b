//! Type-erased cell values
//!
//! Cells store values behind `Arc<dyn Any>` so one runtime serves cells of
//! every type. The typed facade (`VBox<T>`) downcasts on the way out.

use std::any::Any;
use std::sync::Arc;

/// Shared, type-erased value stored in a cell
pub type Value = Arc<dyn Any + Send + Sync>;

/// Wrap a concrete value
pub fn erase<T: Any + Send + Sync>(value: T) -> Value {
    Arc::new(value)
}

/// Borrow a value as `T`, if it has that type
pub fn downcast_ref<T: Any>(value: &Value) -> Option<&T> {
    value.as_ref().downcast_ref::<T>()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_erase_and_downcast() {
        let value = erase(41u64);
        assert_eq!(downcast_ref::<u64>(&value), Some(&41));
        assert_eq!(downcast_ref::<String>(&value), None);
    }
}
