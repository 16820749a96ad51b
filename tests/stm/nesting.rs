//! Linear nesting

use crate::common::*;
use std::sync::atomic::{AtomicU32, Ordering};

// =============================================================================
// VISIBILITY
// =============================================================================

#[test]
fn child_sees_parent_writes() {
    let cell = VBox::new(0u64);

    let outer = Transaction::begin().unwrap();
    cell.put(4).unwrap();
    let inner = Transaction::begin().unwrap();
    assert_eq!(inner.depth(), 1);
    assert_eq!(inner.kind(), TransactionKind::Nested);
    assert_eq!(cell.get().unwrap(), 4);
    inner.commit().unwrap();
    outer.commit().unwrap();
}

#[test]
fn child_commit_is_private_until_parent_commits() {
    let cell = VBox::new(0u64);

    let outer = Transaction::begin().unwrap();
    let inner = Transaction::begin().unwrap();
    cell.put(9).unwrap();
    inner.commit().unwrap();
    assert_eq!(cell.get().unwrap(), 9);

    let other = cell.clone();
    assert_eq!(on_other_thread(move || other.get().unwrap()), 0);

    outer.commit().unwrap();
    assert_eq!(cell.get().unwrap(), 9);
}

#[test]
fn aborted_child_leaves_parent_intact() {
    let a = VBox::new(1u64);
    let b = VBox::new(1u64);

    let outer = Transaction::begin().unwrap();
    a.put(2).unwrap();
    let inner = Transaction::begin().unwrap();
    a.put(3).unwrap();
    b.put(3).unwrap();
    inner.abort().unwrap();

    assert_eq!(a.get().unwrap(), 2);
    assert_eq!(b.get().unwrap(), 1);
    outer.commit().unwrap();
    assert_eq!(a.get().unwrap(), 2);
    assert_eq!(b.get().unwrap(), 1);
}

#[test]
fn parent_abort_discards_merged_children() {
    let cell = VBox::new(0u64);
    let outer = Transaction::begin().unwrap();
    atomically(|| cell.put(5)).unwrap();
    assert_eq!(cell.get().unwrap(), 5);
    outer.abort().unwrap();
    assert_eq!(cell.get().unwrap(), 0);
}

#[test]
fn deep_nesting_merges_level_by_level() {
    let cell = VBox::new(0u64);

    let result = atomically(|| {
        atomically(|| {
            atomically(|| {
                assert_eq!(stack_depth(), 3);
                cell.update(|n| n + 1)
            })?;
            cell.update(|n| n + 10)
        })?;
        cell.update(|n| n + 100)?;
        cell.get()
    });

    assert_eq!(result.unwrap(), 111);
    assert_eq!(cell.get().unwrap(), 111);
    assert_eq!(stack_depth(), 0);
}

// =============================================================================
// RESTARTS
// =============================================================================

#[test]
fn inner_conflict_reruns_inner_body_only() {
    let outer_runs = AtomicU32::new(0);
    let inner_runs = AtomicU32::new(0);
    let cell = VBox::new(0u64);

    atomically(|| {
        outer_runs.fetch_add(1, Ordering::SeqCst);
        atomically(|| {
            let run = inner_runs.fetch_add(1, Ordering::SeqCst);
            cell.put(run as u64)?;
            if run == 0 {
                return Err(StmError::CommitConflict {
                    restart_depth: 1,
                    snapshot: 0,
                });
            }
            Ok(())
        })
    })
    .unwrap();

    assert_eq!(outer_runs.load(Ordering::SeqCst), 1);
    assert_eq!(inner_runs.load(Ordering::SeqCst), 2);
    assert_eq!(cell.get().unwrap(), 1);
}

#[test]
fn stale_snapshot_restarts_from_top_level() {
    let cell = VBox::new(0u64);
    let outer_runs = AtomicU32::new(0);

    let seen = atomically(|| {
        let run = outer_runs.fetch_add(1, Ordering::SeqCst);
        if run == 0 {
            let other = cell.clone();
            on_other_thread(move || other.put(50).unwrap());
        }
        // First read happens after the concurrent commit: the committed
        // head is newer than the snapshot.
        atomically(|| cell.get())
    })
    .unwrap();

    assert_eq!(seen, 50);
    assert_eq!(outer_runs.load(Ordering::SeqCst), 2);
}

// =============================================================================
// READ-ONLY NESTING
// =============================================================================

#[test]
fn read_only_parent_allows_read_only_children() {
    let cell = VBox::new(7u64);
    let outer = Transaction::begin_read_only().unwrap();
    let inner = Transaction::begin_read_only().unwrap();
    assert_eq!(inner.kind(), TransactionKind::ReadOnly);
    assert_eq!(cell.get().unwrap(), 7);
    inner.commit().unwrap();
    outer.commit().unwrap();
}

#[test]
fn read_only_parent_rejects_read_write_child() {
    let outer = Transaction::begin_read_only().unwrap();
    assert!(matches!(
        Transaction::begin(),
        Err(StmError::Unsupported { .. })
    ));
    outer.commit().unwrap();
}

// =============================================================================
// PROPERTIES
// =============================================================================

mod properties {
    use crate::common::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn only_committed_children_reach_the_parent(
            steps in proptest::collection::vec((any::<u16>(), any::<bool>()), 1..12)
        ) {
            let cell = VBox::new(0u16);
            let mut expected = 0u16;

            let outer = Transaction::begin().unwrap();
            for (value, keep) in steps {
                let child = Transaction::begin().unwrap();
                cell.put(value).unwrap();
                if keep {
                    child.commit().unwrap();
                    expected = value;
                } else {
                    child.abort().unwrap();
                }
                prop_assert_eq!(cell.get().unwrap(), expected);
            }
            outer.commit().unwrap();
            prop_assert_eq!(cell.get().unwrap(), expected);
        }
    }
}
