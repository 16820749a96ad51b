//! Snapshot isolation and commit-time validation

use crate::common::*;
use std::thread;

// =============================================================================
// SNAPSHOTS
// =============================================================================

#[test]
fn snapshot_ignores_later_commits() {
    init_tracing();
    let cell = VBox::new(1u64);

    let reader = Transaction::begin_read_only().unwrap();
    assert_eq!(cell.get().unwrap(), 1);

    let writer_cell = cell.clone();
    on_other_thread(move || writer_cell.put(2).unwrap());

    assert_eq!(cell.get().unwrap(), 1, "snapshot must not move");
    reader.commit().unwrap();
    assert_eq!(cell.get().unwrap(), 2);
}

#[test]
fn first_read_after_begin_uses_snapshot() {
    let cell = VBox::new(10u64);

    let reader = Transaction::begin_read_only().unwrap();
    let writer_cell = cell.clone();
    on_other_thread(move || writer_cell.put(11).unwrap());

    // Never read before the concurrent commit, still old.
    assert_eq!(cell.get().unwrap(), 10);
    reader.commit().unwrap();
}

#[test]
fn read_only_transaction_numbers_follow_commits() {
    let cell = VBox::new(0u64);
    cell.put(1).unwrap();
    let first = Transaction::begin_read_only().unwrap();
    let seen = first.number();
    first.commit().unwrap();
    assert!(seen >= cell.committed_versions()[0]);
}

// =============================================================================
// VALIDATION
// =============================================================================

#[test]
fn stale_read_fails_commit() {
    let x = VBox::new(0u64);
    let y = VBox::new(0u64);

    let tx = Transaction::begin().unwrap();
    let seen = x.get().unwrap() + y.get().unwrap();
    x.put(seen + 1).unwrap();

    let (x2, y2) = (x.clone(), y.clone());
    on_other_thread(move || {
        atomically(|| {
            let sum = x2.get()? + y2.get()?;
            y2.put(sum + 1)
        })
        .unwrap()
    });

    assert!(matches!(
        tx.commit(),
        Err(StmError::CommitConflict {
            restart_depth: 0,
            ..
        })
    ));
    assert_eq!(x.get().unwrap(), 0, "failed commit must not leak writes");
    assert_eq!(y.get().unwrap(), 1);
}

#[test]
fn blind_writes_do_not_conflict() {
    let x = VBox::new(0u64);

    let tx = Transaction::begin().unwrap();
    x.put(5).unwrap();

    let x2 = x.clone();
    on_other_thread(move || x2.put(7).unwrap());

    tx.commit().unwrap();
    assert_eq!(x.get().unwrap(), 5, "later commit wins");
}

#[test]
fn tentative_writes_are_invisible_to_other_threads() {
    let cell = VBox::new(String::from("before"));

    let tx = Transaction::begin().unwrap();
    cell.put(String::from("tentative")).unwrap();

    let other = cell.clone();
    let seen = on_other_thread(move || other.get().unwrap());
    assert_eq!(seen, "before");

    tx.commit().unwrap();
    assert_eq!(cell.get().unwrap(), "tentative");
}

// =============================================================================
// CONCURRENT WORKLOADS
// =============================================================================

#[test]
fn concurrent_increments_are_not_lost() {
    let counter = VBox::new(0u64);
    thread::scope(|s| {
        for _ in 0..8 {
            let counter = counter.clone();
            s.spawn(move || {
                for _ in 0..100 {
                    atomically(|| counter.update(|n| n + 1)).unwrap();
                }
            });
        }
    });
    assert_eq!(counter.get().unwrap(), 800);
}

#[test]
fn bank_total_is_invariant() {
    use rand::Rng;

    let bank = accounts(6, 100);
    thread::scope(|s| {
        for _ in 0..4 {
            let bank = &bank;
            s.spawn(move || {
                let mut rng = rand::thread_rng();
                for _ in 0..200 {
                    let from = rng.gen_range(0..bank.len());
                    let to = rng.gen_range(0..bank.len());
                    if from != to {
                        transfer(&bank[from], &bank[to], rng.gen_range(1..=20)).unwrap();
                    }
                }
            });
        }
        for _ in 0..2 {
            let bank = &bank;
            s.spawn(move || {
                for _ in 0..100 {
                    assert_eq!(total(bank), 600);
                }
            });
        }
    });
    assert_eq!(total(&bank), 600);
}
