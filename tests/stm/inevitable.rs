//! Inevitable transactions

use crate::common::*;

#[test]
fn inevitable_commit_is_visible() {
    let cell = VBox::new(0u64);
    let tx = Transaction::begin_inevitable().unwrap();
    assert_eq!(tx.kind(), TransactionKind::Inevitable);
    cell.put(3).unwrap();
    assert_eq!(cell.get().unwrap(), 3);
    tx.commit().unwrap();
    assert_eq!(cell.get().unwrap(), 3);
    assert!(cell.committed_versions()[0] <= Stm::global().latest_version());
}

#[test]
fn inevitable_abort_still_commits() {
    let cell = VBox::new(0u64);
    let tx = Transaction::begin_inevitable().unwrap();
    cell.put(8).unwrap();
    tx.abort().unwrap();
    assert_eq!(cell.get().unwrap(), 8);
}

#[test]
fn dropped_inevitable_transaction_commits() {
    let cell = VBox::new(0u64);
    {
        let _tx = Transaction::begin_inevitable().unwrap();
        cell.put(6).unwrap();
    }
    assert_eq!(cell.get().unwrap(), 6);
    assert_eq!(stack_depth(), 0);
}

#[test]
fn inevitable_writes_invalidate_concurrent_readers() {
    let cell = VBox::new(0u64);

    let tx = Transaction::begin().unwrap();
    let seen = cell.get().unwrap();

    let other = cell.clone();
    on_other_thread(move || {
        let inevitable = Transaction::begin_inevitable().unwrap();
        other.put(20).unwrap();
        inevitable.commit().unwrap();
    });

    cell.put(seen + 1).unwrap();
    assert!(matches!(
        tx.commit(),
        Err(StmError::CommitConflict { .. })
    ));
    assert_eq!(cell.get().unwrap(), 20);
}

#[test]
fn inevitable_transactions_do_not_nest() {
    let tx = Transaction::begin_inevitable().unwrap();
    assert!(matches!(
        Transaction::begin(),
        Err(StmError::Unsupported { .. })
    ));
    assert!(matches!(
        Transaction::begin_inevitable(),
        Err(StmError::Unsupported { .. })
    ));
    tx.commit().unwrap();

    let outer = Transaction::begin().unwrap();
    assert!(matches!(
        Transaction::begin_inevitable(),
        Err(StmError::Unsupported { .. })
    ));
    outer.commit().unwrap();
}

#[test]
fn inevitable_and_regular_writers_interleave() {
    let counter = VBox::new(0u64);
    std::thread::scope(|s| {
        for worker in 0..4 {
            let counter = counter.clone();
            s.spawn(move || {
                for _ in 0..50 {
                    if worker % 2 == 0 {
                        let tx = Transaction::begin_inevitable().unwrap();
                        counter.update(|n| n + 1).unwrap();
                        tx.commit().unwrap();
                    } else {
                        atomically(|| counter.update(|n| n + 1)).unwrap();
                    }
                }
            });
        }
    });
    assert_eq!(counter.get().unwrap(), 200);
}
