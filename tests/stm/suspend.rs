//! Moving transactions between threads

use crate::common::*;

#[test]
fn resume_on_another_thread_and_commit() {
    let cell = VBox::new(1u64);

    let tx = Transaction::begin().unwrap();
    cell.put(2).unwrap();
    let suspended = tx.suspend().unwrap();
    assert_eq!(stack_depth(), 0);
    assert_eq!(cell.get().unwrap(), 1);

    let other = cell.clone();
    on_other_thread(move || {
        let tx = suspended.resume().unwrap();
        assert_eq!(other.get().unwrap(), 2);
        other.put(3).unwrap();
        tx.commit().unwrap();
    });

    assert_eq!(cell.get().unwrap(), 3);
}

#[test]
fn suspended_snapshot_is_preserved() {
    let cell = VBox::new(1u64);

    let reader = Transaction::begin_read_only().unwrap();
    let number = reader.number();
    let suspended = reader.suspend().unwrap();

    cell.put(2).unwrap();
    cell.put(3).unwrap();
    Stm::global().collect_garbage();

    let seen = on_other_thread(move || {
        let reader = suspended.resume().unwrap();
        assert_eq!(reader.number(), number);
        let seen = cell.get().unwrap();
        reader.commit().unwrap();
        seen
    });
    assert_eq!(seen, 1);
}

#[test]
fn dropping_a_suspension_aborts() {
    let cell = VBox::new(1u64);
    let tx = Transaction::begin().unwrap();
    let id = tx.id();
    cell.put(2).unwrap();
    let suspended = tx.suspend().unwrap();
    assert_eq!(suspended.id(), Some(id));
    drop(suspended);
    assert_eq!(cell.get().unwrap(), 1);
}

#[test]
fn nested_transactions_cannot_suspend() {
    let outer = Transaction::begin().unwrap();
    let inner = Transaction::begin().unwrap();
    assert!(matches!(inner.suspend(), Err(StmError::Unsupported { .. })));
    assert_eq!(stack_depth(), 1);
    outer.commit().unwrap();
}

#[test]
fn slot_holding_transactions_cannot_suspend() {
    let cell = VBox::new(0u64);
    let tx = Transaction::begin_inevitable().unwrap();
    cell.put(4).unwrap();
    assert!(matches!(
        tx.suspend(),
        Err(StmError::Unsupported { kind: "inevitable", .. })
    ));
    assert_eq!(stack_depth(), 0);
    // The rejected handle committed, so the reserved slot is free again.
    assert_eq!(cell.get().unwrap(), 4);

    let unrelated = VBox::new(0u64);
    let other = unrelated.clone();
    let (done, finished) = std::sync::mpsc::channel();
    std::thread::spawn(move || {
        other.put(5).unwrap();
        let _ = done.send(());
    });
    finished
        .recv_timeout(std::time::Duration::from_secs(5))
        .expect("writer on another thread finishes");
    assert_eq!(unrelated.get().unwrap(), 5);

    let tx = Transaction::begin_unsafe_single_threaded().unwrap();
    assert!(matches!(
        tx.suspend(),
        Err(StmError::Unsupported { kind: "unsafe-single-threaded", .. })
    ));
    assert_eq!(stack_depth(), 0);
}

#[test]
fn checkpoint_commits_and_continues() {
    let cell = VBox::new(0u64);
    let mut tx = Transaction::begin().unwrap();
    let first = tx.id();

    cell.put(1).unwrap();
    tx.checkpoint().unwrap();
    assert_ne!(tx.id(), first);

    let other = cell.clone();
    assert_eq!(on_other_thread(move || other.get().unwrap()), 1);

    cell.put(2).unwrap();
    tx.abort().unwrap();
    assert_eq!(cell.get().unwrap(), 1);
}
