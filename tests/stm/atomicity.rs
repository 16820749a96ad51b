//! All-or-nothing commits and aborts

use crate::common::*;
use std::sync::atomic::{AtomicU32, Ordering};

// =============================================================================
// COMMIT
// =============================================================================

#[test]
fn commit_publishes_every_write_at_once() {
    let cells: Vec<VBox<u64>> = (0..25).map(|_| VBox::new(0)).collect();

    atomically(|| {
        for (i, cell) in cells.iter().enumerate() {
            cell.put(i as u64 + 1)?;
        }
        Ok::<_, StmError>(())
    })
    .unwrap();

    let heads: Vec<u64> = cells.iter().map(|c| c.committed_versions()[0]).collect();
    assert!(heads.windows(2).all(|w| w[0] == w[1]), "one commit number");
    let values: Vec<u64> = cells.iter().map(|c| c.get().unwrap()).collect();
    assert_eq!(values, (1..=25).collect::<Vec<_>>());
}

#[test]
fn varray_writes_commit_together() {
    let array = VArray::from_vec(vec![0u32; 8]);
    atomically(|| {
        for i in 0..array.len() {
            array.put(i, i as u32 * 2)?;
        }
        Ok::<_, StmError>(())
    })
    .unwrap();
    assert_eq!(array.to_vec().unwrap(), vec![0, 2, 4, 6, 8, 10, 12, 14]);
}

#[test]
fn stm_handle_runs_transactions() {
    let stm = Stm::global();
    let cell = VBox::new(3u64);
    let before = stm.latest_version();
    let value = stm
        .atomically(|| {
            cell.update(|n| n * 3)?;
            Ok(cell.get()?)
        })
        .unwrap();
    assert_eq!(value, 9);
    assert!(stm.latest_version() > before);
    assert_eq!(stm.atomically_read_only(|| Ok(cell.get()?)).unwrap(), 9);
}

// =============================================================================
// ABORT
// =============================================================================

#[test]
fn business_error_discards_writes() {
    let from = VBox::new(10u64);
    let to = VBox::new(0u64);

    let result = atomically(|| {
        from.put(0)?;
        to.put(10)?;
        Err::<(), Error>(Error::Internal("rejected by caller".to_string()))
    });

    assert!(matches!(result, Err(Error::Internal(_))));
    assert_eq!(from.get().unwrap(), 10);
    assert_eq!(to.get().unwrap(), 0);
    assert_eq!(stack_depth(), 0);
}

#[test]
fn explicit_abort_and_drop_discard_writes() {
    let cell = VBox::new(1u64);

    let tx = Transaction::begin().unwrap();
    cell.put(2).unwrap();
    tx.abort().unwrap();
    assert_eq!(cell.get().unwrap(), 1);

    {
        let _tx = Transaction::begin().unwrap();
        cell.put(3).unwrap();
    }
    assert_eq!(cell.get().unwrap(), 1);
    assert_eq!(stack_depth(), 0);
}

#[test]
fn conflicts_are_retried_transparently() {
    let cell = VBox::new(0u64);
    let runs = AtomicU32::new(0);

    let result = atomically(|| {
        let run = runs.fetch_add(1, Ordering::SeqCst);
        let seen = cell.get()?;
        if run == 0 {
            let other = cell.clone();
            on_other_thread(move || other.put(100).unwrap());
        }
        cell.put(seen + 1)?;
        Ok::<_, Error>(seen)
    });

    assert_eq!(result.unwrap(), 100);
    assert_eq!(runs.load(Ordering::SeqCst), 2);
    assert_eq!(cell.get().unwrap(), 101);
}

#[test]
fn retry_budget_surfaces_conflict() {
    let runs = AtomicU32::new(0);
    let options =
        TxOptions::new().with_policy(RetryPolicy::default().with_max_attempts(2).no_backoff());

    let result = atomically_with(options, || {
        runs.fetch_add(1, Ordering::SeqCst);
        Err::<(), Error>(Error::from(StmError::CommitConflict {
            restart_depth: 0,
            snapshot: 0,
        }))
    });

    let err = result.unwrap_err();
    assert!(err.is_conflict());
    assert!(err.is_retryable());
    assert_eq!(runs.load(Ordering::SeqCst), 2);
}

// =============================================================================
// MISUSE
// =============================================================================

#[test]
fn writes_in_read_only_transactions_fail() {
    let cell = VBox::new(1u64);
    let result = atomically_read_only(|| cell.put(2).map_err(Error::from));
    let err = result.unwrap_err();
    assert!(err.is_misuse());
    assert_eq!(err, Error::Misuse(StmError::WriteOnReadOnly));
    assert_eq!(cell.get().unwrap(), 1);
}

#[test]
fn out_of_bounds_index_is_reported() {
    let array = VArray::new(2, 0u8);
    assert_eq!(
        array.get(5),
        Err(StmError::IndexOutOfBounds { index: 5, len: 2 })
    );
}

#[test]
fn finishing_a_shadowed_transaction_is_rejected() {
    let cell = VBox::new(0u64);
    let outer = Transaction::begin().unwrap();
    let inner = Transaction::begin().unwrap();
    cell.put(1).unwrap();

    assert_eq!(outer.commit(), Err(StmError::NotCurrent));
    assert_eq!(inner.commit(), Err(StmError::NoActiveTransaction));
    assert_eq!(stack_depth(), 0);
    assert_eq!(cell.get().unwrap(), 0);
}
