//! Parallel nesting

use crate::common::*;
use std::thread;

// =============================================================================
// MANAGED TASKS
// =============================================================================

#[test]
fn tasks_see_parent_writes_and_merge_in_order() {
    let base = VBox::new(0u64);
    let slots = VArray::new(6, 0u64);

    let results = atomically(|| {
        base.put(100)?;
        let tasks: Vec<_> = (0..slots.len())
            .map(|i| {
                let (base, slots) = (base.clone(), slots.clone());
                move || {
                    let value = base.get()? + i as u64;
                    slots.put(i, value)?;
                    Ok(value)
                }
            })
            .collect();
        manage_nested_parallel_tasks(tasks)
    })
    .unwrap();

    assert_eq!(results, (100..106).collect::<Vec<_>>());
    assert_eq!(slots.to_vec().unwrap(), (100..106).collect::<Vec<_>>());
}

#[test]
fn contended_tasks_still_apply_once_each() {
    let counter = VBox::new(0u64);

    atomically(|| {
        let tasks: Vec<_> = (0..12)
            .map(|_| {
                let counter = counter.clone();
                move || counter.update(|n| n + 1)
            })
            .collect();
        manage_nested_parallel_tasks(tasks)?;
        assert_eq!(counter.get()?, 12);
        Ok::<_, StmError>(())
    })
    .unwrap();

    assert_eq!(counter.get().unwrap(), 12);
}

#[test]
fn disjoint_slices_are_incremented_exactly_once_each() {
    const WORKERS: usize = 16;
    const SLICE: usize = 62;
    let cells = VArray::new(WORKERS * SLICE, 0u64);

    atomically(|| {
        let tasks: Vec<_> = (0..WORKERS)
            .map(|worker| {
                let cells = cells.clone();
                move || {
                    for _ in 0..2 {
                        for i in worker * SLICE..(worker + 1) * SLICE {
                            cells.put(i, cells.get(i)? + 1)?;
                        }
                    }
                    Ok(())
                }
            })
            .collect();
        manage_nested_parallel_tasks(tasks)
    })
    .unwrap();

    let sum: u64 = cells.to_vec().unwrap().iter().sum();
    assert_eq!(sum, (WORKERS * SLICE * 2) as u64);
}

#[test]
fn failing_task_aborts_whole_batch() {
    let cells: Vec<VBox<u64>> = (0..4).map(|_| VBox::new(0)).collect();

    let result = atomically(|| {
        let tasks: Vec<_> = cells
            .iter()
            .enumerate()
            .map(|(i, cell)| {
                let cell = cell.clone();
                move || {
                    cell.put(1)?;
                    if i == 2 {
                        return Err(StmError::Internal("task failed".to_string()));
                    }
                    Ok(())
                }
            })
            .collect();
        manage_nested_parallel_tasks(tasks)
    });

    assert_eq!(result, Err(StmError::Internal("task failed".to_string())));
    for cell in &cells {
        assert_eq!(cell.get().unwrap(), 0);
    }
}

#[test]
fn tasks_require_a_transaction() {
    let tasks = vec![|| Ok(())];
    assert_eq!(
        manage_nested_parallel_tasks(tasks),
        Err(StmError::NoActiveTransaction)
    );
}

// =============================================================================
// HAND-SPAWNED CHILDREN
// =============================================================================

#[test]
fn children_on_scoped_threads_merge_into_parent() {
    let cells: Vec<VBox<u64>> = (0..4).map(|_| VBox::new(0)).collect();

    let parent = Transaction::begin().unwrap();
    let handle = parent.handle();
    thread::scope(|s| {
        for (i, cell) in cells.iter().enumerate() {
            let handle = handle.clone();
            s.spawn(move || {
                let child = Transaction::begin_parallel_nested(&handle).unwrap();
                assert_eq!(child.kind(), TransactionKind::ParallelNested);
                assert_eq!(child.depth(), 1);
                cell.put(i as u64 + 1).unwrap();
                child.commit().unwrap();
            });
        }
    });

    let tentative: Vec<u64> = cells.iter().map(|c| c.get().unwrap()).collect();
    assert_eq!(tentative, vec![1, 2, 3, 4]);
    let other = cells[0].clone();
    assert_eq!(on_other_thread(move || other.get().unwrap()), 0);

    parent.commit().unwrap();
    let committed: Vec<u64> = cells.iter().map(|c| c.get().unwrap()).collect();
    assert_eq!(committed, vec![1, 2, 3, 4]);
}
