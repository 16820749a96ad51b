//! Garbage Collection Integration Tests
//!
//! Installs the runtime with the background collector disabled and drives
//! reclamation by hand. Every test holds the serial lock: commit numbers and
//! the reclamation frontier are process-wide.
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test --test gc
//! ```

#[path = "../common/mod.rs"]
mod common;

use common::*;
use strata_stm::CommitListener;
use parking_lot::MutexGuard;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

static STM: OnceLock<Stm> = OnceLock::new();

fn setup() -> (MutexGuard<'static, ()>, Stm) {
    init_tracing();
    let guard = serial();
    let stm = *STM.get_or_init(|| {
        Stm::builder()
            .disable_gc()
            .write_set_block_size(4)
            .install()
            .expect("first install in this process")
    });
    (guard, stm)
}

#[derive(Default)]
struct RecordingListener {
    calls: AtomicUsize,
    last_frontier: AtomicU64,
}

impl CommitListener for RecordingListener {
    fn on_reclamation(&self, frontier: u64) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.last_frontier.store(frontier, Ordering::SeqCst);
    }
}

// =============================================================================
// INSTALLATION
// =============================================================================

#[test]
fn installed_configuration_is_active() {
    let (_guard, stm) = setup();
    assert!(!stm.config().gc.enabled);
    assert_eq!(stm.config().write_set_block_size, 4);
    assert!(!stm.is_background_gc_running());
}

#[test]
fn second_install_is_rejected() {
    let (_guard, _stm) = setup();
    let err = Stm::builder().install().unwrap_err();
    assert_eq!(err, Error::Config(StmError::AlreadyInstalled));
}

// =============================================================================
// RECLAMATION
// =============================================================================

#[test]
fn versions_accumulate_until_collected() {
    let (_guard, stm) = setup();
    let cell = VBox::new(0u64);
    for n in 1..=3 {
        cell.put(n).unwrap();
    }
    let versions = cell.committed_versions();
    assert_eq!(versions.len(), 4);
    assert_eq!(versions[3], 0);

    let stats = stm.collect_garbage();
    assert!(stats.records_cleaned >= 3);
    assert_eq!(stats.frontier, stm.latest_version());
    assert_eq!(cell.committed_versions(), vec![versions[0]]);
    assert_eq!(cell.get().unwrap(), 3);
}

#[test]
fn wide_write_sets_are_fully_reclaimed() {
    let (_guard, stm) = setup();
    let array = VArray::new(10, 0u32);
    for round in 1..=2 {
        atomically(|| {
            for i in 0..array.len() {
                array.put(i, round)?;
            }
            Ok::<_, StmError>(())
        })
        .unwrap();
    }

    let stats = stm.collect_garbage();
    assert!(stats.nodes_released >= 20);
    assert_eq!(array.to_vec().unwrap(), vec![2; 10]);
}

#[test]
fn pinned_snapshot_survives_collection() {
    let (_guard, stm) = setup();
    let cell = VBox::new(1u64);
    cell.put(2).unwrap();

    let reader = Transaction::begin_read_only().unwrap();
    assert_eq!(cell.get().unwrap(), 2);

    let writer = cell.clone();
    on_other_thread(move || {
        writer.put(3).unwrap();
        writer.put(4).unwrap();
    });

    let stats = stm.collect_garbage();
    assert_eq!(stats.frontier, reader.number());
    assert!(cell.committed_versions().len() >= 3);
    assert_eq!(cell.get().unwrap(), 2);
    reader.commit().unwrap();

    stm.collect_garbage();
    assert_eq!(cell.committed_versions().len(), 1);
    assert_eq!(cell.get().unwrap(), 4);
}

#[test]
fn collection_without_new_commits_is_a_no_op() {
    let (_guard, stm) = setup();
    VBox::new(0u8).put(1).unwrap();
    stm.collect_garbage();
    let stats = stm.collect_garbage();
    assert_eq!(stats.records_cleaned, 0);
    assert_eq!(stats.nodes_released, 0);
}

// =============================================================================
// LISTENERS
// =============================================================================

#[test]
fn listeners_observe_reclamation() {
    let (_guard, stm) = setup();
    let recorder = Arc::new(RecordingListener::default());
    let listener: Arc<dyn CommitListener> = recorder.clone();
    stm.add_commit_listener(Arc::clone(&listener));

    VBox::new(0u64).put(1).unwrap();
    stm.collect_garbage();
    assert_eq!(recorder.calls.load(Ordering::SeqCst), 1);
    assert_eq!(
        recorder.last_frontier.load(Ordering::SeqCst),
        stm.latest_version()
    );

    // Nothing new to release
    stm.collect_garbage();
    assert_eq!(recorder.calls.load(Ordering::SeqCst), 1);

    assert!(stm.remove_commit_listener(&listener));
    VBox::new(0u64).put(1).unwrap();
    stm.collect_garbage();
    assert_eq!(recorder.calls.load(Ordering::SeqCst), 1);
    assert!(!stm.remove_commit_listener(&listener));
}

// =============================================================================
// UNSAFE SINGLE-THREADED
// =============================================================================

#[test]
fn unsafe_bulk_load_commits_once() {
    let (_guard, stm) = setup();
    let array = VArray::new(32, 0u64);
    let before = stm.latest_version();

    let tx = Transaction::begin_unsafe_single_threaded().unwrap();
    assert_eq!(tx.kind(), TransactionKind::UnsafeSingleThreaded);
    for i in 0..array.len() {
        array.put(i, i as u64 * i as u64).unwrap();
    }
    assert_eq!(array.get(5).unwrap(), 25);
    tx.commit().unwrap();

    assert_eq!(stm.latest_version(), before + 1);
    assert_eq!(array.get(31).unwrap(), 961);
    stm.collect_garbage();
    assert_eq!(array.get(31).unwrap(), 961);
}

#[test]
fn unsafe_commit_next_to_a_concurrent_writer_is_unsupported() {
    let (_guard, _stm) = setup();
    let mine = VBox::new(0u64);
    let theirs = VBox::new(0u64);

    let tx = Transaction::begin_unsafe_single_threaded().unwrap();
    mine.put(1).unwrap();
    on_other_thread(move || theirs.put(1).unwrap());

    assert!(matches!(
        tx.commit(),
        Err(StmError::Unsupported { .. })
    ));
}

#[test]
fn unsafe_transaction_without_writes_always_commits() {
    let (_guard, _stm) = setup();
    let cell = VBox::new(5u64);
    let tx = Transaction::begin_unsafe_single_threaded().unwrap();
    assert_eq!(cell.get().unwrap(), 5);
    on_other_thread(move || cell.put(6).unwrap());
    tx.commit().unwrap();
}
