//! Shared helpers for the integration suites.

#![allow(dead_code)]

use parking_lot::{const_mutex, Mutex, MutexGuard};
use std::sync::Once;
use std::thread;
use std::time::Duration;

pub use strata_stm::prelude::*;
pub use strata_stm::{stack_depth, StmError, StmResult};

// =============================================================================
// ENVIRONMENT
// =============================================================================

static TRACING: Once = Once::new();
static SERIAL: Mutex<()> = const_mutex(());

/// Route runtime logs through the test harness output capture
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_test_writer()
            .with_max_level(tracing::Level::DEBUG)
            .try_init();
    });
}

/// Serialize tests that observe process-wide state (commit numbers,
/// reclamation frontier)
pub fn serial() -> MutexGuard<'static, ()> {
    SERIAL.lock()
}

// =============================================================================
// FIXTURES
// =============================================================================

/// `count` accounts holding `balance` each
pub fn accounts(count: usize, balance: u64) -> Vec<VBox<u64>> {
    (0..count).map(|_| VBox::new(balance)).collect()
}

/// Sum of all balances in one read-only transaction
pub fn total(accounts: &[VBox<u64>]) -> u64 {
    atomically_read_only(|| {
        let mut sum = 0;
        for account in accounts {
            sum += account.get()?;
        }
        Ok::<_, StmError>(sum)
    })
    .expect("read-only transactions never conflict")
}

/// Move `amount` from `from` to `to` if the balance allows it
pub fn transfer(from: &VBox<u64>, to: &VBox<u64>, amount: u64) -> StmResult<bool> {
    atomically(|| {
        let balance = from.get()?;
        if balance < amount {
            return Ok(false);
        }
        from.put(balance - amount)?;
        to.put(to.get()? + amount)?;
        Ok(true)
    })
}

/// Run `f` on another thread and wait for it
pub fn on_other_thread<R, F>(f: F) -> R
where
    F: FnOnce() -> R + Send,
    R: Send,
{
    thread::scope(|s| s.spawn(f).join().expect("helper thread panicked"))
}

/// Short pause to let other threads make progress
pub fn pause() {
    thread::sleep(Duration::from_millis(5));
}
