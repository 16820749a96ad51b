//! Transactional Memory Integration Tests
//!
//! End-to-end behaviour of the public API on the process-wide runtime
//! (background collector enabled):
//!
//! 1. Snapshot isolation and commit-time validation
//! 2. All-or-nothing commits and aborts
//! 3. Linear and parallel nesting
//! 4. Inevitable transactions
//! 5. Moving transactions between threads
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test --test stm
//! cargo test --test stm nesting::
//! ```

#[path = "../common/mod.rs"]
mod common;

mod atomicity;
mod inevitable;
mod isolation;
mod nesting;
mod parallel;
mod suspend;
