//! Runtime entry point for strata-stm.
//!
//! The transactional memory is process-wide: cells carry no reference to a
//! runtime object. `Stm` is a cheap handle on that global runtime, created
//! either implicitly from the environment or explicitly through
//! [`StmBuilder::install`] before the first transaction.

use crate::error::{Error, Result};
use std::sync::Arc;
use strata_stm_concurrency::{runtime, CommitListener, GcStats, Runtime};
use strata_stm_core::config::StmConfig;
use strata_stm_engine::{atomically_with, TxOptions};
use tracing::warn;

/// Handle on the process-wide transactional memory.
///
/// # Example
///
/// ```ignore
/// use strata_stm::prelude::*;
///
/// let stm = Stm::builder().gc_interval_ms(100).install()?;
/// let account = VBox::new(100u64);
///
/// stm.atomically(|| {
///     let balance = account.get()?;
///     account.put(balance - 10)?;
///     Ok(())
/// })?;
/// ```
#[derive(Debug, Clone, Copy)]
pub struct Stm {
    runtime: &'static Runtime,
}

impl Stm {
    /// Handle on the runtime, creating it from the environment if needed.
    ///
    /// Environment overrides: `STRATA_STM_DISABLE_GC`,
    /// `STRATA_STM_GC_INTERVAL_MS`, `STRATA_STM_WRITE_SET_BLOCK_SIZE`,
    /// `STRATA_STM_MAX_PARALLEL_THREADS`.
    pub fn global() -> Self {
        Stm { runtime: runtime() }
    }

    /// Create a builder for an explicitly configured runtime.
    pub fn builder() -> StmBuilder {
        StmBuilder::new()
    }

    /// Active configuration.
    pub fn config(&self) -> &StmConfig {
        self.runtime.config()
    }

    /// Number of the newest committed transaction.
    pub fn latest_version(&self) -> u64 {
        self.runtime.latest_version()
    }

    /// Run `body` as a read-write transaction, retrying on conflicts.
    pub fn atomically<T, F>(&self, body: F) -> Result<T>
    where
        F: FnMut() -> Result<T>,
    {
        atomically_with(TxOptions::new(), body)
    }

    /// Run `body` as a read-only transaction.
    pub fn atomically_read_only<T, F>(&self, body: F) -> Result<T>
    where
        F: FnMut() -> Result<T>,
    {
        atomically_with(TxOptions::new().read_only(), body)
    }

    /// Run `body` with explicit options.
    pub fn atomically_with<T, F>(&self, options: TxOptions, body: F) -> Result<T>
    where
        F: FnMut() -> Result<T>,
    {
        atomically_with(options, body)
    }

    /// Run one garbage-collection round now.
    pub fn collect_garbage(&self) -> GcStats {
        self.runtime.collect_garbage()
    }

    /// Register a listener for reclamation progress.
    pub fn add_commit_listener(&self, listener: Arc<dyn CommitListener>) {
        self.runtime.add_commit_listener(listener);
    }

    /// Unregister a listener. Returns `false` if it was not registered.
    pub fn remove_commit_listener(&self, listener: &Arc<dyn CommitListener>) -> bool {
        self.runtime.remove_commit_listener(listener)
    }

    /// Check if the background collector is running.
    pub fn is_background_gc_running(&self) -> bool {
        self.runtime.is_background_gc_running()
    }

    /// Stop the background collector.
    ///
    /// Reclamation continues only through [`Stm::collect_garbage`].
    pub fn stop_background_gc(&self) {
        self.runtime.stop_background_gc();
    }
}

/// Builder for the process-wide runtime.
///
/// # Example
///
/// ```ignore
/// // Tests that drive collection by hand
/// let stm = Stm::builder().disable_gc().install()?;
///
/// // Configuration from a file
/// let stm = Stm::builder().toml(&std::fs::read_to_string("stm.toml")?)?.install()?;
/// ```
#[derive(Debug, Clone, Default)]
pub struct StmBuilder {
    config: StmConfig,
}

impl StmBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        StmBuilder {
            config: StmConfig::new(),
        }
    }

    /// Start from the defaults plus environment overrides.
    pub fn from_env() -> Self {
        StmBuilder {
            config: StmConfig::from_env(),
        }
    }

    /// Replace the configuration with one parsed from TOML.
    pub fn toml(mut self, source: &str) -> Result<Self> {
        self.config = StmConfig::from_toml_str(source).map_err(Error::from)?;
        Ok(self)
    }

    /// Use `config` as is.
    pub fn config(mut self, config: StmConfig) -> Self {
        self.config = config;
        self
    }

    /// Enable or disable the background collector.
    pub fn gc_enabled(mut self, enabled: bool) -> Self {
        self.config.gc.enabled = enabled;
        self
    }

    /// Run without the background collector.
    pub fn disable_gc(self) -> Self {
        self.gc_enabled(false)
    }

    /// Sleep between background collection rounds.
    pub fn gc_interval_ms(mut self, interval_ms: u64) -> Self {
        self.config.gc.interval_ms = interval_ms;
        self
    }

    /// Write-set entries per cooperative write-back block.
    pub fn write_set_block_size(mut self, block_size: usize) -> Self {
        self.config.write_set_block_size = block_size;
        self
    }

    /// Maximum parallel children run at once.
    pub fn max_parallel_threads(mut self, threads: usize) -> Self {
        self.config.parallel.max_threads = threads;
        self
    }

    /// Attempts per parallel child before sequential fallback.
    pub fn max_child_attempts(mut self, attempts: u32) -> Self {
        self.config.parallel.max_child_attempts = attempts;
        self
    }

    /// Configuration built so far.
    pub fn build_config(&self) -> &StmConfig {
        &self.config
    }

    /// Install the runtime.
    ///
    /// Fails if the configuration is invalid, or if the runtime already
    /// exists (installed before, or created by an earlier transaction).
    pub fn install(self) -> Result<Stm> {
        match strata_stm_concurrency::install(self.config) {
            Ok(runtime) => Ok(Stm { runtime }),
            Err(e) => {
                warn!(error = %e, "Runtime install rejected");
                Err(Error::from(e))
            }
        }
    }
}
