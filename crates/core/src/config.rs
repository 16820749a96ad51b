//! Runtime configuration
//!
//! Configuration comes from three layers, later layers winning:
//!
//! 1. Built-in defaults ([`StmConfig::default`])
//! 2. An optional TOML document ([`StmConfig::from_toml_str`])
//! 3. Environment overrides ([`StmConfig::with_overrides`])
//!
//! ## Environment variables
//!
//! | Variable | Effect |
//! |----------|--------|
//! | `STRATA_STM_DISABLE_GC` | `1`, `true`, `yes` or `on` disables the background collector |
//! | `STRATA_STM_GC_INTERVAL_MS` | collector sleep between rounds |
//! | `STRATA_STM_WRITE_SET_BLOCK_SIZE` | entries per cooperative write-back block |
//! | `STRATA_STM_MAX_PARALLEL_THREADS` | parallel nested tasks per wave |
//!
//! Values that fail to parse are ignored with a warning.

use crate::error::{StmError, StmResult};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Environment variable disabling the background collector
pub const ENV_DISABLE_GC: &str = "STRATA_STM_DISABLE_GC";
/// Environment variable overriding the collector interval
pub const ENV_GC_INTERVAL_MS: &str = "STRATA_STM_GC_INTERVAL_MS";
/// Environment variable overriding the write-back block size
pub const ENV_WRITE_SET_BLOCK_SIZE: &str = "STRATA_STM_WRITE_SET_BLOCK_SIZE";
/// Environment variable overriding the parallel wave size
pub const ENV_MAX_PARALLEL_THREADS: &str = "STRATA_STM_MAX_PARALLEL_THREADS";

/// Default collector interval in milliseconds
pub const DEFAULT_GC_INTERVAL_MS: u64 = 500;
/// Default number of write-set entries per write-back block
pub const DEFAULT_WRITE_SET_BLOCK_SIZE: usize = 10;
/// Default attempts for a parallel child before it is deferred
pub const DEFAULT_MAX_CHILD_ATTEMPTS: u32 = 3;

/// Background garbage-collector settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GcConfig {
    /// Whether the background collector thread runs at all
    pub enabled: bool,
    /// Sleep between collection rounds
    pub interval_ms: u64,
}

impl Default for GcConfig {
    fn default() -> Self {
        GcConfig {
            enabled: true,
            interval_ms: DEFAULT_GC_INTERVAL_MS,
        }
    }
}

/// Parallel nested task settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ParallelConfig {
    /// Maximum tasks run concurrently in one wave
    pub max_threads: usize,
    /// Attempts per child before it is deferred to sequential execution
    pub max_child_attempts: u32,
}

impl Default for ParallelConfig {
    fn default() -> Self {
        ParallelConfig {
            max_threads: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            max_child_attempts: DEFAULT_MAX_CHILD_ATTEMPTS,
        }
    }
}

/// Complete runtime configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StmConfig {
    /// Garbage-collector settings
    pub gc: GcConfig,
    /// Write-set entries per cooperative write-back block
    pub write_set_block_size: usize,
    /// Parallel nested task settings
    pub parallel: ParallelConfig,
}

impl Default for StmConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl StmConfig {
    /// Defaults with every field populated
    pub fn new() -> Self {
        StmConfig {
            gc: GcConfig::default(),
            write_set_block_size: DEFAULT_WRITE_SET_BLOCK_SIZE,
            parallel: ParallelConfig::default(),
        }
    }

    /// Parse a TOML document
    ///
    /// Missing tables and keys keep their defaults.
    ///
    /// ```
    /// use strata_stm_core::config::StmConfig;
    ///
    /// let config = StmConfig::from_toml_str("[gc]\nenabled = false\n").unwrap();
    /// assert!(!config.gc.enabled);
    /// assert_eq!(config.write_set_block_size, 10);
    /// ```
    pub fn from_toml_str(source: &str) -> StmResult<Self> {
        let config: StmConfig =
            toml::from_str(source).map_err(|e| StmError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults plus process environment overrides
    pub fn from_env() -> Self {
        Self::new().with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary key lookup
    pub fn with_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup(ENV_DISABLE_GC) {
            match parse_flag(&raw) {
                Some(disabled) => self.gc.enabled = !disabled,
                None => warn!(variable = ENV_DISABLE_GC, value = %raw, "Ignoring unparsable override"),
            }
        }
        if let Some(value) = parse_override::<u64>(&lookup, ENV_GC_INTERVAL_MS) {
            self.gc.interval_ms = value;
        }
        if let Some(value) = parse_override::<usize>(&lookup, ENV_WRITE_SET_BLOCK_SIZE) {
            self.write_set_block_size = value;
        }
        if let Some(value) = parse_override::<usize>(&lookup, ENV_MAX_PARALLEL_THREADS) {
            self.parallel.max_threads = value;
        }
        self
    }

    /// Reject values the runtime cannot operate with
    pub fn validate(&self) -> StmResult<()> {
        if self.write_set_block_size == 0 {
            return Err(StmError::InvalidConfig(
                "write_set_block_size must be at least 1".into(),
            ));
        }
        if self.gc.interval_ms == 0 {
            return Err(StmError::InvalidConfig(
                "gc.interval_ms must be at least 1".into(),
            ));
        }
        if self.parallel.max_threads == 0 {
            return Err(StmError::InvalidConfig(
                "parallel.max_threads must be at least 1".into(),
            ));
        }
        if self.parallel.max_child_attempts == 0 {
            return Err(StmError::InvalidConfig(
                "parallel.max_child_attempts must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}

fn parse_override<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse::<T>() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(variable = key, value = %raw, "Ignoring unparsable override");
            None
        }
    }
}
