// crates/runcoord-config/src/config.rs
// ============================================================================
// Module: Runcoord Configuration
// Description: Configuration loading and validation for Runcoord.
// Purpose: Provide strict, fail-closed config parsing with hard limits.
// Dependencies: runcoord-core, runcoord-store-file, serde, toml
// ============================================================================

//! ## Overview
//! Configuration is loaded from a TOML file with strict size and path limits.
//! Unknown fields, out-of-range timings, and malformed namespaces are
//! rejected so a typo never silently falls back to a default.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::env;
use std::fs;
use std::path::Path;
use std::path::PathBuf;

use runcoord_core::DEFAULT_DELIVERY_QUEUE_DEPTH;
use runcoord_core::DEFAULT_MAX_VALUE_BYTES;
use runcoord_core::Namespace;
use runcoord_core::NamespacePolicy;
use runcoord_store_file::FileStoreConfig;
use runcoord_store_file::WatchPollConfig;
use serde::Deserialize;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default configuration filename when no path is specified.
const DEFAULT_CONFIG_NAME: &str = "runcoord.toml";
/// Environment variable used to override the config path.
pub const CONFIG_ENV_VAR: &str = "RUNCOORD_CONFIG";
/// Maximum configuration file size in bytes.
pub(crate) const MAX_CONFIG_FILE_SIZE: usize = 1024 * 1024;
/// Maximum length of a single path component.
pub(crate) const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
pub(crate) const MAX_TOTAL_PATH_LENGTH: usize = 4096;
/// Default lock timeout in milliseconds.
pub(crate) const DEFAULT_LOCK_TIMEOUT_MS: u64 = 5_000;
/// Minimum lock timeout in milliseconds.
pub(crate) const MIN_LOCK_TIMEOUT_MS: u64 = 10;
/// Maximum lock timeout in milliseconds.
pub(crate) const MAX_LOCK_TIMEOUT_MS: u64 = 60_000;
/// Default pause between lock attempts in milliseconds.
pub(crate) const DEFAULT_LOCK_RETRY_INTERVAL_MS: u64 = 10;
/// Maximum pause between lock attempts in milliseconds.
pub(crate) const MAX_LOCK_RETRY_INTERVAL_MS: u64 = 1_000;
/// Largest configurable value size in bytes.
pub(crate) const MAX_MAX_VALUE_BYTES: usize = 1024 * 1024;
/// Default watch poll interval in milliseconds.
pub(crate) const DEFAULT_POLL_INTERVAL_MS: u64 = 500;
/// Minimum watch poll interval in milliseconds.
pub(crate) const MIN_POLL_INTERVAL_MS: u64 = 50;
/// Maximum watch poll interval in milliseconds.
pub(crate) const MAX_POLL_INTERVAL_MS: u64 = 60_000;
/// Maximum per-watch delivery queue depth.
pub(crate) const MAX_DELIVERY_QUEUE_DEPTH: usize = 65_536;
/// Default scheduler worker count.
pub(crate) const DEFAULT_WORKER_THREADS: usize = 4;
/// Maximum scheduler worker count.
pub(crate) const MAX_WORKER_THREADS: usize = 64;
/// Default upper bound of the random initial delay in milliseconds.
pub(crate) const DEFAULT_INITIAL_JITTER_MS: u64 = 5_000;
/// Maximum initial jitter in milliseconds.
pub(crate) const MAX_INITIAL_JITTER_MS: u64 = 600_000;
/// Default bounded wait for in-flight passes at shutdown in milliseconds.
pub(crate) const DEFAULT_SHUTDOWN_TIMEOUT_MS: u64 = 10_000;
/// Maximum shutdown wait in milliseconds.
pub(crate) const MAX_SHUTDOWN_TIMEOUT_MS: u64 = 300_000;
/// Default namespace holding run records.
pub(crate) const DEFAULT_RUN_NAMESPACE: &str = "framework";
/// Minimum monitor interval in milliseconds.
pub(crate) const MIN_MONITOR_INTERVAL_MS: u64 = 100;
/// Maximum monitor interval in milliseconds (one day).
pub(crate) const MAX_MONITOR_INTERVAL_MS: u64 = 86_400_000;
/// Maximum heartbeat timeout or retention window in seconds (one week).
pub(crate) const MAX_WINDOW_SECS: u64 = 604_800;
/// Default dead heartbeat pass interval in milliseconds.
pub(crate) const DEFAULT_DEAD_HEARTBEAT_INTERVAL_MS: u64 = 20_000;
/// Default heartbeat timeout in seconds.
pub(crate) const DEFAULT_HEARTBEAT_TIMEOUT_SECS: u64 = 300;
/// Default shared environment pass interval in milliseconds.
pub(crate) const DEFAULT_SHARED_ENVIRONMENT_INTERVAL_MS: u64 = 60_000;
/// Default finished run pass interval in milliseconds.
pub(crate) const DEFAULT_FINISHED_RUNS_INTERVAL_MS: u64 = 20_000;
/// Default finished run retention in seconds.
pub(crate) const DEFAULT_FINISHED_RETENTION_SECS: u64 = 300;
/// Default waiting run pass interval in milliseconds.
pub(crate) const DEFAULT_WAITING_RUNS_INTERVAL_MS: u64 = 5_000;

// ============================================================================
// SECTION: Configuration Types
// ============================================================================

/// Runcoord configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuncoordConfig {
    /// Store file configuration.
    pub store: StoreConfig,
    /// Watch polling configuration.
    #[serde(default)]
    pub watch: WatchConfig,
    /// Lifecycle scheduler configuration.
    #[serde(default)]
    pub scheduler: SchedulerConfig,
}

impl RuncoordConfig {
    /// Loads configuration from disk using the default resolution rules.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when loading or validation fails.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let resolved = resolve_path(path)?;
        validate_path(&resolved)?;
        let bytes = fs::read(&resolved).map_err(|err| ConfigError::Io(err.to_string()))?;
        if bytes.len() > MAX_CONFIG_FILE_SIZE {
            return Err(ConfigError::Invalid("config file exceeds size limit".to_string()));
        }
        let content = std::str::from_utf8(&bytes)
            .map_err(|_| ConfigError::Invalid("config file must be utf-8".to_string()))?;
        Self::from_toml(content)
    }

    /// Parses and validates configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when parsing or validation fails.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self =
            toml::from_str(content).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration for internal consistency.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.store.validate()?;
        self.watch.validate()?;
        self.scheduler.validate(self.store.namespace_policy)
    }
}

/// Store file configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StoreConfig {
    /// Path to the shared properties file.
    pub path: PathBuf,
    /// Lock acquisition timeout in milliseconds.
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,
    /// Pause between lock attempts in milliseconds.
    #[serde(default = "default_lock_retry_interval_ms")]
    pub lock_retry_interval_ms: u64,
    /// Flush writes to disk before returning.
    #[serde(default = "default_sync_writes")]
    pub sync_writes: bool,
    /// Largest accepted value in bytes.
    #[serde(default = "default_max_value_bytes")]
    pub max_value_bytes: usize,
    /// Character rules applied to namespaces.
    #[serde(default)]
    pub namespace_policy: NamespacePolicy,
}

impl StoreConfig {
    /// Validates store configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        validate_store_path(&self.path)?;
        if !(MIN_LOCK_TIMEOUT_MS..=MAX_LOCK_TIMEOUT_MS).contains(&self.lock_timeout_ms) {
            return Err(ConfigError::Invalid(format!(
                "store.lock_timeout_ms must be between {MIN_LOCK_TIMEOUT_MS} and \
                 {MAX_LOCK_TIMEOUT_MS}"
            )));
        }
        if self.lock_retry_interval_ms == 0
            || self.lock_retry_interval_ms > MAX_LOCK_RETRY_INTERVAL_MS
        {
            return Err(ConfigError::Invalid(format!(
                "store.lock_retry_interval_ms must be between 1 and {MAX_LOCK_RETRY_INTERVAL_MS}"
            )));
        }
        if self.lock_retry_interval_ms > self.lock_timeout_ms {
            return Err(ConfigError::Invalid(
                "store.lock_retry_interval_ms must not exceed store.lock_timeout_ms".to_string(),
            ));
        }
        if self.max_value_bytes == 0 || self.max_value_bytes > MAX_MAX_VALUE_BYTES {
            return Err(ConfigError::Invalid(format!(
                "store.max_value_bytes must be between 1 and {MAX_MAX_VALUE_BYTES}"
            )));
        }
        Ok(())
    }

    /// Builds the file store configuration.
    #[must_use]
    pub fn file_store_config(&self) -> FileStoreConfig {
        FileStoreConfig {
            path: self.path.clone(),
            lock_timeout_ms: self.lock_timeout_ms,
            lock_retry_interval_ms: self.lock_retry_interval_ms,
            sync_writes: self.sync_writes,
            max_value_bytes: self.max_value_bytes,
        }
    }
}

/// Watch polling configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WatchConfig {
    /// Poll interval in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Undelivered notifications buffered per watch.
    #[serde(default = "default_delivery_queue_depth")]
    pub delivery_queue_depth: usize,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            delivery_queue_depth: default_delivery_queue_depth(),
        }
    }
}

impl WatchConfig {
    /// Validates watch configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if !(MIN_POLL_INTERVAL_MS..=MAX_POLL_INTERVAL_MS).contains(&self.poll_interval_ms) {
            return Err(ConfigError::Invalid(format!(
                "watch.poll_interval_ms must be between {MIN_POLL_INTERVAL_MS} and \
                 {MAX_POLL_INTERVAL_MS}"
            )));
        }
        if self.delivery_queue_depth == 0 || self.delivery_queue_depth > MAX_DELIVERY_QUEUE_DEPTH
        {
            return Err(ConfigError::Invalid(format!(
                "watch.delivery_queue_depth must be between 1 and {MAX_DELIVERY_QUEUE_DEPTH}"
            )));
        }
        Ok(())
    }

    /// Builds the watch polling configuration.
    #[must_use]
    pub const fn poll_config(&self) -> WatchPollConfig {
        WatchPollConfig {
            poll_interval_ms: self.poll_interval_ms,
            delivery_queue_depth: self.delivery_queue_depth,
        }
    }
}

/// Lifecycle scheduler configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SchedulerConfig {
    /// Worker threads executing monitor passes.
    #[serde(default = "default_worker_threads")]
    pub worker_threads: usize,
    /// Upper bound of the random delay before each monitor's first pass.
    #[serde(default = "default_initial_jitter_ms")]
    pub initial_jitter_ms: u64,
    /// Bounded wait for in-flight passes at shutdown.
    #[serde(default = "default_shutdown_timeout_ms")]
    pub shutdown_timeout_ms: u64,
    /// Namespace holding run records.
    #[serde(default = "default_run_namespace")]
    pub run_namespace: String,
    /// Dead heartbeat monitor.
    #[serde(default)]
    pub dead_heartbeat: DeadHeartbeatConfig,
    /// Expired shared environment monitor.
    #[serde(default)]
    pub shared_environment: SharedEnvironmentConfig,
    /// Finished run reaper.
    #[serde(default)]
    pub finished_runs: FinishedRunsConfig,
    /// Waiting run requeuer.
    #[serde(default)]
    pub waiting_runs: WaitingRunsConfig,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            worker_threads: default_worker_threads(),
            initial_jitter_ms: default_initial_jitter_ms(),
            shutdown_timeout_ms: default_shutdown_timeout_ms(),
            run_namespace: default_run_namespace(),
            dead_heartbeat: DeadHeartbeatConfig::default(),
            shared_environment: SharedEnvironmentConfig::default(),
            finished_runs: FinishedRunsConfig::default(),
            waiting_runs: WaitingRunsConfig::default(),
        }
    }
}

impl SchedulerConfig {
    /// Validates scheduler configuration.
    fn validate(&self, namespace_policy: NamespacePolicy) -> Result<(), ConfigError> {
        if self.worker_threads == 0 || self.worker_threads > MAX_WORKER_THREADS {
            return Err(ConfigError::Invalid(format!(
                "scheduler.worker_threads must be between 1 and {MAX_WORKER_THREADS}"
            )));
        }
        if self.initial_jitter_ms > MAX_INITIAL_JITTER_MS {
            return Err(ConfigError::Invalid(format!(
                "scheduler.initial_jitter_ms must be at most {MAX_INITIAL_JITTER_MS}"
            )));
        }
        if self.shutdown_timeout_ms == 0 || self.shutdown_timeout_ms > MAX_SHUTDOWN_TIMEOUT_MS {
            return Err(ConfigError::Invalid(format!(
                "scheduler.shutdown_timeout_ms must be between 1 and {MAX_SHUTDOWN_TIMEOUT_MS}"
            )));
        }
        Namespace::parse(&self.run_namespace, namespace_policy).map_err(|err| {
            ConfigError::Invalid(format!("scheduler.run_namespace is invalid: {err}"))
        })?;
        validate_interval("scheduler.dead_heartbeat", self.dead_heartbeat.interval_ms)?;
        validate_window("scheduler.dead_heartbeat.timeout_secs", self.dead_heartbeat.timeout_secs)?;
        if self.dead_heartbeat.timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "scheduler.dead_heartbeat.timeout_secs must be greater than zero".to_string(),
            ));
        }
        validate_interval("scheduler.shared_environment", self.shared_environment.interval_ms)?;
        validate_interval("scheduler.finished_runs", self.finished_runs.interval_ms)?;
        validate_window(
            "scheduler.finished_runs.retention_secs",
            self.finished_runs.retention_secs,
        )?;
        validate_interval("scheduler.waiting_runs", self.waiting_runs.interval_ms)
    }
}

/// Dead heartbeat monitor configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeadHeartbeatConfig {
    /// Run the monitor.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Delay between passes in milliseconds.
    #[serde(default = "default_dead_heartbeat_interval_ms")]
    pub interval_ms: u64,
    /// Heartbeat age after which a run is dead, in seconds.
    #[serde(default = "default_heartbeat_timeout_secs")]
    pub timeout_secs: u64,
    /// State a dead automated run is reset to.
    #[serde(default)]
    pub reset_policy: ResetPolicyConfig,
}

impl Default for DeadHeartbeatConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_ms: default_dead_heartbeat_interval_ms(),
            timeout_secs: default_heartbeat_timeout_secs(),
            reset_policy: ResetPolicyConfig::default(),
        }
    }
}

/// Reset target for dead automated runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ResetPolicyConfig {
    /// Put the run straight back on the queue.
    #[default]
    Queued,
    /// Park the run until an operator or submitter releases it.
    Pending,
}

/// Expired shared environment monitor configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SharedEnvironmentConfig {
    /// Run the monitor.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Delay between passes in milliseconds.
    #[serde(default = "default_shared_environment_interval_ms")]
    pub interval_ms: u64,
}

impl Default for SharedEnvironmentConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_ms: default_shared_environment_interval_ms(),
        }
    }
}

/// Finished run reaper configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FinishedRunsConfig {
    /// Run the monitor.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Delay between passes in milliseconds.
    #[serde(default = "default_finished_runs_interval_ms")]
    pub interval_ms: u64,
    /// Time a finished run stays visible, in seconds.
    #[serde(default = "default_finished_retention_secs")]
    pub retention_secs: u64,
}

impl Default for FinishedRunsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_ms: default_finished_runs_interval_ms(),
            retention_secs: default_finished_retention_secs(),
        }
    }
}

/// Waiting run requeuer configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WaitingRunsConfig {
    /// Run the monitor.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Delay between passes in milliseconds.
    #[serde(default = "default_waiting_runs_interval_ms")]
    pub interval_ms: u64,
}

impl Default for WaitingRunsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_ms: default_waiting_runs_interval_ms(),
        }
    }
}

// ============================================================================
// SECTION: Defaults
// ============================================================================

/// Returns the default lock timeout.
const fn default_lock_timeout_ms() -> u64 {
    DEFAULT_LOCK_TIMEOUT_MS
}

/// Returns the default lock retry interval.
const fn default_lock_retry_interval_ms() -> u64 {
    DEFAULT_LOCK_RETRY_INTERVAL_MS
}

/// Returns the default durability setting.
const fn default_sync_writes() -> bool {
    true
}

/// Returns the default value size limit.
const fn default_max_value_bytes() -> usize {
    DEFAULT_MAX_VALUE_BYTES
}

/// Returns the default poll interval.
const fn default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}

/// Returns the default delivery queue depth.
const fn default_delivery_queue_depth() -> usize {
    DEFAULT_DELIVERY_QUEUE_DEPTH
}

/// Returns the default worker count.
const fn default_worker_threads() -> usize {
    DEFAULT_WORKER_THREADS
}

/// Returns the default initial jitter.
const fn default_initial_jitter_ms() -> u64 {
    DEFAULT_INITIAL_JITTER_MS
}

/// Returns the default shutdown wait.
const fn default_shutdown_timeout_ms() -> u64 {
    DEFAULT_SHUTDOWN_TIMEOUT_MS
}

/// Returns the default run namespace.
fn default_run_namespace() -> String {
    DEFAULT_RUN_NAMESPACE.to_string()
}

/// Monitors are enabled unless configured otherwise.
const fn default_enabled() -> bool {
    true
}

/// Returns the default dead heartbeat interval.
const fn default_dead_heartbeat_interval_ms() -> u64 {
    DEFAULT_DEAD_HEARTBEAT_INTERVAL_MS
}

/// Returns the default heartbeat timeout.
const fn default_heartbeat_timeout_secs() -> u64 {
    DEFAULT_HEARTBEAT_TIMEOUT_SECS
}

/// Returns the default shared environment interval.
const fn default_shared_environment_interval_ms() -> u64 {
    DEFAULT_SHARED_ENVIRONMENT_INTERVAL_MS
}

/// Returns the default finished run interval.
const fn default_finished_runs_interval_ms() -> u64 {
    DEFAULT_FINISHED_RUNS_INTERVAL_MS
}

/// Returns the default finished run retention.
const fn default_finished_retention_secs() -> u64 {
    DEFAULT_FINISHED_RETENTION_SECS
}

/// Returns the default waiting run interval.
const fn default_waiting_runs_interval_ms() -> u64 {
    DEFAULT_WAITING_RUNS_INTERVAL_MS
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Configuration loading or validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// I/O failure while reading configuration.
    #[error("config io error: {0}")]
    Io(String),
    /// TOML parsing error.
    #[error("config parse error: {0}")]
    Parse(String),
    /// Invalid configuration data.
    #[error("invalid config: {0}")]
    Invalid(String),
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Resolves the config path from the caller or environment defaults.
fn resolve_path(path: Option<&Path>) -> Result<PathBuf, ConfigError> {
    if let Some(path) = path {
        return Ok(path.to_path_buf());
    }
    if let Ok(env_path) = env::var(CONFIG_ENV_VAR) {
        if env_path.len() > MAX_TOTAL_PATH_LENGTH {
            return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
        }
        return Ok(PathBuf::from(env_path));
    }
    Ok(PathBuf::from(DEFAULT_CONFIG_NAME))
}

/// Validates the resolved path against length limits.
fn validate_path(path: &Path) -> Result<(), ConfigError> {
    let text = path.to_string_lossy();
    if text.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
    }
    for component in path.components() {
        let value = component.as_os_str().to_string_lossy();
        if value.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid("config path component too long".to_string()));
        }
    }
    Ok(())
}

/// Validates the store file path.
fn validate_store_path(path: &Path) -> Result<(), ConfigError> {
    if path.as_os_str().is_empty() {
        return Err(ConfigError::Invalid("store.path must be set".to_string()));
    }
    let text = path.to_string_lossy();
    if text.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid("store.path exceeds max length".to_string()));
    }
    for component in path.components() {
        let value = component.as_os_str().to_string_lossy();
        if value.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid("store.path component too long".to_string()));
        }
    }
    Ok(())
}

/// Validates a monitor pass interval.
fn validate_interval(section: &str, interval_ms: u64) -> Result<(), ConfigError> {
    if !(MIN_MONITOR_INTERVAL_MS..=MAX_MONITOR_INTERVAL_MS).contains(&interval_ms) {
        return Err(ConfigError::Invalid(format!(
            "{section}.interval_ms must be between {MIN_MONITOR_INTERVAL_MS} and \
             {MAX_MONITOR_INTERVAL_MS}"
        )));
    }
    Ok(())
}

/// Validates a time window in seconds.
fn validate_window(field: &str, secs: u64) -> Result<(), ConfigError> {
    if secs > MAX_WINDOW_SECS {
        return Err(ConfigError::Invalid(format!("{field} must be at most {MAX_WINDOW_SECS}")));
    }
    Ok(())
}
