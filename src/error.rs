//! Error handling for lifeguard.
use std::{path::PathBuf, time::Duration};

use thiserror::Error;

/// Defines all possible errors surfaced by a service supervisor.
#[derive(Debug, Error)]
pub enum SupervisorError {
    /// The service never satisfied its readiness conditions.
    #[error("Service '{service}' did not become ready within {timeout:?}: {detail}")]
    StartupTimeout {
        /// The service that failed to come up.
        service: String,
        /// The readiness budget that elapsed.
        timeout: Duration,
        /// Which readiness condition was still unmet.
        detail: String,
    },

    /// Graceful shutdown did not clear the service's ports in time.
    #[error("Service '{service}' did not stop within {timeout:?}")]
    ShutdownTimeout {
        /// The service that kept running.
        service: String,
        /// The shutdown budget that elapsed.
        timeout: Duration,
    },

    /// Graceful shutdown and the reaper fallback both failed.
    #[error("Service '{service}' could not be stopped: {reason}")]
    ShutdownFailed {
        /// The service that could not be reclaimed.
        service: String,
        /// Human-readable account of what is still alive.
        reason: String,
    },

    /// A descriptor field required by the service's configuration is absent.
    #[error("Service '{service}' is missing required configuration '{key}'")]
    ConfigurationMissing {
        /// The service being configured.
        service: String,
        /// The configuration key that was expected.
        key: String,
    },

    /// A descriptor violates one of its invariants.
    #[error("Invalid descriptor for service '{service}': {reason}")]
    InvalidDescriptor {
        /// The service being configured.
        service: String,
        /// The violated invariant.
        reason: String,
    },

    /// Spawning or killing a process failed at the OS level.
    #[error("Process control failed: {0}")]
    ProcessControlFailure(#[from] ProcessControlError),

    /// Snapshotting a file before start failed.
    #[error("Failed to back up '{path}': {source}")]
    BackupFailed {
        /// The file or directory being saved.
        path: PathBuf,
        /// The underlying error that occurred.
        #[source]
        source: std::io::Error,
    },

    /// Copying a snapshot back after stop failed.
    #[error("Failed to restore '{path}': {source}")]
    RestoreFailed {
        /// The file or directory being restored.
        path: PathBuf,
        /// The underlying error that occurred.
        #[source]
        source: std::io::Error,
    },

    /// Reading or parsing configuration failed.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The per-service lock file could not be created or locked.
    #[error("Failed to lock '{path}': {source}")]
    LockFailed {
        /// The lock file.
        path: PathBuf,
        /// The underlying error that occurred.
        #[source]
        source: std::io::Error,
    },

    /// Another supervisor already holds the service's lock.
    #[error("Service '{service}' is already managed by another supervisor ({lock})")]
    AlreadyManaged {
        /// The contested service.
        service: String,
        /// The lock file that is held.
        lock: PathBuf,
    },
}

/// Error type for launching and terminating processes.
#[derive(Debug, Error)]
pub enum ProcessControlError {
    /// The command could not be spawned.
    #[error("Failed to spawn `{command}`: {source}")]
    Spawn {
        /// The rendered command line.
        command: String,
        /// The underlying error that occurred.
        #[source]
        source: std::io::Error,
    },

    /// Waiting on a spawned command failed.
    #[error("Failed while waiting on `{command}`: {source}")]
    Wait {
        /// The rendered command line.
        command: String,
        /// The underlying error that occurred.
        #[source]
        source: std::io::Error,
    },

    /// A command ran but reported failure.
    #[error("`{command}` exited with status {status:?}: {stderr}")]
    CommandFailed {
        /// The rendered command line.
        command: String,
        /// Exit code, if the process exited normally.
        status: Option<i32>,
        /// Captured standard error.
        stderr: String,
    },

    /// Sending a termination request to a PID failed.
    #[error("Failed to kill PID {pid}: {source}")]
    Kill {
        /// The target process.
        pid: u32,
        /// The underlying error that occurred.
        #[source]
        source: std::io::Error,
    },

    /// The operation has no implementation for this platform.
    #[error("Unsupported on this platform: {0}")]
    Unsupported(String),
}

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Error reading a configuration file.
    #[error("Failed to read config file: {0}")]
    Read(#[from] std::io::Error),

    /// Error parsing YAML configuration.
    #[error("Invalid YAML format: {0}")]
    Parse(#[from] serde_yaml::Error),

    /// Error parsing an XML configuration file.
    #[error("Invalid XML in '{path}': {source}")]
    Xml {
        /// The XML file being read.
        path: PathBuf,
        /// The underlying error that occurred.
        #[source]
        source: quick_xml::DeError,
    },

    /// A value is present but malformed.
    #[error("Invalid value '{value}' for '{key}': {reason}")]
    InvalidValue {
        /// The configuration key.
        key: String,
        /// The raw value.
        value: String,
        /// Why it was rejected.
        reason: String,
    },

    /// A `${VAR}` reference names an unset environment variable.
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
}

/// Returned by the retry policy once every attempt has failed.
#[derive(Debug, Error)]
#[error("Gave up after {attempts} attempt(s): {last}")]
pub struct RetryExhausted<E>
where
    E: std::error::Error + 'static,
{
    /// How many times the operation ran.
    pub attempts: u32,
    /// The failure of the final attempt.
    #[source]
    pub last: E,
}

/// Error type for log inspection.
#[derive(Debug, Error)]
pub enum LogError {
    /// The log file could not be read.
    #[error("Failed to read log '{path}': {source}")]
    Read {
        /// The log file.
        path: PathBuf,
        /// The underlying error that occurred.
        #[source]
        source: std::io::Error,
    },

    /// The log was readable but the pattern has not appeared.
    #[error("Pattern '{pattern}' not found in '{path}'")]
    NoMatch {
        /// The log file.
        path: PathBuf,
        /// The regex that was searched for.
        pattern: String,
    },
}
