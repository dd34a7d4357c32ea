//! Lifeguard supervises external services (servlet containers, brokers, coordination
//! services and the like) that integration tests depend on. It starts a service and waits
//! until its ports answer, stops it and kills whatever lingers, and snapshots the files a run
//! may modify so they can be put back afterwards.

/// Snapshot and restore of service files.
pub mod backup;

/// CLI interface.
pub mod cli;

/// Configuration management.
pub mod config;

/// Service descriptors and their invariants.
pub mod descriptor;

/// Port discovery from service configuration files.
pub mod discovery;

/// Error handling.
pub mod error;

/// Process spawning.
pub mod launcher;

/// Log inspection.
pub mod logs;

/// Operating-system abstraction.
pub mod platform;

/// Shared pools of exclusive test resources.
pub mod pool;

/// TCP reachability checks.
pub mod probe;

/// Forced process termination.
pub mod reaper;

/// Retry with delay.
pub mod retry;

/// Runtime state directories.
pub mod runtime;

/// Service lifecycle control.
pub mod supervisor;

/// Concrete service technologies.
pub mod variants;

#[doc(hidden)]
pub mod test_utils;
