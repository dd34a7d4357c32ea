//! Static description of one manageable service instance.
use std::{collections::HashMap, path::PathBuf, time::Duration};

use regex::Regex;

use crate::{
    error::SupervisorError, platform::CommandSpec, reaper::SocketState, variants::ServiceKind,
};

/// Default readiness budget when a variant does not specify one.
pub const DEFAULT_START_TIMEOUT: Duration = Duration::from_secs(60);
/// Default shutdown budget when a variant does not specify one.
pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(30);

/// A log line that must appear before the service counts as ready.
#[derive(Debug, Clone)]
pub struct ReadyMarker {
    pub log: PathBuf,
    pub pattern: Regex,
}

/// How `stop` asks the service to shut down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopStrategy {
    /// Run the descriptor's stop command.
    Command,
    /// Ask the OS service manager.
    OsService,
    /// Signal the tracked process (SIGTERM / `taskkill` without `/F`).
    Signal,
}

/// Which evidence `wait_to_start` waits for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadinessSignal {
    /// All required ports reachable, plus the ready marker when one is configured.
    Ports,
    /// The ready marker alone.
    LogMarker,
    /// The PID file names a live process.
    PidFile,
    /// The start command exits successfully.
    ExitCode,
}

/// Everything the supervisor needs to know about one service.
///
/// Fields are public for construction; once handed to a
/// [`Supervisor`](crate::supervisor::Supervisor) the descriptor is only reachable by shared
/// reference.
#[derive(Debug, Clone)]
pub struct ServiceDescriptor {
    /// Name the service is configured under.
    pub name: String,
    pub kind: ServiceKind,
    /// Absent only when the service runs under the OS service manager.
    pub start_command: Option<CommandSpec>,
    /// Absent means signal-based shutdown.
    pub stop_command: Option<CommandSpec>,
    pub start_working_directory: Option<PathBuf>,
    pub stop_working_directory: Option<PathBuf>,
    pub start_timeout: Duration,
    pub stop_timeout: Duration,
    pub pid_file: Option<PathBuf>,
    /// Window title for the last-resort kill. Ignored on POSIX, which has no window titles.
    pub window_title: Option<String>,
    /// OS service manager name, required when `run_as_os_service` is set.
    pub service_name: Option<String>,
    pub run_as_os_service: bool,
    /// Host the readiness ports are probed on.
    pub host: String,
    /// Ports that must all be reachable for the service to be up, in configured order.
    pub required_ports: Vec<u16>,
    pub log_paths: Vec<PathBuf>,
    pub backup_paths: Vec<PathBuf>,
    pub ready_marker: Option<ReadyMarker>,
    /// Makes `stop` and `wait_to_stop` no-ops for fixtures shared across suites.
    pub stop_protected: bool,
    /// Socket states the port reaper targets.
    pub kill_states: Vec<SocketState>,
    /// Extra environment for the start and stop commands.
    pub environment: HashMap<String, String>,
}

impl ServiceDescriptor {
    /// A custom descriptor started by `start_command` with default timeouts and no ports.
    pub fn new(name: impl Into<String>, start_command: CommandSpec) -> Self {
        Self {
            name: name.into(),
            kind: ServiceKind::Custom,
            start_command: Some(start_command),
            stop_command: None,
            start_working_directory: None,
            stop_working_directory: None,
            start_timeout: DEFAULT_START_TIMEOUT,
            stop_timeout: DEFAULT_STOP_TIMEOUT,
            pid_file: None,
            window_title: None,
            service_name: None,
            run_as_os_service: false,
            host: "127.0.0.1".to_string(),
            required_ports: Vec::new(),
            log_paths: Vec::new(),
            backup_paths: Vec::new(),
            ready_marker: None,
            stop_protected: false,
            kill_states: vec![SocketState::Listen],
            environment: HashMap::new(),
        }
    }

    /// Checks the invariants a supervisor relies on.
    pub fn validate(&self) -> Result<(), SupervisorError> {
        let invalid = |reason: &str| SupervisorError::InvalidDescriptor {
            service: self.name.clone(),
            reason: reason.to_string(),
        };
        let missing = |key: &str| SupervisorError::ConfigurationMissing {
            service: self.name.clone(),
            key: key.to_string(),
        };

        if self.name.trim().is_empty() {
            return Err(invalid("service name is empty"));
        }
        if self.start_timeout.is_zero() {
            return Err(invalid("start timeout must be positive"));
        }
        if self.stop_timeout.is_zero() {
            return Err(invalid("stop timeout must be positive"));
        }
        if self.host.trim().is_empty() {
            return Err(missing("host"));
        }
        if self.run_as_os_service {
            if self.service_name.as_deref().is_none_or(|name| name.trim().is_empty()) {
                return Err(missing("service_name"));
            }
        } else if self.start_command.is_none() {
            return Err(missing("start_command"));
        }
        Ok(())
    }

    pub fn stop_strategy(&self) -> StopStrategy {
        if self.run_as_os_service {
            StopStrategy::OsService
        } else if self.stop_command.is_some() {
            StopStrategy::Command
        } else {
            StopStrategy::Signal
        }
    }

    pub fn readiness(&self) -> ReadinessSignal {
        if !self.required_ports.is_empty() {
            ReadinessSignal::Ports
        } else if self.ready_marker.is_some() {
            ReadinessSignal::LogMarker
        } else if self.pid_file.is_some() {
            ReadinessSignal::PidFile
        } else {
            ReadinessSignal::ExitCode
        }
    }
}
