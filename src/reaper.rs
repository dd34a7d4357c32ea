//! Forced reclamation of processes that outlive a graceful stop.
//!
//! Processes are found by the TCP port they hold (parsed from the platform's socket listing),
//! by PID, or by window title on Windows. The OS calls sit behind [`ProcessControl`] so the
//! parsing and dispatch logic can run against scripted output.
use std::time::Duration;

#[cfg(unix)]
use nix::sys::signal::Signal;
use strum_macros::{AsRefStr, EnumString};
#[cfg(not(unix))]
use sysinfo::{ProcessesToUpdate, System};
use tracing::{debug, info, warn};

use crate::{
    error::ProcessControlError,
    launcher::{self, LaunchSpec, OutputMode},
    platform::Platform,
};

const LISTING_TIMEOUT: Duration = Duration::from_secs(15);

/// TCP socket states as printed by `netstat` on either platform family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumString, AsRefStr)]
#[strum(ascii_case_insensitive)]
pub enum SocketState {
    #[strum(to_string = "LISTEN", serialize = "LISTENING")]
    Listen,
    #[strum(to_string = "ESTABLISHED")]
    Established,
    #[strum(to_string = "SYN_SENT")]
    SynSent,
    #[strum(to_string = "SYN_RECV", serialize = "SYN_RECEIVED")]
    SynReceived,
    #[strum(to_string = "FIN_WAIT1", serialize = "FIN_WAIT_1")]
    FinWait1,
    #[strum(to_string = "FIN_WAIT2", serialize = "FIN_WAIT_2")]
    FinWait2,
    #[strum(to_string = "TIME_WAIT")]
    TimeWait,
    #[strum(to_string = "CLOSE_WAIT")]
    CloseWait,
    #[strum(to_string = "LAST_ACK")]
    LastAck,
    #[strum(to_string = "CLOSING")]
    Closing,
    #[strum(to_string = "CLOSED", serialize = "CLOSE")]
    Closed,
}

/// One parsed line of a socket listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SocketEntry {
    /// `tcp`, `tcp6`, `TCP`, ... when the column is present.
    pub protocol: Option<String>,
    pub local_port: u16,
    /// Absent for stateless protocols.
    pub state: Option<SocketState>,
    pub pid: u32,
}

impl SocketEntry {
    /// True when the entry is bound to `port` in one of `states`. Entries without a state
    /// column only match an empty state filter.
    pub fn matches(&self, port: u16, states: &[SocketState]) -> bool {
        if self.local_port != port {
            return false;
        }
        if states.is_empty() {
            return true;
        }
        self.state.is_some_and(|state| states.contains(&state))
    }
}

/// Parses one line of `netstat -ano` (Windows) or `netstat -tanp` (Linux) output.
///
/// Column positions are not relied on: the local address is the first token carrying a
/// numeric port, the foreign address follows it, the state is optional, and the PID is the
/// first later token whose leading digits (before any `/program`) parse. Returns `None` for
/// headers and anything else that does not fit.
pub fn parse_socket_line(line: &str) -> Option<SocketEntry> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    let local_idx = tokens.iter().position(|token| address_port(token).is_some())?;
    let local_port = address_port(tokens[local_idx])?;

    // Foreign address must be present even though its value is irrelevant.
    tokens.get(local_idx + 1)?;

    let mut next = local_idx + 2;
    let state = tokens
        .get(next)
        .and_then(|token| token.parse::<SocketState>().ok());
    if state.is_some() {
        next += 1;
    }

    let pid = tokens.get(next..)?.iter().find_map(|token| {
        let digits = token.split('/').next().unwrap_or_default();
        digits.parse::<u32>().ok()
    })?;

    let protocol = (local_idx > 0)
        .then(|| tokens[0])
        .filter(|token| token.chars().all(|c| c.is_ascii_alphanumeric()))
        .filter(|token| token.chars().any(|c| c.is_ascii_alphabetic()))
        .map(str::to_string);

    Some(SocketEntry {
        protocol,
        local_port,
        state,
        pid,
    })
}

/// Extracts the port from `host:port`, `[v6]:port`, `:::port` or BSD-style `host.port`.
fn address_port(token: &str) -> Option<u16> {
    let (host, port) = token.rsplit_once(':').or_else(|| {
        token
            .rsplit_once('.')
            .filter(|(host, _)| *host == "*" || host.contains('.'))
    })?;
    if host.is_empty() && !token.starts_with(':') {
        return None;
    }
    port.parse::<u16>().ok()
}

/// What a reaping pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReapReport {
    /// PIDs a kill was successfully issued for.
    pub killed: Vec<u32>,
    /// Listing lines that could not be parsed and were skipped.
    pub unparsable: usize,
    /// PIDs whose kill failed, with the reason.
    pub failures: Vec<(u32, String)>,
}

impl ReapReport {
    /// No kill attempt failed.
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    /// Count of kill attempts issued.
    pub fn attempts(&self) -> usize {
        self.killed.len() + self.failures.len()
    }
}

/// OS operations the reaper relies on.
pub trait ProcessControl: Send + Sync {
    /// Raw socket listing text.
    fn socket_listing(&self) -> Result<String, ProcessControlError>;

    /// Forcefully terminates `pid` (and its tree where the platform supports it). A PID that
    /// no longer exists counts as success.
    fn kill_pid(&self, pid: u32) -> Result<(), ProcessControlError>;

    /// Kills whatever owns a window with this title, returning the PIDs it identified (empty
    /// when the platform kills by filter without reporting PIDs, or has no window titles).
    fn kill_signature(&self, signature: &str) -> Result<Vec<u32>, ProcessControlError>;

    /// Whether `pid` refers to a live process.
    fn is_alive(&self, pid: u32) -> bool;
}

/// [`ProcessControl`] backed by the real operating system.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemProcessControl {
    platform: Platform,
}

impl SystemProcessControl {
    pub fn new(platform: Platform) -> Self {
        Self { platform }
    }
}

impl ProcessControl for SystemProcessControl {
    fn socket_listing(&self) -> Result<String, ProcessControlError> {
        let spec = LaunchSpec::new(self.platform.socket_listing()).output(OutputMode::Capture);
        let output = launcher::run_checked(&spec, Some(LISTING_TIMEOUT))?;
        if !output.stderr.trim().is_empty() {
            debug!("Socket listing stderr: {}", output.stderr.trim());
        }
        Ok(output.stdout)
    }

    fn kill_pid(&self, pid: u32) -> Result<(), ProcessControlError> {
        match self.platform.force_kill(pid) {
            Some(command) => {
                let spec = LaunchSpec::new(command).output(OutputMode::Capture);
                let output = launcher::run(&spec, Some(LISTING_TIMEOUT))?;
                info!(
                    "taskkill for PID {pid} exited with {:?}: {}",
                    output.status,
                    output.stdout.trim()
                );
                if output.success() || !self.is_alive(pid) {
                    Ok(())
                } else {
                    Err(ProcessControlError::CommandFailed {
                        command: spec.command.to_string(),
                        status: output.status,
                        stderr: output.stderr.trim().to_string(),
                    })
                }
            }
            #[cfg(unix)]
            None => signal_tree(pid, Signal::SIGKILL),
            #[cfg(not(unix))]
            None => Err(ProcessControlError::Unsupported(
                "signal-based kill on a non-Unix host".into(),
            )),
        }
    }

    fn kill_signature(&self, signature: &str) -> Result<Vec<u32>, ProcessControlError> {
        if let Some(command) = self.platform.kill_window(signature) {
            let spec = LaunchSpec::new(command).output(OutputMode::Capture);
            let output = launcher::run(&spec, Some(LISTING_TIMEOUT))?;
            info!(
                "Window kill for '{signature}' exited with {:?}: {} {}",
                output.status,
                output.stdout.trim(),
                output.stderr.trim()
            );
            return Ok(Vec::new());
        }

        info!("No window titles on {:?}; nothing killed for '{signature}'", self.platform);
        Ok(Vec::new())
    }

    fn is_alive(&self, pid: u32) -> bool {
        is_pid_alive(pid)
    }
}

/// Liveness check for an arbitrary PID.
pub fn is_pid_alive(pid: u32) -> bool {
    #[cfg(unix)]
    {
        let Ok(raw) = i32::try_from(pid) else {
            return false;
        };
        !matches!(
            nix::sys::signal::kill(nix::unistd::Pid::from_raw(raw), None),
            Err(nix::errno::Errno::ESRCH)
        )
    }
    #[cfg(not(unix))]
    {
        let mut system = System::new();
        system.refresh_processes(
            ProcessesToUpdate::Some(&[sysinfo::Pid::from_u32(pid)]),
            true,
        );
        system.process(sysinfo::Pid::from_u32(pid)).is_some()
    }
}

/// Sends `signal` to the process group of `pid` (when it is not ours) and then to `pid`
/// itself. A process that is already gone counts as success.
#[cfg(unix)]
pub(crate) fn signal_tree(pid: u32, signal: Signal) -> Result<(), ProcessControlError> {
    use nix::{errno::Errno, sys::signal::kill, unistd::Pid};

    fn errno_to_kill_error(pid: u32, err: Errno) -> ProcessControlError {
        ProcessControlError::Kill {
            pid,
            source: std::io::Error::from_raw_os_error(err as i32),
        }
    }

    let raw = i32::try_from(pid).map_err(|_| ProcessControlError::Kill {
        pid,
        source: std::io::Error::other("PID exceeds the platform's pid_t range"),
    })?;
    let target = Pid::from_raw(raw);

    match kill(target, None) {
        Ok(()) => {}
        Err(Errno::ESRCH) => {
            debug!("PID {pid} already gone");
            return Ok(());
        }
        Err(err) => return Err(errno_to_kill_error(pid, err)),
    }

    let supervisor_pgid = unsafe { libc::getpgid(0) };
    let target_pgid = unsafe { libc::getpgid(raw) };
    if target_pgid > 0 && target_pgid != supervisor_pgid {
        let kill_result = unsafe { libc::killpg(target_pgid, signal as libc::c_int) };
        if kill_result < 0 {
            let err = std::io::Error::last_os_error();
            match err.raw_os_error() {
                Some(code) if code == libc::ESRCH => {}
                Some(code) if code == libc::EPERM => {
                    warn!(
                        "Insufficient permissions to signal process group {target_pgid}; falling back to direct signal"
                    );
                }
                _ => return Err(ProcessControlError::Kill { pid, source: err }),
            }
        } else {
            debug!("Sent {signal} to process group {target_pgid}");
        }
    }

    match kill(target, Some(signal)) {
        Ok(()) => Ok(()),
        Err(Errno::ESRCH) => {
            debug!("PID {pid} exited before {signal} could be delivered");
            Ok(())
        }
        Err(err) => Err(errno_to_kill_error(pid, err)),
    }
}

/// Finds and terminates processes that outlived a graceful stop.
#[derive(Debug, Clone, Default)]
pub struct Reaper<C = SystemProcessControl> {
    control: C,
}

impl Reaper<SystemProcessControl> {
    /// Reaper over the real OS for `platform`.
    pub fn system(platform: Platform) -> Self {
        Self::new(SystemProcessControl::new(platform))
    }
}

impl<C: ProcessControl> Reaper<C> {
    pub fn new(control: C) -> Self {
        Self { control }
    }

    pub fn control(&self) -> &C {
        &self.control
    }

    /// Kills the process behind every listing line that binds `port` in one of `states`. A PID
    /// that appears on several lines gets one kill attempt per line.
    ///
    /// Unparsable listing lines are logged and counted. A failed kill is recorded in the
    /// report and does not stop the remaining kills. Only a failure to obtain the listing
    /// itself is an error.
    pub fn kill_by_port(
        &self,
        port: u16,
        states: &[SocketState],
    ) -> Result<ReapReport, ProcessControlError> {
        let listing = self.control.socket_listing()?;
        let own_pid = std::process::id();
        let mut report = ReapReport::default();

        for line in listing.lines() {
            if line.trim().is_empty() {
                continue;
            }
            let Some(entry) = parse_socket_line(line) else {
                report.unparsable += 1;
                debug!("Skipping unparsable socket line: {}", line.trim());
                continue;
            };
            if !entry.matches(port, states) {
                continue;
            }
            if entry.pid == 0 || entry.pid == own_pid {
                debug!("Ignoring PID {} on port {port}", entry.pid);
                continue;
            }

            info!(
                "Killing PID {} holding port {port} ({})",
                entry.pid,
                entry.state.map(|s| s.as_ref().to_string()).unwrap_or_else(|| "stateless".into())
            );
            match self.control.kill_pid(entry.pid) {
                Ok(()) => report.killed.push(entry.pid),
                Err(err) => {
                    warn!("Failed to kill PID {} on port {port}: {err}", entry.pid);
                    report.failures.push((entry.pid, err.to_string()));
                }
            }
        }

        if report.unparsable > 0 {
            info!(
                "Skipped {} unparsable socket listing line(s) while reaping port {port}",
                report.unparsable
            );
        }
        if report.attempts() == 0 {
            info!("No process holds port {port} in states {states:?}");
        }
        Ok(report)
    }

    /// Forcefully terminates a single PID.
    pub fn kill_by_pid(&self, pid: u32) -> Result<(), ProcessControlError> {
        info!("Killing PID {pid}");
        self.control.kill_pid(pid)
    }

    /// Kills processes by window title. Only Windows has titles; elsewhere nothing is killed.
    pub fn kill_by_window_title(&self, title: &str) -> Result<ReapReport, ProcessControlError> {
        let killed = self.control.kill_signature(title)?;
        Ok(ReapReport {
            killed,
            ..ReapReport::default()
        })
    }
}
