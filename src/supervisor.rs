//! Lifecycle control for one external service used as a test fixture.
//!
//! A [`Supervisor`] owns a validated [`ServiceDescriptor`] and drives the service through
//! `Stopped -> Starting -> Running -> Stopping -> Stopped`. Waits are blocking polls bounded by
//! the descriptor's timeouts. When a graceful stop does not clear the service, the
//! [`Reaper`] reclaims whatever still holds its window, ports, PID file or spawned process.
use std::{
    fs::{self, File, OpenOptions},
    io::{self, Write},
    path::{Path, PathBuf},
    process::Child,
    sync::{Mutex, MutexGuard},
    time::Duration,
};

use fs2::FileExt;
#[cfg(unix)]
use nix::sys::signal::Signal;
use serde::Serialize;
use strum_macros::AsRefStr;
use tracing::{debug, error, info, warn};

use crate::{
    backup::BackupSet,
    config::Settings,
    descriptor::{ReadinessSignal, ServiceDescriptor, StopStrategy},
    error::{ProcessControlError, SupervisorError},
    launcher::{self, LaunchSpec, OutputMode},
    logs,
    platform::{CommandSpec, Platform, ServiceAction},
    probe::{self, POLL_INTERVAL},
    reaper::{self, ProcessControl, Reaper, SystemProcessControl},
    retry::RetryPolicy,
    runtime, variants,
};

/// How long forcibly killed processes get to release their ports.
const FALLBACK_GRACE: Duration = Duration::from_secs(5);

/// Log lines echoed when a startup times out.
const DIAGNOSTIC_TAIL: usize = 20;

/// Where a supervised service is in its lifecycle. Held in memory only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, AsRefStr, Serialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    Stopped,
    Starting,
    Running,
    Stopping,
    /// A start or stop timed out or failed.
    Failed,
}

#[derive(Debug)]
struct Inner {
    state: LifecycleState,
    child: Option<Child>,
    backup: Option<BackupSet>,
}

/// Starts, waits on, stops and reclaims a single service.
pub struct Supervisor<C: ProcessControl = SystemProcessControl> {
    descriptor: ServiceDescriptor,
    platform: Platform,
    reaper: Reaper<C>,
    backup_root: PathBuf,
    lock_file: PathBuf,
    inner: Mutex<Inner>,
}

impl Supervisor<SystemProcessControl> {
    /// Supervisor acting on the real operating system.
    pub fn new(descriptor: ServiceDescriptor, platform: Platform) -> Result<Self, SupervisorError> {
        Self::with_control(descriptor, platform, SystemProcessControl::new(platform))
    }

    /// Builds the descriptor configured under `services.<name>` and wraps it.
    pub fn from_settings(
        name: &str,
        settings: &Settings,
        platform: Platform,
    ) -> Result<Self, SupervisorError> {
        let descriptor = variants::descriptor_from_settings(name, settings, platform)?;
        Self::new(descriptor, platform)
    }
}

impl<C: ProcessControl> Supervisor<C> {
    /// Validates `descriptor` and binds it to `control` for forced termination.
    pub fn with_control(
        descriptor: ServiceDescriptor,
        platform: Platform,
        control: C,
    ) -> Result<Self, SupervisorError> {
        descriptor.validate()?;
        let backup_root = runtime::backup_dir().join(&descriptor.name);
        let lock_file = runtime::lock_dir().join(format!("{}.lock", descriptor.name));
        Ok(Self {
            descriptor,
            platform,
            reaper: Reaper::new(control),
            backup_root,
            lock_file,
            inner: Mutex::new(Inner {
                state: LifecycleState::Stopped,
                child: None,
                backup: None,
            }),
        })
    }

    /// Keeps snapshots and the lock file under `dir` instead of the runtime state directory.
    pub fn with_state_dir(mut self, dir: &Path) -> Self {
        self.backup_root = dir.join("backups").join(&self.descriptor.name);
        self.lock_file = dir
            .join("locks")
            .join(format!("{}.lock", self.descriptor.name));
        self
    }

    pub fn descriptor(&self) -> &ServiceDescriptor {
        &self.descriptor
    }

    pub fn reaper(&self) -> &Reaper<C> {
        &self.reaper
    }

    pub fn backup_root(&self) -> &Path {
        &self.backup_root
    }

    pub fn state(&self) -> LifecycleState {
        self.inner().state
    }

    /// Ports that must all be reachable for the service to count as up.
    pub fn service_ports(&self) -> &[u16] {
        &self.descriptor.required_ports
    }

    pub fn service_logs(&self) -> &[PathBuf] {
        &self.descriptor.log_paths
    }

    pub fn service_files_to_backup(&self) -> &[PathBuf] {
        &self.descriptor.backup_paths
    }

    /// PID of the process launched by the last `start`, if it has not exited.
    pub fn child_pid(&self) -> Option<u32> {
        let mut inner = self.inner();
        let child = inner.child.as_mut()?;
        matches!(child.try_wait(), Ok(None)).then(|| child.id())
    }

    fn inner(&self) -> MutexGuard<'_, Inner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn set_state(&self, state: LifecycleState) {
        let mut inner = self.inner();
        if inner.state != state {
            debug!(
                "'{}' {} -> {}",
                self.descriptor.name,
                inner.state.as_ref(),
                state.as_ref()
            );
            inner.state = state;
        }
    }

    fn missing(&self, key: &str) -> SupervisorError {
        SupervisorError::ConfigurationMissing {
            service: self.descriptor.name.clone(),
            key: key.to_string(),
        }
    }

    fn os_service_command(&self, action: ServiceAction) -> Result<CommandSpec, SupervisorError> {
        let service = self
            .descriptor
            .service_name
            .as_deref()
            .ok_or_else(|| self.missing("service_name"))?;
        Ok(self.platform.service_command(action, service))
    }

    /// Launches the service without waiting for it.
    pub fn start(&self) -> Result<(), SupervisorError> {
        let descriptor = &self.descriptor;
        let command = if descriptor.run_as_os_service {
            self.os_service_command(ServiceAction::Start)?
        } else {
            descriptor
                .start_command
                .clone()
                .ok_or_else(|| self.missing("start_command"))?
        };
        let spec = LaunchSpec::new(command)
            .working_dir(descriptor.start_working_directory.clone())
            .env(descriptor.environment.clone());

        let mut inner = self.inner();
        if let Some(previous) = inner.child.as_mut()
            && matches!(previous.try_wait(), Ok(None))
        {
            warn!(
                "'{}' already has a live start process (PID {}); tracking the new one",
                descriptor.name,
                previous.id()
            );
        }
        inner.state = LifecycleState::Starting;

        match launcher::spawn(&spec) {
            Ok(child) => {
                info!(
                    "Started '{}' with `{}` (PID {})",
                    descriptor.name,
                    spec.command,
                    child.id()
                );
                inner.child = Some(child);
                Ok(())
            }
            Err(err) => {
                error!("Failed to start '{}': {err}", descriptor.name);
                inner.state = LifecycleState::Failed;
                Err(err.into())
            }
        }
    }

    /// Blocks until the service is ready or `start_timeout` elapses.
    ///
    /// Readiness is, in order of precedence: every required port reachable (plus the ready
    /// marker when one is configured), the ready marker alone, a live PID in the PID file, or
    /// a successful exit of the start command. A timeout leaves the process running.
    pub fn wait_to_start(&self) -> Result<(), SupervisorError> {
        let descriptor = &self.descriptor;
        let timeout = descriptor.start_timeout;
        info!(
            "Waiting up to {timeout:?} for '{}' to become ready",
            descriptor.name
        );

        let ready = match descriptor.readiness() {
            ReadinessSignal::Ports => probe::poll_until(timeout, POLL_INTERVAL, || {
                probe::all_reachable(&descriptor.host, &descriptor.required_ports)
                    && self.marker_seen()
            }),
            ReadinessSignal::LogMarker => descriptor.ready_marker.as_ref().is_none_or(|marker| {
                logs::wait_for_match(
                    &marker.log,
                    &marker.pattern,
                    RetryPolicy::within(timeout, POLL_INTERVAL),
                )
                .is_ok()
            }),
            ReadinessSignal::PidFile => probe::poll_until(timeout, POLL_INTERVAL, || {
                self.pid_file_pid()
                    .is_some_and(|pid| self.reaper.control().is_alive(pid))
            }),
            ReadinessSignal::ExitCode => return self.wait_for_start_exit(),
        };

        if ready {
            self.set_state(LifecycleState::Running);
            info!("'{}' is ready", descriptor.name);
            Ok(())
        } else {
            Err(self.startup_timeout(self.unmet_conditions().join("; ")))
        }
    }

    fn wait_for_start_exit(&self) -> Result<(), SupervisorError> {
        let descriptor = &self.descriptor;
        if self.inner().child.is_none() {
            return Err(self.startup_timeout("no start process has been launched".into()));
        }

        let mut outcome = None;
        let finished = probe::poll_until(descriptor.start_timeout, POLL_INTERVAL, || {
            let mut inner = self.inner();
            let Some(child) = inner.child.as_mut() else {
                return false;
            };
            match child.try_wait() {
                Ok(None) => false,
                Ok(Some(status)) => {
                    outcome = Some(Ok(status));
                    true
                }
                Err(err) => {
                    outcome = Some(Err(err));
                    true
                }
            }
        });

        match outcome {
            Some(Ok(status)) if status.success() => {
                self.set_state(LifecycleState::Running);
                info!("Start command for '{}' completed", descriptor.name);
                Ok(())
            }
            Some(Ok(status)) => {
                self.set_state(LifecycleState::Failed);
                Err(ProcessControlError::CommandFailed {
                    command: self.start_command_display(),
                    status: status.code(),
                    stderr: String::new(),
                }
                .into())
            }
            Some(Err(source)) => {
                self.set_state(LifecycleState::Failed);
                Err(ProcessControlError::Wait {
                    command: self.start_command_display(),
                    source,
                }
                .into())
            }
            None => {
                debug_assert!(!finished);
                Err(self.startup_timeout("start command is still running".into()))
            }
        }
    }

    fn start_command_display(&self) -> String {
        self.descriptor
            .start_command
            .as_ref()
            .map(ToString::to_string)
            .unwrap_or_else(|| self.descriptor.name.clone())
    }

    fn marker_seen(&self) -> bool {
        self.descriptor
            .ready_marker
            .as_ref()
            .is_none_or(|marker| logs::contains_match(&marker.log, &marker.pattern))
    }

    fn unmet_conditions(&self) -> Vec<String> {
        let descriptor = &self.descriptor;
        let mut unmet = Vec::new();

        let down: Vec<u16> = descriptor
            .required_ports
            .iter()
            .copied()
            .filter(|port| !probe::is_reachable(&descriptor.host, *port))
            .collect();
        if !down.is_empty() {
            unmet.push(format!(
                "port(s) {down:?} not reachable on {}",
                descriptor.host
            ));
        }
        if let Some(marker) = &descriptor.ready_marker
            && !logs::contains_match(&marker.log, &marker.pattern)
        {
            unmet.push(format!(
                "'{}' not found in {}",
                marker.pattern.as_str(),
                marker.log.display()
            ));
        }
        if descriptor.readiness() == ReadinessSignal::PidFile
            && let Some(pid_file) = &descriptor.pid_file
        {
            unmet.push(format!("no live process recorded in {}", pid_file.display()));
        }
        if unmet.is_empty() {
            unmet.push("readiness was only reached after the deadline".into());
        }
        unmet
    }

    fn startup_timeout(&self, detail: String) -> SupervisorError {
        self.set_state(LifecycleState::Failed);
        self.log_diagnostics();
        warn!(
            "'{}' did not become ready within {:?}: {detail}",
            self.descriptor.name, self.descriptor.start_timeout
        );
        SupervisorError::StartupTimeout {
            service: self.descriptor.name.clone(),
            timeout: self.descriptor.start_timeout,
            detail,
        }
    }

    fn log_diagnostics(&self) {
        for log in &self.descriptor.log_paths {
            match logs::tail(log, DIAGNOSTIC_TAIL) {
                Ok(lines) if !lines.is_empty() => {
                    warn!("Last lines of {}:\n{}", log.display(), lines.join("\n"))
                }
                Ok(_) => debug!("{} is empty", log.display()),
                Err(err) => debug!("{err}"),
            }
        }
    }

    fn pid_file_pid(&self) -> Option<u32> {
        let path = self.descriptor.pid_file.as_ref()?;
        let content = fs::read_to_string(path).ok()?;
        let pid = content.trim().parse::<u32>().ok()?;
        (pid != 0).then_some(pid)
    }

    /// Liveness of the tracked process: the spawned child while it runs, otherwise the PID
    /// file. `None` when nothing is tracked.
    fn tracked_alive(&self) -> Option<bool> {
        {
            let mut inner = self.inner();
            if let Some(child) = inner.child.as_mut() {
                match child.try_wait() {
                    Ok(None) => return Some(true),
                    Ok(Some(_)) => {}
                    Err(err) => debug!("Unable to poll PID {}: {err}", child.id()),
                }
            }
        }
        self.pid_file_pid()
            .map(|pid| self.reaper.control().is_alive(pid))
    }

    /// Non-blocking. True when none of the required ports is reachable; for services without
    /// ports, when no tracked process is alive.
    pub fn is_stopped(&self) -> bool {
        let descriptor = &self.descriptor;
        if descriptor.required_ports.is_empty() {
            !self.tracked_alive().unwrap_or(false)
        } else {
            probe::none_reachable(&descriptor.host, &descriptor.required_ports)
        }
    }

    /// Asks the service to shut down without waiting for it. A no-op for stop-protected
    /// services.
    pub fn stop(&self) -> Result<(), SupervisorError> {
        let descriptor = &self.descriptor;
        if descriptor.stop_protected {
            info!(
                "'{}' is stop-protected; leaving it running",
                descriptor.name
            );
            return Ok(());
        }

        self.set_state(LifecycleState::Stopping);
        let strategy = descriptor.stop_strategy();
        info!("Stopping '{}' ({strategy:?})", descriptor.name);
        let result = match strategy {
            StopStrategy::OsService => self.stop_os_service(),
            StopStrategy::Command => self.run_stop_command(),
            StopStrategy::Signal => self.signal_tracked(),
        };
        if let Err(err) = &result {
            error!("Failed to stop '{}': {err}", descriptor.name);
            self.set_state(LifecycleState::Failed);
        }
        result
    }

    fn stop_os_service(&self) -> Result<(), SupervisorError> {
        let spec = LaunchSpec::new(self.os_service_command(ServiceAction::Stop)?)
            .output(OutputMode::Capture);
        launcher::run_checked(&spec, Some(self.descriptor.stop_timeout))?;
        Ok(())
    }

    fn run_stop_command(&self) -> Result<(), SupervisorError> {
        let descriptor = &self.descriptor;
        let Some(command) = descriptor.stop_command.clone() else {
            return self.signal_tracked();
        };
        let spec = LaunchSpec::new(command)
            .working_dir(descriptor.stop_working_directory.clone())
            .env(descriptor.environment.clone());
        let output = launcher::run(&spec, Some(descriptor.stop_timeout))?;
        if output.timed_out {
            warn!(
                "Stop command for '{}' did not finish within {:?}",
                descriptor.name, descriptor.stop_timeout
            );
        } else if !output.success() {
            warn!(
                "Stop command for '{}' exited with {:?}",
                descriptor.name, output.status
            );
        }
        Ok(())
    }

    fn signal_tracked(&self) -> Result<(), SupervisorError> {
        let Some(pid) = self.child_pid().or_else(|| self.pid_file_pid()) else {
            info!(
                "'{}' has no tracked process to signal",
                self.descriptor.name
            );
            return Ok(());
        };
        match self.platform.terminate(pid) {
            Some(command) => {
                let spec = LaunchSpec::new(command).output(OutputMode::Capture);
                let output = launcher::run(&spec, Some(self.descriptor.stop_timeout))?;
                debug!(
                    "taskkill for PID {pid} exited with {:?}: {}",
                    output.status,
                    output.stdout.trim()
                );
            }
            #[cfg(unix)]
            None => reaper::signal_tree(pid, Signal::SIGTERM)?,
            #[cfg(not(unix))]
            None => {
                return Err(ProcessControlError::Unsupported(
                    "signal-based termination on a non-Unix host".into(),
                )
                .into());
            }
        }
        Ok(())
    }

    /// Blocks until the service is down. After `stop_timeout` the reaper kills whatever still
    /// holds the service's window, ports, PID file or spawned process, and the service gets a
    /// short grace period to disappear. A no-op for stop-protected services.
    pub fn wait_to_stop(&self) -> Result<(), SupervisorError> {
        let descriptor = &self.descriptor;
        if descriptor.stop_protected {
            debug!("'{}' is stop-protected; not waiting", descriptor.name);
            return Ok(());
        }

        if probe::poll_until(descriptor.stop_timeout, POLL_INTERVAL, || self.is_stopped()) {
            self.mark_stopped();
            info!("'{}' stopped", descriptor.name);
            return Ok(());
        }

        warn!(
            "'{}' still running after {:?}; killing it",
            descriptor.name, descriptor.stop_timeout
        );
        let mut failures = Vec::new();
        if !self.reclaim(&mut failures) {
            self.set_state(LifecycleState::Failed);
            return Err(SupervisorError::ShutdownTimeout {
                service: descriptor.name.clone(),
                timeout: descriptor.stop_timeout,
            });
        }

        if probe::poll_until(FALLBACK_GRACE, POLL_INTERVAL, || self.is_stopped()) {
            warn!("'{}' had to be killed", descriptor.name);
            self.mark_stopped();
            return Ok(());
        }

        self.set_state(LifecycleState::Failed);
        let mut reason = self.still_running();
        if !failures.is_empty() {
            reason.push_str("; kill failures: ");
            reason.push_str(&failures.join("; "));
        }
        Err(SupervisorError::ShutdownFailed {
            service: descriptor.name.clone(),
            reason,
        })
    }

    /// Runs every applicable reaper strategy. Returns whether any process was targeted.
    fn reclaim(&self, failures: &mut Vec<String>) -> bool {
        let descriptor = &self.descriptor;
        let mut targeted = false;

        if let Some(title) = &descriptor.window_title {
            match self.reaper.kill_by_window_title(title) {
                Ok(report) => {
                    // Windows kills by filter and reports no PIDs.
                    targeted |= !report.killed.is_empty() || self.platform == Platform::Windows;
                }
                Err(err) => failures.push(format!("window '{title}': {err}")),
            }
        }

        for port in &descriptor.required_ports {
            match self.reaper.kill_by_port(*port, &descriptor.kill_states) {
                Ok(report) => {
                    targeted |= report.attempts() > 0;
                    failures.extend(
                        report
                            .failures
                            .iter()
                            .map(|(pid, err)| format!("PID {pid} on port {port}: {err}")),
                    );
                }
                Err(err) => failures.push(format!("port {port}: {err}")),
            }
        }

        if let Some(pid) = self.pid_file_pid()
            && self.reaper.control().is_alive(pid)
        {
            targeted = true;
            if let Err(err) = self.reaper.kill_by_pid(pid) {
                failures.push(format!("PID {pid} from PID file: {err}"));
            }
        }

        if let Some(pid) = self.child_pid() {
            targeted = true;
            if let Err(err) = self.reaper.kill_by_pid(pid) {
                failures.push(format!("spawned PID {pid}: {err}"));
            }
        }

        targeted
    }

    fn still_running(&self) -> String {
        let descriptor = &self.descriptor;
        let up: Vec<u16> = descriptor
            .required_ports
            .iter()
            .copied()
            .filter(|port| probe::is_reachable(&descriptor.host, *port))
            .collect();
        if up.is_empty() {
            "tracked process is still alive".to_string()
        } else {
            format!("port(s) {up:?} still reachable on {}", descriptor.host)
        }
    }

    fn mark_stopped(&self) {
        let mut inner = self.inner();
        let exited = inner
            .child
            .as_mut()
            .is_some_and(|child| !matches!(child.try_wait(), Ok(None)));
        if exited {
            inner.child = None;
        }
        inner.state = LifecycleState::Stopped;
    }

    /// Snapshots every backup path. A snapshot left behind by an earlier run that never
    /// restored is put back first.
    pub fn backup_service_files(&self) -> Result<(), SupervisorError> {
        let descriptor = &self.descriptor;
        if descriptor.backup_paths.is_empty() {
            debug!("'{}' has no files to back up", descriptor.name);
            return Ok(());
        }
        if let Some(stale) = BackupSet::load(&self.backup_root)? {
            warn!(
                "Restoring unrestored snapshot of '{}' taken at {}",
                descriptor.name, stale.created_at
            );
            stale.restore()?;
            stale.discard()?;
        }
        let set = BackupSet::capture(&descriptor.name, &descriptor.backup_paths, &self.backup_root)?;
        self.inner().backup = Some(set);
        Ok(())
    }

    /// Copies the snapshot back and deletes it. Also restores a snapshot written by another
    /// process, such as an earlier `lguard start`.
    pub fn restore_service_files(&self) -> Result<(), SupervisorError> {
        let held = self.inner().backup.take();
        let set = match held {
            Some(set) => set,
            None => match BackupSet::load(&self.backup_root)? {
                Some(set) => set,
                None => {
                    debug!("No snapshot to restore for '{}'", self.descriptor.name);
                    return Ok(());
                }
            },
        };
        if let Err(err) = set.restore() {
            self.inner().backup = Some(set);
            return Err(err);
        }
        set.discard()
    }

    /// Stops the service and restores its files. Files are restored even when stopping
    /// fails; the stop error takes precedence.
    pub fn teardown(&self) -> Result<(), SupervisorError> {
        let stopped = self.stop().and_then(|()| self.wait_to_stop());
        if let Err(err) = &stopped {
            error!("Failed to stop '{}': {err}", self.descriptor.name);
        }
        let restored = self.restore_service_files();
        stopped.and(restored)
    }

    /// Backs up, starts and waits for the service, returning a guard that tears it down.
    ///
    /// The guard holds an exclusive lock on the service, so a second `setup` of the same
    /// service from any process fails with [`SupervisorError::AlreadyManaged`]. Files are
    /// restored if startup fails.
    pub fn setup(&self) -> Result<ServiceFixture<'_, C>, SupervisorError> {
        let lock = self.acquire_lock()?;
        self.backup_service_files()?;

        if let Err(err) = self.start().and_then(|()| self.wait_to_start()) {
            error!("Setup of '{}' failed: {err}", self.descriptor.name);
            if let Err(restore_err) = self.restore_service_files() {
                error!(
                    "Failed to restore files of '{}': {restore_err}",
                    self.descriptor.name
                );
            }
            return Err(err);
        }

        Ok(ServiceFixture {
            supervisor: self,
            lock: Some(lock),
            torn_down: false,
        })
    }

    fn acquire_lock(&self) -> Result<File, SupervisorError> {
        let lock_err = |source: io::Error| SupervisorError::LockFailed {
            path: self.lock_file.clone(),
            source,
        };

        if let Some(dir) = self.lock_file.parent() {
            fs::create_dir_all(dir).map_err(lock_err)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(&self.lock_file)
            .map_err(lock_err)?;

        match file.try_lock_exclusive() {
            Ok(()) => {}
            Err(err) if err.raw_os_error() == fs2::lock_contended_error().raw_os_error() => {
                return Err(SupervisorError::AlreadyManaged {
                    service: self.descriptor.name.clone(),
                    lock: self.lock_file.clone(),
                });
            }
            Err(err) => return Err(lock_err(err)),
        }

        file.set_len(0)
            .and_then(|()| writeln!(file, "{}", std::process::id()))
            .map_err(lock_err)?;
        debug!("Locked {}", self.lock_file.display());
        Ok(file)
    }
}

/// Scoped ownership of a running service, returned by [`Supervisor::setup`].
///
/// Dropping the guard without calling [`teardown`](Self::teardown) tears the service down and
/// logs any error.
pub struct ServiceFixture<'a, C: ProcessControl = SystemProcessControl> {
    supervisor: &'a Supervisor<C>,
    lock: Option<File>,
    torn_down: bool,
}

impl<'a, C: ProcessControl> ServiceFixture<'a, C> {
    pub fn supervisor(&self) -> &'a Supervisor<C> {
        self.supervisor
    }

    /// Stops the service, restores its files and releases the lock.
    pub fn teardown(mut self) -> Result<(), SupervisorError> {
        self.run_teardown()
    }

    fn run_teardown(&mut self) -> Result<(), SupervisorError> {
        self.torn_down = true;
        let result = self.supervisor.teardown();
        if let Some(lock) = self.lock.take()
            && let Err(err) = FileExt::unlock(&lock)
        {
            debug!("Failed to unlock: {err}");
        }
        result
    }
}

impl<C: ProcessControl> Drop for ServiceFixture<'_, C> {
    fn drop(&mut self) {
        if !self.torn_down
            && let Err(err) = self.run_teardown()
        {
            error!(
                "Teardown of '{}' failed: {err}",
                self.supervisor.descriptor.name
            );
        }
    }
}
