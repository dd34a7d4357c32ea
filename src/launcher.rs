//! Spawns OS commands for service start/stop and captures their output.
use std::{
    collections::HashMap,
    io::Read,
    path::PathBuf,
    process::{Child, ExitStatus, Stdio},
    thread,
    time::{Duration, Instant},
};

#[cfg(unix)]
use std::os::unix::process::CommandExt;

use tracing::{debug, warn};

use crate::{error::ProcessControlError, platform::CommandSpec};

/// What to do with a launched process's standard streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputMode {
    /// Share the supervisor's stdout/stderr.
    #[default]
    Inherit,
    /// Pipe both streams back to the caller.
    Capture,
    /// Discard both streams.
    Discard,
}

/// Everything needed to launch one command.
#[derive(Debug, Clone)]
pub struct LaunchSpec {
    pub command: CommandSpec,
    pub working_dir: Option<PathBuf>,
    pub env: HashMap<String, String>,
    pub output: OutputMode,
}

impl LaunchSpec {
    pub fn new(command: CommandSpec) -> Self {
        Self {
            command,
            working_dir: None,
            env: HashMap::new(),
            output: OutputMode::Inherit,
        }
    }

    pub fn working_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.working_dir = dir;
        self
    }

    pub fn env(mut self, env: HashMap<String, String>) -> Self {
        self.env = env;
        self
    }

    pub fn output(mut self, output: OutputMode) -> Self {
        self.output = output;
        self
    }
}

/// Result of a command that was waited on.
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    /// Exit code; `None` if killed by a signal or abandoned after a timeout.
    pub status: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    /// True when the command outlived its timeout and was killed.
    pub timed_out: bool,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status == Some(0)
    }
}

/// Spawns the command without waiting for it. On Unix the child leads its own process
/// group so the whole tree can be signalled later.
pub fn spawn(spec: &LaunchSpec) -> Result<Child, ProcessControlError> {
    let mut cmd = spec.command.to_command();
    if let Some(dir) = &spec.working_dir {
        cmd.current_dir(dir);
    }
    cmd.envs(&spec.env);

    match spec.output {
        OutputMode::Inherit => {
            cmd.stdin(Stdio::null())
                .stdout(Stdio::inherit())
                .stderr(Stdio::inherit());
        }
        OutputMode::Capture => {
            cmd.stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped());
        }
        OutputMode::Discard => {
            cmd.stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(Stdio::null());
        }
    }

    #[cfg(unix)]
    cmd.process_group(0);

    debug!(
        "Launching `{}` in {:?}",
        spec.command,
        spec.working_dir.as_deref()
    );

    cmd.spawn().map_err(|source| ProcessControlError::Spawn {
        command: spec.command.to_string(),
        source,
    })
}

/// Runs the command to completion. Output is only collected in [`OutputMode::Capture`].
/// With a timeout, a command that is still running when it elapses is killed along with its
/// process group and reported with `timed_out = true`.
pub fn run(
    spec: &LaunchSpec,
    timeout: Option<Duration>,
) -> Result<CommandOutput, ProcessControlError> {
    let mut child = spawn(spec)?;
    let command = spec.command.to_string();

    let stdout_reader = child.stdout.take().map(drain);
    let stderr_reader = child.stderr.take().map(drain);

    let waited = match timeout {
        Some(duration) => wait_with_timeout(&mut child, duration),
        None => child.wait().map(Some),
    }
    .map_err(|source| ProcessControlError::Wait {
        command: command.clone(),
        source,
    })?;

    let timed_out = waited.is_none();
    if timed_out {
        warn!("`{command}` did not finish within {timeout:?}; killing it");
        #[cfg(unix)]
        {
            let pgid = nix::unistd::Pid::from_raw(child.id() as i32);
            if let Err(err) = nix::sys::signal::killpg(pgid, nix::sys::signal::SIGKILL) {
                debug!("Failed to signal process group of `{command}`: {err}");
            }
        }
        if let Err(err) = child.kill() {
            warn!("Failed to kill timed-out `{command}`: {err}");
        }
        let _ = child.wait();
    }

    let stdout = stdout_reader
        .and_then(|handle| handle.join().ok())
        .unwrap_or_default();
    let stderr = stderr_reader
        .and_then(|handle| handle.join().ok())
        .unwrap_or_default();

    Ok(CommandOutput {
        status: waited.and_then(|status| status.code()),
        stdout,
        stderr,
        timed_out,
    })
}

/// Like [`run`] but a non-zero exit or timeout becomes [`ProcessControlError::CommandFailed`].
pub fn run_checked(
    spec: &LaunchSpec,
    timeout: Option<Duration>,
) -> Result<CommandOutput, ProcessControlError> {
    let output = run(spec, timeout)?;
    if output.success() {
        Ok(output)
    } else {
        Err(ProcessControlError::CommandFailed {
            command: spec.command.to_string(),
            status: output.status,
            stderr: output.stderr.trim().to_string(),
        })
    }
}

fn drain<R: Read + Send + 'static>(mut stream: R) -> thread::JoinHandle<String> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = stream.read_to_end(&mut buf);
        String::from_utf8_lossy(&buf).into_owned()
    })
}

/// Wait for a child process with a timeout, returning `Ok(None)` on timeout.
pub fn wait_with_timeout(
    child: &mut Child,
    timeout: Duration,
) -> std::io::Result<Option<ExitStatus>> {
    let deadline = Instant::now() + timeout;

    loop {
        match child.try_wait()? {
            Some(status) => return Ok(Some(status)),
            None => {
                if Instant::now() >= deadline {
                    return Ok(None);
                }
                thread::sleep(Duration::from_millis(50));
            }
        }
    }
}
