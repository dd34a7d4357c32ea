#![allow(dead_code)]

use std::{collections::HashMap, sync::Mutex};

use lifeguard::{
    error::ProcessControlError,
    reaper::ProcessControl,
    test_utils::TestListener,
};
use sysinfo::{Pid, ProcessesToUpdate, System};

pub fn is_process_alive(pid: u32) -> bool {
    let mut system = System::new();
    system.refresh_processes(ProcessesToUpdate::All, true);
    system.process(Pid::from_u32(pid)).is_some()
}

pub fn python3_available() -> bool {
    std::process::Command::new("python3")
        .arg("--version")
        .output()
        .map(|output| output.status.success())
        .unwrap_or(false)
}

/// [`ProcessControl`] that serves a fixed socket listing and records kills instead of
/// touching real processes. PIDs registered with [`ScriptedControl::hold`] own an in-process
/// listener that is closed when that PID is killed.
#[derive(Default)]
pub struct ScriptedControl {
    listing: String,
    failing: Vec<u32>,
    held: Mutex<HashMap<u32, TestListener>>,
    pub kills: Mutex<Vec<u32>>,
    pub signatures: Mutex<Vec<String>>,
}

impl ScriptedControl {
    pub fn new(listing: impl Into<String>) -> Self {
        Self {
            listing: listing.into(),
            ..Self::default()
        }
    }

    /// Kills of these PIDs report failure.
    pub fn failing(mut self, pids: &[u32]) -> Self {
        self.failing = pids.to_vec();
        self
    }

    /// `pid` is released along with `listener` when killed.
    pub fn hold(self, pid: u32, listener: TestListener) -> Self {
        self.held.lock().unwrap().insert(pid, listener);
        self
    }

    pub fn kills(&self) -> Vec<u32> {
        self.kills.lock().unwrap().clone()
    }
}

impl ProcessControl for ScriptedControl {
    fn socket_listing(&self) -> Result<String, ProcessControlError> {
        Ok(self.listing.clone())
    }

    fn kill_pid(&self, pid: u32) -> Result<(), ProcessControlError> {
        self.kills.lock().unwrap().push(pid);
        if self.failing.contains(&pid) {
            return Err(ProcessControlError::Kill {
                pid,
                source: std::io::Error::from(std::io::ErrorKind::PermissionDenied),
            });
        }
        if let Some(listener) = self.held.lock().unwrap().remove(&pid) {
            listener.close();
        }
        Ok(())
    }

    fn kill_signature(&self, signature: &str) -> Result<Vec<u32>, ProcessControlError> {
        self.signatures.lock().unwrap().push(signature.to_string());
        Ok(Vec::new())
    }

    fn is_alive(&self, pid: u32) -> bool {
        self.held.lock().unwrap().contains_key(&pid)
    }
}

/// One `netstat -tanp` style line.
pub fn linux_line(port: u16, state: &str, pid: u32) -> String {
    format!(
        "tcp        0      0 127.0.0.1:{port:<16}0.0.0.0:*               {state:<11} {pid}/java"
    )
}
