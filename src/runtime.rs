//! Runtime paths and process-wide state.
//!
//! Backups, manifests and per-service lock files live under a state directory chosen on
//! first use: `~/.local/share/lifeguard` in user mode, `/var/lib/lifeguard` in system mode.
use std::{
    env,
    path::{Path, PathBuf},
    sync::{OnceLock, RwLock},
};

/// Where to store state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeMode {
    /// User home dir (~/.local/share/lifeguard).
    User,
    /// System dirs (/var/lib/lifeguard).
    System,
}

#[derive(Debug, Clone)]
struct RuntimeContext {
    mode: RuntimeMode,
    state_dir: PathBuf,
}

static CONTEXT: OnceLock<RwLock<RuntimeContext>> = OnceLock::new();

fn context_lock() -> &'static RwLock<RuntimeContext> {
    CONTEXT.get_or_init(|| RwLock::new(RuntimeContext::from_mode(RuntimeMode::User)))
}

fn read_context() -> RuntimeContext {
    context_lock()
        .read()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .clone()
}

fn write_context(context: RuntimeContext) {
    let mut guard = context_lock()
        .write()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    *guard = context;
}

impl RuntimeContext {
    fn from_mode(mode: RuntimeMode) -> Self {
        match mode {
            RuntimeMode::User => Self::user_directories(),
            RuntimeMode::System => Self {
                mode,
                state_dir: PathBuf::from("/var/lib/lifeguard"),
            },
        }
    }

    fn user_directories() -> Self {
        let home = env::var_os("HOME")
            .or_else(|| env::var_os("USERPROFILE"))
            .map(PathBuf::from)
            .unwrap_or_else(env::temp_dir);
        Self::from_user_home(&home)
    }

    fn from_user_home(home: &Path) -> Self {
        Self {
            mode: RuntimeMode::User,
            state_dir: home.join(".local/share/lifeguard"),
        }
    }
}

/// Sets runtime mode. Re-resolves directories from the current environment.
pub fn init(mode: RuntimeMode) {
    write_context(RuntimeContext::from_mode(mode));
}

/// Returns the current runtime mode (User or System).
pub fn mode() -> RuntimeMode {
    read_context().mode
}

/// State dir.
pub fn state_dir() -> PathBuf {
    read_context().state_dir
}

/// Root under which each service's file snapshots are kept.
pub fn backup_dir() -> PathBuf {
    state_dir().join("backups")
}

/// Directory holding per-service exclusive lock files.
pub fn lock_dir() -> PathBuf {
    state_dir().join("locks")
}
