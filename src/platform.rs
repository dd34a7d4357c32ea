//! Operating-system capabilities the supervisor depends on.
//!
//! Every place that would otherwise branch on the host OS asks a [`Platform`] instead: script
//! extensions, path separators, the socket listing used by the reaper, and the commands used
//! to kill processes or drive the OS service manager.
use std::{
    fmt,
    path::{MAIN_SEPARATOR, PathBuf},
    process::Command,
};

use strum_macros::{AsRefStr, EnumString};

/// Operating-system family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, AsRefStr)]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum Platform {
    /// Windows hosts (`.bat` scripts, `taskkill`, `sc`).
    Windows,
    /// Unix-likes (`.sh` scripts, signals, `systemctl`). Port reaping needs Linux `netstat`.
    Posix,
}

/// Direction of an OS service manager request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum ServiceAction {
    Start,
    Stop,
}

/// A program plus its arguments, kept separate from `std::process::Command` so descriptors
/// stay cloneable and printable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    /// Executable to run.
    pub program: String,
    /// Arguments passed verbatim.
    pub args: Vec<String>,
}

impl CommandSpec {
    /// Creates a command from a program and its arguments.
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Builds a `std::process::Command` for this spec.
    pub fn to_command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        cmd
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            if arg.contains(char::is_whitespace) {
                write!(f, " \"{arg}\"")?;
            } else {
                write!(f, " {arg}")?;
            }
        }
        Ok(())
    }
}

impl Platform {
    /// The platform this binary was compiled for.
    pub fn current() -> Self {
        if cfg!(windows) {
            Platform::Windows
        } else {
            Platform::Posix
        }
    }

    /// Appends the platform's script extension to a script stem (`bin/startup` ->
    /// `bin/startup.sh`). Stems that already carry an extension are returned unchanged.
    pub fn script(self, stem: &str) -> String {
        let file_name = stem.rsplit(['/', '\\']).next().unwrap_or(stem);
        if file_name.contains('.') {
            return stem.to_string();
        }
        match self {
            Platform::Windows => format!("{stem}.bat"),
            Platform::Posix => format!("{stem}.sh"),
        }
    }

    /// Separator used when normalising configured paths.
    pub fn path_separator(self) -> char {
        match self {
            Platform::Windows => '\\',
            Platform::Posix => '/',
        }
    }

    /// Rewrites both `/` and `\` into this platform's separator.
    ///
    /// Only applied when the platform matches the host, since `Path` itself understands the
    /// host's separator only.
    pub fn normalize_path(self, raw: &str) -> PathBuf {
        let separator = if self == Platform::current() {
            MAIN_SEPARATOR
        } else {
            self.path_separator()
        };
        let normalized: String = raw
            .trim()
            .chars()
            .map(|c| if c == '/' || c == '\\' { separator } else { c })
            .collect();
        PathBuf::from(normalized)
    }

    /// Wraps a free-form command line in the platform shell.
    pub fn shell(self, command_line: &str) -> CommandSpec {
        match self {
            Platform::Windows => CommandSpec::new("cmd", ["/C", command_line]),
            Platform::Posix => CommandSpec::new("sh", ["-c", command_line]),
        }
    }

    /// Invocation for a script path: Windows batch files go through `cmd /C`, POSIX scripts
    /// through `sh` so they need not be executable.
    pub fn script_command<I, S>(self, script: &str, args: I) -> CommandSpec
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let extra = args.into_iter().map(Into::into);
        match self {
            Platform::Windows => {
                let mut all = vec!["/C".to_string(), script.to_string()];
                all.extend(extra);
                CommandSpec::new("cmd", all)
            }
            Platform::Posix => {
                let mut all = vec![script.to_string()];
                all.extend(extra);
                CommandSpec::new("sh", all)
            }
        }
    }

    /// Socket listing whose lines carry local address, state and owning PID.
    ///
    /// The POSIX form is Linux `netstat` (net-tools), where `-p` adds the owning PID. BSD/macOS
    /// `netstat` rejects it, so port reaping there fails with the listing error.
    pub fn socket_listing(self) -> CommandSpec {
        match self {
            Platform::Windows => CommandSpec::new("netstat", ["-ano"]),
            Platform::Posix => CommandSpec::new("netstat", ["-tanp"]),
        }
    }

    /// Forced tree kill of a single PID. POSIX kills go through signals instead.
    pub fn force_kill(self, pid: u32) -> Option<CommandSpec> {
        match self {
            Platform::Windows => Some(CommandSpec::new(
                "taskkill",
                ["/F".to_string(), "/T".into(), "/PID".into(), pid.to_string()],
            )),
            Platform::Posix => None,
        }
    }

    /// Polite tree termination (`taskkill` without `/F`). POSIX sends SIGTERM instead.
    pub fn terminate(self, pid: u32) -> Option<CommandSpec> {
        match self {
            Platform::Windows => Some(CommandSpec::new(
                "taskkill",
                ["/T".to_string(), "/PID".into(), pid.to_string()],
            )),
            Platform::Posix => None,
        }
    }

    /// Kill by window title. POSIX has no window titles.
    pub fn kill_window(self, title: &str) -> Option<CommandSpec> {
        match self {
            Platform::Windows => Some(CommandSpec::new(
                "taskkill",
                [
                    "/F".to_string(),
                    "/FI".into(),
                    format!("WINDOWTITLE eq {title}"),
                ],
            )),
            Platform::Posix => None,
        }
    }

    /// Request to the OS service manager.
    pub fn service_command(self, action: ServiceAction, service_name: &str) -> CommandSpec {
        match self {
            Platform::Windows => CommandSpec::new("sc", [action.as_ref(), service_name]),
            Platform::Posix => CommandSpec::new("systemctl", [action.as_ref(), service_name]),
        }
    }
}

impl Default for Platform {
    fn default() -> Self {
        Self::current()
    }
}
