//! Command-line interface for lifeguard.
use std::str::FromStr;

use clap::{Parser, Subcommand};
use tracing::level_filters::LevelFilter;

/// Wrapper around `LevelFilter` so clap can parse log levels from either
/// string names ("info", "debug", etc.) or numeric shorthands (0-5).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LogLevelArg(LevelFilter);

impl LogLevelArg {
    /// String representation suitable for an `EnvFilter` directive.
    pub fn as_str(&self) -> &'static str {
        match self.0 {
            LevelFilter::OFF => "off",
            LevelFilter::ERROR => "error",
            LevelFilter::WARN => "warn",
            LevelFilter::INFO => "info",
            LevelFilter::DEBUG => "debug",
            LevelFilter::TRACE => "trace",
        }
    }
}

impl FromStr for LogLevelArg {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err("log level cannot be empty".into());
        }

        if let Ok(number) = trimmed.parse::<u8>() {
            let level = match number {
                0 => LevelFilter::OFF,
                1 => LevelFilter::ERROR,
                2 => LevelFilter::WARN,
                3 => LevelFilter::INFO,
                4 => LevelFilter::DEBUG,
                5 => LevelFilter::TRACE,
                _ => {
                    return Err(format!(
                        "unsupported log level number '{number}' (expected 0-5)"
                    ));
                }
            };
            return Ok(LogLevelArg(level));
        }

        let level = match trimmed.to_ascii_lowercase().as_str() {
            "off" => LevelFilter::OFF,
            "error" | "err" => LevelFilter::ERROR,
            "warn" | "warning" => LevelFilter::WARN,
            "info" => LevelFilter::INFO,
            "debug" => LevelFilter::DEBUG,
            "trace" => LevelFilter::TRACE,
            _ => return Err(format!("invalid log level '{trimmed}'")),
        };
        Ok(LogLevelArg(level))
    }
}

/// Command-line interface for lifeguard.
#[derive(Parser)]
#[command(name = "lguard", version, author)]
#[command(about = "Starts, stops and reclaims external services used as test fixtures", long_about = None)]
pub struct Cli {
    /// Override the logging verbosity for this invocation only.
    #[arg(long, value_name = "LEVEL", global = true)]
    pub log_level: Option<LogLevelArg>,

    /// Keep backups and locks under /var/lib/lifeguard instead of the user's home.
    #[arg(long = "sys", global = true)]
    pub sys: bool,

    /// The command to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands for lguard.
#[derive(Subcommand)]
pub enum Commands {
    /// Back up a service's files, start it and wait until it is ready.
    Start {
        /// Path to the configuration file.
        #[arg(short, long, default_value = "lifeguard.yaml")]
        config: String,

        /// Name of the service under `services:`.
        service: String,

        /// Return as soon as the start command has been launched.
        #[arg(long)]
        no_wait: bool,
    },

    /// Stop a service, kill it if it lingers, and restore its files.
    Stop {
        /// Path to the configuration file.
        #[arg(short, long, default_value = "lifeguard.yaml")]
        config: String,

        /// Name of the service under `services:`.
        service: String,
    },

    /// Start a service, keep it up until Ctrl-C, then tear it down.
    Run {
        /// Path to the configuration file.
        #[arg(short, long, default_value = "lifeguard.yaml")]
        config: String,

        /// Name of the service under `services:`.
        service: String,
    },

    /// Show whether configured services are up.
    Status {
        /// Path to the configuration file.
        #[arg(short, long, default_value = "lifeguard.yaml")]
        config: String,

        /// Only show this service.
        #[arg(short, long)]
        service: Option<String>,

        /// Emit machine-readable JSON output instead of a table.
        #[arg(long)]
        json: bool,
    },

    /// Print the last lines of a service's logs.
    Logs {
        /// Path to the configuration file.
        #[arg(short, long, default_value = "lifeguard.yaml")]
        config: String,

        /// Name of the service under `services:`.
        service: String,

        /// Number of lines to show per log.
        #[arg(short = 'n', long, default_value = "50")]
        lines: usize,
    },

    /// Kill every process holding a TCP port.
    KillPort {
        /// The port to reclaim.
        port: u16,

        /// Socket states to target (e.g. LISTEN, ESTABLISHED). Defaults to LISTEN.
        #[arg(long = "state", value_name = "STATE")]
        states: Vec<String>,
    },
}

/// Parses command-line arguments and returns a `Cli` struct.
pub fn parse_args() -> Cli {
    Cli::parse()
}
