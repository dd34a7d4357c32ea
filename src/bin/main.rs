use std::{error::Error, path::Path, sync::mpsc};

use serde::Serialize;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use lifeguard::{
    cli::{Cli, Commands, parse_args},
    config::Settings,
    logs,
    platform::Platform,
    probe,
    reaper::{Reaper, SocketState},
    runtime::{self, RuntimeMode},
    supervisor::{LifecycleState, Supervisor},
    variants,
};

fn main() -> Result<(), Box<dyn Error>> {
    let args = parse_args();
    init_logging(&args);
    if args.sys {
        runtime::init(RuntimeMode::System);
    }
    debug!(
        "Runtime mode {:?}; state under {}",
        runtime::mode(),
        runtime::state_dir().display()
    );
    let platform = Platform::current();

    match args.command {
        Commands::Start {
            config,
            service,
            no_wait,
        } => {
            let supervisor = build_supervisor(&config, &service, platform)?;
            supervisor.backup_service_files()?;
            supervisor.start()?;
            if !no_wait {
                supervisor.wait_to_start()?;
            }
        }
        Commands::Stop { config, service } => {
            let supervisor = build_supervisor(&config, &service, platform)?;
            supervisor.teardown()?;
        }
        Commands::Run { config, service } => {
            let supervisor = build_supervisor(&config, &service, platform)?;
            let (tx, rx) = mpsc::channel();
            ctrlc::set_handler(move || {
                let _ = tx.send(());
            })?;

            let fixture = supervisor.setup()?;
            info!("'{service}' is up; press Ctrl-C to stop it");
            let _ = rx.recv();
            info!("Shutting down '{service}'");
            fixture.teardown()?;
        }
        Commands::Status {
            config,
            service,
            json,
        } => {
            let settings = load_settings(&config)?;
            let names = match service {
                Some(name) => vec![name],
                None => settings.service_names(),
            };
            let reports = names
                .iter()
                .map(|name| ServiceReport::collect(name, &settings, platform))
                .collect::<Result<Vec<_>, _>>()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&reports)?);
            } else {
                print_status_table(&reports);
            }
        }
        Commands::Logs {
            config,
            service,
            lines,
        } => {
            let settings = load_settings(&config)?;
            let descriptor = variants::descriptor_from_settings(&service, &settings, platform)?;
            if descriptor.log_paths.is_empty() {
                warn!("'{service}' has no logs configured");
            }
            for path in &descriptor.log_paths {
                println!("==> {} <==", path.display());
                match logs::tail(path, lines) {
                    Ok(tail) => tail.iter().for_each(|line| println!("{line}")),
                    Err(err) => warn!("{err}"),
                }
            }
        }
        Commands::KillPort { port, states } => {
            let states = if states.is_empty() {
                vec![SocketState::Listen]
            } else {
                states
                    .iter()
                    .map(|raw| {
                        raw.parse::<SocketState>()
                            .map_err(|_| format!("unknown socket state '{raw}'"))
                    })
                    .collect::<Result<Vec<_>, _>>()?
            };
            let report = Reaper::system(platform).kill_by_port(port, &states)?;
            println!(
                "Killed {} process(es) on port {port}: {:?}",
                report.killed.len(),
                report.killed
            );
            for (pid, err) in &report.failures {
                println!("Failed to kill PID {pid}: {err}");
            }
            if !report.is_clean() {
                return Err(format!("could not reclaim port {port} completely").into());
            }
        }
    }

    Ok(())
}

fn init_logging(args: &Cli) {
    let filter = if let Some(level) = args.log_level {
        EnvFilter::new(level.as_str())
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn load_settings(config: &str) -> Result<Settings, Box<dyn Error>> {
    let settings = Settings::load(Path::new(config))?;
    info!("Loaded configuration from {config}");
    Ok(settings)
}

fn build_supervisor(
    config: &str,
    service: &str,
    platform: Platform,
) -> Result<Supervisor, Box<dyn Error>> {
    let settings = load_settings(config)?;
    Ok(Supervisor::from_settings(service, &settings, platform)?)
}

#[derive(Serialize)]
struct ServiceReport {
    name: String,
    kind: String,
    state: LifecycleState,
    ports: Vec<PortReport>,
    stop_protected: bool,
}

#[derive(Serialize)]
struct PortReport {
    port: u16,
    reachable: bool,
}

impl ServiceReport {
    /// Probes the service's ports. Services without ports report as stopped, since no PID is
    /// tracked across invocations.
    fn collect(
        name: &str,
        settings: &Settings,
        platform: Platform,
    ) -> Result<Self, Box<dyn Error>> {
        let descriptor = variants::descriptor_from_settings(name, settings, platform)?;
        let ports: Vec<PortReport> = descriptor
            .required_ports
            .iter()
            .map(|port| PortReport {
                port: *port,
                reachable: probe::is_reachable(&descriptor.host, *port),
            })
            .collect();
        let state = if !ports.is_empty() && ports.iter().all(|p| p.reachable) {
            LifecycleState::Running
        } else if ports.iter().any(|p| p.reachable) {
            LifecycleState::Failed
        } else {
            LifecycleState::Stopped
        };
        Ok(Self {
            name: name.to_string(),
            kind: descriptor.kind.as_ref().to_string(),
            state,
            ports,
            stop_protected: descriptor.stop_protected,
        })
    }
}

fn print_status_table(reports: &[ServiceReport]) {
    println!("{:<24} {:<22} {:<10} PORTS", "SERVICE", "KIND", "STATE");
    for report in reports {
        let ports = report
            .ports
            .iter()
            .map(|p| format!("{}{}", p.port, if p.reachable { "" } else { "(down)" }))
            .collect::<Vec<_>>()
            .join(",");
        println!(
            "{:<24} {:<22} {:<10} {}",
            report.name,
            report.kind,
            report.state.as_ref(),
            if ports.is_empty() { "-" } else { ports.as_str() }
        );
    }
}
