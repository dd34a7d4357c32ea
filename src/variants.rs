//! Concrete service technologies and how their descriptors are built from configuration.
//!
//! Each [`ServiceKind`] carries a [`VariantProfile`]: where its scripts, logs and mutable
//! configuration live relative to the installation home, and how its ports are discovered.
//! Any profile default can be overridden under `services.<name>.` in the configuration.
use std::{collections::HashMap, path::Path, time::Duration};

use regex::Regex;
use strum_macros::{AsRefStr, EnumIter, EnumString};
use tracing::{debug, warn};

use crate::{
    config::Settings,
    descriptor::{DEFAULT_START_TIMEOUT, DEFAULT_STOP_TIMEOUT, ReadyMarker, ServiceDescriptor},
    discovery,
    error::{ConfigError, SupervisorError},
    platform::{CommandSpec, Platform},
    reaper::SocketState,
};

/// Service technologies with built-in defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, EnumString, AsRefStr, EnumIter)]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum ServiceKind {
    /// Tomcat-style servlet container configured through `conf/server.xml`.
    ServletContainer,
    /// Application server host controller running in domain mode.
    ClusterController,
    /// JMS message broker.
    MessageBroker,
    /// ZooKeeper-style coordination service configured through `conf/zoo.cfg`.
    CoordinationService,
    /// Batch job engine; readiness is reported in its log.
    JobEngine,
    /// Content repository engine; readiness is reported in its log.
    RepositoryEngine,
    /// Integration engine usually installed as an OS service.
    ConnectivityEngine,
    /// Everything comes from configuration.
    #[default]
    Custom,
}

/// A script relative to the installation home.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Script {
    pub path: &'static str,
    pub args: &'static [&'static str],
}

const fn script(path: &'static str, args: &'static [&'static str]) -> Script {
    Script { path, args }
}

/// Where a variant's ports come from when none are configured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortSource {
    /// Only the `ports` key.
    Config,
    /// Shutdown and connector ports of a `server.xml`.
    ServerXml(&'static str),
    /// A single key in a properties file.
    Properties {
        file: &'static str,
        key: &'static str,
    },
}

/// Per-technology defaults. Paths are relative to the service home.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariantProfile {
    pub start: Option<Script>,
    pub stop: Option<Script>,
    pub start_timeout: Duration,
    pub stop_timeout: Duration,
    pub logs: &'static [&'static str],
    pub backups: &'static [&'static str],
    pub window_title: Option<&'static str>,
    pub ready_log: Option<&'static str>,
    pub ready_pattern: Option<&'static str>,
    pub pid_file: Option<&'static str>,
    pub ports: PortSource,
}

impl VariantProfile {
    fn custom() -> Self {
        Self {
            start: None,
            stop: None,
            start_timeout: DEFAULT_START_TIMEOUT,
            stop_timeout: DEFAULT_STOP_TIMEOUT,
            logs: &[],
            backups: &[],
            window_title: None,
            ready_log: None,
            ready_pattern: None,
            pid_file: None,
            ports: PortSource::Config,
        }
    }
}

fn pick(platform: Platform, posix: Script, windows: Script) -> Option<Script> {
    match platform {
        Platform::Posix => Some(posix),
        Platform::Windows => Some(windows),
    }
}

/// Console window titles only exist on Windows.
fn console_title(platform: Platform, title: &'static str) -> Option<&'static str> {
    (platform == Platform::Windows).then_some(title)
}

impl ServiceKind {
    /// Built-in defaults for this technology on `platform`.
    pub fn profile(self, platform: Platform) -> VariantProfile {
        let posix = platform == Platform::Posix;
        match self {
            ServiceKind::ServletContainer => VariantProfile {
                start: pick(
                    platform,
                    script("bin/startup.sh", &[]),
                    script("bin/startup.bat", &[]),
                ),
                stop: pick(
                    platform,
                    script("bin/shutdown.sh", &[]),
                    script("bin/shutdown.bat", &[]),
                ),
                start_timeout: Duration::from_secs(120),
                stop_timeout: Duration::from_secs(60),
                logs: &["logs/catalina.out"],
                backups: &["conf/server.xml", "conf/context.xml", "conf/tomcat-users.xml"],
                window_title: console_title(platform, "Tomcat"),
                ports: PortSource::ServerXml("conf/server.xml"),
                ..VariantProfile::custom()
            },
            ServiceKind::ClusterController => VariantProfile {
                start: pick(
                    platform,
                    script("bin/domain.sh", &[]),
                    script("bin/domain.bat", &[]),
                ),
                stop: pick(
                    platform,
                    script(
                        "bin/jboss-cli.sh",
                        &["--connect", "--command=/host=master:shutdown"],
                    ),
                    script(
                        "bin/jboss-cli.bat",
                        &["--connect", "--command=/host=master:shutdown"],
                    ),
                ),
                start_timeout: Duration::from_secs(180),
                stop_timeout: Duration::from_secs(90),
                logs: &[
                    "domain/log/host-controller.log",
                    "domain/log/process-controller.log",
                ],
                backups: &[
                    "domain/configuration/domain.xml",
                    "domain/configuration/host.xml",
                ],
                window_title: console_title(platform, "domain"),
                ready_log: Some("domain/log/host-controller.log"),
                ready_pattern: Some(r"started in \d+ ?ms"),
                ..VariantProfile::custom()
            },
            ServiceKind::MessageBroker => VariantProfile {
                start: pick(
                    platform,
                    script("bin/activemq", &["start"]),
                    script("bin/activemq.bat", &["start"]),
                ),
                stop: pick(
                    platform,
                    script("bin/activemq", &["stop"]),
                    script("bin/activemq.bat", &["stop"]),
                ),
                start_timeout: Duration::from_secs(120),
                stop_timeout: Duration::from_secs(60),
                logs: &["data/activemq.log"],
                backups: &["conf/activemq.xml", "conf/jetty.xml"],
                window_title: console_title(platform, "activemq"),
                ..VariantProfile::custom()
            },
            ServiceKind::CoordinationService => VariantProfile {
                start: pick(
                    platform,
                    script("bin/zkServer.sh", &["start"]),
                    script("bin/zkServer.cmd", &[]),
                ),
                stop: if posix {
                    Some(script("bin/zkServer.sh", &["stop"]))
                } else {
                    None
                },
                start_timeout: Duration::from_secs(60),
                stop_timeout: Duration::from_secs(30),
                logs: &["logs/zookeeper.out"],
                backups: &["conf/zoo.cfg"],
                window_title: console_title(platform, "zkServer"),
                ports: PortSource::Properties {
                    file: "conf/zoo.cfg",
                    key: "clientPort",
                },
                ..VariantProfile::custom()
            },
            ServiceKind::JobEngine => VariantProfile {
                start: pick(
                    platform,
                    script("bin/start-engine.sh", &[]),
                    script("bin/start-engine.bat", &[]),
                ),
                stop: pick(
                    platform,
                    script("bin/stop-engine.sh", &[]),
                    script("bin/stop-engine.bat", &[]),
                ),
                start_timeout: Duration::from_secs(90),
                stop_timeout: Duration::from_secs(60),
                logs: &["logs/engine.log"],
                backups: &["conf/engine.properties"],
                window_title: console_title(platform, "job-engine"),
                ready_log: Some("logs/engine.log"),
                ready_pattern: Some(r"(?i)engine started"),
                pid_file: Some("engine.pid"),
                ..VariantProfile::custom()
            },
            ServiceKind::RepositoryEngine => VariantProfile {
                start: pick(
                    platform,
                    script("bin/start-repository.sh", &[]),
                    script("bin/start-repository.bat", &[]),
                ),
                stop: pick(
                    platform,
                    script("bin/stop-repository.sh", &[]),
                    script("bin/stop-repository.bat", &[]),
                ),
                start_timeout: Duration::from_secs(120),
                stop_timeout: Duration::from_secs(60),
                logs: &["logs/repository.log"],
                backups: &["conf/repository.properties"],
                window_title: console_title(platform, "repository-engine"),
                ready_log: Some("logs/repository.log"),
                ready_pattern: Some(r"(?i)repository (is )?ready"),
                pid_file: Some("repository.pid"),
                ..VariantProfile::custom()
            },
            ServiceKind::ConnectivityEngine => VariantProfile {
                start: pick(
                    platform,
                    script("bin/connectivity-engine.sh", &["start"]),
                    script("bin/connectivity-engine.bat", &["start"]),
                ),
                stop: pick(
                    platform,
                    script("bin/connectivity-engine.sh", &["stop"]),
                    script("bin/connectivity-engine.bat", &["stop"]),
                ),
                start_timeout: Duration::from_secs(90),
                stop_timeout: Duration::from_secs(60),
                logs: &["logs/connectivity.log"],
                backups: &["conf/connectivity.properties"],
                window_title: console_title(platform, "ConnectivityEngine"),
                ..VariantProfile::custom()
            },
            ServiceKind::Custom => VariantProfile::custom(),
        }
    }

    /// Builds and validates the descriptor configured under `services.<name>.`.
    pub fn descriptor(
        self,
        name: &str,
        settings: &Settings,
        platform: Platform,
    ) -> Result<ServiceDescriptor, SupervisorError> {
        DescriptorBuilder {
            name,
            kind: self,
            settings,
            platform,
            profile: self.profile(platform),
            prefix: format!("services.{name}."),
        }
        .build()
    }
}

/// Reads the `kind` of service `name` and builds its descriptor.
pub fn descriptor_from_settings(
    name: &str,
    settings: &Settings,
    platform: Platform,
) -> Result<ServiceDescriptor, SupervisorError> {
    let key = format!("services.{name}.kind");
    let kind = match settings.get(&key) {
        Some(raw) => raw
            .parse::<ServiceKind>()
            .map_err(|_| ConfigError::InvalidValue {
                key: key.clone(),
                value: raw.to_string(),
                reason: "unknown service kind".into(),
            })?,
        None => ServiceKind::Custom,
    };
    kind.descriptor(name, settings, platform)
}

struct DescriptorBuilder<'a> {
    name: &'a str,
    kind: ServiceKind,
    settings: &'a Settings,
    platform: Platform,
    profile: VariantProfile,
    prefix: String,
}

impl DescriptorBuilder<'_> {
    fn key(&self, suffix: &str) -> String {
        format!("{}{suffix}", self.prefix)
    }

    fn get(&self, suffix: &str) -> Option<&str> {
        self.settings.get(&self.key(suffix))
    }

    fn missing(&self, key: &str) -> SupervisorError {
        SupervisorError::ConfigurationMissing {
            service: self.name.to_string(),
            key: self.key(key),
        }
    }

    /// Command from, in order: a free-form command line, a script key, the profile script.
    /// Profile scripts need `home`, unless the service manager runs the service anyway.
    fn command(
        &self,
        which: &str,
        home: Option<&Path>,
        base: &Path,
        default: Option<Script>,
        os_service: bool,
    ) -> Result<Option<CommandSpec>, SupervisorError> {
        if let Some(line) = self.get(&format!("{which}_command")) {
            return Ok(Some(self.platform.shell(line)));
        }
        let args = self.settings.list(&self.key(&format!("{which}_args")));
        if let Some(raw) = self.get(&format!("{which}_script")) {
            let path = self
                .settings
                .resolve_path(&self.platform.script(raw), base);
            return Ok(Some(
                self.platform
                    .script_command(&path.to_string_lossy(), args),
            ));
        }
        let Some(script) = default else {
            return Ok(None);
        };
        let home = match home {
            Some(home) => home,
            None if os_service => return Ok(None),
            None => return Err(self.missing("home")),
        };
        let path = self.settings.resolve_path(script.path, home);
        let args = if args.is_empty() {
            script.args.iter().map(|arg| arg.to_string()).collect()
        } else {
            args
        };
        Ok(Some(
            self.platform.script_command(&path.to_string_lossy(), args),
        ))
    }

    fn discover_ports(&self, base: &Path) -> Result<Vec<u16>, SupervisorError> {
        let configured = self.settings.ports(&self.key("ports"))?;
        if !configured.is_empty() {
            return Ok(configured);
        }
        match self.profile.ports {
            PortSource::Config => Ok(Vec::new()),
            PortSource::ServerXml(file) => {
                let path = self.settings.resolve_path(file, base);
                if !path.exists() {
                    warn!(
                        "'{}' has no ports configured and {} does not exist",
                        self.name,
                        path.display()
                    );
                    return Ok(Vec::new());
                }
                Ok(discovery::servlet_connector_ports(&path)?)
            }
            PortSource::Properties { file, key } => {
                let path = self.settings.resolve_path(file, base);
                if !path.exists() {
                    warn!(
                        "'{}' has no ports configured and {} does not exist",
                        self.name,
                        path.display()
                    );
                    return Ok(Vec::new());
                }
                Ok(discovery::properties_port(&path, key)?.into_iter().collect())
            }
        }
    }

    fn ready_marker(
        &self,
        base: &Path,
        first_log: Option<&Path>,
    ) -> Result<Option<ReadyMarker>, SupervisorError> {
        let Some(raw) = self.get("ready_pattern").or(self.profile.ready_pattern) else {
            return Ok(None);
        };
        let pattern = Regex::new(raw).map_err(|err| ConfigError::InvalidValue {
            key: self.key("ready_pattern"),
            value: raw.to_string(),
            reason: err.to_string(),
        })?;
        let log = match self.get("ready_log").or(self.profile.ready_log) {
            Some(raw) => self.settings.resolve_path(raw, base),
            None => first_log
                .map(Path::to_path_buf)
                .ok_or_else(|| self.missing("ready_log"))?,
        };
        Ok(Some(ReadyMarker { log, pattern }))
    }

    fn build(self) -> Result<ServiceDescriptor, SupervisorError> {
        let settings = self.settings;
        let home = settings.path(&self.key("home"));
        let base = home
            .clone()
            .unwrap_or_else(|| settings.base_dir().to_path_buf());

        let run_as_os_service = settings.flag(&self.key("os_service"))?.unwrap_or(false);
        let start_command = self.command(
            "start",
            home.as_deref(),
            &base,
            self.profile.start,
            run_as_os_service,
        )?;
        let stop_command = self.command(
            "stop",
            home.as_deref(),
            &base,
            self.profile.stop,
            run_as_os_service,
        )?;

        let start_working_directory = settings
            .path_from(&self.key("start_dir"), &base)
            .or_else(|| home.clone());
        let stop_working_directory = settings
            .path_from(&self.key("stop_dir"), &base)
            .or_else(|| start_working_directory.clone());

        let resolve_all = |values: Vec<String>, defaults: &[&str]| {
            if values.is_empty() {
                defaults
                    .iter()
                    .map(|raw| settings.resolve_path(raw, &base))
                    .collect::<Vec<_>>()
            } else {
                values
                    .iter()
                    .map(|raw| settings.resolve_path(raw, &base))
                    .collect()
            }
        };
        let log_paths = resolve_all(settings.list(&self.key("logs")), self.profile.logs);
        let backup_paths = resolve_all(settings.list(&self.key("backup")), self.profile.backups);

        let kill_states = settings
            .list(&self.key("kill_states"))
            .iter()
            .map(|raw| {
                raw.parse::<SocketState>()
                    .map_err(|_| ConfigError::InvalidValue {
                        key: self.key("kill_states"),
                        value: raw.clone(),
                        reason: "unknown socket state".into(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let environment: HashMap<String, String> = {
            let env_prefix = self.key("env.");
            settings
                .keys_under(&env_prefix)
                .filter_map(|var| {
                    settings
                        .get(&format!("{env_prefix}{var}"))
                        .map(|value| (var.to_string(), value.to_string()))
                })
                .collect()
        };

        let descriptor = ServiceDescriptor {
            name: self.name.to_string(),
            kind: self.kind,
            required_ports: self.discover_ports(&base)?,
            ready_marker: self.ready_marker(&base, log_paths.first().map(|p| p.as_path()))?,
            start_command,
            stop_command,
            start_working_directory,
            stop_working_directory,
            start_timeout: settings
                .duration(&self.key("start_timeout"))?
                .unwrap_or(self.profile.start_timeout),
            stop_timeout: settings
                .duration(&self.key("stop_timeout"))?
                .unwrap_or(self.profile.stop_timeout),
            pid_file: settings
                .path_from(&self.key("pid_file"), &base)
                .or_else(|| {
                    self.profile
                        .pid_file
                        .map(|raw| settings.resolve_path(raw, &base))
                }),
            window_title: self
                .get("window_title")
                .or(self.profile.window_title)
                .map(str::to_string),
            service_name: self.get("service_name").map(str::to_string),
            run_as_os_service,
            host: self.get("host").unwrap_or("127.0.0.1").to_string(),
            log_paths,
            backup_paths,
            stop_protected: settings
                .flag(&self.key("stop_protected"))?
                .unwrap_or(false),
            kill_states: if kill_states.is_empty() {
                vec![SocketState::Listen]
            } else {
                kill_states
            },
            environment,
        };

        descriptor.validate()?;
        debug!(
            "Built {} descriptor for '{}': ports {:?}, stop via {:?}",
            descriptor.kind.as_ref(),
            descriptor.name,
            descriptor.required_ports,
            descriptor.stop_strategy()
        );
        Ok(descriptor)
    }
}
