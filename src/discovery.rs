//! Port discovery from a service's own configuration files.
use std::{fs, path::Path};

use serde::Deserialize;
use tracing::{debug, warn};

use crate::{config::parse_properties, error::ConfigError};

#[derive(Debug, Deserialize)]
struct ServerXml {
    #[serde(rename = "@port")]
    port: Option<String>,
    #[serde(rename = "Service", default)]
    services: Vec<ServiceXml>,
}

#[derive(Debug, Deserialize)]
struct ServiceXml {
    #[serde(rename = "Connector", default)]
    connectors: Vec<ConnectorXml>,
}

#[derive(Debug, Deserialize)]
struct ConnectorXml {
    #[serde(rename = "@port")]
    port: Option<String>,
}

/// Ports a servlet container listens on, read from its `server.xml`: the `<Server port>`
/// shutdown port followed by every `<Connector port>`. Disabled (`-1`) and unresolved
/// placeholder values are skipped.
pub fn servlet_connector_ports(server_xml: &Path) -> Result<Vec<u16>, ConfigError> {
    let content = fs::read_to_string(server_xml)?;
    let server: ServerXml =
        quick_xml::de::from_str(&content).map_err(|source| ConfigError::Xml {
            path: server_xml.to_path_buf(),
            source,
        })?;

    let raw_ports = server.port.into_iter().chain(
        server
            .services
            .into_iter()
            .flat_map(|service| service.connectors)
            .filter_map(|connector| connector.port),
    );

    let mut ports = Vec::new();
    for raw in raw_ports {
        match raw.trim().parse::<i32>() {
            Ok(port) if (1..=i32::from(u16::MAX)).contains(&port) => {
                let port = port as u16;
                if !ports.contains(&port) {
                    ports.push(port);
                }
            }
            Ok(port) => debug!("Ignoring disabled port {port} in {}", server_xml.display()),
            Err(_) => warn!(
                "Ignoring unresolved port '{raw}' in {}",
                server_xml.display()
            ),
        }
    }
    Ok(ports)
}

/// A single port stored under `key` in a properties file, e.g. `clientPort` in a
/// coordination service's `zoo.cfg`.
pub fn properties_port(file: &Path, key: &str) -> Result<Option<u16>, ConfigError> {
    let content = fs::read_to_string(file)?;
    let values = parse_properties(&content);
    values
        .get(key)
        .map(|raw| {
            raw.parse::<u16>()
                .ok()
                .filter(|port| *port != 0)
                .ok_or_else(|| ConfigError::InvalidValue {
                    key: key.to_string(),
                    value: raw.clone(),
                    reason: format!("not a TCP port in {}", file.display()),
                })
        })
        .transpose()
}
