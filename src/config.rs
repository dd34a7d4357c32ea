//! Configuration management for lifeguard.
//!
//! Configuration is a flat map of dotted keys to string values. YAML files are flattened
//! (`services.tomcat.ports: [8080, 8005]` becomes `services.tomcat.ports = "8080,8005"`) and
//! Java-style `.properties` files are read as-is, so both sources answer the same `get(key)`.
use regex::Regex;
use serde_yaml::Value;
use std::{
    collections::HashMap,
    env, fs,
    path::{Path, PathBuf},
    sync::OnceLock,
    time::Duration,
};
use tracing::debug;

use crate::{error::ConfigError, platform::Platform};

/// Key/value view over a loaded configuration file.
#[derive(Debug, Clone, Default)]
pub struct Settings {
    values: HashMap<String, String>,
    /// Directory relative paths are resolved from.
    base_dir: PathBuf,
    platform: Platform,
}

impl Settings {
    /// Builds settings from explicit pairs, resolving relative paths from `base_dir`.
    pub fn from_pairs<I, K, V>(pairs: I, base_dir: impl Into<PathBuf>) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            values: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
            base_dir: base_dir.into(),
            platform: Platform::current(),
        }
    }

    /// Loads a `.yaml`/`.yml` or `.properties` file, expanding `${VAR}` references.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| {
            ConfigError::Read(std::io::Error::new(
                e.kind(),
                format!("{} ({})", e, path.display()),
            ))
        })?;
        let expanded = expand_env_vars(&content)?;

        let is_properties = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("properties"));

        let values = if is_properties {
            parse_properties(&expanded)
        } else {
            let root: Value = serde_yaml::from_str(&expanded)?;
            let mut values = HashMap::new();
            flatten_yaml("", &root, &mut values);
            values
        };

        debug!("Loaded {} configuration keys from {}", values.len(), path.display());

        let base_dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."))
            .to_path_buf();

        Ok(Self {
            values,
            base_dir,
            platform: Platform::current(),
        })
    }

    /// Overrides the platform used for path normalisation.
    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = platform;
        self
    }

    /// Raw lookup. Empty values count as absent.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values
            .get(key)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    /// Directory relative paths are resolved against.
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Keys starting with `prefix`, with the prefix removed.
    pub fn keys_under<'a>(&'a self, prefix: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.values
            .keys()
            .filter_map(move |key| key.strip_prefix(prefix))
    }

    /// Names of every `services.<name>` section.
    pub fn service_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .keys_under("services.")
            .filter_map(|rest| rest.split('.').next())
            .map(str::to_string)
            .collect();
        names.sort();
        names.dedup();
        names
    }

    /// A path value, normalised for the platform and resolved against `base`.
    pub fn path_from(&self, key: &str, base: &Path) -> Option<PathBuf> {
        self.get(key).map(|raw| self.resolve_path(raw, base))
    }

    /// A path value resolved against the configuration file's directory.
    pub fn path(&self, key: &str) -> Option<PathBuf> {
        self.path_from(key, &self.base_dir)
    }

    /// Normalises `raw` and joins it onto `base` unless it is already absolute.
    pub fn resolve_path(&self, raw: &str, base: &Path) -> PathBuf {
        let path = self.platform.normalize_path(raw);
        if path.is_absolute() {
            path
        } else {
            base.join(path)
        }
    }

    /// A duration such as `500ms`, `30s`, `2m` or `1h`. Bare numbers are seconds.
    pub fn duration(&self, key: &str) -> Result<Option<Duration>, ConfigError> {
        self.get(key)
            .map(|raw| {
                parse_duration(raw).map_err(|reason| ConfigError::InvalidValue {
                    key: key.to_string(),
                    value: raw.to_string(),
                    reason,
                })
            })
            .transpose()
    }

    /// A boolean flag (`true/false`, `yes/no`, `on/off`, `1/0`).
    pub fn flag(&self, key: &str) -> Result<Option<bool>, ConfigError> {
        let Some(raw) = self.get(key) else {
            return Ok(None);
        };
        match raw.to_ascii_lowercase().as_str() {
            "true" | "yes" | "on" | "1" => Ok(Some(true)),
            "false" | "no" | "off" | "0" => Ok(Some(false)),
            _ => Err(ConfigError::InvalidValue {
                key: key.to_string(),
                value: raw.to_string(),
                reason: "expected a boolean".into(),
            }),
        }
    }

    /// A comma-separated list. Missing keys yield an empty list.
    pub fn list(&self, key: &str) -> Vec<String> {
        self.get(key)
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|item| !item.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// A comma-separated list of TCP ports, order preserved and duplicates dropped.
    pub fn ports(&self, key: &str) -> Result<Vec<u16>, ConfigError> {
        let mut ports = Vec::new();
        for item in self.list(key) {
            let port = item
                .parse::<u16>()
                .ok()
                .filter(|port| *port != 0)
                .ok_or_else(|| ConfigError::InvalidValue {
                    key: key.to_string(),
                    value: item.clone(),
                    reason: "expected a TCP port between 1 and 65535".into(),
                })?;
            if !ports.contains(&port) {
                ports.push(port);
            }
        }
        Ok(ports)
    }
}

/// Flattens nested YAML mappings into dotted keys. Sequences become comma-joined values.
fn flatten_yaml(prefix: &str, value: &Value, out: &mut HashMap<String, String>) {
    match value {
        Value::Mapping(map) => {
            for (key, child) in map {
                let Some(key) = scalar_to_string(key) else {
                    continue;
                };
                let full = if prefix.is_empty() {
                    key
                } else {
                    format!("{prefix}.{key}")
                };
                flatten_yaml(&full, child, out);
            }
        }
        Value::Sequence(items) => {
            let joined: Vec<String> = items.iter().filter_map(scalar_to_string).collect();
            out.insert(prefix.to_string(), joined.join(","));
        }
        Value::Tagged(tagged) => flatten_yaml(prefix, &tagged.value, out),
        other => {
            if let Some(scalar) = scalar_to_string(other) {
                out.insert(prefix.to_string(), scalar);
            }
        }
    }
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Parses Java-style properties: `key=value`, `key: value` or `key value`, `#`/`!` comments
/// and trailing-backslash line continuations.
pub fn parse_properties(content: &str) -> HashMap<String, String> {
    let mut values = HashMap::new();
    let mut pending = String::new();

    for raw_line in content.lines() {
        let line = raw_line.trim_start();
        if pending.is_empty() && (line.is_empty() || line.starts_with('#') || line.starts_with('!'))
        {
            continue;
        }

        if let Some(stripped) = line.strip_suffix('\\') {
            pending.push_str(stripped);
            continue;
        }
        pending.push_str(line);

        let entry = std::mem::take(&mut pending);
        let split_at = entry.find(['=', ':']).or_else(|| entry.find(char::is_whitespace));
        let (key, value) = match split_at {
            Some(idx) => (&entry[..idx], &entry[idx + 1..]),
            None => (entry.as_str(), ""),
        };
        values.insert(key.trim().to_string(), value.trim().to_string());
    }

    values
}

/// Expands `${VAR}` and `$VAR` references from the process environment.
fn expand_env_vars(input: &str) -> Result<String, ConfigError> {
    static ENV_REF: OnceLock<Regex> = OnceLock::new();
    let re = ENV_REF.get_or_init(|| {
        Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}|\$([A-Za-z_][A-Za-z0-9_]*)")
            .expect("static regex")
    });

    let mut missing = None;
    let result = re.replace_all(input, |caps: &regex::Captures| {
        let var_name = caps
            .get(1)
            .or_else(|| caps.get(2))
            .map(|m| m.as_str())
            .unwrap_or_default();
        match env::var(var_name) {
            Ok(value) => value,
            Err(_) => {
                missing.get_or_insert_with(|| var_name.to_string());
                String::new()
            }
        }
    });

    match missing {
        Some(var) => Err(ConfigError::MissingEnvVar(var)),
        None => Ok(result.into_owned()),
    }
}

/// Parses a user-facing duration string in the format `<number>[ms|s|m|h]`.
pub fn parse_duration(raw: &str) -> Result<Duration, String> {
    let value = raw.trim();
    if value.is_empty() {
        return Err("Duration value cannot be empty".into());
    }

    if let Some(stripped) = value.strip_suffix("ms") {
        let amount: u64 = stripped
            .trim()
            .parse()
            .map_err(|_| format!("Invalid duration value: '{raw}'"))?;
        return Ok(Duration::from_millis(amount));
    }

    let (amount_str, multiplier) = if let Some(stripped) = value.strip_suffix('s') {
        (stripped.trim(), 1)
    } else if let Some(stripped) = value.strip_suffix('m') {
        (stripped.trim(), 60)
    } else if let Some(stripped) = value.strip_suffix('h') {
        (stripped.trim(), 3600)
    } else {
        (value, 1)
    };

    let amount: u64 = amount_str
        .parse()
        .map_err(|_| format!("Invalid duration value: '{raw}'"))?;

    Ok(Duration::from_secs(amount.saturating_mul(multiplier)))
}
