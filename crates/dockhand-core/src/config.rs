//! Typed view of service configuration documents.
//!
//! A document maps environment names (`default`, `test`, ...) to sections.
//! The same format is used for a project's own `dockhand.yml` and for the
//! configuration embedded in backing-service images.

use std::collections::BTreeMap;
use std::path::Path;

use dockhand_common::constants::CONFIG_FILE_CANDIDATES;
use dockhand_common::error::{DockhandError, Result};
use dockhand_common::types::EnvironmentMapping;
use indexmap::IndexMap;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer};
use serde_yaml::Value;

/// The `host` entry of a section.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum HostSpec {
    /// Hostnames mapped to container ports.
    Ports(IndexMap<String, u16>),
    /// A single hostname.
    Name(String),
}

/// One environment section of a configuration document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Registry host the image lives in.
    pub registry: Option<String>,
    /// Image name; normalized when the descriptor is built.
    pub image_name: Option<String>,
    /// Image tag.
    pub tag: Option<String>,
    /// Hostnames routed to this service by the reverse proxy.
    pub host: Option<HostSpec>,
    /// Command used to test a freshly built image.
    pub test_command: Option<String>,
    /// Host source directories mounted into the container.
    pub mount_src: Option<IndexMap<String, String>>,
    /// Variables this service exposes to services depending on it.
    #[serde(deserialize_with = "environment_mapping")]
    pub provides_env: EnvironmentMapping,
    /// Extra containers started from the same image, by name.
    pub additional_commands: Option<IndexMap<String, String>>,
    /// Directories created under the data volume before start.
    pub data_directories: Option<Vec<String>>,
    /// Defaults for the variables dependents expose as `<NAME>_<KEY>`.
    #[serde(deserialize_with = "environment_mapping")]
    pub backing_service_env: EnvironmentMapping,
    /// The service's own environment variables.
    #[serde(deserialize_with = "environment_mapping")]
    pub environment: EnvironmentMapping,
    /// Backing services, in declaration order, with their per-dependency values.
    #[serde(deserialize_with = "dependency_mapping")]
    pub dependencies: IndexMap<String, EnvironmentMapping>,
    /// Published ports.
    #[serde(deserialize_with = "scalar_list")]
    pub ports: Vec<String>,
}

/// A parsed configuration document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigDocument {
    sections: IndexMap<String, Value>,
}

impl ConfigDocument {
    /// Parses a YAML document.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not YAML or not a mapping of
    /// section names to sections.
    pub fn parse(text: &str) -> Result<Self> {
        let value: Value = serde_yaml::from_str(text)?;
        let Value::Mapping(mapping) = value else {
            return Err(DockhandError::Config {
                message: "configuration document is not a mapping".into(),
            });
        };

        let mut sections = IndexMap::new();
        for (key, section) in mapping {
            let Some(name) = scalar_to_string(&key) else {
                return Err(DockhandError::Config {
                    message: format!("invalid section name: {key:?}"),
                });
            };
            let _ = sections.insert(name, section);
        }
        Ok(Self { sections })
    }

    /// Loads the project configuration from `dir`.
    ///
    /// `config/dockhand.yml` takes precedence over `dockhand.yml`.
    ///
    /// # Errors
    ///
    /// Returns `DockhandError::ConfigurationFileMissing` if neither file
    /// exists, or an error if the file cannot be read or parsed.
    pub fn load(dir: &Path) -> Result<Self> {
        let path = CONFIG_FILE_CANDIDATES
            .iter()
            .map(|candidate| dir.join(candidate))
            .find(|path| path.is_file())
            .ok_or_else(|| DockhandError::ConfigurationFileMissing {
                dir: dir.to_path_buf(),
            })?;

        tracing::info!(path = %path.display(), "loading service configuration");
        let content = std::fs::read_to_string(&path).map_err(|e| DockhandError::Io {
            path: path.clone(),
            source: e,
        })?;
        Self::parse(&content)
    }

    /// Returns the section names in document order.
    pub fn section_names(&self) -> impl Iterator<Item = &str> {
        self.sections.keys().map(String::as_str)
    }

    /// Returns whether a section named `environment` exists.
    #[must_use]
    pub fn has_section(&self, environment: &str) -> bool {
        self.sections.contains_key(environment)
    }

    /// Returns whether `environment` is present with content. A key with a
    /// null value does not define the environment.
    #[must_use]
    pub fn defines(&self, environment: &str) -> bool {
        self.sections
            .get(environment)
            .is_some_and(|value| !value.is_null())
    }

    /// Returns the typed section named `environment`.
    ///
    /// # Errors
    ///
    /// Returns `DockhandError::EnvironmentNotFound` if the section is
    /// absent, or a YAML error if it is malformed.
    pub fn section(&self, environment: &str) -> Result<ServiceConfig> {
        let value = self
            .sections
            .get(environment)
            .ok_or_else(|| DockhandError::EnvironmentNotFound {
                environment: environment.to_string(),
                available: self.section_names().map(ToString::to_string).collect(),
            })?;

        if value.is_null() {
            return Ok(ServiceConfig::default());
        }
        Ok(serde_yaml::from_value(value.clone())?)
    }
}

/// Converts a YAML scalar to its string form; `None` for null and non-scalars.
fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Tagged(tagged) => scalar_to_string(&tagged.value),
        Value::Null | Value::Sequence(_) | Value::Mapping(_) => None,
    }
}

fn scalar_value<E: serde::de::Error>(key: &str, value: &Value) -> std::result::Result<Option<String>, E> {
    match value {
        Value::Null => Ok(None),
        Value::Sequence(_) | Value::Mapping(_) => {
            Err(E::custom(format!("value of '{key}' must be a scalar")))
        }
        other => Ok(scalar_to_string(other)),
    }
}

fn to_environment<E: serde::de::Error>(
    raw: BTreeMap<String, Value>,
) -> std::result::Result<EnvironmentMapping, E> {
    raw.into_iter()
        .map(|(key, value)| scalar_value(&key, &value).map(|v| (key, v)))
        .collect()
}

fn environment_mapping<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<EnvironmentMapping, D::Error> {
    let raw = Option::<BTreeMap<String, Value>>::deserialize(deserializer)?;
    to_environment(raw.unwrap_or_default())
}

fn dependency_mapping<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<IndexMap<String, EnvironmentMapping>, D::Error> {
    let raw = Option::<IndexMap<String, Option<BTreeMap<String, Value>>>>::deserialize(deserializer)?;
    raw.unwrap_or_default()
        .into_iter()
        .map(|(name, config)| to_environment(config.unwrap_or_default()).map(|env| (name, env)))
        .collect()
}

fn scalar_list<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<Vec<String>, D::Error> {
    let raw = Option::<Vec<Value>>::deserialize(deserializer)?;
    raw.unwrap_or_default()
        .iter()
        .map(|value| {
            scalar_to_string(value).ok_or_else(|| D::Error::custom("list entries must be scalars"))
        })
        .collect()
}
