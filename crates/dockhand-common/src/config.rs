//! Process-level configuration for dockhand.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::constants;

/// Root configuration shared by the engine and the runtime adapters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DockhandConfig {
    /// Configuration section to load for the current service.
    pub environment: String,
    /// Directory holding cached embedded configurations.
    pub cache_dir: PathBuf,
    /// Docker binary to invoke.
    pub docker_binary: String,
    /// Docker host passed as `-H`, if any.
    pub docker_host: Option<String>,
}

impl Default for DockhandConfig {
    fn default() -> Self {
        Self {
            environment: constants::DEFAULT_ENVIRONMENT.into(),
            cache_dir: PathBuf::from(constants::DEFAULT_CACHE_DIR),
            docker_binary: constants::DEFAULT_DOCKER_BINARY.into(),
            docker_host: None,
        }
    }
}

impl DockhandConfig {
    /// Builds the configuration from the process environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary variable lookup.
    ///
    /// Empty values are treated as unset.
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();
        Self {
            environment: get(constants::ENV_ENVIRONMENT).unwrap_or(defaults.environment),
            cache_dir: get(constants::ENV_CACHE_DIR).map_or(defaults.cache_dir, PathBuf::from),
            docker_binary: get(constants::ENV_DOCKER_BINARY).unwrap_or(defaults.docker_binary),
            docker_host: get(constants::ENV_DOCKER_HOST_IP),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn defaults_when_nothing_is_set() {
        let config = DockhandConfig::from_lookup(|_| None);
        assert_eq!(config, DockhandConfig::default());
        assert_eq!(config.environment, "default");
    }

    #[test]
    fn lookup_overrides_defaults() {
        let vars: HashMap<&str, &str> = [
            ("DOCKHAND_ENVIRONMENT", "test"),
            ("DOCKHAND_CACHE_DIR", "/var/cache/dockhand"),
            ("DOCKER_BINARY", "/usr/local/bin/docker"),
            ("DOCKER_HOST_IP", "10.0.0.2"),
        ]
        .into_iter()
        .collect();
        let config = DockhandConfig::from_lookup(|k| vars.get(k).map(ToString::to_string));
        assert_eq!(config.environment, "test");
        assert_eq!(config.cache_dir, PathBuf::from("/var/cache/dockhand"));
        assert_eq!(config.docker_binary, "/usr/local/bin/docker");
        assert_eq!(config.docker_host.as_deref(), Some("10.0.0.2"));
    }

    #[test]
    fn blank_values_are_ignored() {
        let config = DockhandConfig::from_lookup(|k| {
            (k == "DOCKHAND_ENVIRONMENT").then(|| "  ".to_string())
        });
        assert_eq!(config.environment, "default");
    }
}
