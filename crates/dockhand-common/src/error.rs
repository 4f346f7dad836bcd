//! Unified error types for the dockhand workspace.
//!
//! Variants fall into three groups: failures that abort a whole resolution,
//! per-dependency failures that the resolver downgrades to warnings, and the
//! deferred environment validation failure raised only when a container is
//! about to be started.

use std::path::PathBuf;

use thiserror::Error;

/// Top-level error type shared across the workspace.
#[derive(Debug, Error)]
pub enum DockhandError {
    /// An I/O operation failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path where the I/O error occurred.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A configuration value is invalid.
    #[error("invalid configuration: {message}")]
    Config {
        /// Description of the invalid configuration.
        message: String,
    },

    /// A YAML document could not be parsed.
    #[error("YAML error: {source}")]
    Yaml {
        /// Underlying YAML error.
        #[from]
        source: serde_yaml::Error,
    },

    /// A JSON payload could not be parsed.
    #[error("serialization error: {source}")]
    Serialization {
        /// Underlying serialization error.
        #[from]
        source: serde_json::Error,
    },

    /// Neither `config/dockhand.yml` nor `dockhand.yml` exists in the project.
    #[error("no configuration file found in {}", dir.display())]
    ConfigurationFileMissing {
        /// Project directory that was searched.
        dir: PathBuf,
    },

    /// The requested environment section is absent from the configuration.
    #[error("environment '{environment}' not found in configuration, available: {}", available.join(", "))]
    EnvironmentNotFound {
        /// Requested environment name.
        environment: String,
        /// Sections present in the document.
        available: Vec<String>,
    },

    /// No tag of the fallback chain is available for an image.
    #[error("no tag found for image {image}, wanted tag {requested}, available tags: [{}]", available.join(", "))]
    NoTagFound {
        /// Repository that was queried.
        image: String,
        /// Tag that was originally requested.
        requested: String,
        /// Every tag that was available.
        available: Vec<String>,
    },

    /// The runtime does not know the image.
    #[error("image not found: {image}")]
    ImageNotFound {
        /// Full image reference.
        image: String,
    },

    /// A dependency's embedded configuration has no `default` section.
    #[error("no 'default' configuration found in embedded configuration of {service}")]
    DefaultEnvironmentMissing {
        /// Dependency name.
        service: String,
    },

    /// A dependency's image carries no embedded configuration file.
    #[error("no configuration file found in container of {service}")]
    ContainerConfigurationMissing {
        /// Dependency name.
        service: String,
    },

    /// A dependency's container could not mount a host directory.
    #[error("missing host directories for {service}, provision them before retrying")]
    HostDirectoriesMissing {
        /// Dependency name.
        service: String,
    },

    /// Environment variables without a value at container start.
    #[error("unable to execute container because of missing environment variables: {}", keys.join(", "))]
    EnvironmentVariablesMissing {
        /// Every key whose value is absent.
        keys: Vec<String>,
    },

    /// Dependency declarations form a cycle.
    #[error("cyclic dependency detected: {}", chain.join(" -> "))]
    CyclicDependency {
        /// Path from the root service back to the repeated dependency.
        chain: Vec<String>,
    },

    /// The container runtime reported a failure.
    #[error("container runtime error: {message}")]
    Runtime {
        /// Description of the failure.
        message: String,
    },

    /// The image registry reported a failure.
    #[error("registry {registry} error: {message}")]
    Registry {
        /// Registry host.
        registry: String,
        /// Description of the failure.
        message: String,
    },

    /// A required resource was not found.
    #[error("{kind} not found: {id}")]
    NotFound {
        /// Type of the missing resource.
        kind: &'static str,
        /// Identifier of the missing resource.
        id: String,
    },
}

impl DockhandError {
    /// Returns whether the resolver may continue with a minimal descriptor
    /// after this error occurred while reading a dependency's configuration.
    #[must_use]
    pub const fn is_recoverable_dependency_failure(&self) -> bool {
        matches!(
            self,
            Self::DefaultEnvironmentMissing { .. }
                | Self::ContainerConfigurationMissing { .. }
                | Self::Yaml { .. }
                | Self::Config { .. }
        )
    }
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, DockhandError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_variables_lists_every_key() {
        let err = DockhandError::EnvironmentVariablesMissing {
            keys: vec!["DATABASE_URL".into(), "SECRET".into()],
        };
        assert_eq!(
            err.to_string(),
            "unable to execute container because of missing environment variables: DATABASE_URL, SECRET"
        );
    }

    #[test]
    fn no_tag_found_carries_available_tags() {
        let err = DockhandError::NoTagFound {
            image: "registry/postgresql".into(),
            requested: "feature-x".into(),
            available: vec!["other".into()],
        };
        let msg = err.to_string();
        assert!(msg.contains("feature-x"), "got: {msg}");
        assert!(msg.contains("[other]"), "got: {msg}");
    }

    #[test]
    fn host_directories_are_not_recoverable() {
        let err = DockhandError::HostDirectoriesMissing {
            service: "redis".into(),
        };
        assert!(!err.is_recoverable_dependency_failure());
        let err = DockhandError::ContainerConfigurationMissing {
            service: "redis".into(),
        };
        assert!(err.is_recoverable_dependency_failure());
    }

    #[test]
    fn cycle_renders_chain() {
        let err = DockhandError::CyclicDependency {
            chain: vec!["app".into(), "cache".into(), "app".into()],
        };
        assert_eq!(err.to_string(), "cyclic dependency detected: app -> cache -> app");
    }
}
