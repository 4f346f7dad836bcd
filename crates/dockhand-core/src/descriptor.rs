//! Service descriptors: the unresolved description of one service.

use std::path::Path;

use dockhand_common::constants::{CONTAINER_DATA_DIR, DEFAULT_HOST_PORT, HOST_DATA_ROOT};
use dockhand_common::error::{DockhandError, Result};
use dockhand_common::types::{EnvironmentMapping, ImageRef, Repository, normalize_image_name};
use indexmap::IndexMap;

use crate::config::{ConfigDocument, HostSpec, ServiceConfig};

/// A hostname routed to a container port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostBinding {
    /// Public hostname.
    pub hostname: String,
    /// Container port.
    pub port: u16,
}

/// Image name and tag used when a section does not declare them.
///
/// Typically derived from version-control metadata (repository name and
/// current branch) by the caller.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentityDefaults {
    /// Fallback image name.
    pub image_name: Option<String>,
    /// Fallback tag.
    pub tag: Option<String>,
}

/// The declared configuration of one service, before its dependencies
/// are resolved.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceDescriptor {
    /// Registry host.
    pub registry: String,
    /// Normalized image name.
    pub image_name: String,
    /// Image tag; upgraded by tag fallback for backing services.
    pub tag: String,
    /// The service's own environment variables.
    pub environment: EnvironmentMapping,
    /// Host source directory to container directory.
    pub mount_src: IndexMap<String, String>,
    /// Directories to create under the data volume.
    pub data_directories: Vec<String>,
    /// Variables exposed to dependents, unprefixed.
    pub provided_environment: EnvironmentMapping,
    /// Values dependents expose as `<NAME>_<KEY>`.
    pub backing_service_environment: EnvironmentMapping,
    /// Backing services in declaration order.
    pub dependencies: IndexMap<String, EnvironmentMapping>,
    /// Hostnames routed to this service.
    pub hosts: Vec<HostBinding>,
    /// Published ports.
    pub ports: Vec<String>,
    /// Test command for freshly built images.
    pub test_command: Option<String>,
    /// Extra containers started from the same image.
    pub additional_commands: IndexMap<String, String>,
}

impl ServiceDescriptor {
    /// Builds the descriptor of the `environment` section of `document`.
    ///
    /// # Errors
    ///
    /// Returns an error if the section is absent or malformed, or if no
    /// registry or image name can be determined.
    pub fn from_document(
        document: &ConfigDocument,
        environment: &str,
        defaults: &IdentityDefaults,
    ) -> Result<Self> {
        let section = document.section(environment)?;

        let registry = section.registry.clone().ok_or_else(|| DockhandError::Config {
            message: format!("section '{environment}' declares no registry"),
        })?;
        let image_name = section
            .image_name
            .clone()
            .or_else(|| defaults.image_name.clone())
            .ok_or_else(|| DockhandError::Config {
                message: format!("section '{environment}' declares no image_name"),
            })?;
        let tag = section
            .tag
            .clone()
            .or_else(|| defaults.tag.clone())
            .ok_or_else(|| DockhandError::Config {
                message: format!("section '{environment}' declares no tag"),
            })?;

        let mut descriptor = Self {
            registry,
            image_name: normalize_image_name(&image_name),
            tag,
            ..Self::default()
        };
        descriptor.apply(section);
        Ok(descriptor)
    }

    /// Loads the project configuration in `dir` and builds the descriptor
    /// of its `environment` section.
    ///
    /// # Errors
    ///
    /// Returns an error if no configuration file exists or the section
    /// cannot be turned into a descriptor.
    pub fn load(dir: &Path, environment: &str, defaults: &IdentityDefaults) -> Result<Self> {
        Self::from_document(&ConfigDocument::load(dir)?, environment, defaults)
    }

    /// Builds the minimal descriptor of dependency `name` of `owner`.
    ///
    /// The dependency lives in the owner's registry, starts from the
    /// owner's tag, and carries `config` as its backing-service values.
    #[must_use]
    pub fn backing(owner: &Self, name: &str, config: &EnvironmentMapping) -> Self {
        Self {
            registry: owner.registry.clone(),
            image_name: normalize_image_name(name),
            tag: owner.tag.clone(),
            backing_service_environment: config.clone(),
            ..Self::default()
        }
    }

    /// Applies a configuration section onto this descriptor.
    ///
    /// Identity fields already set are kept. Backing-service values already
    /// present (supplied by the owner) take precedence over the section's
    /// defaults. Everything else is replaced by the section.
    pub fn apply(&mut self, section: ServiceConfig) {
        if self.registry.is_empty() {
            self.registry = section.registry.unwrap_or_default();
        }
        if self.image_name.is_empty() {
            self.image_name = normalize_image_name(&section.image_name.unwrap_or_default());
        }
        if self.tag.is_empty() {
            self.tag = section.tag.unwrap_or_default();
        }

        for (key, value) in section.backing_service_env {
            let _ = self.backing_service_environment.entry(key).or_insert(value);
        }

        self.environment = section.environment;
        self.provided_environment = section.provides_env;
        self.mount_src = section.mount_src.unwrap_or_default();
        self.data_directories = section.data_directories.unwrap_or_default();
        self.dependencies = section.dependencies;
        self.hosts = section.host.map(host_bindings).unwrap_or_default();
        self.ports = section.ports;
        self.test_command = section.test_command;
        self.additional_commands = section.additional_commands.unwrap_or_default();
    }

    /// Returns the image reference `registry/image_name:tag`.
    #[must_use]
    pub fn image(&self) -> ImageRef {
        ImageRef::new(self.registry.clone(), self.image_name.clone(), self.tag.clone())
    }

    /// Returns the repository `registry/image_name`.
    #[must_use]
    pub fn repository(&self) -> Repository {
        Repository::new(self.registry.clone(), self.image_name.clone())
    }

    /// Returns the volume mounts: the data volume, then each source mount.
    #[must_use]
    pub fn volumes(&self) -> Vec<String> {
        let data_volume = format!(
            "{HOST_DATA_ROOT}/{}/data:{CONTAINER_DATA_DIR}",
            self.image_name.replace('-', "_")
        );
        std::iter::once(data_volume)
            .chain(
                self.mount_src
                    .iter()
                    .map(|(host, container)| format!("{host}:{container}")),
            )
            .collect()
    }
}

fn host_bindings(spec: HostSpec) -> Vec<HostBinding> {
    match spec {
        HostSpec::Ports(ports) => ports
            .into_iter()
            .map(|(hostname, port)| HostBinding { hostname, port })
            .collect(),
        HostSpec::Name(hostname) => vec![HostBinding {
            hostname,
            port: DEFAULT_HOST_PORT,
        }],
    }
}
