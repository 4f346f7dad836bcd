//! Collaborator abstractions consumed by the engine.
//!
//! The engine never talks to a container runtime, an image registry, or a
//! reverse proxy directly. Implementors of these traits live in
//! `dockhand-runtime` (and in tests as hand-written fakes).

use std::collections::BTreeMap;
use std::path::Path;

use dockhand_common::constants::{EMBEDDED_CONFIG_PATH, MISSING_FILE_MARKER, MOUNT_FAILURE_MARKER};
use dockhand_common::error::Result;
use dockhand_common::types::{ImageIdentity, ImageRef, Repository};

/// Options for a single container run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// Container name.
    pub name: Option<String>,
    /// Command and arguments; the image default when empty.
    pub command: Vec<String>,
    /// `name:alias` links to other containers.
    pub links: Vec<String>,
    /// Environment variables.
    pub env: BTreeMap<String, String>,
    /// `host:container` volume mounts.
    pub volumes: Vec<String>,
    /// Published ports.
    pub ports: Vec<String>,
    /// User to run as.
    pub user: Option<String>,
    /// Run in the background.
    pub detach: bool,
    /// Remove the container once it exits.
    pub remove: bool,
}

/// Captured result of a container run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunOutput {
    /// Standard output.
    pub stdout: String,
    /// Standard error.
    pub stderr: String,
    /// Exit code, `-1` when the process was killed by a signal.
    pub exit_code: i32,
}

impl RunOutput {
    /// Returns whether the run exited successfully.
    #[must_use]
    pub const fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Outcome of reading the configuration file embedded in an image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EmbeddedConfig {
    /// The raw, unparsed configuration text.
    Found(String),
    /// The image carries no configuration file.
    Missing,
    /// The container could not mount a required host directory.
    HostDirectoriesMissing,
}

impl EmbeddedConfig {
    /// Classifies the output of a run that printed the embedded configuration.
    ///
    /// A run failed when it exited non-zero, printed nothing, or reported the
    /// file as missing. A failed run whose output mentions a mount failure
    /// means host directories are missing; any other failure means the file
    /// is absent. This is the only place output markers are inspected.
    #[must_use]
    pub fn from_output(output: &RunOutput) -> Self {
        let combined = format!("{}\n{}", output.stdout, output.stderr);
        let failed = !output.success()
            || output.stdout.trim().is_empty()
            || combined.contains(MISSING_FILE_MARKER);

        if !failed {
            Self::Found(output.stdout.clone())
        } else if combined.contains(MOUNT_FAILURE_MARKER) {
            Self::HostDirectoriesMissing
        } else {
            Self::Missing
        }
    }
}

/// A source of available tags for a repository.
pub trait TagSource {
    /// Lists the tags available for `repository`.
    ///
    /// # Errors
    ///
    /// Returns an error if the source cannot be queried.
    fn available_tags(&self, repository: &Repository) -> Result<Vec<String>>;
}

/// The part of a container runtime the resolver needs.
///
/// [`TagSource::available_tags`] lists the tags of images present locally.
pub trait ContainerRuntime: TagSource {
    /// Runs a container to completion (or detaches) and captures its output.
    ///
    /// # Errors
    ///
    /// Returns an error if the runtime cannot be invoked at all. A command
    /// that runs but fails is reported through [`RunOutput::exit_code`].
    fn run(&self, image: &ImageRef, options: &RunOptions) -> Result<RunOutput>;

    /// Returns the content identity of a local image.
    ///
    /// # Errors
    ///
    /// Returns `DockhandError::ImageNotFound` if the image is not present.
    fn image_identity(&self, image: &ImageRef) -> Result<ImageIdentity>;

    /// Runs `image` once to print its embedded configuration file.
    ///
    /// # Errors
    ///
    /// Returns an error if the runtime cannot be invoked.
    fn fetch_embedded_config(&self, image: &ImageRef) -> Result<EmbeddedConfig> {
        let options = RunOptions {
            command: vec!["cat".into(), EMBEDDED_CONFIG_PATH.into()],
            remove: true,
            ..RunOptions::default()
        };
        let output = self.run(image, &options)?;
        Ok(EmbeddedConfig::from_output(&output))
    }
}

/// Container lifecycle operations used by the orchestrator.
pub trait ContainerLifecycle: ContainerRuntime {
    /// Stops a container by name.
    ///
    /// # Errors
    ///
    /// Returns an error if the runtime cannot be invoked.
    fn stop(&self, name: &str) -> Result<()>;

    /// Removes a stopped container by name.
    ///
    /// # Errors
    ///
    /// Returns an error if the runtime cannot be invoked.
    fn remove(&self, name: &str) -> Result<()>;

    /// Returns whether the container named exactly `name` is running.
    ///
    /// # Errors
    ///
    /// Returns an error if the runtime cannot be queried.
    fn is_running(&self, name: &str) -> Result<bool>;

    /// Returns the network address of a running container.
    ///
    /// # Errors
    ///
    /// Returns an error if the runtime cannot be queried.
    fn container_address(&self, name: &str) -> Result<Option<String>>;

    /// Returns the user configured in the image, if any.
    ///
    /// # Errors
    ///
    /// Returns `DockhandError::ImageNotFound` if the image is not present.
    fn image_user(&self, image: &ImageRef) -> Result<Option<String>>;

    /// Pulls an image from its registry.
    ///
    /// # Errors
    ///
    /// Returns an error if the pull fails.
    fn pull(&self, image: &ImageRef) -> Result<()>;

    /// Builds `image` from the build context in `context`.
    ///
    /// # Errors
    ///
    /// Returns an error if the runtime cannot be invoked or the build fails.
    fn build(&self, image: &ImageRef, context: &Path) -> Result<()>;

    /// Pushes `image` to its registry.
    ///
    /// # Errors
    ///
    /// Returns an error if the push fails.
    fn push(&self, image: &ImageRef) -> Result<()>;
}

/// A remote image registry.
///
/// [`TagSource::available_tags`] lists remote tags; an unknown repository
/// has no tags.
pub trait Registry: TagSource {
    /// Returns the identity the registry holds for `repository:tag`.
    ///
    /// # Errors
    ///
    /// Returns an error if the registry cannot be queried.
    fn image_id(&self, repository: &Repository, tag: &str) -> Result<Option<ImageIdentity>>;
}

/// A reverse proxy mapping hostnames to running containers.
pub trait ProxyRegistrar {
    /// Routes `hostname` to `address:port` of `container`.
    ///
    /// # Errors
    ///
    /// Returns an error if the proxy cannot be updated.
    fn register(&self, container: &str, hostname: &str, address: &str, port: u16) -> Result<()>;

    /// Removes the route of `hostname` to `address:port`.
    ///
    /// # Errors
    ///
    /// Returns an error if the proxy cannot be updated.
    fn unregister(&self, container: &str, hostname: &str, address: &str, port: u16)
    -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn output(stdout: &str, stderr: &str, exit_code: i32) -> RunOutput {
        RunOutput {
            stdout: stdout.into(),
            stderr: stderr.into(),
            exit_code,
        }
    }

    #[test]
    fn classify_found_configuration() {
        let raw = "default:\n  provides_env:\n    REDIS_URL: redis://cache\n";
        assert_eq!(
            EmbeddedConfig::from_output(&output(raw, "", 0)),
            EmbeddedConfig::Found(raw.into())
        );
    }

    #[test]
    fn classify_missing_file() {
        let out = output("cat: /dockhand.yml: No such file or directory", "", 0);
        assert_eq!(EmbeddedConfig::from_output(&out), EmbeddedConfig::Missing);
    }

    #[test]
    fn classify_mount_failure() {
        let out = output("No such file or directory: failed to mount", "", 0);
        assert_eq!(
            EmbeddedConfig::from_output(&out),
            EmbeddedConfig::HostDirectoriesMissing
        );
    }

    #[test]
    fn classify_mount_failure_on_stderr() {
        let out = output("", "Error: failed to mount /dockhand/redis/data", 125);
        assert_eq!(
            EmbeddedConfig::from_output(&out),
            EmbeddedConfig::HostDirectoriesMissing
        );
    }

    #[test]
    fn classify_empty_output_as_missing() {
        assert_eq!(
            EmbeddedConfig::from_output(&output("", "", 0)),
            EmbeddedConfig::Missing
        );
    }

    #[test]
    fn classify_non_zero_exit_as_missing() {
        let out = output("partial", "cat: /dockhand.yml: Permission denied", 1);
        assert_eq!(EmbeddedConfig::from_output(&out), EmbeddedConfig::Missing);
    }
}
