//! Container runtime backed by the docker command-line client.

use std::path::{Path, PathBuf};
use std::process::Command;

use dockhand_common::config::DockhandConfig;
use dockhand_common::error::{DockhandError, Result};
use dockhand_common::types::{ImageIdentity, ImageRef, Repository};
use dockhand_core::backend::{ContainerLifecycle, ContainerRuntime, RunOptions, RunOutput, TagSource};

/// Drives the docker binary, optionally against a remote docker host.
#[derive(Debug, Clone)]
pub struct DockerCli {
    binary: PathBuf,
    host: Option<String>,
}

impl DockerCli {
    /// Creates a client invoking `binary`, passing `-H host` when given.
    #[must_use]
    pub fn new(binary: impl Into<PathBuf>, host: Option<String>) -> Self {
        Self {
            binary: binary.into(),
            host,
        }
    }

    /// Creates a client from the process configuration without checking
    /// that the binary exists.
    #[must_use]
    pub fn from_config(config: &DockhandConfig) -> Self {
        Self::new(&config.docker_binary, config.docker_host.clone())
    }

    /// Locates the configured docker binary on `PATH`.
    ///
    /// # Errors
    ///
    /// Returns `DockhandError::NotFound` if the binary cannot be found.
    pub fn detect(config: &DockhandConfig) -> Result<Self> {
        let binary = which::which(&config.docker_binary).map_err(|_| DockhandError::NotFound {
            kind: "docker binary",
            id: config.docker_binary.clone(),
        })?;
        tracing::debug!(binary = %binary.display(), host = ?config.docker_host, "docker client detected");
        Ok(Self::new(binary, config.docker_host.clone()))
    }

    /// Returns the global arguments preceding every subcommand.
    fn global_args(&self) -> Vec<String> {
        self.host
            .as_ref()
            .map(|host| vec!["-H".to_string(), host.clone()])
            .unwrap_or_default()
    }

    /// Runs a docker subcommand and captures its output.
    fn execute(&self, args: &[String]) -> Result<RunOutput> {
        tracing::debug!(binary = %self.binary.display(), args = ?args, "invoking docker");
        let output = Command::new(&self.binary)
            .args(self.global_args())
            .args(args)
            .output()
            .map_err(|e| DockhandError::Io {
                path: self.binary.clone(),
                source: e,
            })?;

        Ok(RunOutput {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            exit_code: output.status.code().unwrap_or(-1),
        })
    }

    /// Runs a subcommand that must succeed.
    fn execute_checked(&self, args: &[String]) -> Result<RunOutput> {
        let output = self.execute(args)?;
        if output.success() {
            return Ok(output);
        }
        Err(DockhandError::Runtime {
            message: format!(
                "docker {} exited with status {}: {}",
                args.first().map_or("", String::as_str),
                output.exit_code,
                output.stderr.trim()
            ),
        })
    }

    fn inspect_image(&self, image: &ImageRef, format: &str) -> Result<String> {
        let output = self.execute(&args(["image", "inspect", "--format", format, &image.to_string()]))?;
        if !output.success() {
            return Err(DockhandError::ImageNotFound {
                image: image.to_string(),
            });
        }
        Ok(output.stdout.trim().to_string())
    }
}

impl TagSource for DockerCli {
    fn available_tags(&self, repository: &Repository) -> Result<Vec<String>> {
        let output = self.execute_checked(&args(["images", &repository.to_string(), "--format", "{{.Tag}}"]))?;
        Ok(parse_tags(&output.stdout))
    }
}

impl ContainerRuntime for DockerCli {
    fn run(&self, image: &ImageRef, options: &RunOptions) -> Result<RunOutput> {
        tracing::info!(image = %image, name = ?options.name, detach = options.detach, "docker run");
        self.execute(&run_args(image, options))
    }

    fn image_identity(&self, image: &ImageRef) -> Result<ImageIdentity> {
        self.inspect_image(image, "{{.Id}}").map(ImageIdentity::new)
    }
}

impl ContainerLifecycle for DockerCli {
    fn stop(&self, name: &str) -> Result<()> {
        let output = self.execute(&args(["stop", name]))?;
        if !output.success() {
            tracing::warn!(container = name, stderr = %output.stderr.trim(), "docker stop failed");
        }
        Ok(())
    }

    fn remove(&self, name: &str) -> Result<()> {
        let output = self.execute(&args(["rm", name]))?;
        if !output.success() {
            tracing::warn!(container = name, stderr = %output.stderr.trim(), "docker rm failed");
        }
        Ok(())
    }

    fn is_running(&self, name: &str) -> Result<bool> {
        let output = self.execute_checked(&args(["ps", "-q", "--filter", &name_filter(name)]))?;
        Ok(!output.stdout.trim().is_empty())
    }

    fn container_address(&self, name: &str) -> Result<Option<String>> {
        let output = self.execute(&args([
            "inspect",
            "--format",
            "{{.NetworkSettings.IPAddress}}",
            name,
        ]))?;
        if !output.success() {
            return Ok(None);
        }
        Ok(non_empty(&output.stdout))
    }

    fn image_user(&self, image: &ImageRef) -> Result<Option<String>> {
        self.inspect_image(image, "{{.Config.User}}")
            .map(|user| non_empty(&user))
    }

    fn pull(&self, image: &ImageRef) -> Result<()> {
        tracing::info!(image = %image, "docker pull");
        let _ = self.execute_checked(&args(["pull", &image.to_string()]))?;
        Ok(())
    }

    fn build(&self, image: &ImageRef, context: &Path) -> Result<()> {
        tracing::info!(image = %image, context = %context.display(), "docker build");
        let context = context.to_string_lossy();
        let _ = self.execute_checked(&args(["build", "-t", &image.to_string(), &context]))?;
        Ok(())
    }

    fn push(&self, image: &ImageRef) -> Result<()> {
        tracing::info!(image = %image, "docker push");
        let _ = self.execute_checked(&args(["push", &image.to_string()]))?;
        Ok(())
    }
}

fn args<const N: usize>(parts: [&str; N]) -> Vec<String> {
    parts.iter().map(ToString::to_string).collect()
}

/// Builds the arguments of `docker run` for `image` with `options`.
#[must_use]
pub fn run_args(image: &ImageRef, options: &RunOptions) -> Vec<String> {
    let mut args = vec!["run".to_string()];
    if options.detach {
        args.push("-d".into());
    }
    if options.remove {
        args.push("--rm".into());
    }
    if let Some(name) = &options.name {
        args.extend(["--name".into(), name.clone()]);
    }
    if let Some(user) = &options.user {
        args.extend(["-u".into(), user.clone()]);
    }
    for link in &options.links {
        args.extend(["--link".into(), link.clone()]);
    }
    for (key, value) in &options.env {
        args.extend(["-e".into(), format!("{key}={value}")]);
    }
    for volume in &options.volumes {
        args.extend(["-v".into(), volume.clone()]);
    }
    for port in &options.ports {
        args.extend(["-p".into(), port.clone()]);
    }
    args.push(image.to_string());
    args.extend(options.command.iter().cloned());
    args
}

/// Matches the container named exactly `name`; docker reports names with a
/// leading slash.
fn name_filter(name: &str) -> String {
    format!("name=^/?{name}$")
}

/// Parses one tag per line, skipping untagged images.
fn parse_tags(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|tag| !tag.is_empty() && *tag != "<none>")
        .map(ToString::to_string)
        .collect()
}

fn non_empty(text: &str) -> Option<String> {
    Some(text.trim())
        .filter(|t| !t.is_empty())
        .map(ToString::to_string)
}
