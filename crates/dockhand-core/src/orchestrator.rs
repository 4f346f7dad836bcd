//! Container orchestration of a resolved service tree.
//!
//! The orchestrator drives a [`ContainerLifecycle`] to start, stop, and run
//! commands in a service and its backing services. Tag fallback for
//! commands and pulls goes through the remote [`Registry`].

use std::path::Path;

use dockhand_common::constants::CONTAINER_DATA_DIR;
use dockhand_common::error::{DockhandError, Result};
use dockhand_common::types::{ImageIdentity, ImageRef};

use crate::backend::{ContainerLifecycle, ProxyRegistrar, Registry, RunOptions, RunOutput};
use crate::cache::ConfigurationCache;
use crate::dependency::{DependencyResolver, Resolution};
use crate::descriptor::ServiceDescriptor;
use crate::service::ServiceModel;

/// Starts, stops, and runs commands in resolved services.
pub struct Orchestrator<'a, R: ContainerLifecycle> {
    runtime: &'a R,
    registry: &'a dyn Registry,
    proxy: Option<&'a dyn ProxyRegistrar>,
    cache: &'a ConfigurationCache,
}

impl<R: ContainerLifecycle> std::fmt::Debug for Orchestrator<'_, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("cache", self.cache)
            .field("proxy", &self.proxy.is_some())
            .finish_non_exhaustive()
    }
}

impl<'a, R: ContainerLifecycle> Orchestrator<'a, R> {
    /// Creates an orchestrator without a reverse proxy.
    #[must_use]
    pub fn new(runtime: &'a R, registry: &'a dyn Registry, cache: &'a ConfigurationCache) -> Self {
        Self {
            runtime,
            registry,
            proxy: None,
            cache,
        }
    }

    /// Registers hostnames with `proxy` on start and stop.
    #[must_use]
    pub fn with_proxy(mut self, proxy: &'a dyn ProxyRegistrar) -> Self {
        self.proxy = Some(proxy);
        self
    }

    /// Returns a resolver over the same runtime and cache.
    #[must_use]
    pub fn resolver(&self) -> DependencyResolver<'a> {
        DependencyResolver::new(self.runtime, self.cache)
    }

    /// Fully resolves `descriptor` into a service model.
    ///
    /// # Errors
    ///
    /// Returns an error if resolution aborts.
    pub fn resolve(&self, descriptor: ServiceDescriptor) -> Result<ServiceModel> {
        self.resolver().resolve_service(descriptor, Resolution::Full)
    }

    /// Starts every backing service of the tree that is not running yet,
    /// dependencies first.
    ///
    /// # Errors
    ///
    /// Returns an error if a backing service cannot be started.
    pub fn ensure_backing_services(&self, model: &ServiceModel) -> Result<()> {
        for service in model.startup_order()? {
            if std::ptr::eq(service, model) {
                continue;
            }
            if self.runtime.is_running(service.name())? {
                tracing::debug!(service = service.name(), "backing service already running");
                continue;
            }
            self.start_containers(service)?;
        }
        Ok(())
    }

    /// Starts `model` detached, together with its backing services and
    /// additional commands, and routes its hostnames.
    ///
    /// # Errors
    ///
    /// Returns an error if any variable is missing or a container fails to
    /// start.
    pub fn start(&self, model: &ServiceModel) -> Result<()> {
        self.ensure_backing_services(model)?;
        self.start_containers(model)
    }

    /// Stops and removes the containers of `model` and unroutes its hostnames.
    ///
    /// A proxy that cannot be updated does not keep the containers running.
    ///
    /// # Errors
    ///
    /// Returns an error if the runtime cannot be invoked.
    pub fn stop(&self, model: &ServiceModel) -> Result<()> {
        if let Err(e) = self.update_proxy(model, false) {
            tracing::warn!(service = model.name(), error = %e, "hosts not unrouted");
        }
        for name in container_names(model) {
            tracing::info!(container = %name, "stopping container");
            self.runtime.stop(&name)?;
            self.runtime.remove(&name)?;
        }
        Ok(())
    }

    /// Stops `model`, then each of its direct backing services that is
    /// running.
    ///
    /// # Errors
    ///
    /// Returns an error if the runtime cannot be invoked.
    pub fn stop_all(&self, model: &ServiceModel) -> Result<()> {
        self.stop(model)?;
        for service in model.backing_services().values() {
            if self.runtime.is_running(service.name())? {
                self.stop(service)?;
            }
        }
        Ok(())
    }

    /// Builds the declared image of `model` from `context`.
    ///
    /// Returns whether the build produced a new image: a build that leaves
    /// the local identity unchanged did not succeed.
    ///
    /// # Errors
    ///
    /// Returns an error if the runtime cannot be invoked or the build fails.
    pub fn build(&self, model: &ServiceModel, context: &Path) -> Result<bool> {
        let image = model.image();
        let before = self.local_identity(&image)?;
        tracing::info!(image = %image, context = %context.display(), "building image");
        self.runtime.build(&image, context)?;
        let after = self.local_identity(&image)?;
        Ok(after.is_some() && after != before)
    }

    /// Pushes the declared image of `model`.
    ///
    /// # Errors
    ///
    /// Returns an error if the push fails.
    pub fn push(&self, model: &ServiceModel) -> Result<()> {
        let image = model.image();
        tracing::info!(image = %image, "pushing image");
        self.runtime.push(&image)
    }

    /// Builds, tests, and pushes `model`. Returns `false` without pushing
    /// when the build produced no new image or the tests failed.
    ///
    /// # Errors
    ///
    /// Returns an error if any step cannot be carried out.
    pub fn release(&self, model: &ServiceModel, context: &Path) -> Result<bool> {
        if !self.build(model, context)? {
            tracing::warn!(service = model.name(), "build produced no new image");
            return Ok(false);
        }
        if !self.test(model)? {
            tracing::warn!(service = model.name(), "tests failed");
            return Ok(false);
        }
        self.push(model)?;
        Ok(true)
    }

    /// Runs `command` in a fresh container of `model` after creating its
    /// data directories.
    ///
    /// # Errors
    ///
    /// Returns an error if no tag is available, a variable is missing, or
    /// the runtime cannot be invoked.
    pub fn exec(&self, model: &ServiceModel, command: &[String]) -> Result<RunOutput> {
        self.create_data_directories(model)?;
        self.run(model, command)
    }

    /// Runs `command` in a fresh container of `model`.
    ///
    /// # Errors
    ///
    /// Returns an error if no tag is available, a variable is missing, or
    /// the runtime cannot be invoked.
    pub fn run(&self, model: &ServiceModel, command: &[String]) -> Result<RunOutput> {
        let image = model.image_with_fallback(self.registry)?;
        self.run_in(model, &image, command)
    }

    fn run_in(&self, model: &ServiceModel, image: &ImageRef, command: &[String]) -> Result<RunOutput> {
        let options = RunOptions {
            command: command.to_vec(),
            links: model.links(),
            env: model.checked_environment()?,
            volumes: model.volumes(),
            remove: true,
            ..RunOptions::default()
        };
        tracing::info!(image = %image, command = ?command, "running command");
        self.runtime.run(image, &options)
    }

    /// Runs the declared test command in the declared image of `model` with
    /// its backing services up. Returns `true` when no test command is
    /// declared.
    ///
    /// # Errors
    ///
    /// Returns an error if the environment cannot be started.
    pub fn test(&self, model: &ServiceModel) -> Result<bool> {
        let Some(test_command) = model.descriptor().test_command.as_deref() else {
            return Ok(true);
        };
        if test_command.trim().is_empty() {
            return Ok(true);
        }
        self.ensure_backing_services(model)?;
        self.create_data_directories(model)?;
        let output = self.run_in(model, &model.image(), &shell(test_command))?;
        Ok(output.success())
    }

    /// Creates the declared data directories inside the data volume, owned
    /// by the image's configured user.
    ///
    /// # Errors
    ///
    /// Returns an error if no tag is available or the command fails.
    pub fn create_data_directories(&self, model: &ServiceModel) -> Result<()> {
        let directories = &model.descriptor().data_directories;
        if directories.is_empty() {
            return Ok(());
        }

        let image = model.image_with_fallback(self.registry)?;
        let user = self.runtime.image_user(&image)?;
        let options = RunOptions {
            command: shell(&data_directories_script(directories, user.as_deref())),
            volumes: model.volumes(),
            user: Some("root".into()),
            remove: true,
            ..RunOptions::default()
        };
        tracing::info!(service = model.name(), count = directories.len(), "creating data directories");
        self.run_checked(&image, &options)
    }

    /// Returns whether the registry holds a different image for the
    /// fallback tag than the one present locally.
    ///
    /// # Errors
    ///
    /// Returns an error if the registry cannot be queried.
    pub fn newer_version_available(&self, model: &ServiceModel) -> Result<bool> {
        let tag = model.tag_with_fallback(self.registry)?;
        let Some(remote) = self.registry.image_id(&model.repository(), tag)? else {
            return Ok(false);
        };
        let local = self.local_identity(&model.image())?;
        Ok(local.as_ref() != Some(&remote))
    }

    /// Pulls the image of `model` at its fallback tag.
    ///
    /// # Errors
    ///
    /// Returns an error if no tag is available or the pull fails.
    pub fn pull(&self, model: &ServiceModel) -> Result<()> {
        let image = model.image_with_fallback(self.registry)?;
        tracing::info!(image = %image, "pulling image");
        self.runtime.pull(&image)
    }

    /// Pulls every direct backing service of `owner` without inspecting
    /// their images first.
    ///
    /// # Errors
    ///
    /// Returns an error if a pull fails.
    pub fn pull_backing_services(&self, owner: &ServiceDescriptor) -> Result<()> {
        let model = self.resolver().resolve_service(owner.clone(), Resolution::Shallow)?;
        for service in model.backing_services().values() {
            self.pull(service)?;
        }
        Ok(())
    }

    /// Removes every cached embedded configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the cache cannot be removed.
    pub fn clean(&self) -> Result<()> {
        self.cache.clear()
    }

    fn start_containers(&self, model: &ServiceModel) -> Result<()> {
        self.create_data_directories(model)?;
        let env = model.checked_environment()?;
        let image = model.image();

        for (name, command) in &model.descriptor().additional_commands {
            let options = RunOptions {
                name: Some(format!("{}_{name}", model.name())),
                command: shell(command),
                links: model.links(),
                env: env.clone(),
                volumes: model.volumes(),
                detach: true,
                ..RunOptions::default()
            };
            self.run_checked(&image, &options)?;
        }

        let options = RunOptions {
            name: Some(model.name().to_string()),
            links: model.links(),
            env,
            volumes: model.volumes(),
            ports: model.descriptor().ports.clone(),
            detach: true,
            ..RunOptions::default()
        };
        tracing::info!(image = %image, "starting container");
        self.run_checked(&image, &options)?;
        self.update_proxy(model, true)
    }

    fn local_identity(&self, image: &ImageRef) -> Result<Option<ImageIdentity>> {
        match self.runtime.image_identity(image) {
            Ok(identity) => Ok(Some(identity)),
            Err(DockhandError::ImageNotFound { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn run_checked(&self, image: &ImageRef, options: &RunOptions) -> Result<()> {
        let output = self.runtime.run(image, options)?;
        if output.success() {
            return Ok(());
        }
        Err(DockhandError::Runtime {
            message: format!(
                "{image} exited with status {}: {}",
                output.exit_code,
                output.stderr.trim()
            ),
        })
    }

    fn update_proxy(&self, model: &ServiceModel, up: bool) -> Result<()> {
        let hosts = &model.descriptor().hosts;
        let Some(proxy) = self.proxy else {
            return Ok(());
        };
        if hosts.is_empty() {
            return Ok(());
        }
        let Some(address) = self.runtime.container_address(model.name())? else {
            tracing::warn!(service = model.name(), "no container address, hosts not routed");
            return Ok(());
        };

        for host in hosts {
            if up {
                proxy.register(model.name(), &host.hostname, &address, host.port)?;
            } else {
                proxy.unregister(model.name(), &host.hostname, &address, host.port)?;
            }
        }
        Ok(())
    }
}

fn container_names(model: &ServiceModel) -> Vec<String> {
    std::iter::once(model.name().to_string())
        .chain(
            model
                .descriptor()
                .additional_commands
                .keys()
                .map(|name| format!("{}_{name}", model.name())),
        )
        .collect()
}

fn shell(command: &str) -> Vec<String> {
    vec!["/bin/bash".into(), "-c".into(), command.into()]
}

fn data_directories_script(directories: &[String], user: Option<&str>) -> String {
    let paths = directories
        .iter()
        .map(|dir| format!("{CONTAINER_DATA_DIR}/{dir}"))
        .collect::<Vec<_>>()
        .join(" ");
    match user.filter(|u| !u.is_empty()) {
        Some(user) => format!("mkdir -p {paths}; chown {user}:{user} {paths}"),
        None => format!("mkdir -p {paths}"),
    }
}
