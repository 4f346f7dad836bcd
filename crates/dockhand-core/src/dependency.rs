//! Recursive resolution of backing services.
//!
//! Each declared dependency becomes a backing service in the owner's
//! registry. A full resolution picks an available local tag, reads the
//! configuration embedded in the dependency's image (through the cache),
//! and recurses into the dependencies that configuration declares.

use dockhand_common::constants::DEFAULT_ENVIRONMENT;
use dockhand_common::error::{DockhandError, Result};
use dockhand_common::types::{EnvironmentMapping, ImageRef};
use indexmap::IndexMap;

use crate::backend::{ContainerRuntime, EmbeddedConfig};
use crate::cache::ConfigurationCache;
use crate::config::{ConfigDocument, ServiceConfig};
use crate::descriptor::ServiceDescriptor;
use crate::service::ServiceModel;
use crate::tag::TagResolver;

/// How far dependencies are resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Resolve tags, read embedded configurations, and recurse.
    Full,
    /// Only build the direct backing descriptors; never runs a container.
    Shallow,
}

/// Resolves backing services against a container runtime.
pub struct DependencyResolver<'a> {
    runtime: &'a dyn ContainerRuntime,
    cache: &'a ConfigurationCache,
}

impl std::fmt::Debug for DependencyResolver<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DependencyResolver")
            .field("cache", self.cache)
            .finish_non_exhaustive()
    }
}

impl<'a> DependencyResolver<'a> {
    /// Creates a resolver.
    #[must_use]
    pub fn new(runtime: &'a dyn ContainerRuntime, cache: &'a ConfigurationCache) -> Self {
        Self { runtime, cache }
    }

    /// Resolves every dependency of `descriptor` and freezes the result.
    ///
    /// # Errors
    ///
    /// Returns an error on any failure that aborts the whole resolution:
    /// no available tag, missing host directories, a dependency cycle, or a
    /// runtime that cannot be invoked.
    pub fn resolve_service(
        &self,
        descriptor: ServiceDescriptor,
        resolution: Resolution,
    ) -> Result<ServiceModel> {
        tracing::info!(service = %descriptor.image(), ?resolution, "resolving service");
        let mut chain = vec![descriptor.image_name.clone()];
        let backing = self.resolve_dependencies(&descriptor, resolution, &mut chain)?;
        Ok(ServiceModel::new(descriptor, backing))
    }

    /// Resolves the single dependency `name` of `owner`.
    ///
    /// # Errors
    ///
    /// Returns an error on any failure that aborts the whole resolution.
    pub fn resolve(
        &self,
        owner: &ServiceDescriptor,
        name: &str,
        config: &EnvironmentMapping,
        resolution: Resolution,
    ) -> Result<ServiceModel> {
        let mut chain = vec![owner.image_name.clone()];
        self.resolve_in(owner, name, config, resolution, &mut chain)
    }

    fn resolve_dependencies(
        &self,
        owner: &ServiceDescriptor,
        resolution: Resolution,
        chain: &mut Vec<String>,
    ) -> Result<IndexMap<String, ServiceModel>> {
        let mut backing = IndexMap::with_capacity(owner.dependencies.len());
        for (name, config) in &owner.dependencies {
            let service = self.resolve_in(owner, name, config, resolution, chain)?;
            let _ = backing.insert(name.clone(), service);
        }
        Ok(backing)
    }

    fn resolve_in(
        &self,
        owner: &ServiceDescriptor,
        name: &str,
        config: &EnvironmentMapping,
        resolution: Resolution,
        chain: &mut Vec<String>,
    ) -> Result<ServiceModel> {
        let mut descriptor = ServiceDescriptor::backing(owner, name, config);
        if resolution == Resolution::Shallow {
            return Ok(ServiceModel::unresolved(descriptor));
        }

        if chain.contains(&descriptor.image_name) {
            let mut cycle = chain.clone();
            cycle.push(descriptor.image_name);
            return Err(DockhandError::CyclicDependency { chain: cycle });
        }

        descriptor.tag = TagResolver::resolve_from(self.runtime, &descriptor.repository(), &owner.tag)?;
        tracing::info!(dependency = name, image = %descriptor.image(), "resolving backing service");

        match self.load_section(name, &descriptor.image()) {
            Ok(section) => descriptor.apply(section),
            Err(e) if e.is_recoverable_dependency_failure() => {
                tracing::warn!(dependency = name, error = %e, "continuing with minimal configuration");
            }
            Err(e) => return Err(e),
        }

        chain.push(descriptor.image_name.clone());
        let backing = self.resolve_dependencies(&descriptor, resolution, chain);
        let _ = chain.pop();
        Ok(ServiceModel::new(descriptor, backing?))
    }

    /// Reads the `default` section of the configuration embedded in `image`.
    fn load_section(&self, name: &str, image: &ImageRef) -> Result<ServiceConfig> {
        let raw = self.load_raw(name, image)?;
        let document = ConfigDocument::parse(&String::from_utf8_lossy(&raw))?;
        if !document.defines(DEFAULT_ENVIRONMENT) {
            return Err(DockhandError::DefaultEnvironmentMissing {
                service: name.to_string(),
            });
        }
        document.section(DEFAULT_ENVIRONMENT)
    }

    fn load_raw(&self, name: &str, image: &ImageRef) -> Result<Vec<u8>> {
        if let Some(raw) = self.load_cached(image) {
            return Ok(raw);
        }

        match self.runtime.fetch_embedded_config(image)? {
            EmbeddedConfig::Found(text) => {
                self.store(image, text.as_bytes());
                Ok(text.into_bytes())
            }
            EmbeddedConfig::Missing => Err(DockhandError::ContainerConfigurationMissing {
                service: name.to_string(),
            }),
            EmbeddedConfig::HostDirectoriesMissing => Err(DockhandError::HostDirectoriesMissing {
                service: name.to_string(),
            }),
        }
    }

    fn load_cached(&self, image: &ImageRef) -> Option<Vec<u8>> {
        let identity = match self.runtime.image_identity(image) {
            Ok(identity) => identity,
            Err(DockhandError::ImageNotFound { .. }) => return None,
            Err(e) => {
                tracing::warn!(image = %image, error = %e, "cannot determine image identity");
                return None;
            }
        };

        self.cache.get(&identity).unwrap_or_else(|e| {
            tracing::warn!(image = %image, error = %e, "configuration cache unreadable");
            None
        })
    }

    /// Caches `raw` under the identity `image` has after the run.
    fn store(&self, image: &ImageRef, raw: &[u8]) {
        let result = self
            .runtime
            .image_identity(image)
            .and_then(|identity| self.cache.put(&identity, raw));
        if let Err(e) = result {
            tracing::warn!(image = %image, error = %e, "embedded configuration not cached");
        }
    }
}
