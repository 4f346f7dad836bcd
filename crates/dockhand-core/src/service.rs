//! The resolved, queryable model of a service and its backing services.

use std::cell::OnceCell;
use std::collections::BTreeMap;

use dockhand_common::error::Result;
use dockhand_common::types::{EnvironmentMapping, ImageRef, Repository};
use indexmap::IndexMap;

use crate::backend::TagSource;
use crate::descriptor::ServiceDescriptor;
use crate::environment::EnvironmentComposer;
use crate::graph::DependencyGraph;
use crate::tag::TagResolver;

/// A service whose dependency tree has been resolved.
///
/// The model is immutable once built. The only lazily computed value is the
/// fallback tag, which depends on the tag source passed at the call site.
#[derive(Debug, Clone)]
pub struct ServiceModel {
    descriptor: ServiceDescriptor,
    backing_services: IndexMap<String, ServiceModel>,
    environment: EnvironmentMapping,
    fallback_tag: OnceCell<String>,
}

impl ServiceModel {
    /// Freezes `descriptor` with its resolved backing services.
    #[must_use]
    pub fn new(descriptor: ServiceDescriptor, backing_services: IndexMap<String, Self>) -> Self {
        let environment = EnvironmentComposer::compose(
            &descriptor,
            backing_services
                .iter()
                .map(|(name, service)| (name.as_str(), &service.descriptor)),
        );
        Self {
            descriptor,
            backing_services,
            environment,
            fallback_tag: OnceCell::new(),
        }
    }

    /// Freezes `descriptor` without backing services.
    #[must_use]
    pub fn unresolved(descriptor: ServiceDescriptor) -> Self {
        Self::new(descriptor, IndexMap::new())
    }

    /// Returns the underlying descriptor.
    #[must_use]
    pub const fn descriptor(&self) -> &ServiceDescriptor {
        &self.descriptor
    }

    /// Returns the image name, which is also the container name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.descriptor.image_name
    }

    /// Returns the declared image reference.
    #[must_use]
    pub fn image(&self) -> ImageRef {
        self.descriptor.image()
    }

    /// Returns the repository of the image.
    #[must_use]
    pub fn repository(&self) -> Repository {
        self.descriptor.repository()
    }

    /// Returns `registry/image_name:tag`.
    #[must_use]
    pub fn full_identity(&self) -> String {
        self.image().to_string()
    }

    /// Returns the backing services in declaration order.
    #[must_use]
    pub const fn backing_services(&self) -> &IndexMap<String, Self> {
        &self.backing_services
    }

    /// Returns the backing service declared as `name`.
    #[must_use]
    pub fn backing_service(&self, name: &str) -> Option<&Self> {
        self.backing_services.get(name)
    }

    /// Returns the composed environment, possibly with absent values.
    #[must_use]
    pub const fn environment(&self) -> &EnvironmentMapping {
        &self.environment
    }

    /// Returns the composed environment with every value present.
    ///
    /// # Errors
    ///
    /// Returns `DockhandError::EnvironmentVariablesMissing` if any value is absent.
    pub fn checked_environment(&self) -> Result<BTreeMap<String, String>> {
        EnvironmentComposer::validate(&self.environment)
    }

    /// Returns the volume mounts of this service.
    #[must_use]
    pub fn volumes(&self) -> Vec<String> {
        self.descriptor.volumes()
    }

    /// Returns the host side of every volume in the tree: this service
    /// first, then each backing service recursively in declaration order.
    #[must_use]
    pub fn directories_required_on_host(&self) -> Vec<String> {
        let mut dirs: Vec<String> = self
            .volumes()
            .iter()
            .filter_map(|volume| volume.split(':').next())
            .map(ToString::to_string)
            .collect();
        for service in self.backing_services.values() {
            dirs.extend(service.directories_required_on_host());
        }
        dirs
    }

    /// Returns `name:name` container links for each direct backing service.
    #[must_use]
    pub fn links(&self) -> Vec<String> {
        self.backing_services
            .values()
            .map(|service| format!("{0}:{0}", service.name()))
            .collect()
    }

    /// Returns the tag to run, falling back along `develop`, `master`, `latest`.
    ///
    /// The first successful result is kept for the lifetime of the model.
    ///
    /// # Errors
    ///
    /// Returns an error if `source` fails or no tag is available.
    pub fn tag_with_fallback<T: TagSource + ?Sized>(&self, source: &T) -> Result<&str> {
        if let Some(tag) = self.fallback_tag.get() {
            return Ok(tag);
        }
        let tag = TagResolver::resolve_from(source, &self.repository(), &self.descriptor.tag)?;
        Ok(self.fallback_tag.get_or_init(|| tag))
    }

    /// Returns the image reference with the fallback tag.
    ///
    /// # Errors
    ///
    /// Returns an error if no tag is available.
    pub fn image_with_fallback<T: TagSource + ?Sized>(&self, source: &T) -> Result<ImageRef> {
        let tag = self.tag_with_fallback(source)?;
        Ok(self.repository().with_tag(tag))
    }

    /// Returns this service and every transitive backing service, depth first.
    #[must_use]
    pub fn walk(&self) -> Vec<&Self> {
        let mut services = vec![self];
        for service in self.backing_services.values() {
            services.extend(service.walk());
        }
        services
    }

    /// Builds the dependency graph of the whole tree.
    #[must_use]
    pub fn dependency_graph(&self) -> DependencyGraph {
        let mut graph = DependencyGraph::new();
        for service in self.walk() {
            let dependent = graph.add_service(service.name());
            for backing in service.backing_services.values() {
                let dependency = graph.add_service(backing.name());
                graph.add_dependency(dependent, dependency);
            }
        }
        graph
    }

    /// Returns every service of the tree, each after its dependencies.
    ///
    /// Services sharing an image name appear once.
    ///
    /// # Errors
    ///
    /// Returns `DockhandError::CyclicDependency` if names form a cycle.
    pub fn startup_order(&self) -> Result<Vec<&Self>> {
        let services = self.walk();
        let order = self.dependency_graph().startup_order()?;
        Ok(order
            .iter()
            .filter_map(|name| services.iter().copied().find(|s| s.name() == name))
            .collect())
    }
}
