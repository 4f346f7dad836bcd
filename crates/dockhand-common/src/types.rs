//! Domain primitive types used across the dockhand workspace.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Environment variables where `None` marks a declared but absent value.
pub type EnvironmentMapping = BTreeMap<String, Option<String>>;

/// Content identifier of a built image, as reported by the runtime.
///
/// Unlike tags, identities never move to another image.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageIdentity(String);

impl ImageIdentity {
    /// Creates an identity from the runtime's string representation.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the inner string representation.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ImageIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An image repository: a registry host plus an image name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Repository {
    /// Registry host, e.g. `registry.example.com:5000`.
    pub registry: String,
    /// Image name within the registry.
    pub name: String,
}

impl Repository {
    /// Creates a repository reference.
    #[must_use]
    pub fn new(registry: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            registry: registry.into(),
            name: name.into(),
        }
    }

    /// Returns a reference to `tag` within this repository.
    #[must_use]
    pub fn with_tag(&self, tag: impl Into<String>) -> ImageRef {
        ImageRef {
            registry: self.registry.clone(),
            name: self.name.clone(),
            tag: tag.into(),
        }
    }
}

impl fmt::Display for Repository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.registry, self.name)
    }
}

/// A fully qualified image reference: `registry/name:tag`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageRef {
    /// Registry host.
    pub registry: String,
    /// Image name within the registry.
    pub name: String,
    /// Mutable tag.
    pub tag: String,
}

impl ImageRef {
    /// Creates an image reference.
    #[must_use]
    pub fn new(registry: impl Into<String>, name: impl Into<String>, tag: impl Into<String>) -> Self {
        Self {
            registry: registry.into(),
            name: name.into(),
            tag: tag.into(),
        }
    }

    /// Returns the repository part of the reference.
    #[must_use]
    pub fn repository(&self) -> Repository {
        Repository::new(self.registry.clone(), self.name.clone())
    }
}

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}:{}", self.registry, self.name, self.tag)
    }
}

/// Normalizes an image name: dashes become underscores and dots are dropped.
#[must_use]
pub fn normalize_image_name(name: &str) -> String {
    name.chars()
        .filter(|c| *c != '.')
        .map(|c| if c == '-' { '_' } else { c })
        .collect()
}
