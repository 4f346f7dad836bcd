//! Ordered tag fallback.
//!
//! The requested tag wins when available; otherwise the first available of
//! `develop`, `master`, `latest`.

use dockhand_common::constants::FALLBACK_TAGS;
use dockhand_common::error::{DockhandError, Result};
use dockhand_common::types::Repository;

use crate::backend::TagSource;

/// Picks an available tag following the fixed preference order.
#[derive(Debug, Clone, Copy, Default)]
pub struct TagResolver;

impl TagResolver {
    /// Returns the candidate tags in preference order.
    #[must_use]
    pub fn candidates(requested: &str) -> Vec<&str> {
        std::iter::once(requested).chain(FALLBACK_TAGS).collect()
    }

    /// Resolves `requested` against `available`.
    ///
    /// `image` only appears in the error message.
    ///
    /// # Errors
    ///
    /// Returns `DockhandError::NoTagFound` if no candidate is available.
    pub fn resolve(image: &str, requested: &str, available: &[String]) -> Result<String> {
        Self::candidates(requested)
            .into_iter()
            .find(|candidate| available.iter().any(|tag| tag == candidate))
            .map(ToString::to_string)
            .ok_or_else(|| DockhandError::NoTagFound {
                image: image.to_string(),
                requested: requested.to_string(),
                available: available.to_vec(),
            })
    }

    /// Resolves `requested` against the tags `source` lists for `repository`.
    ///
    /// # Errors
    ///
    /// Returns an error if the source cannot be queried or no tag matches.
    pub fn resolve_from<T: TagSource + ?Sized>(
        source: &T,
        repository: &Repository,
        requested: &str,
    ) -> Result<String> {
        let available = source.available_tags(repository)?;
        let tag = Self::resolve(&repository.to_string(), requested, &available)?;
        if tag != requested {
            tracing::debug!(repository = %repository, requested, tag = %tag, "falling back to tag");
        }
        Ok(tag)
    }
}
