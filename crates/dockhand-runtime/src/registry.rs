//! Image registry client over the v1 HTTP tag API.
//!
//! The registry host is taken from each [`Repository`], so one client
//! serves every registry a service tree refers to.

use dockhand_common::error::{DockhandError, Result};
use dockhand_common::types::{ImageIdentity, Repository};
use dockhand_core::backend::{Registry, TagSource};
use reqwest::StatusCode;
use reqwest::blocking::Client;
use serde_json::Value;

/// Error body returned for an unknown repository.
const REPOSITORY_NOT_FOUND: &str = "Repository not found";

/// Queries registries with blocking HTTP requests.
#[derive(Debug, Clone, Default)]
pub struct HttpRegistry {
    client: Client,
}

impl HttpRegistry {
    /// Creates a registry client.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry client on top of an existing HTTP client.
    #[must_use]
    pub const fn with_client(client: Client) -> Self {
        Self { client }
    }

    fn get(&self, repository: &Repository, url: &str) -> Result<(StatusCode, String)> {
        tracing::debug!(url, "querying registry");
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|e| registry_error(repository, e))?;
        let status = response.status();
        let body = response.text().map_err(|e| registry_error(repository, e))?;
        Ok((status, body))
    }
}

impl TagSource for HttpRegistry {
    fn available_tags(&self, repository: &Repository) -> Result<Vec<String>> {
        let (status, body) = self.get(repository, &tags_url(repository))?;
        parse_listing(repository, status, &body)
    }
}

impl Registry for HttpRegistry {
    fn image_id(&self, repository: &Repository, tag: &str) -> Result<Option<ImageIdentity>> {
        let url = format!("{}/{tag}", tags_url(repository));
        let (status, body) = self.get(repository, &url)?;
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(DockhandError::Registry {
                registry: repository.registry.clone(),
                message: format!("HTTP {status} for {url}"),
            });
        }
        parse_image_id(repository, &body).map(Some)
    }
}

fn tags_url(repository: &Repository) -> String {
    format!(
        "http://{}/v1/repositories/{}/tags",
        repository.registry, repository.name
    )
}

fn registry_error(repository: &Repository, e: impl std::fmt::Display) -> DockhandError {
    DockhandError::Registry {
        registry: repository.registry.clone(),
        message: e.to_string(),
    }
}

/// Checks the status of a tag listing response before parsing its body.
///
/// A 404 carries the registry's error object and is parsed like a success.
fn parse_listing(repository: &Repository, status: StatusCode, body: &str) -> Result<Vec<String>> {
    if !status.is_success() && status != StatusCode::NOT_FOUND {
        return Err(registry_error(
            repository,
            format!("HTTP {status} for {}", tags_url(repository)),
        ));
    }
    parse_tags(repository, body)
}

/// Parses a tag listing: an object of tag to image id, or an error object.
///
/// An unknown repository has no tags.
fn parse_tags(repository: &Repository, body: &str) -> Result<Vec<String>> {
    let value: Value = serde_json::from_str(body)?;
    let Value::Object(object) = value else {
        return Err(registry_error(repository, "tag listing is not an object"));
    };

    if let Some(error) = object.get("error") {
        let message = error.as_str().unwrap_or_default();
        if message == REPOSITORY_NOT_FOUND {
            tracing::debug!(repository = %repository, "repository not found in registry");
            return Ok(Vec::new());
        }
        return Err(registry_error(repository, message));
    }

    Ok(object.keys().cloned().collect())
}

/// Parses the image id of a single tag, a JSON string.
fn parse_image_id(repository: &Repository, body: &str) -> Result<ImageIdentity> {
    match serde_json::from_str::<Value>(body)? {
        Value::String(id) => Ok(ImageIdentity::new(id)),
        other => Err(registry_error(
            repository,
            format!("unexpected image id: {other}"),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repository() -> Repository {
        Repository::new("my.registry.net", "postgresql")
    }

    #[test]
    fn tags_url_uses_repository_registry() {
        assert_eq!(
            tags_url(&repository()),
            "http://my.registry.net/v1/repositories/postgresql/tags"
        );
    }

    #[test]
    fn tags_are_object_keys() {
        let body = r#"{"latest": "abc123", "develop": "def456"}"#;
        let mut tags = parse_tags(&repository(), body).unwrap();
        tags.sort();
        assert_eq!(tags, vec!["develop", "latest"]);
    }

    #[test]
    fn unknown_repository_has_no_tags() {
        let body = r#"{"error": "Repository not found"}"#;
        assert!(parse_tags(&repository(), body).unwrap().is_empty());
    }

    #[test]
    fn other_errors_are_reported() {
        let body = r#"{"error": "Internal failure"}"#;
        let err = parse_tags(&repository(), body).unwrap_err();
        assert!(err.to_string().contains("Internal failure"), "got: {err}");
    }

    #[test]
    fn failed_listing_is_reported_with_status() {
        let err = parse_listing(&repository(), StatusCode::BAD_GATEWAY, "{}").unwrap_err();
        assert!(matches!(err, DockhandError::Registry { .. }));
        assert!(err.to_string().contains("502"), "got: {err}");

        let err = parse_listing(&repository(), StatusCode::UNAUTHORIZED, r#"{"latest": "abc"}"#)
            .unwrap_err();
        assert!(err.to_string().contains("401"), "got: {err}");
    }

    #[test]
    fn not_found_listing_reads_error_body() {
        let body = r#"{"error": "Repository not found"}"#;
        let tags = parse_listing(&repository(), StatusCode::NOT_FOUND, body).unwrap();
        assert!(tags.is_empty());
    }

    #[test]
    fn successful_listing_is_parsed() {
        let tags = parse_listing(&repository(), StatusCode::OK, r#"{"latest": "abc"}"#).unwrap();
        assert_eq!(tags, vec!["latest"]);
    }

    #[test]
    fn non_object_listing_is_an_error() {
        assert!(parse_tags(&repository(), "[]").is_err());
        assert!(parse_tags(&repository(), "not json").is_err());
    }

    #[test]
    fn image_id_is_a_json_string() {
        let id = parse_image_id(&repository(), r#""sha256:0123""#).unwrap();
        assert_eq!(id.as_str(), "sha256:0123");
        assert!(parse_image_id(&repository(), "42").is_err());
    }
}
