//! Collaborator adapters for the dockhand engine.
//!
//! [`docker::DockerCli`] drives the docker binary and implements the
//! container runtime traits; [`registry::HttpRegistry`] queries an image
//! registry over HTTP.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod docker;
pub mod registry;
