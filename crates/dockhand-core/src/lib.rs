//! # dockhand-core
//!
//! Resolves a service and its transitive backing services into an immutable,
//! queryable model: image tags with fallback, environment variables composed
//! across the dependency tree, volumes and host directories, and the
//! embedded configuration of each backing image (cached by image identity).
//!
//! Handles:
//! - **Config**: Typed configuration documents and project loading.
//! - **Tag**: Ordered tag fallback.
//! - **Cache**: Identity-keyed configuration cache over a pluggable store.
//! - **Environment**: Composition, interpolation, and validation of variables.
//! - **Dependency**: Recursive backing-service resolution.
//! - **Service**: The resolved service model.
//! - **Graph**: Dependencies-first startup order.
//! - **Orchestrator**: Start, stop, and exec on top of the resolved model.
//!
//! The container runtime, image registry, and reverse-proxy registrar are
//! consumed through the traits in [`backend`].

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod backend;
pub mod cache;
pub mod config;
pub mod dependency;
pub mod descriptor;
pub mod environment;
pub mod graph;
pub mod orchestrator;
pub mod service;
pub mod tag;
