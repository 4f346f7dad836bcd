//! Integration tests for backing-service resolution.
//!
//! A fake container runtime serves embedded configurations per image name,
//! so these tests exercise the whole pipeline:
//! 1. Load the owner's configuration document
//! 2. Resolve tags and embedded configurations of every backing service
//! 3. Compose and interpolate the environment
//! 4. Cache embedded configurations by image identity

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;

use dockhand_common::error::{DockhandError, Result};
use dockhand_common::types::{EnvironmentMapping, ImageIdentity, ImageRef, Repository};
use dockhand_core::backend::{ContainerRuntime, RunOptions, RunOutput, TagSource};
use dockhand_core::cache::ConfigurationCache;
use dockhand_core::config::ConfigDocument;
use dockhand_core::dependency::{DependencyResolver, Resolution};
use dockhand_core::descriptor::{IdentityDefaults, ServiceDescriptor};
use dockhand_core::service::ServiceModel;

// ── Fake runtime ─────────────────────────────────────────────────────

struct Image {
    tags: Vec<String>,
    output: RunOutput,
    identity: Option<String>,
}

#[derive(Default)]
struct FakeDocker {
    images: BTreeMap<String, Image>,
    runs: RefCell<Vec<String>>,
}

impl FakeDocker {
    fn with_image(mut self, name: &str, stdout: &str, stderr: &str, exit_code: i32) -> Self {
        let image = Image {
            tags: vec!["develop".into(), "latest".into()],
            output: RunOutput {
                stdout: stdout.into(),
                stderr: stderr.into(),
                exit_code,
            },
            identity: Some(format!("sha256:{name}")),
        };
        let _ = self.images.insert(name.into(), image);
        self
    }

    fn with_config(self, name: &str, yaml: &str) -> Self {
        self.with_image(name, yaml, "", 0)
    }

    fn without_config(self, name: &str) -> Self {
        self.with_image(name, "cat: /dockhand.yml: No such file or directory", "", 1)
    }

    fn run_count(&self) -> usize {
        self.runs.borrow().len()
    }
}

impl TagSource for FakeDocker {
    fn available_tags(&self, repository: &Repository) -> Result<Vec<String>> {
        Ok(self
            .images
            .get(&repository.name)
            .map(|image| image.tags.clone())
            .unwrap_or_default())
    }
}

impl ContainerRuntime for FakeDocker {
    fn run(&self, image: &ImageRef, _options: &RunOptions) -> Result<RunOutput> {
        self.runs.borrow_mut().push(image.to_string());
        Ok(self
            .images
            .get(&image.name)
            .map(|known| known.output.clone())
            .unwrap_or_else(|| RunOutput {
                stderr: "Unable to find image".into(),
                exit_code: 125,
                ..RunOutput::default()
            }))
    }

    fn image_identity(&self, image: &ImageRef) -> Result<ImageIdentity> {
        self.images
            .get(&image.name)
            .and_then(|known| known.identity.clone())
            .map(ImageIdentity::new)
            .ok_or_else(|| DockhandError::ImageNotFound {
                image: image.to_string(),
            })
    }
}

/// An image that is only present locally once it has been run, as when
/// the first run pulls it.
#[derive(Default)]
struct PullingDocker {
    pulled: Cell<bool>,
    runs: Cell<usize>,
}

impl TagSource for PullingDocker {
    fn available_tags(&self, _repository: &Repository) -> Result<Vec<String>> {
        Ok(vec!["develop".into()])
    }
}

impl ContainerRuntime for PullingDocker {
    fn run(&self, _image: &ImageRef, _options: &RunOptions) -> Result<RunOutput> {
        self.pulled.set(true);
        self.runs.set(self.runs.get() + 1);
        Ok(RunOutput {
            stdout: "default: {}\n".into(),
            ..RunOutput::default()
        })
    }

    fn image_identity(&self, image: &ImageRef) -> Result<ImageIdentity> {
        if self.pulled.get() {
            return Ok(ImageIdentity::new("sha256:pulled"));
        }
        Err(DockhandError::ImageNotFound {
            image: image.to_string(),
        })
    }
}

fn owner(dependencies: &str) -> ServiceDescriptor {
    let text = format!(
        "default:\n  registry: my.registry.net\n  image_name: app\n  tag: feature-x\n  dependencies:\n{dependencies}"
    );
    let document = ConfigDocument::parse(&text).expect("owner document");
    ServiceDescriptor::from_document(&document, "default", &IdentityDefaults::default())
        .expect("owner descriptor")
}

fn resolve(docker: &FakeDocker, owner: ServiceDescriptor) -> Result<ServiceModel> {
    let cache = ConfigurationCache::in_memory();
    DependencyResolver::new(docker, &cache).resolve_service(owner, Resolution::Full)
}

fn env_value<'a>(model: &'a ServiceModel, key: &str) -> Option<&'a str> {
    model.environment().get(key).and_then(Option::as_deref)
}

// ── Environment wiring ───────────────────────────────────────────────

#[test]
fn queue_vhost_flows_into_provided_url() {
    let docker = FakeDocker::default().with_config(
        "queue",
        "default:\n  backing_service_env:\n    vhost: default\n  provides_env:\n    QUEUE_URL: amqp://$QUEUE_VHOST\n",
    );

    let model = resolve(&docker, owner("    queue:\n      vhost: app\n")).unwrap();

    assert_eq!(env_value(&model, "QUEUE_VHOST"), Some("app"));
    assert_eq!(env_value(&model, "QUEUE_URL"), Some("amqp://app"));
    let queue = model.backing_service("queue").expect("queue resolved");
    assert_eq!(queue.full_identity(), "my.registry.net/queue:develop");
}

#[test]
fn image_defaults_fill_unset_backing_values() {
    let docker = FakeDocker::default().with_config(
        "postgresql",
        "default:\n  backing_service_env:\n    database: app_development\n    user: postgres\n  provides_env:\n    DATABASE_URL: postgres://$POSTGRESQL_USER@db/$POSTGRESQL_DATABASE\n",
    );

    let model = resolve(&docker, owner("    postgresql:\n      database: app_test\n")).unwrap();

    assert_eq!(env_value(&model, "POSTGRESQL_DATABASE"), Some("app_test"));
    assert_eq!(env_value(&model, "POSTGRESQL_USER"), Some("postgres"));
    assert_eq!(
        env_value(&model, "DATABASE_URL"),
        Some("postgres://postgres@db/app_test")
    );
}

#[test]
fn absent_backing_value_fails_validation_only() {
    let docker = FakeDocker::default().with_config("redis", "default:\n  backing_service_env:\n    password:\n");

    let model = resolve(&docker, owner("    redis:\n")).unwrap();

    match model.checked_environment().unwrap_err() {
        DockhandError::EnvironmentVariablesMissing { keys } => {
            assert_eq!(keys, vec!["REDIS_PASSWORD".to_string()]);
        }
        other => panic!("unexpected error: {other}"),
    }
}

// ── Failure taxonomy ─────────────────────────────────────────────────

#[test]
fn missing_configuration_leaves_siblings_intact() {
    let docker = FakeDocker::default().without_config("redis").with_config(
        "postgresql",
        "default:\n  provides_env:\n    DATABASE_URL: postgres://db/$POSTGRESQL_DATABASE\n",
    );

    let model = resolve(
        &docker,
        owner("    redis:\n    postgresql:\n      database: app_development\n"),
    )
    .unwrap();

    let redis = model.backing_service("redis").expect("redis kept");
    assert!(redis.descriptor().provided_environment.is_empty());
    assert_eq!(redis.full_identity(), "my.registry.net/redis:develop");
    assert_eq!(
        env_value(&model, "DATABASE_URL"),
        Some("postgres://db/app_development")
    );
}

#[test]
fn missing_default_section_is_tolerated() {
    let docker = FakeDocker::default().with_config("redis", "test:\n  provides_env:\n    A: b\n");

    let model = resolve(&docker, owner("    redis:\n")).unwrap();

    assert!(model.backing_service("redis").is_some());
    assert_eq!(env_value(&model, "A"), None);
}

#[test]
fn null_default_section_is_tolerated() {
    let docker = FakeDocker::default().with_config("redis", "default:\n");

    let model = resolve(&docker, owner("    redis:\n")).unwrap();

    let redis = model.backing_service("redis").expect("redis resolved");
    assert_eq!(redis.full_identity(), "my.registry.net/redis:develop");
    assert!(redis.backing_services().is_empty());
}

#[test]
fn unparseable_configuration_is_tolerated() {
    let docker = FakeDocker::default().with_config("redis", "default: [unclosed\n");

    let model = resolve(&docker, owner("    redis:\n")).unwrap();

    assert!(model.backing_service("redis").is_some());
}

#[test]
fn missing_host_directories_abort_resolution() {
    let docker = FakeDocker::default()
        .with_image(
            "redis",
            "",
            "Error: No such file or directory: failed to mount /dockhand/redis/data",
            125,
        )
        .with_config("postgresql", "default: {}\n");

    let err = resolve(&docker, owner("    redis:\n    postgresql:\n")).unwrap_err();

    assert!(
        matches!(&err, DockhandError::HostDirectoriesMissing { service } if service == "redis"),
        "got: {err}"
    );
    assert_eq!(docker.run_count(), 1);
}

#[test]
fn unknown_image_has_no_tag() {
    let docker = FakeDocker::default();

    let err = resolve(&docker, owner("    elasticsearch:\n")).unwrap_err();

    assert!(matches!(err, DockhandError::NoTagFound { .. }), "got: {err}");
    assert_eq!(docker.run_count(), 0);
}

#[test]
fn dependency_cycle_is_reported() {
    let docker = FakeDocker::default().with_config("web", "default:\n  dependencies:\n    app:\n");

    let err = resolve(&docker, owner("    web:\n")).unwrap_err();

    match err {
        DockhandError::CyclicDependency { chain } => assert_eq!(chain, vec!["app", "web", "app"]),
        other => panic!("unexpected error: {other}"),
    }
}

// ── Tree queries ─────────────────────────────────────────────────────

#[test]
fn host_directories_span_three_levels() {
    let docker = FakeDocker::default()
        .with_config(
            "web",
            "default:\n  mount_src:\n    /src/web: /home/web\n  dependencies:\n    db:\n",
        )
        .with_config("db", "default:\n  data_directories:\n    - pg\n");

    let model = resolve(&docker, owner("    web:\n")).unwrap();

    assert_eq!(
        model.directories_required_on_host(),
        vec![
            "/dockhand/app/data",
            "/dockhand/web/data",
            "/src/web",
            "/dockhand/db/data",
        ]
    );
    let order: Vec<&str> = model
        .startup_order()
        .unwrap()
        .iter()
        .map(|service| service.name())
        .collect();
    assert_eq!(order, vec!["db", "web", "app"]);
}

#[test]
fn shallow_resolution_runs_nothing() {
    let docker = FakeDocker::default().with_config("redis", "default: {}\n");
    let cache = ConfigurationCache::in_memory();

    let model = DependencyResolver::new(&docker, &cache)
        .resolve_service(owner("    redis:\n"), Resolution::Shallow)
        .unwrap();

    assert_eq!(docker.run_count(), 0);
    let redis = model.backing_service("redis").expect("redis listed");
    assert_eq!(redis.descriptor().tag, "feature-x");
    assert!(redis.backing_services().is_empty());
}

// ── Configuration cache ──────────────────────────────────────────────

#[test]
fn cached_configuration_avoids_container_run() {
    let dir = tempfile::tempdir().unwrap();
    let cache = ConfigurationCache::in_directory(dir.path().join("configuration_cache"));
    let docker = FakeDocker::default().with_config(
        "redis",
        "default:\n  provides_env:\n    REDIS_URL: redis://cache\n",
    );

    let first = DependencyResolver::new(&docker, &cache)
        .resolve_service(owner("    redis:\n"), Resolution::Full)
        .unwrap();
    assert_eq!(docker.run_count(), 1);

    let second = DependencyResolver::new(&docker, &cache)
        .resolve_service(owner("    redis:\n"), Resolution::Full)
        .unwrap();
    assert_eq!(docker.run_count(), 1);
    assert_eq!(first.environment(), second.environment());
    assert_eq!(env_value(&second, "REDIS_URL"), Some("redis://cache"));
}

#[test]
fn cache_is_keyed_by_identity() {
    let cache = ConfigurationCache::in_memory();
    let docker = FakeDocker::default().with_config("redis", "default: {}\n");

    let _ = DependencyResolver::new(&docker, &cache)
        .resolve_service(owner("    redis:\n"), Resolution::Full)
        .unwrap();

    let cached = cache.get(&ImageIdentity::new("sha256:redis")).unwrap();
    assert_eq!(cached.as_deref(), Some(b"default: {}\n".as_slice()));
}

#[test]
fn configuration_of_pulled_image_is_cached_under_new_identity() {
    let docker = PullingDocker::default();
    let cache = ConfigurationCache::in_memory();
    let app = owner("    redis:\n");

    let redis = DependencyResolver::new(&docker, &cache)
        .resolve(&app, "redis", &EnvironmentMapping::new(), Resolution::Full)
        .unwrap();

    assert_eq!(redis.full_identity(), "my.registry.net/redis:develop");
    assert_eq!(docker.runs.get(), 1);
    let cached = cache.get(&ImageIdentity::new("sha256:pulled")).unwrap();
    assert_eq!(cached.as_deref(), Some(b"default: {}\n".as_slice()));
}

#[test]
fn shallow_resolution_of_unpulled_image_caches_nothing() {
    let docker = PullingDocker::default();
    let cache = ConfigurationCache::in_memory();
    let app = owner("    redis:\n");

    let redis = DependencyResolver::new(&docker, &cache)
        .resolve(&app, "redis", &EnvironmentMapping::new(), Resolution::Shallow)
        .unwrap();

    assert_eq!(redis.descriptor().tag, "feature-x");
    assert_eq!(docker.runs.get(), 0);
    assert!(cache.get(&ImageIdentity::new("sha256:pulled")).unwrap().is_none());
}
