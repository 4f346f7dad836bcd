//! System-wide constants and default paths.

/// Environment section used when none is requested.
pub const DEFAULT_ENVIRONMENT: &str = "default";

/// Project-relative configuration file locations, searched in order.
pub const CONFIG_FILE_CANDIDATES: [&str; 2] = ["config/dockhand.yml", "dockhand.yml"];

/// Path of the configuration file embedded in a service image.
pub const EMBEDDED_CONFIG_PATH: &str = "/dockhand.yml";

/// Tags tried, in order, after the requested tag is found unavailable.
pub const FALLBACK_TAGS: [&str; 3] = ["develop", "master", "latest"];

/// Default location of the configuration cache, relative to the working directory.
pub const DEFAULT_CACHE_DIR: &str = "tmp/configuration_cache";

/// Host-side root under which every service keeps its data volume.
pub const HOST_DATA_ROOT: &str = "/dockhand";

/// Container-side mount point of the data volume.
pub const CONTAINER_DATA_DIR: &str = "/dockhand/data";

/// Default docker binary name.
pub const DEFAULT_DOCKER_BINARY: &str = "docker";

/// Port used when a service declares a single hostname without a port.
pub const DEFAULT_HOST_PORT: u16 = 80;

/// Output marker of a runtime that could not find the embedded configuration.
pub const MISSING_FILE_MARKER: &str = "No such file or directory";

/// Output marker of a runtime that could not mount a host directory.
pub const MOUNT_FAILURE_MARKER: &str = "failed to mount";

/// Environment variable selecting the configuration section.
pub const ENV_ENVIRONMENT: &str = "DOCKHAND_ENVIRONMENT";

/// Environment variable overriding the configuration cache directory.
pub const ENV_CACHE_DIR: &str = "DOCKHAND_CACHE_DIR";

/// Environment variable naming the docker binary.
pub const ENV_DOCKER_BINARY: &str = "DOCKER_BINARY";

/// Environment variable naming the docker host.
pub const ENV_DOCKER_HOST_IP: &str = "DOCKER_HOST_IP";
