//! Deployment configuration

use std::path::PathBuf;

use crate::runtime::NetworkMode;

/// Fixed in-container path the release directory is mounted at
pub const RELEASE_MOUNT_PATH: &str = "/app";

/// What to release and how; not persisted
#[derive(Debug, Clone)]
pub struct DeploymentConfig {
    pub app_name: String,

    /// Tag of the `{app_name}` image to run
    pub image_tag: String,

    pub env_file_path: PathBuf,

    /// Built release, mounted read/write at [`RELEASE_MOUNT_PATH`]
    pub release_directory: PathBuf,

    /// Caller's preference; `ZERO_DOWNTIME` in the env file decides
    pub zero_downtime_requested: bool,

    pub health_timeout_secs: u64,

    /// `None` leaves the runtime's default network
    pub network_mode: Option<NetworkMode>,

    /// Ordered `host:internal` mappings. Empty means publish `PORT:PORT`
    /// when the env file (or `default_port`) names a port.
    pub port_mappings: Vec<String>,

    /// Extra `source:target` mounts
    pub volume_mounts: Vec<String>,

    /// Container port used when the env file has no `PORT`
    pub default_port: Option<u16>,

    /// Stop the displaced unit but keep it as `{app}-old` for rollback
    pub keep_previous: bool,
}

impl DeploymentConfig {
    pub fn new(
        app_name: impl Into<String>,
        image_tag: impl Into<String>,
        env_file_path: impl Into<PathBuf>,
        release_directory: impl Into<PathBuf>,
    ) -> Self {
        Self {
            app_name: app_name.into(),
            image_tag: image_tag.into(),
            env_file_path: env_file_path.into(),
            release_directory: release_directory.into(),
            zero_downtime_requested: true,
            health_timeout_secs: 60,
            network_mode: None,
            port_mappings: Vec::new(),
            volume_mounts: Vec::new(),
            default_port: None,
            keep_previous: false,
        }
    }

    /// Image reference `{app}:{tag}`
    pub fn image(&self) -> String {
        format!("{}:{}", self.app_name, self.image_tag)
    }

    pub fn publishes_ports(&self) -> bool {
        self.network_mode
            .as_ref()
            .map(NetworkMode::publishes_ports)
            .unwrap_or(true)
    }

    /// Port mappings for a unit listening on `container_port`
    pub fn ports_for(&self, container_port: Option<u16>) -> Vec<String> {
        if !self.publishes_ports() {
            return Vec::new();
        }
        if !self.port_mappings.is_empty() {
            return self.port_mappings.clone();
        }
        container_port
            .map(|port| vec![format!("{}:{}", port, port)])
            .unwrap_or_default()
    }

    /// Release directory mount followed by the declared volumes
    pub fn volumes(&self) -> Vec<String> {
        let mut volumes = vec![format!(
            "{}:{}",
            self.release_directory.display(),
            RELEASE_MOUNT_PATH
        )];
        volumes.extend(self.volume_mounts.iter().cloned());
        volumes
    }
}

/// Split a `[ip:]host:internal[/proto]` mapping into its host and internal ports
pub fn parse_port_mapping(mapping: &str) -> Option<(u16, u16)> {
    let mapping = mapping.split('/').next()?;
    let mut parts = mapping.rsplit(':');
    let internal = parts.next()?.parse().ok()?;
    let host = parts.next()?.parse().ok()?;
    Some((host, internal))
}
