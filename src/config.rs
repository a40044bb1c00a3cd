use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{BentoError, Result};
use crate::fs_util::atomic_write;
use crate::paths::{get_data_dir, settings_path};
use crate::poll::PollPolicy;

pub const DEFAULT_IMAGE: &str = "kijiproject/bento-cluster";
pub const DEFAULT_PLATFORM_VERSION: &str = "cdh5.0.3";
pub const DEFAULT_DOCKER_ADDRESS: &str = "tcp://127.0.0.1:2375";
pub const DEFAULT_SUPERVISOR_PORT: u16 = 9001;
pub const DEFAULT_HOSTS_HELPER: &str = "bento-update-hosts";

/// User settings stored in ~/.bento/config.toml.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Settings {
    #[serde(default = "default_image")]
    pub image: String,
    #[serde(default)]
    pub docker_address: Option<String>,
    #[serde(default = "default_platform_version")]
    pub default_platform_version: String,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default)]
    pub hosts_file: Option<PathBuf>,
    #[serde(default)]
    pub client_config_root: Option<PathBuf>,
    #[serde(default = "default_supervisor_port")]
    pub supervisor_port: u16,
    #[serde(default = "default_hosts_helper")]
    pub hosts_helper: String,
    #[serde(default = "default_required_services")]
    pub required_services: Vec<RequiredService>,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_image() -> String {
    DEFAULT_IMAGE.to_string()
}

fn default_platform_version() -> String {
    DEFAULT_PLATFORM_VERSION.to_string()
}

fn default_poll_interval_ms() -> u64 {
    100
}

fn default_timeout_ms() -> u64 {
    120_000
}

fn default_supervisor_port() -> u16 {
    DEFAULT_SUPERVISOR_PORT
}

fn default_hosts_helper() -> String {
    DEFAULT_HOSTS_HELPER.to_string()
}

fn default_required_services() -> Vec<RequiredService> {
    vec![RequiredService {
        name: "hdfs-init".to_string(),
        expect: ServiceExpectation::Exited { exit_status: 0 },
    }]
}

fn default_request_timeout_secs() -> u64 {
    30
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            image: default_image(),
            docker_address: None,
            default_platform_version: default_platform_version(),
            poll_interval_ms: default_poll_interval_ms(),
            timeout_ms: default_timeout_ms(),
            hosts_file: None,
            client_config_root: None,
            supervisor_port: default_supervisor_port(),
            hosts_helper: default_hosts_helper(),
            required_services: default_required_services(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

/// A supervisor program that must be up before a bento counts as ready.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RequiredService {
    pub name: String,
    #[serde(default)]
    pub expect: ServiceExpectation,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ServiceExpectation {
    /// Long-running daemon, must be RUNNING.
    #[default]
    Running,
    /// One-shot task, must have EXITED with this status.
    Exited { exit_status: i32 },
}

impl Settings {
    /// Load settings from `path`, writing defaults there when the file is missing.
    pub fn load_or_init(path: &Path) -> Result<Self> {
        if !path.exists() {
            let settings = Self::default();
            settings.save(path)?;
            return Ok(settings);
        }
        let content = fs::read_to_string(path).map_err(|e| BentoError::config(e.to_string()))?;
        Self::parse(&content)
    }

    /// Load from the default location (~/.bento/config.toml).
    pub fn load_default() -> Result<Self> {
        Self::load_or_init(&settings_path()?)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let settings: Self = toml::from_str(content)?;
        settings.poll_policy()?;
        Ok(settings)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        atomic_write(path, content.as_bytes())
    }

    /// Poll policy for start/stop waits.
    pub fn poll_policy(&self) -> Result<PollPolicy> {
        PollPolicy::from_millis(self.poll_interval_ms, self.timeout_ms)
    }

    /// Engine address: settings, then DOCKER_HOST, then the local TCP default.
    pub fn resolve_docker_address(&self, docker_host_env: Option<&str>) -> String {
        self.docker_address
            .clone()
            .or_else(|| {
                docker_host_env
                    .filter(|v| !v.is_empty())
                    .map(str::to_string)
            })
            .unwrap_or_else(|| DEFAULT_DOCKER_ADDRESS.to_string())
    }

    /// Root under which per-bento client config dirs live.
    pub fn client_config_root(&self) -> Result<PathBuf> {
        match &self.client_config_root {
            Some(root) => Ok(root.clone()),
            None => get_data_dir(),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Full image reference for a platform version, e.g. `kijiproject/bento-cluster:cdh5.0.3`.
    pub fn image_ref(&self, platform_version: &str) -> String {
        format!("{}:{}", self.image, platform_version)
    }
}

/// Which parts of the local environment to synchronize after a state change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncOptions {
    pub sync_hosts: bool,
    pub sync_config: bool,
    /// Overrides the default `<client_config_root>/<name>`.
    pub config_dir: Option<PathBuf>,
    /// Overrides the default hosts target.
    pub hosts_path: Option<PathBuf>,
}

impl SyncOptions {
    pub fn none() -> Self {
        Self {
            sync_hosts: false,
            sync_config: false,
            config_dir: None,
            hosts_path: None,
        }
    }
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            sync_hosts: true,
            sync_config: true,
            config_dir: None,
            hosts_path: None,
        }
    }
}

/// What `create` does after the container exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchOptions {
    pub start: bool,
    pub sync: SyncOptions,
    pub poll: PollPolicy,
}

impl Default for LaunchOptions {
    fn default() -> Self {
        Self {
            start: true,
            sync: SyncOptions::default(),
            poll: PollPolicy::default(),
        }
    }
}
