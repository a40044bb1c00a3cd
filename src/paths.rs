//! Centralized path utilities for bento state on the local machine.

use std::path::{Path, PathBuf};

use crate::error::{BentoError, Result};

pub const GLOBAL_HOSTS_FILE_PATH: &str = "/etc/hosts";

/// Get the root data directory (~/.bento).
pub fn get_data_dir() -> Result<PathBuf> {
    let home = dirs::home_dir().ok_or_else(|| BentoError::config("Cannot find home directory"))?;
    Ok(home.join(".bento"))
}

/// Get the path to the settings file.
pub fn settings_path() -> Result<PathBuf> {
    Ok(get_data_dir()?.join("config.toml"))
}

/// Client configuration directory for one bento: `<root>/<name>`.
pub fn client_config_dir(root: &Path, bento_name: &str) -> PathBuf {
    root.join(bento_name)
}

/// Line layout of a name resolution file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostsFormat {
    /// `/etc/hosts`: `<address> <hostname>`
    Hosts,
    /// HOSTALIASES file: `<hostname> <address>`
    HostAliases,
}

/// Resolution file to keep in sync and how its lines are laid out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostsTarget {
    pub path: PathBuf,
    pub format: HostsFormat,
}

impl HostsTarget {
    pub fn hosts(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            format: HostsFormat::Hosts,
        }
    }
}

/// Pick the resolution file when none was given.
///
/// Linux resolvers honour HOSTALIASES, which lets a non-root user resolve the
/// bento hostname without touching /etc/hosts.
pub fn default_hosts_target(hostaliases: Option<&str>) -> HostsTarget {
    if cfg!(target_os = "linux") {
        match hostaliases.filter(|v| !v.is_empty()) {
            Some(path) => {
                return HostsTarget {
                    path: PathBuf::from(path),
                    format: HostsFormat::HostAliases,
                }
            }
            None => log::warn!(
                "The HOSTALIASES environment variable is not set. \
                 This can be used to allow bento to be run as non-root. \
                 Please update your bash configuration and add: \
                 export HOSTALIASES=${{HOME}}/.hosts"
            ),
        }
    }
    HostsTarget::hosts(GLOBAL_HOSTS_FILE_PATH)
}
