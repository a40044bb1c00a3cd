//! Runtime-facing data types.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Label carried by every container this crate creates.
pub const MANAGED_LABEL: &str = "org.kiji.bento.managed";
pub const PLATFORM_VERSION_LABEL: &str = "org.kiji.bento.platform-version";

/// Options for `ContainerRuntime::create`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CreateOptions {
    pub hostname: String,
    pub labels: BTreeMap<String, String>,
}

/// Inspect result, reduced to what lifecycle code needs plus the raw document.
#[derive(Debug, Clone, PartialEq)]
pub struct ContainerDetails {
    pub id: String,
    pub name: String,
    pub image: String,
    pub running: bool,
    pub hostname: String,
    pub ip_address: String,
    pub labels: BTreeMap<String, String>,
    pub created_at: Option<DateTime<Utc>>,
    /// Full engine response, shown by the `info` command.
    pub raw: serde_json::Value,
}

impl ContainerDetails {
    pub fn platform_version(&self) -> Option<&str> {
        self.labels.get(PLATFORM_VERSION_LABEL).map(String::as_str)
    }
}

/// Entry of a container listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSummary {
    pub id: String,
    pub names: Vec<String>,
    pub image: String,
    pub running: bool,
    pub labels: BTreeMap<String, String>,
}

impl ContainerSummary {
    /// First name without the engine's leading '/'.
    pub fn name(&self) -> &str {
        self.names
            .first()
            .map(|n| n.trim_start_matches('/'))
            .unwrap_or(self.id.as_str())
    }
}

/// Filter for `ContainerRuntime::list`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListFilter {
    pub label: String,
    /// Include stopped containers.
    pub all: bool,
}

/// Cached projection of a bento as the runtime reports it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceRecord {
    pub name: String,
    pub container_id: String,
    pub image: String,
    pub platform_version: Option<String>,
    pub running: bool,
    pub hostname: String,
    pub address: String,
    pub created_at: Option<DateTime<Utc>>,
}

impl From<&ContainerDetails> for InstanceRecord {
    fn from(details: &ContainerDetails) -> Self {
        Self {
            name: details.name.clone(),
            container_id: details.id.clone(),
            image: details.image.clone(),
            platform_version: details.platform_version().map(str::to_string),
            running: details.running,
            hostname: details.hostname.clone(),
            address: details.ip_address.clone(),
            created_at: details.created_at,
        }
    }
}
