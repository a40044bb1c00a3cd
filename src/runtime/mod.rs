//! Container runtime seam.
//!
//! Implementations must report a missing container as
//! `ErrorKind::NotFound` (and nothing else as NotFound). Every other failure is
//! returned as-is and crosses the lifecycle code unchanged.

mod docker;
mod types;

pub use docker::DockerEngine;
pub use types::{
    ContainerDetails, ContainerSummary, CreateOptions, InstanceRecord, ListFilter, MANAGED_LABEL,
    PLATFORM_VERSION_LABEL,
};

use std::time::Duration;

use crate::error::Result;

pub trait ContainerRuntime: Send + Sync {
    /// Create a container named `name` from `image`; returns the container id.
    fn create(&self, image: &str, name: &str, options: &CreateOptions) -> Result<String>;

    fn start(&self, id: &str) -> Result<()>;

    fn stop(&self, id: &str) -> Result<()>;

    /// Remove the container and its anonymous volumes.
    fn remove(&self, id: &str) -> Result<()>;

    fn inspect(&self, id: &str) -> Result<ContainerDetails>;

    /// `inspect` bounded by `limit` when given. Poll loops pass their
    /// remaining budget so one slow answer cannot outlast the wait.
    fn inspect_within(&self, id: &str, _limit: Option<Duration>) -> Result<ContainerDetails> {
        self.inspect(id)
    }

    fn list(&self, filter: &ListFilter) -> Result<Vec<ContainerSummary>>;

    fn image_exists(&self, image: &str) -> Result<bool>;

    /// Pull `image`, reporting each progress message to `progress`.
    fn pull(&self, image: &str, progress: &mut dyn FnMut(&str)) -> Result<()>;

    /// Combined stdout/stderr log output.
    fn logs(&self, id: &str) -> Result<Vec<u8>>;
}
