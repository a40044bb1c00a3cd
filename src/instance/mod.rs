//! Per-name bento handle.
//!
//! A `BentoInstance` holds no cached container state: every query goes to
//! the runtime (and, for readiness, to the supervisor inside the container).

mod lifecycle;
mod sync;
mod types;

use std::sync::Arc;
use std::time::Duration;

pub use types::{BentoContext, InstanceState, StartOutcome, StopOutcome};

use crate::error::{BentoError, Result};
use crate::events::LifecycleEvent;
use crate::runtime::{ContainerDetails, InstanceRecord, MANAGED_LABEL};

#[derive(Clone)]
pub struct BentoInstance {
    name: String,
    context: Arc<BentoContext>,
}

impl BentoInstance {
    pub fn new(name: impl Into<String>, context: Arc<BentoContext>) -> Self {
        Self {
            name: name.into(),
            context,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn emit(&self, event: LifecycleEvent) {
        self.context.sink.emit(&event);
    }

    /// Engine view of the container. NotFound when the bento does not exist.
    ///
    /// A container only counts as this bento when it carries the managed label
    /// and its name matches exactly; the engine also resolves id prefixes.
    pub fn details(&self) -> Result<ContainerDetails> {
        self.details_within(None)
    }

    fn details_within(&self, limit: Option<Duration>) -> Result<ContainerDetails> {
        let details = self.context.runtime.inspect_within(&self.name, limit)?;
        let managed = details.labels.get(MANAGED_LABEL).map(String::as_str) == Some("true");
        if !managed || details.name != self.name {
            log::debug!(
                "Container {} ({}) is not a bento named {}",
                details.name,
                details.id,
                self.name
            );
            return Err(BentoError::not_found(&self.name));
        }
        Ok(details)
    }

    pub fn record(&self) -> Result<InstanceRecord> {
        Ok(InstanceRecord::from(&self.details()?))
    }

    /// Full engine inspect document.
    pub fn info(&self) -> Result<serde_json::Value> {
        Ok(self.details()?.raw)
    }

    pub fn hostname(&self) -> Result<String> {
        Ok(self.details()?.hostname)
    }

    pub fn ip_address(&self) -> Result<String> {
        Ok(self.details()?.ip_address)
    }

    /// Runtime running flag only.
    pub fn is_container_running(&self) -> Result<bool> {
        Ok(self.details()?.running)
    }

    /// True when the supervisor reports every required service up.
    pub fn is_running(&self) -> Result<bool> {
        self.is_running_within(None)
    }

    fn is_container_running_within(&self, limit: Option<Duration>) -> Result<bool> {
        Ok(self.details_within(limit)?.running)
    }

    fn is_running_within(&self, limit: Option<Duration>) -> Result<bool> {
        let details = self.details_within(limit)?;
        self.services_ready(&details, limit)
    }

    fn services_ready(&self, details: &ContainerDetails, limit: Option<Duration>) -> Result<bool> {
        if !details.running {
            return Ok(false);
        }
        self.context
            .supervisor
            .services_ready(&details.ip_address, limit)
    }

    pub fn state(&self) -> Result<InstanceState> {
        let details = match self.details() {
            Ok(details) => details,
            Err(e) if e.is_not_found() => return Ok(InstanceState::Absent),
            Err(e) => return Err(e),
        };
        if !details.running {
            return Ok(InstanceState::Stopped);
        }
        if self.context.is_stopping(&self.name) {
            return Ok(InstanceState::Stopping);
        }
        if self.services_ready(&details, None)? {
            Ok(InstanceState::Ready)
        } else {
            Ok(InstanceState::Starting)
        }
    }

    /// Combined stdout/stderr of the container.
    pub fn get_log(&self) -> Result<Vec<u8>> {
        let details = self.details()?;
        self.context.runtime.logs(&details.id)
    }
}
