//! Instance-related type definitions.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

use serde::Serialize;

use crate::client_config::ClientConfigWriter;
use crate::config::Settings;
use crate::error::Result;
use crate::events::EventSink;
use crate::hosts::{HostsFileSynchronizer, PrivilegedHostsWriter};
use crate::paths::{client_config_dir, default_hosts_target, HostsTarget};
use crate::runtime::{ContainerRuntime, DockerEngine};
use crate::supervisor::{ServiceSupervisor, SupervisordClient};

/// Observable lifecycle state of a bento.
///
/// `Stopping` is reported while a `stop` issued through the same context is
/// waiting for the container to halt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceState {
    Absent,
    Stopped,
    Starting,
    Ready,
    Stopping,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    /// Services were already up; nothing was called or polled.
    AlreadyReady,
    /// The runtime start call was issued and readiness confirmed.
    Started,
    /// The container was running but not ready; readiness was awaited.
    Resumed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    AlreadyStopped,
    Stopped,
}

/// Collaborators shared by `BentoSystem` and every `BentoInstance` it hands out.
pub struct BentoContext {
    pub settings: Settings,
    pub runtime: Arc<dyn ContainerRuntime>,
    pub supervisor: Arc<dyn ServiceSupervisor>,
    pub sink: Arc<dyn EventSink>,
    pub hosts: HostsFileSynchronizer,
    pub config_writer: ClientConfigWriter,
    /// HOSTALIASES value captured at construction.
    pub hostaliases: Option<String>,
    stopping: Mutex<HashSet<String>>,
}

/// Marks a bento as stopping until dropped.
pub(crate) struct StoppingGuard<'a> {
    context: &'a BentoContext,
    name: String,
}

impl Drop for StoppingGuard<'_> {
    fn drop(&mut self) {
        self.context.stopping_set().remove(&self.name);
    }
}

impl BentoContext {
    pub fn new(
        settings: Settings,
        runtime: Arc<dyn ContainerRuntime>,
        supervisor: Arc<dyn ServiceSupervisor>,
        sink: Arc<dyn EventSink>,
        hosts: HostsFileSynchronizer,
    ) -> Result<Self> {
        Ok(Self {
            settings,
            runtime,
            supervisor,
            sink,
            hosts,
            config_writer: ClientConfigWriter::new()?,
            hostaliases: None,
            stopping: Mutex::new(HashSet::new()),
        })
    }

    fn stopping_set(&self) -> MutexGuard<'_, HashSet<String>> {
        self.stopping.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub(crate) fn mark_stopping(&self, name: &str) -> StoppingGuard<'_> {
        self.stopping_set().insert(name.to_string());
        StoppingGuard {
            context: self,
            name: name.to_string(),
        }
    }

    pub(crate) fn is_stopping(&self, name: &str) -> bool {
        self.stopping_set().contains(name)
    }

    /// Wire the Docker engine, supervisord client and privileged hosts writer
    /// from `settings` and the process environment.
    pub fn from_settings(settings: Settings, sink: Arc<dyn EventSink>) -> Result<Self> {
        let docker_host = std::env::var("DOCKER_HOST").ok();
        let address = settings.resolve_docker_address(docker_host.as_deref());
        log::debug!("Using docker engine at {}", address);

        let runtime = DockerEngine::new(&address, settings.request_timeout())?;
        let supervisor = SupervisordClient::new(
            settings.supervisor_port,
            settings.required_services.clone(),
            settings.request_timeout(),
        )?;
        let hosts = HostsFileSynchronizer::new(Arc::new(PrivilegedHostsWriter::new(
            settings.hosts_helper.clone(),
        )));

        let mut context = Self::new(settings, Arc::new(runtime), Arc::new(supervisor), sink, hosts)?;
        context.hostaliases = std::env::var("HOSTALIASES").ok();
        Ok(context)
    }

    pub fn with_hostaliases(mut self, hostaliases: Option<String>) -> Self {
        self.hostaliases = hostaliases;
        self
    }

    /// Explicit path, then the settings override, then the platform default.
    pub fn hosts_target(&self, explicit: Option<PathBuf>) -> HostsTarget {
        match explicit.or_else(|| self.settings.hosts_file.clone()) {
            Some(path) => HostsTarget::hosts(path),
            None => default_hosts_target(self.hostaliases.as_deref()),
        }
    }

    pub fn config_dir(&self, bento_name: &str, explicit: Option<PathBuf>) -> Result<PathBuf> {
        match explicit {
            Some(dir) => Ok(dir),
            None => Ok(client_config_dir(
                &self.settings.client_config_root()?,
                bento_name,
            )),
        }
    }
}
