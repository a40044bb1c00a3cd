//! Lifecycle notifications delivered to an injected sink.

use std::path::PathBuf;
use std::sync::Mutex;

use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum LifecycleEvent {
    Created { name: String, image: String },
    Starting { name: String },
    ContainerStarted { name: String },
    ServicesReady { name: String },
    AlreadyRunning { name: String },
    Stopping { name: String },
    Stopped { name: String },
    AlreadyStopped { name: String },
    Removed { name: String },
    HostsUpdated { path: PathBuf, hostname: String, address: String },
    HostsSkipped { hostname: String, address: String },
    ConfigWritten { dir: PathBuf },
    PullProgress { image: String, message: String },
    ImagePresent { image: String },
}

/// Receiver of lifecycle notifications.
///
/// Passed explicitly to `BentoSystem` and `BentoInstance`; there is no
/// process-wide default.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: &LifecycleEvent);
}

/// Forwards events to the `log` facade at info level.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl EventSink for LogSink {
    fn emit(&self, event: &LifecycleEvent) {
        match event {
            LifecycleEvent::Created { name, image } => {
                log::info!("Bento container {} created from {}.", name, image)
            }
            LifecycleEvent::Starting { name } => log::info!("Starting bento container {}.", name),
            LifecycleEvent::ContainerStarted { name } => {
                log::info!("Bento container {} started.", name)
            }
            LifecycleEvent::ServicesReady { name } => log::info!("Bento {} services started.", name),
            LifecycleEvent::AlreadyRunning { name } => {
                log::info!("Bento container {} already started.", name)
            }
            LifecycleEvent::Stopping { name } => log::info!("Stopping bento container {}.", name),
            LifecycleEvent::Stopped { name } => log::info!("Bento container {} stopped.", name),
            LifecycleEvent::AlreadyStopped { name } => {
                log::info!("Bento container {} not running.", name)
            }
            LifecycleEvent::Removed { name } => log::info!("Bento container {} removed.", name),
            LifecycleEvent::HostsUpdated {
                path,
                hostname,
                address,
            } => log::info!(
                "Bento hostname entry \"{} {}\" written to {}",
                address,
                hostname,
                path.display()
            ),
            LifecycleEvent::HostsSkipped { hostname, address } => log::warn!(
                "Please update your hosts file to include the following entry: \"{} {}\"",
                address,
                hostname
            ),
            LifecycleEvent::ConfigWritten { dir } => {
                log::info!("Bento client configs written to {}", dir.display())
            }
            LifecycleEvent::PullProgress { image, message } => {
                log::info!("[{}] {}", image, message)
            }
            LifecycleEvent::ImagePresent { image } => {
                log::info!("Image {} already present.", image)
            }
        }
    }
}

/// Keeps every event in memory; useful for callers that render their own output.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<LifecycleEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<LifecycleEvent> {
        self.events.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl EventSink for RecordingSink {
    fn emit(&self, event: &LifecycleEvent) {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(event.clone());
    }
}
