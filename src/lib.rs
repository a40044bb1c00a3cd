//! Lifecycle management for bento clusters: single-node Hadoop/HBase
//! development clusters, each running in one docker container.

pub mod client_config;
pub mod commands;
pub mod config;
pub mod error;
pub mod events;
pub mod fs_util;
pub mod hosts;
pub mod instance;
pub mod paths;
pub mod poll;
pub mod runtime;
pub mod supervisor;
pub mod system;
pub mod validation;

pub use config::{LaunchOptions, Settings, SyncOptions};
pub use error::{BentoError, ErrorKind, Result};
pub use events::{EventSink, LifecycleEvent, LogSink};
pub use instance::{BentoContext, BentoInstance, InstanceState, StartOutcome, StopOutcome};
pub use poll::{CancelToken, PollPolicy};
pub use runtime::{ContainerRuntime, InstanceRecord};
pub use supervisor::ServiceSupervisor;
pub use system::BentoSystem;
