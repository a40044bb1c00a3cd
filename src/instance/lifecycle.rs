//! Instance lifecycle management (start/stop).

use std::time::{Duration, Instant};

use super::{BentoInstance, StartOutcome, StopOutcome};
use crate::config::SyncOptions;
use crate::error::Result;
use crate::events::LifecycleEvent;
use crate::poll::{wait_until, CancelToken, PollPolicy};

/// Token bounded by `policy.timeout` from now, sharing `cancel`'s flag.
fn budget(policy: &PollPolicy, cancel: &CancelToken) -> CancelToken {
    match Instant::now().checked_add(policy.timeout()) {
        Some(deadline) => cancel.child_with_deadline(deadline),
        None => cancel.clone(),
    }
}

/// Time one check may spend: what is left of the budget, but at least one
/// interval so the final check can still complete.
fn check_limit(policy: &PollPolicy, cancel: &CancelToken) -> Option<Duration> {
    cancel.remaining().map(|left| left.max(policy.interval()))
}

impl BentoInstance {
    /// Start the bento and wait for its services.
    ///
    /// Both waits share one `policy.timeout` budget. On timeout the container
    /// is left as the runtime reports it; hosts and client config are only
    /// synchronized once services are ready.
    pub fn start(
        &self,
        sync: &SyncOptions,
        policy: &PollPolicy,
        cancel: &CancelToken,
    ) -> Result<StartOutcome> {
        let cancel = budget(policy, cancel);
        let details = self.details()?;
        let outcome = if details.running {
            if self.services_ready(&details, check_limit(policy, &cancel))? {
                self.emit(LifecycleEvent::AlreadyRunning {
                    name: self.name.clone(),
                });
                return Ok(StartOutcome::AlreadyReady);
            }
            log::info!(
                "Bento container {} is running, waiting for its services",
                self.name
            );
            StartOutcome::Resumed
        } else {
            self.emit(LifecycleEvent::Starting {
                name: self.name.clone(),
            });
            self.context.runtime.start(&details.id)?;
            StartOutcome::Started
        };

        wait_until("container running", policy, &cancel, || {
            self.is_container_running_within(check_limit(policy, &cancel))
        })?;
        self.emit(LifecycleEvent::ContainerStarted {
            name: self.name.clone(),
        });

        wait_until("bento services", policy, &cancel, || {
            self.is_running_within(check_limit(policy, &cancel))
        })?;
        self.emit(LifecycleEvent::ServicesReady {
            name: self.name.clone(),
        });

        self.synchronize(sync)?;
        Ok(outcome)
    }

    /// Stop the container and wait until the runtime reports it halted.
    /// State is not touched further on timeout.
    pub fn stop(&self, policy: &PollPolicy, cancel: &CancelToken) -> Result<StopOutcome> {
        let details = self.details()?;
        if !details.running {
            self.emit(LifecycleEvent::AlreadyStopped {
                name: self.name.clone(),
            });
            return Ok(StopOutcome::AlreadyStopped);
        }

        let _stopping = self.context.mark_stopping(&self.name);
        self.emit(LifecycleEvent::Stopping {
            name: self.name.clone(),
        });
        self.context.runtime.stop(&details.id)?;

        let cancel = budget(policy, cancel);
        wait_until("container halt", policy, &cancel, || {
            Ok(!self.is_container_running_within(check_limit(policy, &cancel))?)
        })?;
        self.emit(LifecycleEvent::Stopped {
            name: self.name.clone(),
        });
        Ok(StopOutcome::Stopped)
    }
}
