//! Bounded poll-until-true loop used for readiness and halt confirmation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::{BentoError, Result};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(120_000);

/// Interval/timeout pair for one wait.
///
/// A policy always allows at least one predicate check, even when the
/// interval is larger than the timeout or the timeout is zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    interval: Duration,
    timeout: Duration,
}

impl PollPolicy {
    pub fn new(interval: Duration, timeout: Duration) -> Result<Self> {
        if interval.is_zero() {
            return Err(BentoError::config("poll interval must be greater than zero"));
        }
        Ok(Self { interval, timeout })
    }

    pub fn from_millis(interval_ms: u64, timeout_ms: u64) -> Result<Self> {
        Self::new(
            Duration::from_millis(interval_ms),
            Duration::from_millis(timeout_ms),
        )
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

/// Cooperative abort signal and outer deadline shared by nested waits.
///
/// Clones share the same flag, so an orchestrator can hand one clone to a
/// lifecycle call and cancel it from elsewhere.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// A token that additionally expires at `deadline`.
    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
            deadline: Some(deadline),
        }
    }

    /// Derive a token sharing this cancel flag whose deadline is the earlier
    /// of the current one and `deadline`.
    pub fn child_with_deadline(&self, deadline: Instant) -> Self {
        let deadline = match self.deadline {
            Some(current) => current.min(deadline),
            None => deadline,
        };
        Self {
            cancelled: Arc::clone(&self.cancelled),
            deadline: Some(deadline),
        }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left before the deadline; zero once it has passed.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }
}

/// Wait until `predicate` returns true.
///
/// The predicate is evaluated once before any budget check. Between checks the
/// loop sleeps for `min(interval, remaining)`, where the remaining budget is the
/// policy timeout clipped to the token's deadline and recomputed from a
/// monotonic clock. Errors from the predicate abort the wait unchanged.
pub fn wait_until<F>(
    what: &str,
    policy: &PollPolicy,
    cancel: &CancelToken,
    mut predicate: F,
) -> Result<()>
where
    F: FnMut() -> Result<bool>,
{
    let start = Instant::now();
    // None only when the timeout is too large to represent: wait unbounded.
    let budget_end = match (start.checked_add(policy.timeout), cancel.deadline()) {
        (Some(end), Some(deadline)) => Some(end.min(deadline)),
        (end, deadline) => end.or(deadline),
    };

    let mut checks: u64 = 0;
    loop {
        checks += 1;
        if predicate()? {
            log::debug!(
                "{} satisfied after {:?} ({} checks)",
                what,
                start.elapsed(),
                checks
            );
            return Ok(());
        }

        if cancel.is_cancelled() {
            return Err(BentoError::cancelled(what));
        }

        let pause = match budget_end {
            Some(end) => {
                let now = Instant::now();
                if now >= end {
                    log::debug!("{} not satisfied after {} checks", what, checks);
                    return Err(BentoError::timeout(what, policy.timeout, policy.interval));
                }
                policy.interval.min(end - now)
            }
            None => policy.interval,
        };
        std::thread::sleep(pause);
    }
}
