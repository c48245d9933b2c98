//! Bounded confirmation polling with backoff
//!
//! After a package is published the registry needs some time before the new
//! version shows up. The poller asks a probe repeatedly until it answers
//! `true`, the attempt budget or the total wait is exhausted, or the run is
//! cancelled.

use log::{debug, warn};
use std::future::Future;
use std::time::Duration;
use tokio::time::{Instant, sleep};
use tokio_util::sync::CancellationToken;

/// Options for polling behavior
#[derive(Debug, Clone, PartialEq)]
pub struct PollPolicy {
    /// Delay after the first unsuccessful probe
    pub initial_delay: Duration,
    /// Maximum delay between probes
    pub max_delay: Duration,
    /// Multiplier applied to the delay after each probe (1.0 = fixed interval)
    pub backoff_multiplier: f64,
    /// Maximum number of probes
    pub max_attempts: u32,
    /// Maximum total time spent waiting
    pub max_wait: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 1.0,
            max_attempts: 13,
            max_wait: Duration::from_secs(60),
        }
    }
}

impl PollPolicy {
    /// Delay to apply after `delay`, capped at `max_delay`
    ///
    /// The product is capped before it becomes a `Duration`, so any finite
    /// multiplier is safe.
    pub fn next_delay(&self, delay: Duration) -> Duration {
        let next = delay.as_secs_f64() * self.backoff_multiplier.max(1.0);
        if !next.is_finite() || next >= self.max_delay.as_secs_f64() {
            return self.max_delay;
        }
        Duration::try_from_secs_f64(next).unwrap_or(self.max_delay)
    }
}

/// Result of a confirmation poll
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    Confirmed { attempts: u32, elapsed: Duration },
    TimedOut { attempts: u32, elapsed: Duration },
    Cancelled { attempts: u32, elapsed: Duration },
}

impl PollOutcome {
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Confirmed { attempts, .. }
            | Self::TimedOut { attempts, .. }
            | Self::Cancelled { attempts, .. } => *attempts,
        }
    }

    pub fn elapsed(&self) -> Duration {
        match self {
            Self::Confirmed { elapsed, .. }
            | Self::TimedOut { elapsed, .. }
            | Self::Cancelled { elapsed, .. } => *elapsed,
        }
    }
}

/// Poller for waiting until a published version becomes visible
///
/// # Examples
///
/// ```no_run
/// use publish_crates::core::{ConfirmationPoller, PollOutcome, PollPolicy};
/// use tokio_util::sync::CancellationToken;
///
/// #[tokio::main]
/// async fn main() {
///     let poller = ConfirmationPoller::new(PollPolicy::default());
///     let cancel = CancellationToken::new();
///
///     let outcome = poller
///         .poll(|| async { Ok::<_, anyhow::Error>(true) }, &cancel)
///         .await;
///
///     assert!(matches!(outcome, PollOutcome::Confirmed { attempts: 1, .. }));
/// }
/// ```
pub struct ConfirmationPoller {
    policy: PollPolicy,
}

impl ConfirmationPoller {
    pub fn new(policy: PollPolicy) -> Self {
        Self { policy }
    }

    /// Probe until confirmed, exhausted or cancelled
    ///
    /// Probe errors are logged and count as "not yet visible". The first
    /// probe runs immediately; sleeps never extend past `max_wait` and are
    /// interrupted by cancellation.
    ///
    /// # Arguments
    ///
    /// * `probe` - Async function answering whether the version is visible
    /// * `cancel` - Token cancelling the surrounding run
    pub async fn poll<F, Fut>(&self, mut probe: F, cancel: &CancellationToken) -> PollOutcome
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = anyhow::Result<bool>>,
    {
        let start = Instant::now();
        let max_attempts = self.policy.max_attempts.max(1);
        let mut delay = self.policy.initial_delay;
        let mut attempts = 0;

        loop {
            if cancel.is_cancelled() {
                return PollOutcome::Cancelled {
                    attempts,
                    elapsed: start.elapsed(),
                };
            }

            attempts += 1;
            match probe().await {
                Ok(true) => {
                    return PollOutcome::Confirmed {
                        attempts,
                        elapsed: start.elapsed(),
                    };
                }
                Ok(false) => debug!("not visible yet (attempt {}/{})", attempts, max_attempts),
                Err(e) => warn!(
                    "registry query failed (attempt {}/{}): {:#}",
                    attempts, max_attempts, e
                ),
            }

            let elapsed = start.elapsed();
            if attempts >= max_attempts || elapsed >= self.policy.max_wait {
                return PollOutcome::TimedOut { attempts, elapsed };
            }

            let wait_for = delay.min(self.policy.max_wait - elapsed);
            tokio::select! {
                _ = cancel.cancelled() => {
                    return PollOutcome::Cancelled {
                        attempts,
                        elapsed: start.elapsed(),
                    };
                }
                _ = sleep(wait_for) => {}
            }

            delay = self.policy.next_delay(delay);
        }
    }
}
