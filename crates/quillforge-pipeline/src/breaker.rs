//! Failure tracking for the external generator.

use std::sync::Mutex;
use std::time::Duration;

use tokio::time::Instant;

#[derive(Debug, Clone, Copy)]
enum BreakerState {
    Closed { consecutive_failures: u32 },
    Open { since: Instant },
    HalfOpen,
}

/// Consecutive-failure breaker guarding the external generator.
///
/// The breaker opens after `failure_threshold` consecutive failures and
/// refuses further calls until `cooldown` has elapsed, at which point exactly
/// one probe call is let through. The probe's outcome decides whether the
/// breaker closes again or reopens for another cooldown.
///
/// Each pipeline instance owns its own breaker; failure streaks are never
/// shared process-wide, so independent pipelines (and tests) see independent
/// state.
#[derive(Debug)]
pub struct GeneratorBreaker {
    state: Mutex<BreakerState>,
    failure_threshold: u32,
    cooldown: Duration,
}

impl GeneratorBreaker {
    /// Create a breaker that opens after `failure_threshold` consecutive
    /// failures and allows a probe after `cooldown`.
    #[must_use]
    pub fn new(failure_threshold: u32, cooldown: Duration) -> Self {
        Self {
            state: Mutex::new(BreakerState::Closed {
                consecutive_failures: 0,
            }),
            failure_threshold,
            cooldown,
        }
    }

    /// Whether a call may proceed right now.
    ///
    /// Returns `false` while the breaker is open or while a probe is already
    /// in flight. A `true` return during recovery claims the probe; the
    /// caller must report the outcome through [`Self::record_success`] or
    /// [`Self::record_failure`].
    pub fn try_acquire(&self) -> bool {
        let Ok(mut state) = self.state.lock() else {
            return true;
        };
        match *state {
            BreakerState::Closed { .. } => true,
            BreakerState::Open { since } => {
                if since.elapsed() >= self.cooldown {
                    *state = BreakerState::HalfOpen;
                    true
                } else {
                    false
                }
            }
            BreakerState::HalfOpen => false,
        }
    }

    /// Record a successful call, closing the breaker.
    pub fn record_success(&self) {
        if let Ok(mut state) = self.state.lock() {
            *state = BreakerState::Closed {
                consecutive_failures: 0,
            };
        }
    }

    /// Record a failed call.
    ///
    /// Reaching the threshold, or failing the recovery probe, opens the
    /// breaker and restarts the cooldown.
    pub fn record_failure(&self) {
        if let Ok(mut state) = self.state.lock() {
            *state = match *state {
                BreakerState::Closed {
                    consecutive_failures,
                } => {
                    let failures = consecutive_failures + 1;
                    if failures >= self.failure_threshold {
                        tracing::warn!(failures, "generator circuit breaker opened");
                        BreakerState::Open {
                            since: Instant::now(),
                        }
                    } else {
                        BreakerState::Closed {
                            consecutive_failures: failures,
                        }
                    }
                }
                BreakerState::Open { .. } | BreakerState::HalfOpen => BreakerState::Open {
                    since: Instant::now(),
                },
            };
        }
    }

    /// Whether the breaker is currently refusing calls.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.state
            .lock()
            .map(|state| matches!(*state, BreakerState::Open { .. } | BreakerState::HalfOpen))
            .unwrap_or(false)
    }
}
