//! ---
//! mesh_section: "02-storage-resilience"
//! mesh_subsection: "module"
//! mesh_type: "source"
//! mesh_scope: "code"
//! mesh_description: "Resilient gateway over the remote tabular store."
//! mesh_version: "v0.1.0"
//! mesh_owner: "tbd"
//! ---
use std::fmt;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

/// Breaker states exposed to operators and metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    /// Normal operation; calls pass through.
    Closed,
    /// Fast-fail; calls are rejected without touching the network.
    Open,
    /// A single probe call is in flight after the cool-down elapsed.
    HalfOpen,
}

impl BreakerState {
    /// Represent the state as a static label for metrics and status payloads.
    pub fn as_str(&self) -> &'static str {
        match self {
            BreakerState::Closed => "closed",
            BreakerState::Open => "open",
            BreakerState::HalfOpen => "half-open",
        }
    }
}

impl fmt::Display for BreakerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug)]
struct BreakerInner {
    state: BreakerState,
    consecutive_failures: u32,
    // When the current OPEN or HALF_OPEN stretch began.
    entered_at: Option<Instant>,
}

/// Three-state circuit breaker guarding the remote store.
///
/// State is shared by every caller of the owning gateway; transitions happen
/// atomically under one lock. Accounting is per *call*, not per attempt: the
/// gateway records one success or one failure after its retry loop resolves.
#[derive(Debug)]
pub struct CircuitBreaker {
    threshold: u32,
    cooldown: Duration,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    /// Create a breaker tripping after `threshold` consecutive failures and
    /// cooling down for `cooldown` before admitting a probe.
    pub fn new(threshold: u32, cooldown: Duration) -> Self {
        Self {
            threshold: threshold.max(1),
            cooldown,
            inner: Mutex::new(BreakerInner {
                state: BreakerState::Closed,
                consecutive_failures: 0,
                entered_at: None,
            }),
        }
    }

    /// Ask to admit a call. `Err` carries the time remaining until the next
    /// probe would be admitted.
    ///
    /// An OPEN breaker whose cool-down has elapsed flips to HALF_OPEN and
    /// admits exactly the requesting call; concurrent callers keep failing
    /// fast until the probe's outcome is recorded. A probe whose caller
    /// dropped the future records no outcome at all, so a HALF_OPEN breaker
    /// admits a fresh probe once a further cool-down passes with nothing
    /// reported back.
    pub fn try_admit(&self) -> Result<(), Duration> {
        let mut inner = self.inner.lock();
        let elapsed = inner
            .entered_at
            .map(|at| at.elapsed())
            .unwrap_or(Duration::MAX);
        match inner.state {
            BreakerState::Closed => Ok(()),
            BreakerState::HalfOpen => {
                if elapsed >= self.cooldown {
                    // The last probe was abandoned; take its slot.
                    inner.entered_at = Some(Instant::now());
                    tracing::warn!(
                        target: "opsmesh::store::breaker",
                        "probe unresolved past cool-down, admitting a fresh probe"
                    );
                    Ok(())
                } else {
                    Err(self.cooldown - elapsed)
                }
            }
            BreakerState::Open => {
                if elapsed >= self.cooldown {
                    inner.state = BreakerState::HalfOpen;
                    inner.entered_at = Some(Instant::now());
                    tracing::info!(
                        target: "opsmesh::store::breaker",
                        "cool-down elapsed, admitting probe call"
                    );
                    Ok(())
                } else {
                    Err(self.cooldown - elapsed)
                }
            }
        }
    }

    /// Record the outcome of an admitted call that completed successfully.
    pub fn record_success(&self) {
        let mut inner = self.inner.lock();
        if inner.state != BreakerState::Closed {
            tracing::info!(
                target: "opsmesh::store::breaker",
                from = %inner.state,
                "breaker closing after successful call"
            );
        }
        inner.state = BreakerState::Closed;
        inner.consecutive_failures = 0;
        inner.entered_at = None;
    }

    /// Record the outcome of an admitted call that ultimately failed.
    pub fn record_failure(&self) {
        let mut inner = self.inner.lock();
        match inner.state {
            BreakerState::Closed => {
                inner.consecutive_failures += 1;
                if inner.consecutive_failures >= self.threshold {
                    inner.state = BreakerState::Open;
                    inner.entered_at = Some(Instant::now());
                    tracing::warn!(
                        target: "opsmesh::store::breaker",
                        failures = inner.consecutive_failures,
                        cooldown_secs = self.cooldown.as_secs(),
                        "breaker opened"
                    );
                }
            }
            BreakerState::HalfOpen => {
                inner.state = BreakerState::Open;
                inner.entered_at = Some(Instant::now());
                tracing::warn!(
                    target: "opsmesh::store::breaker",
                    cooldown_secs = self.cooldown.as_secs(),
                    "probe failed, breaker reopened"
                );
            }
            // A failure recorded while OPEN can only come from a call admitted
            // before the trip; it changes nothing.
            BreakerState::Open => {}
        }
    }

    /// Current state snapshot.
    pub fn state(&self) -> BreakerState {
        self.inner.lock().state
    }

    /// Consecutive failure count (CLOSED state bookkeeping).
    pub fn consecutive_failures(&self) -> u32 {
        self.inner.lock().consecutive_failures
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const COOLDOWN: Duration = Duration::from_secs(60);

    #[tokio::test(start_paused = true)]
    async fn trips_after_threshold_and_fast_fails() {
        let breaker = CircuitBreaker::new(5, COOLDOWN);
        for _ in 0..5 {
            breaker.try_admit().unwrap();
            breaker.record_failure();
        }
        assert_eq!(breaker.state(), BreakerState::Open);
        let retry_after = breaker.try_admit().unwrap_err();
        assert!(retry_after <= COOLDOWN);
    }

    #[tokio::test(start_paused = true)]
    async fn admits_single_probe_after_cooldown() {
        let breaker = CircuitBreaker::new(1, COOLDOWN);
        breaker.try_admit().unwrap();
        breaker.record_failure();
        assert_eq!(breaker.state(), BreakerState::Open);

        tokio::time::advance(COOLDOWN).await;
        breaker.try_admit().unwrap();
        assert_eq!(breaker.state(), BreakerState::HalfOpen);
        // Concurrent caller while the probe is in flight.
        assert!(breaker.try_admit().is_err());

        breaker.record_success();
        assert_eq!(breaker.state(), BreakerState::Closed);
        breaker.try_admit().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn failed_probe_restarts_cooldown() {
        let breaker = CircuitBreaker::new(1, COOLDOWN);
        breaker.try_admit().unwrap();
        breaker.record_failure();
        tokio::time::advance(COOLDOWN).await;
        breaker.try_admit().unwrap();
        breaker.record_failure();
        assert_eq!(breaker.state(), BreakerState::Open);
        // Fresh cool-down: still rejecting halfway through.
        tokio::time::advance(COOLDOWN / 2).await;
        assert!(breaker.try_admit().is_err());
        tokio::time::advance(COOLDOWN).await;
        assert!(breaker.try_admit().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn abandoned_probe_is_replaced_after_another_cooldown() {
        let breaker = CircuitBreaker::new(1, COOLDOWN);
        breaker.try_admit().unwrap();
        breaker.record_failure();
        tokio::time::advance(COOLDOWN).await;
        // Probe admitted, but its outcome is never recorded.
        breaker.try_admit().unwrap();
        assert_eq!(breaker.state(), BreakerState::HalfOpen);
        assert!(breaker.try_admit().is_err());

        // Another cool-down passes with no outcome; the slot is reclaimed.
        tokio::time::advance(COOLDOWN).await;
        breaker.try_admit().unwrap();
        assert_eq!(breaker.state(), BreakerState::HalfOpen);
        breaker.record_success();
        assert_eq!(breaker.state(), BreakerState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn success_resets_consecutive_failures() {
        let breaker = CircuitBreaker::new(3, COOLDOWN);
        breaker.record_failure();
        breaker.record_failure();
        breaker.record_success();
        breaker.record_failure();
        breaker.record_failure();
        assert_eq!(breaker.state(), BreakerState::Closed);
    }
}
