//! ---
//! mesh_section: "02-storage-resilience"
//! mesh_subsection: "module"
//! mesh_type: "source"
//! mesh_scope: "code"
//! mesh_description: "Resilient gateway over the remote tabular store."
//! mesh_version: "v0.1.0"
//! mesh_owner: "tbd"
//! ---
use std::time::Duration;

use opsmesh_common::config::GatewayConfig;

/// Bounded fixed-backoff retry schedule applied inside an admitted call.
///
/// Only classified-transient failures consume attempts; anything else
/// propagates immediately. The schedule is fixed rather than exponential:
/// the remote store's rate limiter punishes bursts, and a known ceiling on
/// added latency matters more here than rediscovering capacity quickly.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts per call (first try included).
    pub max_attempts: u32,
    /// Delays applied before the 2nd, 3rd, … attempt, in order. The last
    /// entry repeats if `max_attempts` exceeds the table length.
    pub backoff: Vec<Duration>,
}

impl RetryPolicy {
    /// Construct a policy from explicit bounds.
    pub fn new(max_attempts: u32, backoff: Vec<Duration>) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }

    /// Derive the policy from gateway configuration.
    pub fn from_config(config: &GatewayConfig) -> Self {
        Self::new(config.max_attempts, config.backoff())
    }

    /// Delay to sleep after `completed_attempts` failed attempts.
    pub fn delay_after(&self, completed_attempts: u32) -> Duration {
        if self.backoff.is_empty() {
            return Duration::ZERO;
        }
        let index = (completed_attempts.saturating_sub(1) as usize).min(self.backoff.len() - 1);
        self.backoff[index]
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(
            3,
            vec![
                Duration::from_millis(200),
                Duration::from_millis(500),
                Duration::from_millis(1000),
            ],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_schedule_matches_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.delay_after(1), Duration::from_millis(200));
        assert_eq!(policy.delay_after(2), Duration::from_millis(500));
        assert_eq!(policy.delay_after(3), Duration::from_millis(1000));
        // Past the table the last entry repeats.
        assert_eq!(policy.delay_after(7), Duration::from_millis(1000));
    }

    #[test]
    fn empty_backoff_means_immediate_retries() {
        let policy = RetryPolicy::new(2, Vec::new());
        assert_eq!(policy.delay_after(1), Duration::ZERO);
    }
}
