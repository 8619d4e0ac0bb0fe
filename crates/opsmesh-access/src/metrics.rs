//! ---
//! mesh_section: "04-access-control"
//! mesh_subsection: "module"
//! mesh_type: "source"
//! mesh_scope: "code"
//! mesh_description: "Permission resolution, role management, and audit trail."
//! mesh_version: "v0.1.0"
//! mesh_owner: "tbd"
//! ---

use opsmesh_common::metrics::SharedRegistry;
use prometheus::{Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts};

/// Prometheus instruments for the access-control layer.
#[derive(Clone)]
pub struct AccessMetrics {
    checks: IntCounterVec,
    cache_events: IntCounterVec,
    resolve_latency: Histogram,
    mutations: IntCounterVec,
    audit_write_failures: IntCounter,
}

impl AccessMetrics {
    /// Register the access metric families on the shared registry.
    pub fn new(registry: SharedRegistry) -> anyhow::Result<Self> {
        let checks = IntCounterVec::new(
            Opts::new(
                "opsmesh_access_checks_total",
                "Permission checks by outcome (granted, denied, failed)",
            ),
            &["outcome"],
        )?;
        let cache_events = IntCounterVec::new(
            Opts::new(
                "opsmesh_access_cache_events_total",
                "Permission cache lookups and invalidations by event",
            ),
            &["event"],
        )?;
        let resolve_latency = Histogram::with_opts(
            HistogramOpts::new(
                "opsmesh_access_resolve_latency_seconds",
                "Latency of full permission-set resolutions (cache misses)",
            )
            .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]),
        )?;
        let mutations = IntCounterVec::new(
            Opts::new(
                "opsmesh_access_mutations_total",
                "Role-assignment mutations by operation and outcome",
            ),
            &["op", "outcome"],
        )?;
        let audit_write_failures = IntCounter::new(
            "opsmesh_access_audit_write_failures_total",
            "Audit trail rows that could not be written or completed",
        )?;

        registry.register(Box::new(checks.clone()))?;
        registry.register(Box::new(cache_events.clone()))?;
        registry.register(Box::new(resolve_latency.clone()))?;
        registry.register(Box::new(mutations.clone()))?;
        registry.register(Box::new(audit_write_failures.clone()))?;

        Ok(Self {
            checks,
            cache_events,
            resolve_latency,
            mutations,
            audit_write_failures,
        })
    }

    /// Count a permission check outcome.
    pub fn record_check(&self, outcome: &'static str) {
        self.checks.with_label_values(&[outcome]).inc();
    }

    /// Count a cache hit, miss, or invalidation.
    pub fn record_cache_event(&self, event: &'static str) {
        self.cache_events.with_label_values(&[event]).inc();
    }

    /// Observe one full resolution's latency.
    pub fn observe_resolution(&self, elapsed: std::time::Duration) {
        self.resolve_latency.observe(elapsed.as_secs_f64());
    }

    /// Count a mutation attempt.
    pub fn record_mutation(&self, op: &'static str, success: bool) {
        let outcome = if success { "success" } else { "failure" };
        self.mutations.with_label_values(&[op, outcome]).inc();
    }

    /// Count an audit row that failed to persist.
    pub fn record_audit_write_failure(&self) {
        self.audit_write_failures.inc();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opsmesh_common::metrics::new_registry;

    #[test]
    fn families_register_once_and_count() {
        let registry = new_registry();
        let metrics = AccessMetrics::new(registry.clone()).unwrap();
        metrics.record_check("granted");
        metrics.record_check("denied");
        metrics.record_cache_event("hit");
        metrics.record_mutation("role.assign", true);

        let families = registry.gather();
        let names: Vec<&str> = families.iter().map(|f| f.get_name()).collect();
        assert!(names.contains(&"opsmesh_access_checks_total"));
        assert!(names.contains(&"opsmesh_access_mutations_total"));

        // Double registration is a wiring bug and must fail loudly.
        assert!(AccessMetrics::new(registry).is_err());
    }
}
