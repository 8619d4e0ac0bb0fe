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

use anyhow::Result;
use opsmesh_common::metrics::SharedRegistry;
use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts};

use crate::breaker::BreakerState;

/// Metrics published by the storage gateway.
#[derive(Clone)]
pub struct GatewayMetrics {
    calls_total: IntCounterVec,
    rejected_total: IntCounterVec,
    retries_total: IntCounterVec,
    call_latency_seconds: HistogramVec,
    breaker_state: IntGauge,
}

impl GatewayMetrics {
    /// Register the gateway metric family against the provided registry.
    pub fn new(registry: SharedRegistry) -> Result<Self> {
        let calls_total = IntCounterVec::new(
            Opts::new(
                "opsmesh_store_calls_total",
                "Store calls by operation and final outcome (after internal retries)",
            ),
            &["op", "outcome"],
        )?;
        registry.register(Box::new(calls_total.clone()))?;

        let rejected_total = IntCounterVec::new(
            Opts::new(
                "opsmesh_store_rejected_total",
                "Calls rejected by the open circuit breaker without a network attempt",
            ),
            &["op"],
        )?;
        registry.register(Box::new(rejected_total.clone()))?;

        let retries_total = IntCounterVec::new(
            Opts::new(
                "opsmesh_store_retries_total",
                "Retry attempts performed inside admitted calls",
            ),
            &["op"],
        )?;
        registry.register(Box::new(retries_total.clone()))?;

        let histogram_opts = HistogramOpts::new(
            "opsmesh_store_call_latency_seconds",
            "Wall-clock duration of store calls including retries and backoff",
        )
        .buckets(prometheus::exponential_buckets(0.01, 2.0, 12)?);
        let call_latency_seconds = HistogramVec::new(histogram_opts, &["op"])?;
        registry.register(Box::new(call_latency_seconds.clone()))?;

        let breaker_state = IntGauge::new(
            "opsmesh_store_breaker_state",
            "Circuit breaker state (0 = closed, 1 = half-open, 2 = open)",
        )?;
        registry.register(Box::new(breaker_state.clone()))?;

        Ok(Self {
            calls_total,
            rejected_total,
            retries_total,
            call_latency_seconds,
            breaker_state,
        })
    }

    /// Record a completed call (success or ultimate failure).
    pub fn record_call(&self, op: &str, success: bool, latency: Duration) {
        let outcome = if success { "success" } else { "failure" };
        self.calls_total.with_label_values(&[op, outcome]).inc();
        self.call_latency_seconds
            .with_label_values(&[op])
            .observe(latency.as_secs_f64());
    }

    /// Record a call the breaker rejected without a network attempt.
    pub fn record_rejected(&self, op: &str) {
        self.rejected_total.with_label_values(&[op]).inc();
    }

    /// Record one retry attempt.
    pub fn record_retry(&self, op: &str) {
        self.retries_total.with_label_values(&[op]).inc();
    }

    /// Publish the current breaker state.
    pub fn set_breaker_state(&self, state: BreakerState) {
        let value = match state {
            BreakerState::Closed => 0,
            BreakerState::HalfOpen => 1,
            BreakerState::Open => 2,
        };
        self.breaker_state.set(value);
    }
}
