//! ---
//! mesh_section: "02-storage-resilience"
//! mesh_subsection: "module"
//! mesh_type: "source"
//! mesh_scope: "code"
//! mesh_description: "Resilient gateway over the remote tabular store."
//! mesh_version: "v0.1.0"
//! mesh_owner: "tbd"
//! ---
use std::future::Future;
use std::sync::Arc;

use indexmap::IndexMap;
use opsmesh_common::config::GatewayConfig;
use tokio::time::{sleep, timeout, Duration, Instant};
use tracing::warn;

use crate::breaker::CircuitBreaker;
use crate::metrics::GatewayMetrics;
use crate::protocol::{RangeSpec, RemoteError, Row, TabularStore};
use crate::retry::RetryPolicy;
use crate::{Result, StoreError};

/// Resilient front door to the remote tabular store.
///
/// Every call is admitted through the circuit breaker, runs with a
/// per-attempt timeout, and retries transient failures on a bounded
/// schedule. Breaker accounting happens exactly once per call after the
/// retry loop resolves, so a call that succeeds on its third attempt counts
/// as one success. A caller that stops awaiting the returned future records
/// nothing; in-flight bookkeeping is only written when the call resolves.
pub struct StorageGateway {
    store: Arc<dyn TabularStore>,
    breaker: CircuitBreaker,
    retry: RetryPolicy,
    call_timeout: Duration,
    metrics: Option<GatewayMetrics>,
}

impl StorageGateway {
    /// Wrap a protocol implementation with the configured failure policy.
    pub fn new(store: Arc<dyn TabularStore>, config: &GatewayConfig) -> Self {
        Self {
            store,
            breaker: CircuitBreaker::new(config.failure_threshold, config.cooldown),
            retry: RetryPolicy::from_config(config),
            call_timeout: config.call_timeout,
            metrics: None,
        }
    }

    /// Attach Prometheus metrics.
    pub fn with_metrics(mut self, metrics: GatewayMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Read a range (or a whole sheet) of cell values.
    pub async fn read(&self, sheet: &str, range: Option<&str>) -> Result<Vec<Row>> {
        self.call("read", || self.store.read(sheet, range)).await
    }

    /// Overwrite a range in place.
    pub async fn write(&self, sheet: &str, range: &str, rows: Vec<Row>) -> Result<()> {
        self.call("write", || self.store.write(sheet, range, rows.clone()))
            .await
    }

    /// Append rows at the end of a sheet.
    pub async fn append(&self, sheet: &str, rows: Vec<Row>) -> Result<()> {
        self.call("append", || self.store.append(sheet, rows.clone()))
            .await
    }

    /// Read several ranges in one remote round trip.
    pub async fn batch_read(&self, specs: &[RangeSpec]) -> Result<IndexMap<RangeSpec, Vec<Row>>> {
        self.call("batch_read", || self.store.batch_read(specs))
            .await
    }

    /// Clear a range (or a whole sheet).
    pub async fn clear(&self, sheet: &str, range: Option<&str>) -> Result<()> {
        self.call("clear", || self.store.clear(sheet, range)).await
    }

    /// Current breaker state (for health endpoints and tests).
    pub fn breaker_state(&self) -> crate::breaker::BreakerState {
        self.breaker.state()
    }

    async fn call<T, F, Fut>(&self, op: &'static str, attempt_fn: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = std::result::Result<T, RemoteError>>,
    {
        if let Err(retry_after) = self.breaker.try_admit() {
            if let Some(metrics) = &self.metrics {
                metrics.record_rejected(op);
                metrics.set_breaker_state(self.breaker.state());
            }
            return Err(StoreError::CircuitOpen { retry_after });
        }

        let started = Instant::now();
        let mut attempt: u32 = 1;
        let outcome = loop {
            let attempt_result = match timeout(self.call_timeout, attempt_fn()).await {
                Ok(result) => result,
                Err(_) => Err(RemoteError::timeout(format!(
                    "{op} exceeded {}ms deadline",
                    self.call_timeout.as_millis()
                ))),
            };

            match attempt_result {
                Ok(value) => break Ok(value),
                Err(err) if err.is_transient() && attempt < self.retry.max_attempts => {
                    let delay = self.retry.delay_after(attempt);
                    warn!(
                        target: "opsmesh::store::gateway",
                        op,
                        attempt,
                        kind = %err.kind,
                        delay_ms = delay.as_millis() as u64,
                        "transient store failure, retrying"
                    );
                    if let Some(metrics) = &self.metrics {
                        metrics.record_retry(op);
                    }
                    sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => break Err(err),
            }
        };

        match &outcome {
            Ok(_) => self.breaker.record_success(),
            Err(_) => self.breaker.record_failure(),
        }
        if let Some(metrics) = &self.metrics {
            metrics.record_call(op, outcome.is_ok(), started.elapsed());
            metrics.set_breaker_state(self.breaker.state());
        }

        outcome.map_err(|err| {
            if err.is_transient() {
                StoreError::Transient {
                    kind: err.kind,
                    message: err.message,
                }
            } else {
                StoreError::Remote {
                    kind: err.kind,
                    message: err.message,
                }
            }
        })
    }
}
