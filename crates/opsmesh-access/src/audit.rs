//! ---
//! mesh_section: "04-access-control"
//! mesh_subsection: "module"
//! mesh_type: "source"
//! mesh_scope: "code"
//! mesh_description: "Permission resolution, role management, and audit trail."
//! mesh_version: "v0.1.0"
//! mesh_owner: "tbd"
//! ---
//! Write-ahead audit trail for mutating business operations.
//!
//! [`AuditTrail::begin`] records the intent as a PENDING row before the
//! action runs; [`AuditTrail::succeed`]/[`AuditTrail::fail`] rewrite the row
//! with the terminal status and duration. A PENDING row with no terminal
//! update is the crash signature operators scan for. Completion failures are
//! logged and counted but never mask the business outcome; the action
//! already happened.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use opsmesh_common::time::utc_now;
use opsmesh_directory::{
    DirectoryStore, LogLevel, SystemLogEntry, TransactionLogEntry, TxStatus,
};
use tracing::warn;
use uuid::Uuid;

use crate::metrics::AccessMetrics;

/// Handle to an open (PENDING) transaction row.
#[derive(Debug)]
pub struct TxHandle {
    /// Correlation id of the PENDING row.
    pub tx_id: String,
    started_at: DateTime<Utc>,
}

/// Appends and completes transaction rows, and emits system log events.
pub struct AuditTrail {
    directory: Arc<dyn DirectoryStore>,
    metrics: Option<AccessMetrics>,
}

impl AuditTrail {
    /// Build the trail over a directory store.
    pub fn new(directory: Arc<dyn DirectoryStore>) -> Self {
        Self {
            directory,
            metrics: None,
        }
    }

    /// Attach Prometheus metrics.
    pub fn with_metrics(mut self, metrics: AccessMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Record intent: append a PENDING row and hand back its handle. An
    /// error here aborts the business operation; mutations must not run
    /// unaudited.
    pub async fn begin(
        &self,
        user_id: &str,
        module_code: &str,
        action: &str,
        entity_type: &str,
        payload: serde_json::Value,
    ) -> opsmesh_store::Result<TxHandle> {
        let started_at = utc_now();
        let tx_id = Uuid::new_v4().to_string();
        let entry = TransactionLogEntry {
            tx_id: tx_id.clone(),
            user_id: user_id.to_owned(),
            module_code: module_code.to_owned(),
            action: action.to_owned(),
            entity_type: entity_type.to_owned(),
            entity_id: None,
            status: TxStatus::Pending,
            payload,
            error_message: None,
            started_at,
            completed_at: None,
            duration_ms: None,
        };
        if let Err(err) = self.directory.append_transaction(entry).await {
            if let Some(metrics) = &self.metrics {
                metrics.record_audit_write_failure();
            }
            return Err(err);
        }
        Ok(TxHandle { tx_id, started_at })
    }

    /// Mark the transaction SUCCESS.
    pub async fn succeed(&self, handle: TxHandle, entity_id: Option<String>) {
        self.complete(handle, TxStatus::Success, entity_id, None).await;
    }

    /// Mark the transaction FAILED with the cause.
    pub async fn fail(&self, handle: TxHandle, error: &str) {
        self.complete(handle, TxStatus::Failed, None, Some(error.to_owned()))
            .await;
    }

    async fn complete(
        &self,
        handle: TxHandle,
        status: TxStatus,
        entity_id: Option<String>,
        error_message: Option<String>,
    ) {
        let completed_at = utc_now();
        let duration_ms = (completed_at - handle.started_at).num_milliseconds().max(0);
        if let Err(err) = self
            .directory
            .complete_transaction(
                &handle.tx_id,
                status,
                entity_id,
                error_message,
                completed_at,
                duration_ms,
            )
            .await
        {
            warn!(
                target: "opsmesh::access::audit",
                tx_id = %handle.tx_id,
                status = status.as_str(),
                %err,
                "could not complete transaction row"
            );
            if let Some(metrics) = &self.metrics {
                metrics.record_audit_write_failure();
            }
        }
    }

    /// Emit a system log event without blocking the caller. The append runs
    /// on a detached task; a lost event costs observability, not
    /// correctness.
    pub fn log_event(
        &self,
        level: LogLevel,
        message: impl Into<String>,
        context: serde_json::Value,
        correlation_id: Option<String>,
    ) {
        let entry = SystemLogEntry {
            id: Uuid::new_v4().to_string(),
            level,
            message: message.into(),
            context,
            correlation_id,
            logged_at: utc_now(),
        };
        let directory = self.directory.clone();
        let metrics = self.metrics.clone();
        tokio::spawn(async move {
            if let Err(err) = directory.append_system_log(entry).await {
                warn!(
                    target: "opsmesh::access::audit",
                    %err,
                    "dropped system log event"
                );
                if let Some(metrics) = &metrics {
                    metrics.record_audit_write_failure();
                }
            }
        });
    }
}
