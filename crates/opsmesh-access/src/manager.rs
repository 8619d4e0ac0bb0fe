//! ---
//! mesh_section: "04-access-control"
//! mesh_subsection: "module"
//! mesh_type: "source"
//! mesh_scope: "code"
//! mesh_description: "Permission resolution, role management, and audit trail."
//! mesh_version: "v0.1.0"
//! mesh_owner: "tbd"
//! ---
//! Role-assignment mutations: validate, audit ahead, act, invalidate.
//!
//! Every mutation follows the same shape; a PENDING audit row goes in
//! before the directory write, the terminal status after, and the actor's
//! (target user's) cached permission set is dropped so the change is visible
//! to the next check in this process.

use std::sync::Arc;

use opsmesh_directory::{DirectoryStore, LogLevel, NewAssignment, RoleAssignment};
use serde_json::json;
use tracing::info;

use crate::audit::AuditTrail;
use crate::metrics::AccessMetrics;
use crate::resolver::PermissionResolver;
use crate::{AccessError, Result};

/// Module code mutations in this crate are audited under.
const MODULE_CODE: &str = "ACCESS";

/// Orchestrates role-assignment changes against the directory.
pub struct AccessManager {
    directory: Arc<dyn DirectoryStore>,
    resolver: Arc<PermissionResolver>,
    audit: AuditTrail,
    metrics: Option<AccessMetrics>,
}

impl AccessManager {
    /// Build the manager; the resolver is shared so invalidations land in
    /// the same cache the checks read from.
    pub fn new(
        directory: Arc<dyn DirectoryStore>,
        resolver: Arc<PermissionResolver>,
        audit: AuditTrail,
    ) -> Self {
        Self {
            directory,
            resolver,
            audit,
            metrics: None,
        }
    }

    /// Attach Prometheus metrics.
    pub fn with_metrics(mut self, metrics: AccessMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Grant a role to a user. The role must exist and be active; the user
    /// must exist. The grant itself is appended, never merged; repeated
    /// grants produce distinct assignment rows.
    pub async fn assign_role(
        &self,
        actor_id: &str,
        request: NewAssignment,
    ) -> Result<RoleAssignment> {
        let role = self
            .directory
            .get_role(&request.role_id)
            .await?
            .ok_or_else(|| AccessError::UnknownRole(request.role_id.clone()))?;
        if !role.is_active {
            return Err(AccessError::InactiveRole(role.code));
        }
        self.directory
            .get_user(&request.user_id)
            .await?
            .ok_or_else(|| AccessError::UnknownUser(request.user_id.clone()))?;

        let payload = json!({
            "user_id": request.user_id,
            "role_id": request.role_id,
            "site_code": request.site_code,
            "expires_at": request.expires_at.map(opsmesh_common::time::format_timestamp),
        });
        let tx = self
            .audit
            .begin(actor_id, MODULE_CODE, "role.assign", "role_assignment", payload)
            .await
            .map_err(AccessError::Store)?;

        match self.directory.create_assignment(request).await {
            Ok(assignment) => {
                self.audit.succeed(tx, Some(assignment.id.clone())).await;
                self.resolver.invalidate(&assignment.user_id);
                if let Some(metrics) = &self.metrics {
                    metrics.record_mutation("role.assign", true);
                }
                info!(
                    target: "opsmesh::access::manager",
                    actor_id,
                    user_id = %assignment.user_id,
                    role_code = %role.code,
                    assignment_id = %assignment.id,
                    "role assigned"
                );
                self.audit.log_event(
                    LogLevel::Info,
                    format!("role {} assigned to {}", role.code, assignment.user_id),
                    json!({ "assignment_id": assignment.id }),
                    None,
                );
                Ok(assignment)
            }
            Err(err) => {
                self.audit.fail(tx, &err.to_string()).await;
                if let Some(metrics) = &self.metrics {
                    metrics.record_mutation("role.assign", false);
                }
                Err(err.into())
            }
        }
    }

    /// Soft-revoke an assignment. The row stays for audit history; only the
    /// active flag flips.
    pub async fn revoke_role(
        &self,
        actor_id: &str,
        assignment_id: &str,
    ) -> Result<RoleAssignment> {
        let tx = self
            .audit
            .begin(
                actor_id,
                MODULE_CODE,
                "role.revoke",
                "role_assignment",
                json!({ "assignment_id": assignment_id }),
            )
            .await
            .map_err(AccessError::Store)?;

        match self.directory.revoke_assignment(assignment_id).await {
            Ok(assignment) => {
                self.audit.succeed(tx, Some(assignment.id.clone())).await;
                self.resolver.invalidate(&assignment.user_id);
                if let Some(metrics) = &self.metrics {
                    metrics.record_mutation("role.revoke", true);
                }
                info!(
                    target: "opsmesh::access::manager",
                    actor_id,
                    user_id = %assignment.user_id,
                    assignment_id = %assignment.id,
                    "role assignment revoked"
                );
                Ok(assignment)
            }
            Err(err) => {
                self.audit.fail(tx, &err.to_string()).await;
                if let Some(metrics) = &self.metrics {
                    metrics.record_mutation("role.revoke", false);
                }
                Err(err.into())
            }
        }
    }
}
