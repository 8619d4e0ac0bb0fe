//! ---
//! mesh_section: "04-access-control"
//! mesh_subsection: "module"
//! mesh_type: "source"
//! mesh_scope: "code"
//! mesh_description: "Permission resolution, role management, and audit trail."
//! mesh_version: "v0.1.0"
//! mesh_owner: "tbd"
//! ---
//! Resolves a user's effective permission set and answers access checks.
//!
//! Resolution walks user → effective assignments → active roles → active
//! permission grants, with the roles and permissions sheets fetched in one
//! batched round trip. The resolved set is cached per user; see
//! [`PermissionCache`] for the freshness rules.
//!
//! The check surface fails closed: any storage failure on the read path is
//! logged and answered as "deny" (or an empty module list). An outage can
//! therefore never widen access, only narrow it.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use opsmesh_common::time::utc_now;
use opsmesh_directory::{
    DirectoryStore, LogLevel, Module, Permission, ROLE_ADMIN, ROLE_SUPER_ADMIN,
};
use serde_json::json;
use tokio::time::Instant;
use tracing::warn;

use crate::audit::AuditTrail;
use crate::cache::PermissionCache;
use crate::metrics::AccessMetrics;

/// A user's fully resolved permissions at a point in time.
#[derive(Debug, Clone)]
pub struct PermissionSet {
    /// The user this set belongs to.
    pub user_id: String,
    /// Codes of every active role reached through an effective assignment.
    pub role_codes: Vec<String>,
    /// Active permission grants from those roles.
    pub permissions: Vec<Permission>,
    /// When resolution ran.
    pub resolved_at: DateTime<Utc>,
}

impl PermissionSet {
    /// Whether any grant covers the requested module/action/resource.
    pub fn allows(&self, module_code: &str, action: &str, resource: Option<&str>) -> bool {
        self.permissions
            .iter()
            .any(|p| p.matches(module_code, action, resource))
    }

    /// Whether any grant reaches the module at all (used for navigation).
    pub fn covers_module(&self, module_code: &str) -> bool {
        self.permissions.iter().any(|p| p.covers_module(module_code))
    }

    /// Whether the user holds the given role code.
    pub fn has_role(&self, code: &str) -> bool {
        self.role_codes.iter().any(|c| c == code)
    }

    /// A set with no roles and no grants; the deny-everything answer.
    pub fn empty(user_id: &str) -> Self {
        Self {
            user_id: user_id.to_owned(),
            role_codes: Vec::new(),
            permissions: Vec::new(),
            resolved_at: utc_now(),
        }
    }
}

/// Answers "may user X do Y" against the directory, through the cache.
pub struct PermissionResolver {
    directory: Arc<dyn DirectoryStore>,
    cache: PermissionCache,
    metrics: Option<AccessMetrics>,
    audit: Option<Arc<AuditTrail>>,
}

impl PermissionResolver {
    /// Build a resolver with the given cache TTL.
    pub fn new(directory: Arc<dyn DirectoryStore>, cache_ttl: Duration) -> Self {
        Self {
            directory,
            cache: PermissionCache::new(cache_ttl),
            metrics: None,
            audit: None,
        }
    }

    /// Attach Prometheus metrics.
    pub fn with_metrics(mut self, metrics: AccessMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Attach an audit trail so fail-closed decisions leave a best-effort
    /// system log event alongside the tracing output.
    pub fn with_audit(mut self, audit: Arc<AuditTrail>) -> Self {
        self.audit = Some(audit);
        self
    }

    fn report_failure(&self, user_id: &str, operation: &str, err: &opsmesh_store::StoreError) {
        warn!(
            target: "opsmesh::access::resolver",
            user_id,
            operation,
            %err,
            "access decision failed closed"
        );
        if let Some(audit) = &self.audit {
            audit.log_event(
                LogLevel::Error,
                format!("{operation} failed closed for {user_id}"),
                json!({ "error": err.to_string() }),
                None,
            );
        }
    }

    /// Resolve the user's effective permission set, serving from cache when
    /// fresh. Unknown and deactivated users resolve to the empty set; that
    /// outcome is cached too, so a burst of checks from a revoked user does
    /// not hammer the store.
    pub async fn resolve(&self, user_id: &str) -> opsmesh_store::Result<Arc<PermissionSet>> {
        if let Some(cached) = self.cache.get(user_id) {
            if let Some(metrics) = &self.metrics {
                metrics.record_cache_event("hit");
            }
            return Ok(cached);
        }
        if let Some(metrics) = &self.metrics {
            metrics.record_cache_event("miss");
        }

        let started = Instant::now();
        let set = Arc::new(self.resolve_uncached(user_id).await?);
        if let Some(metrics) = &self.metrics {
            metrics.observe_resolution(started.elapsed());
        }
        self.cache.insert(user_id, set.clone());
        Ok(set)
    }

    async fn resolve_uncached(&self, user_id: &str) -> opsmesh_store::Result<PermissionSet> {
        let user = match self.directory.get_user(user_id).await? {
            Some(user) if user.is_active => user,
            _ => return Ok(PermissionSet::empty(user_id)),
        };

        let now = utc_now();
        let assignments = self.directory.list_assignments_for_user(&user.id).await?;
        let effective: Vec<_> = assignments
            .into_iter()
            .filter(|a| a.is_effective(now))
            .collect();
        if effective.is_empty() {
            return Ok(PermissionSet::empty(user_id));
        }

        let (roles, permissions) = self.directory.roles_with_permissions().await?;
        let held_roles: Vec<_> = roles
            .into_iter()
            .filter(|r| r.is_active && effective.iter().any(|a| a.role_id == r.id))
            .collect();
        let permissions = permissions
            .into_iter()
            .filter(|p| held_roles.iter().any(|r| r.id == p.role_id))
            .collect();

        Ok(PermissionSet {
            user_id: user.id,
            role_codes: held_roles.into_iter().map(|r| r.code).collect(),
            permissions,
            resolved_at: now,
        })
    }

    /// Yes/no permission check. Fails closed: a storage failure answers
    /// deny, never an error.
    pub async fn check(
        &self,
        user_id: &str,
        module_code: &str,
        action: &str,
        resource: Option<&str>,
    ) -> bool {
        match self.resolve(user_id).await {
            Ok(set) => {
                let granted = set.allows(module_code, action, resource);
                if let Some(metrics) = &self.metrics {
                    metrics.record_check(if granted { "granted" } else { "denied" });
                }
                granted
            }
            Err(err) => {
                self.report_failure(user_id, "permission check", &err);
                if let Some(metrics) = &self.metrics {
                    metrics.record_check("failed");
                }
                false
            }
        }
    }

    /// Active modules the user can reach, in navigation order. Fails closed
    /// to an empty list.
    pub async fn accessible_modules(&self, user_id: &str) -> Vec<Module> {
        let set = match self.resolve(user_id).await {
            Ok(set) => set,
            Err(err) => {
                self.report_failure(user_id, "module listing", &err);
                return Vec::new();
            }
        };
        if set.permissions.is_empty() {
            return Vec::new();
        }
        match self.directory.list_active_modules().await {
            Ok(modules) => modules
                .into_iter()
                .filter(|m| set.covers_module(&m.code))
                .collect(),
            Err(err) => {
                self.report_failure(user_id, "module listing", &err);
                Vec::new()
            }
        }
    }

    /// Whether any grant reaches the module. Fails closed.
    pub async fn can_access_module(&self, user_id: &str, module_code: &str) -> bool {
        match self.resolve(user_id).await {
            Ok(set) => set.covers_module(module_code),
            Err(err) => {
                self.report_failure(user_id, "module access check", &err);
                false
            }
        }
    }

    /// Codes of the user's effective roles. Fails closed to an empty list.
    pub async fn user_roles(&self, user_id: &str) -> Vec<String> {
        match self.resolve(user_id).await {
            Ok(set) => set.role_codes.clone(),
            Err(err) => {
                self.report_failure(user_id, "role listing", &err);
                Vec::new()
            }
        }
    }

    /// The user's active permission grants. Fails closed to an empty list,
    /// so a storage failure reads as "no grants", never as an error.
    pub async fn user_permissions(&self, user_id: &str) -> Vec<Permission> {
        match self.resolve(user_id).await {
            Ok(set) => set.permissions.clone(),
            Err(err) => {
                self.report_failure(user_id, "permission listing", &err);
                Vec::new()
            }
        }
    }

    /// Whether the user holds a role. Fails closed.
    pub async fn has_role(&self, user_id: &str, code: &str) -> bool {
        match self.resolve(user_id).await {
            Ok(set) => set.has_role(code),
            Err(_) => false,
        }
    }

    /// Whether the user holds the unrestricted role. Fails closed.
    pub async fn is_super_admin(&self, user_id: &str) -> bool {
        self.has_role(user_id, ROLE_SUPER_ADMIN).await
    }

    /// Whether the user holds either administrative role. Fails closed.
    pub async fn is_admin(&self, user_id: &str) -> bool {
        match self.resolve(user_id).await {
            Ok(set) => set.has_role(ROLE_SUPER_ADMIN) || set.has_role(ROLE_ADMIN),
            Err(_) => false,
        }
    }

    /// Drop the user's cached set (after a mutation touching them).
    pub fn invalidate(&self, user_id: &str) {
        if let Some(metrics) = &self.metrics {
            metrics.record_cache_event("invalidate");
        }
        self.cache.invalidate(user_id);
    }

    /// Drop every cached set (role or permission definitions changed).
    pub fn invalidate_all(&self) {
        if let Some(metrics) = &self.metrics {
            metrics.record_cache_event("invalidate_all");
        }
        self.cache.invalidate_all();
    }
}
