//! ---
//! mesh_section: "04-access-control"
//! mesh_subsection: "module"
//! mesh_type: "source"
//! mesh_scope: "code"
//! mesh_description: "Permission resolution, role management, and audit trail."
//! mesh_version: "v0.1.0"
//! mesh_owner: "tbd"
//! ---
#![warn(missing_docs)]
//! Access-control core: resolves a user's effective permissions (with a TTL
//! cache over the slow tabular store), answers yes/no permission checks,
//! manages role assignments, and keeps the write-ahead audit trail.
//!
//! Read-path decisions fail closed: when the directory cannot be consulted,
//! [`PermissionResolver::check`] answers deny and module listings come back
//! empty. Write paths propagate errors instead; a role mutation that cannot
//! be audited or persisted must surface, never be silently dropped.

pub mod audit;
pub mod cache;
pub mod manager;
pub mod metrics;
pub mod resolver;

pub use audit::{AuditTrail, TxHandle};
pub use cache::PermissionCache;
pub use manager::AccessManager;
pub use metrics::AccessMetrics;
pub use resolver::{PermissionResolver, PermissionSet};

use opsmesh_store::StoreError;

/// Errors surfaced by the mutation paths (the read paths fail closed and
/// never return this type to permission checkers).
#[derive(Debug, thiserror::Error)]
pub enum AccessError {
    /// The backing store failed or rejected the operation.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// The referenced user does not exist in the directory.
    #[error("user not found: {0}")]
    UnknownUser(String),
    /// The referenced role does not exist.
    #[error("role not found: {0}")]
    UnknownRole(String),
    /// The referenced role exists but is disabled.
    #[error("role is inactive: {0}")]
    InactiveRole(String),
}

/// Result alias for mutation paths.
pub type Result<T> = std::result::Result<T, AccessError>;
