//! ---
//! mesh_section: "03-directory-data-access"
//! mesh_subsection: "module"
//! mesh_type: "source"
//! mesh_scope: "code"
//! mesh_description: "Tabular store adapter and domain records."
//! mesh_version: "v0.1.0"
//! mesh_owner: "tbd"
//! ---
//! Data-access contract the resolver and management layers program against.
//! [`SheetDirectory`](crate::SheetDirectory) is the production implementation;
//! tests substitute their own.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use opsmesh_store::Result;

use crate::records::{
    Module, NewAssignment, NewUser, Permission, Role, RoleAssignment, SignIn, SiteConfig,
    SystemLogEntry, TransactionLogEntry, TxStatus, User,
};

/// Typed access to the platform directory sheets.
///
/// List operations return only rows that decode cleanly; a corrupt row is
/// logged and skipped rather than failing the whole listing. Mutations are
/// strict; they return [`StoreError`](opsmesh_store::StoreError) on any
/// decode or addressing problem.
#[async_trait]
pub trait DirectoryStore: Send + Sync {
    /// All users, including inactive ones.
    async fn list_users(&self) -> Result<Vec<User>>;
    /// Look a user up by id.
    async fn get_user(&self, user_id: &str) -> Result<Option<User>>;
    /// Look a user up by email, case-insensitively.
    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>>;
    /// Create a user; the adapter stamps `created_at`/`updated_at`.
    async fn create_user(&self, user: NewUser) -> Result<User>;
    /// Overwrite a user's row; re-stamps `updated_at`.
    async fn update_user(&self, user: User) -> Result<User>;
    /// Upsert on sign-in: refresh profile fields and `last_login_at`,
    /// creating the user on first sign-in.
    async fn record_sign_in(&self, sign_in: SignIn) -> Result<User>;

    /// All role definitions.
    async fn list_roles(&self) -> Result<Vec<Role>>;
    /// Look a role up by id.
    async fn get_role(&self, role_id: &str) -> Result<Option<Role>>;
    /// Look a role up by its unique code.
    async fn get_role_by_code(&self, code: &str) -> Result<Option<Role>>;

    /// Every assignment row for a user, effective or not.
    async fn list_assignments_for_user(&self, user_id: &str) -> Result<Vec<RoleAssignment>>;
    /// Look an assignment up by id.
    async fn get_assignment(&self, assignment_id: &str) -> Result<Option<RoleAssignment>>;
    /// Append a new assignment; the adapter assigns the id and timestamp.
    async fn create_assignment(&self, assignment: NewAssignment) -> Result<RoleAssignment>;
    /// Soft-revoke an assignment (flip `is_active`, keep the row).
    async fn revoke_assignment(&self, assignment_id: &str) -> Result<RoleAssignment>;

    /// All modules, in declared order.
    async fn list_modules(&self) -> Result<Vec<Module>>;
    /// Active modules only, sorted by `sort_order`.
    async fn list_active_modules(&self) -> Result<Vec<Module>>;

    /// Active permission grants for one role.
    async fn list_permissions_for_role(&self, role_id: &str) -> Result<Vec<Permission>>;
    /// Every active permission grant.
    async fn list_all_permissions(&self) -> Result<Vec<Permission>>;
    /// Roles and permissions fetched in a single remote round trip.
    async fn roles_with_permissions(&self) -> Result<(Vec<Role>, Vec<Permission>)>;

    /// Active settings for one site.
    async fn list_site_config(&self, site_code: &str) -> Result<Vec<SiteConfig>>;
    /// One setting value for one site.
    async fn get_site_value(&self, site_code: &str, key: &str) -> Result<Option<String>>;

    /// Append a transaction log entry (normally PENDING).
    async fn append_transaction(&self, entry: TransactionLogEntry) -> Result<()>;
    /// Rewrite a transaction row with its terminal status.
    #[allow(clippy::too_many_arguments)]
    async fn complete_transaction(
        &self,
        tx_id: &str,
        status: TxStatus,
        entity_id: Option<String>,
        error_message: Option<String>,
        completed_at: DateTime<Utc>,
        duration_ms: i64,
    ) -> Result<TransactionLogEntry>;

    /// Append a system log event.
    async fn append_system_log(&self, entry: SystemLogEntry) -> Result<()>;
}
