//! ---
//! mesh_section: "03-directory-data-access"
//! mesh_subsection: "module"
//! mesh_type: "source"
//! mesh_scope: "code"
//! mesh_description: "Tabular store adapter and domain records."
//! mesh_version: "v0.1.0"
//! mesh_owner: "tbd"
//! ---
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::rows::{self, RowError};

/// Wildcard token matching any value of a permission field.
pub const WILDCARD: &str = "*";

/// Seeded role code with an unrestricted grant.
pub const ROLE_SUPER_ADMIN: &str = "SUPER_ADMIN";
/// Seeded role code for platform administrators.
pub const ROLE_ADMIN: &str = "ADMIN";
/// Seeded role code for read-only users.
pub const ROLE_VIEWER: &str = "VIEWER";

/// A platform user. Created on first successful external sign-in and only
/// ever soft-disabled; this core never hard-deletes users.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    /// Opaque stable identity from the identity provider.
    pub id: String,
    /// Unique email, matched case-insensitively.
    pub email: String,
    /// Display name for UI rendering.
    pub display_name: String,
    /// Identity-provider tag (e.g. `google`, `azuread`).
    pub auth_provider: String,
    /// Whether the user can act at all.
    pub is_active: bool,
    /// Stamped by the adapter at creation.
    pub created_at: DateTime<Utc>,
    /// Re-stamped by the adapter on every update.
    pub updated_at: DateTime<Utc>,
    /// Last successful sign-in, if any.
    pub last_login_at: Option<DateTime<Utc>>,
    /// Opaque metadata blob owned by upstream tooling.
    pub metadata: serde_json::Value,
}

/// Payload for creating a user; the adapter stamps timestamps.
#[derive(Debug, Clone)]
pub struct NewUser {
    /// Opaque stable identity.
    pub id: String,
    /// Unique email.
    pub email: String,
    /// Display name.
    pub display_name: String,
    /// Identity-provider tag.
    pub auth_provider: String,
    /// Opaque metadata blob.
    pub metadata: serde_json::Value,
}

/// Verified identity arriving with a sign-in event.
#[derive(Debug, Clone)]
pub struct SignIn {
    /// Opaque stable identity.
    pub user_id: String,
    /// Email as asserted by the identity provider.
    pub email: String,
    /// Display name as asserted by the identity provider.
    pub display_name: String,
    /// Identity-provider tag.
    pub auth_provider: String,
}

/// A named role. Immutable once referenced by assignments except for the
/// active flag and description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    /// Opaque identifier.
    pub id: String,
    /// Unique human-meaningful code (`ADMIN`, `VIEWER`, …).
    pub code: String,
    /// Display name.
    pub name: String,
    /// Free-form description.
    pub description: String,
    /// Whether assignments referencing this role are effective.
    pub is_active: bool,
}

/// Links a user to a role, optionally scoped to one site.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleAssignment {
    /// Opaque identifier.
    pub id: String,
    /// Assigned user.
    pub user_id: String,
    /// Assigned role.
    pub role_id: String,
    /// Site scope; `None` means all sites.
    pub site_code: Option<String>,
    /// Identity of the assigner.
    pub assigned_by: String,
    /// When the assignment was made.
    pub assigned_at: DateTime<Utc>,
    /// Optional expiry; past expiry makes the assignment ineffective.
    pub expires_at: Option<DateTime<Utc>>,
    /// Soft-revocation flag. Revoked assignments stay for audit history.
    pub is_active: bool,
}

impl RoleAssignment {
    /// Whether the assignment itself is in force at `now`. The referenced
    /// role's own active flag is checked separately by the resolver.
    pub fn is_effective(&self, now: DateTime<Utc>) -> bool {
        self.is_active && self.expires_at.map(|at| now < at).unwrap_or(true)
    }
}

/// Payload for creating an assignment; the adapter assigns id and timestamp.
#[derive(Debug, Clone)]
pub struct NewAssignment {
    /// Assigned user.
    pub user_id: String,
    /// Assigned role.
    pub role_id: String,
    /// Site scope; `None` means all sites.
    pub site_code: Option<String>,
    /// Identity of the assigner.
    pub assigned_by: String,
    /// Optional expiry.
    pub expires_at: Option<DateTime<Utc>>,
}

/// An installable feature area; the unit permissions are scoped against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Module {
    /// Opaque identifier.
    pub id: String,
    /// Unique code (`HR`, `WMS`, …).
    pub code: String,
    /// Display name.
    pub name: String,
    /// Free-form description.
    pub description: String,
    /// Icon tag for the UI shell.
    pub icon: String,
    /// Route the UI mounts the module at.
    pub route: String,
    /// Whether the module is installed/enabled.
    pub is_active: bool,
    /// UI ordering hint.
    pub sort_order: i64,
}

/// Grants a role an action on a resource within a module. Each of
/// `module_code`, `action`, and `resource` independently supports the
/// [`WILDCARD`] token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permission {
    /// Opaque identifier.
    pub id: String,
    /// Role receiving the grant.
    pub role_id: String,
    /// Module scope or `*`.
    pub module_code: String,
    /// Action or `*`.
    pub action: String,
    /// Resource or `*`.
    pub resource: String,
    /// Opaque condition predicate, evaluated by the consuming module, not
    /// by this core. Raw JSON text as stored.
    pub condition: Option<String>,
    /// Whether the grant is effective.
    pub is_active: bool,
}

impl Permission {
    /// Three independent wildcard checks; a permission can mix a wildcard
    /// action with a specific module. When `resource` is not asked about,
    /// the resource field does not constrain the match.
    pub fn matches(&self, module_code: &str, action: &str, resource: Option<&str>) -> bool {
        field_matches(&self.module_code, module_code)
            && field_matches(&self.action, action)
            && resource
                .map(|r| field_matches(&self.resource, r))
                .unwrap_or(true)
    }

    /// Whether the grant reaches the given module at all.
    pub fn covers_module(&self, module_code: &str) -> bool {
        field_matches(&self.module_code, module_code)
    }

    /// Parse the condition predicate leniently: absent or malformed JSON
    /// degrades to an empty object rather than failing the lookup.
    pub fn parsed_condition(&self) -> serde_json::Value {
        match &self.condition {
            None => serde_json::Value::Object(serde_json::Map::new()),
            Some(raw) => serde_json::from_str(raw)
                .unwrap_or_else(|_| serde_json::Value::Object(serde_json::Map::new())),
        }
    }
}

fn field_matches(granted: &str, requested: &str) -> bool {
    granted == WILDCARD || granted == requested
}

/// Per-site key/value setting. Not security-relevant; shares the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteConfig {
    /// Opaque identifier.
    pub id: String,
    /// Site the setting applies to.
    pub site_code: String,
    /// Setting key.
    pub key: String,
    /// Setting value, uninterpreted.
    pub value: String,
    /// Declared value type tag (`string`, `number`, `boolean`, `json`).
    pub value_type: String,
    /// Whether the setting is in force.
    pub is_active: bool,
}

/// Terminal and non-terminal states of a write-ahead transaction entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TxStatus {
    /// Intent recorded, action not yet finished. A stuck PENDING row is the
    /// crash signature operators look for.
    Pending,
    /// Action completed.
    Success,
    /// Action failed; `error_message` carries the cause.
    Failed,
}

impl TxStatus {
    /// Token stored in the status cell.
    pub fn as_str(&self) -> &'static str {
        match self {
            TxStatus::Pending => "PENDING",
            TxStatus::Success => "SUCCESS",
            TxStatus::Failed => "FAILED",
        }
    }

    /// Parse a status cell token.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "PENDING" => Some(TxStatus::Pending),
            "SUCCESS" => Some(TxStatus::Success),
            "FAILED" => Some(TxStatus::Failed),
            _ => None,
        }
    }
}

/// One row per mutating business operation, written ahead of the action.
/// This is a recovery/audit trail, not a transaction mechanism; the
/// backing store has no rollback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionLogEntry {
    /// Correlation id (UUID v4), referenced by system log entries.
    pub tx_id: String,
    /// Acting user.
    pub user_id: String,
    /// Module the operation belongs to.
    pub module_code: String,
    /// Business action name.
    pub action: String,
    /// Entity family acted upon.
    pub entity_type: String,
    /// Entity id once known.
    pub entity_id: Option<String>,
    /// Current state of the operation.
    pub status: TxStatus,
    /// Snapshot of the operation payload.
    pub payload: serde_json::Value,
    /// Failure detail for FAILED entries.
    pub error_message: Option<String>,
    /// When the intent was recorded.
    pub started_at: DateTime<Utc>,
    /// When the terminal status was recorded.
    pub completed_at: Option<DateTime<Utc>>,
    /// Wall-clock duration of the business action.
    pub duration_ms: Option<i64>,
}

/// Severity of a system log event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogLevel {
    /// Failures needing operator attention.
    Error,
    /// Degraded but continuing.
    Warn,
    /// Routine events.
    Info,
    /// Diagnostic detail.
    Debug,
}

impl LogLevel {
    /// Token stored in the level cell.
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Error => "ERROR",
            LogLevel::Warn => "WARN",
            LogLevel::Info => "INFO",
            LogLevel::Debug => "DEBUG",
        }
    }

    /// Parse a level cell token.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "ERROR" => Some(LogLevel::Error),
            "WARN" => Some(LogLevel::Warn),
            "INFO" => Some(LogLevel::Info),
            "DEBUG" => Some(LogLevel::Debug),
            _ => None,
        }
    }
}

/// Generic leveled event record, optionally correlated to a transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemLogEntry {
    /// Opaque identifier.
    pub id: String,
    /// Severity.
    pub level: LogLevel,
    /// Event message.
    pub message: String,
    /// Structured context.
    pub context: serde_json::Value,
    /// Back-reference to a [`TransactionLogEntry::tx_id`].
    pub correlation_id: Option<String>,
    /// When the event was recorded.
    pub logged_at: DateTime<Utc>,
}

// --- row codecs -----------------------------------------------------------
//
// Column indexes follow the tables in `schema.rs`.

impl User {
    /// Decode from a USERS data row.
    pub fn from_row(row: &[String]) -> Result<Self, RowError> {
        Ok(Self {
            id: rows::required(row, 0, "id")?,
            email: rows::required(row, 1, "email")?,
            display_name: rows::cell(row, 2).trim().to_owned(),
            auth_provider: rows::cell(row, 3).trim().to_owned(),
            is_active: rows::boolean(row, 4, "is_active")?,
            created_at: rows::timestamp(row, 5, "created_at")?,
            updated_at: rows::timestamp(row, 6, "updated_at")?,
            last_login_at: rows::optional_timestamp(row, 7, "last_login_at")?,
            metadata: rows::lenient_json(row, 8),
        })
    }

    /// Encode to a USERS data row.
    pub fn to_row(&self) -> Vec<String> {
        vec![
            self.id.clone(),
            self.email.clone(),
            self.display_name.clone(),
            self.auth_provider.clone(),
            rows::boolean_cell(self.is_active),
            rows::timestamp_cell(self.created_at),
            rows::timestamp_cell(self.updated_at),
            rows::optional_timestamp_cell(self.last_login_at),
            rows::json_cell(&self.metadata),
        ]
    }
}

impl Role {
    /// Decode from a ROLES data row.
    pub fn from_row(row: &[String]) -> Result<Self, RowError> {
        Ok(Self {
            id: rows::required(row, 0, "id")?,
            code: rows::required(row, 1, "code")?,
            name: rows::cell(row, 2).trim().to_owned(),
            description: rows::cell(row, 3).trim().to_owned(),
            is_active: rows::boolean(row, 4, "is_active")?,
        })
    }

    /// Encode to a ROLES data row.
    pub fn to_row(&self) -> Vec<String> {
        vec![
            self.id.clone(),
            self.code.clone(),
            self.name.clone(),
            self.description.clone(),
            rows::boolean_cell(self.is_active),
        ]
    }
}

impl RoleAssignment {
    /// Decode from a ROLE_ASSIGNMENTS data row.
    pub fn from_row(row: &[String]) -> Result<Self, RowError> {
        Ok(Self {
            id: rows::required(row, 0, "id")?,
            user_id: rows::required(row, 1, "user_id")?,
            role_id: rows::required(row, 2, "role_id")?,
            site_code: rows::optional(row, 3),
            assigned_by: rows::cell(row, 4).trim().to_owned(),
            assigned_at: rows::timestamp(row, 5, "assigned_at")?,
            expires_at: rows::optional_timestamp(row, 6, "expires_at")?,
            is_active: rows::boolean(row, 7, "is_active")?,
        })
    }

    /// Encode to a ROLE_ASSIGNMENTS data row.
    pub fn to_row(&self) -> Vec<String> {
        vec![
            self.id.clone(),
            self.user_id.clone(),
            self.role_id.clone(),
            rows::optional_cell(self.site_code.as_deref()),
            self.assigned_by.clone(),
            rows::timestamp_cell(self.assigned_at),
            rows::optional_timestamp_cell(self.expires_at),
            rows::boolean_cell(self.is_active),
        ]
    }
}

impl Module {
    /// Decode from a MODULES data row.
    pub fn from_row(row: &[String]) -> Result<Self, RowError> {
        Ok(Self {
            id: rows::required(row, 0, "id")?,
            code: rows::required(row, 1, "code")?,
            name: rows::cell(row, 2).trim().to_owned(),
            description: rows::cell(row, 3).trim().to_owned(),
            icon: rows::cell(row, 4).trim().to_owned(),
            route: rows::cell(row, 5).trim().to_owned(),
            is_active: rows::boolean(row, 6, "is_active")?,
            sort_order: rows::i64_or(row, 7, "sort_order", 0)?,
        })
    }

    /// Encode to a MODULES data row.
    pub fn to_row(&self) -> Vec<String> {
        vec![
            self.id.clone(),
            self.code.clone(),
            self.name.clone(),
            self.description.clone(),
            self.icon.clone(),
            self.route.clone(),
            rows::boolean_cell(self.is_active),
            self.sort_order.to_string(),
        ]
    }
}

impl Permission {
    /// Decode from a PERMISSIONS data row.
    pub fn from_row(row: &[String]) -> Result<Self, RowError> {
        Ok(Self {
            id: rows::required(row, 0, "id")?,
            role_id: rows::required(row, 1, "role_id")?,
            module_code: rows::required(row, 2, "module_code")?,
            action: rows::required(row, 3, "action")?,
            resource: rows::required(row, 4, "resource")?,
            condition: rows::optional(row, 5),
            is_active: rows::boolean(row, 6, "is_active")?,
        })
    }

    /// Encode to a PERMISSIONS data row.
    pub fn to_row(&self) -> Vec<String> {
        vec![
            self.id.clone(),
            self.role_id.clone(),
            self.module_code.clone(),
            self.action.clone(),
            self.resource.clone(),
            rows::optional_cell(self.condition.as_deref()),
            rows::boolean_cell(self.is_active),
        ]
    }
}

impl SiteConfig {
    /// Decode from a SITE_CONFIG data row.
    pub fn from_row(row: &[String]) -> Result<Self, RowError> {
        Ok(Self {
            id: rows::required(row, 0, "id")?,
            site_code: rows::required(row, 1, "site_code")?,
            key: rows::required(row, 2, "key")?,
            value: rows::cell(row, 3).to_owned(),
            value_type: rows::cell(row, 4).trim().to_owned(),
            is_active: rows::boolean(row, 5, "is_active")?,
        })
    }

    /// Encode to a SITE_CONFIG data row.
    pub fn to_row(&self) -> Vec<String> {
        vec![
            self.id.clone(),
            self.site_code.clone(),
            self.key.clone(),
            self.value.clone(),
            self.value_type.clone(),
            rows::boolean_cell(self.is_active),
        ]
    }
}

impl TransactionLogEntry {
    /// Decode from a TRANSACTION_LOG data row.
    pub fn from_row(row: &[String]) -> Result<Self, RowError> {
        let status_cell = rows::required(row, 6, "status")?;
        Ok(Self {
            tx_id: rows::required(row, 0, "tx_id")?,
            user_id: rows::required(row, 1, "user_id")?,
            module_code: rows::cell(row, 2).trim().to_owned(),
            action: rows::required(row, 3, "action")?,
            entity_type: rows::cell(row, 4).trim().to_owned(),
            entity_id: rows::optional(row, 5),
            status: TxStatus::parse(&status_cell).ok_or(RowError::Token {
                column: "status",
                value: status_cell,
            })?,
            payload: rows::lenient_json(row, 7),
            error_message: rows::optional(row, 8),
            started_at: rows::timestamp(row, 9, "started_at")?,
            completed_at: rows::optional_timestamp(row, 10, "completed_at")?,
            duration_ms: rows::optional_i64(row, 11, "duration_ms")?,
        })
    }

    /// Encode to a TRANSACTION_LOG data row.
    pub fn to_row(&self) -> Vec<String> {
        vec![
            self.tx_id.clone(),
            self.user_id.clone(),
            self.module_code.clone(),
            self.action.clone(),
            self.entity_type.clone(),
            rows::optional_cell(self.entity_id.as_deref()),
            self.status.as_str().to_owned(),
            rows::json_cell(&self.payload),
            rows::optional_cell(self.error_message.as_deref()),
            rows::timestamp_cell(self.started_at),
            rows::optional_timestamp_cell(self.completed_at),
            self.duration_ms.map(|d| d.to_string()).unwrap_or_default(),
        ]
    }
}

impl SystemLogEntry {
    /// Decode from a SYSTEM_LOG data row.
    pub fn from_row(row: &[String]) -> Result<Self, RowError> {
        let level_cell = rows::required(row, 1, "level")?;
        Ok(Self {
            id: rows::required(row, 0, "id")?,
            level: LogLevel::parse(&level_cell).ok_or(RowError::Token {
                column: "level",
                value: level_cell,
            })?,
            message: rows::cell(row, 2).to_owned(),
            context: rows::lenient_json(row, 3),
            correlation_id: rows::optional(row, 4),
            logged_at: rows::timestamp(row, 5, "logged_at")?,
        })
    }

    /// Encode to a SYSTEM_LOG data row.
    pub fn to_row(&self) -> Vec<String> {
        vec![
            self.id.clone(),
            self.level.as_str().to_owned(),
            self.message.clone(),
            rows::json_cell(&self.context),
            rows::optional_cell(self.correlation_id.as_deref()),
            rows::timestamp_cell(self.logged_at),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use opsmesh_common::time::utc_now;

    fn permission(module_code: &str, action: &str, resource: &str) -> Permission {
        Permission {
            id: "p1".into(),
            role_id: "r1".into(),
            module_code: module_code.into(),
            action: action.into(),
            resource: resource.into(),
            condition: None,
            is_active: true,
        }
    }

    #[test]
    fn wildcard_fields_match_independently() {
        let p = permission("HR", "*", "candidate");
        assert!(p.matches("HR", "create", Some("candidate")));
        assert!(p.matches("HR", "delete", Some("candidate")));
        assert!(!p.matches("WMS", "create", Some("candidate")));
        assert!(!p.matches("HR", "create", Some("payslip")));
        // Resource unconstrained when the caller does not ask about one.
        assert!(p.matches("HR", "create", None));

        let all = permission("*", "*", "*");
        assert!(all.matches("anything", "whatever", Some("x")));
    }

    #[test]
    fn assignment_effectiveness_honours_expiry_and_active_flag() {
        let now = utc_now();
        let mut assignment = RoleAssignment {
            id: "a1".into(),
            user_id: "u1".into(),
            role_id: "r1".into(),
            site_code: None,
            assigned_by: "admin".into(),
            assigned_at: now,
            expires_at: None,
            is_active: true,
        };
        assert!(assignment.is_effective(now));

        assignment.expires_at = Some(now - Duration::minutes(1));
        assert!(!assignment.is_effective(now));

        assignment.expires_at = Some(now + Duration::minutes(1));
        assert!(assignment.is_effective(now));

        assignment.is_active = false;
        assert!(!assignment.is_effective(now));
    }

    #[test]
    fn malformed_condition_degrades_to_empty_object() {
        let mut p = permission("HR", "view", "*");
        p.condition = Some("{\"own_site_only\": true}".into());
        assert_eq!(p.parsed_condition()["own_site_only"], true);
        p.condition = Some("{nope".into());
        assert!(p.parsed_condition().as_object().unwrap().is_empty());
        p.condition = None;
        assert!(p.parsed_condition().as_object().unwrap().is_empty());
    }

    #[test]
    fn user_row_round_trip_preserves_optionals() {
        let now = utc_now();
        let user = User {
            id: "u1".into(),
            email: "Pat@Example.com".into(),
            display_name: "Pat".into(),
            auth_provider: "google".into(),
            is_active: true,
            created_at: now,
            updated_at: now,
            last_login_at: None,
            metadata: serde_json::json!({"locale": "en"}),
        };
        let row = user.to_row();
        assert_eq!(row[7], ""); // absent optional is an empty cell
        let decoded = User::from_row(&row).unwrap();
        assert_eq!(decoded.email, "Pat@Example.com");
        assert_eq!(decoded.last_login_at, None);
        assert_eq!(decoded.metadata["locale"], "en");
    }

    #[test]
    fn transaction_row_round_trip_keeps_status_tokens() {
        let now = utc_now();
        let entry = TransactionLogEntry {
            tx_id: "t-1".into(),
            user_id: "u1".into(),
            module_code: "ACCESS".into(),
            action: "role.assign".into(),
            entity_type: "role_assignment".into(),
            entity_id: None,
            status: TxStatus::Pending,
            payload: serde_json::json!({"role_id": "r1"}),
            error_message: None,
            started_at: now,
            completed_at: None,
            duration_ms: None,
        };
        let row = entry.to_row();
        assert_eq!(row[6], "PENDING");
        let decoded = TransactionLogEntry::from_row(&row).unwrap();
        assert_eq!(decoded.status, TxStatus::Pending);
        assert_eq!(decoded.completed_at, None);
    }

    #[test]
    fn rejects_unknown_status_and_level_tokens() {
        let mut row = vec![
            "t-1".to_string(),
            "u1".into(),
            "ACCESS".into(),
            "x".into(),
            "e".into(),
            "".into(),
            "MAYBE".into(),
            "".into(),
            "".into(),
            opsmesh_common::time::format_timestamp(utc_now()),
            "".into(),
            "".into(),
        ];
        assert!(TransactionLogEntry::from_row(&row).is_err());
        row[6] = "success".into();
        assert!(TransactionLogEntry::from_row(&row).is_ok());
        assert!(LogLevel::parse("TRACE").is_none());
    }
}
