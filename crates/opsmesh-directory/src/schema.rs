//! ---
//! mesh_section: "03-directory-data-access"
//! mesh_subsection: "module"
//! mesh_type: "source"
//! mesh_scope: "code"
//! mesh_description: "Tabular store adapter and domain records."
//! mesh_version: "v0.1.0"
//! mesh_owner: "tbd"
//! ---
//! Sheet layout shared with the provisioning tooling. Row 1 of every sheet
//! is the header row; data rows start at position 2. Column order here is
//! the row codec's contract; reordering a header is a breaking schema
//! change for every deployed spreadsheet.

/// Sheet (tab) names in the backing spreadsheet.
pub mod sheets {
    /// User directory.
    pub const USERS: &str = "USERS";
    /// Role definitions.
    pub const ROLES: &str = "ROLES";
    /// User↔role assignments.
    pub const ROLE_ASSIGNMENTS: &str = "ROLE_ASSIGNMENTS";
    /// Installable feature modules.
    pub const MODULES: &str = "MODULES";
    /// Role↔module permission grants.
    pub const PERMISSIONS: &str = "PERMISSIONS";
    /// Per-site key/value settings.
    pub const SITE_CONFIG: &str = "SITE_CONFIG";
    /// Write-ahead business transaction log.
    pub const TRANSACTION_LOG: &str = "TRANSACTION_LOG";
    /// Leveled system event log.
    pub const SYSTEM_LOG: &str = "SYSTEM_LOG";
}

/// Column order for the USERS sheet.
pub const USER_COLUMNS: &[&str] = &[
    "id",
    "email",
    "display_name",
    "auth_provider",
    "is_active",
    "created_at",
    "updated_at",
    "last_login_at",
    "metadata",
];

/// Column order for the ROLES sheet.
pub const ROLE_COLUMNS: &[&str] = &["id", "code", "name", "description", "is_active"];

/// Column order for the ROLE_ASSIGNMENTS sheet.
pub const ASSIGNMENT_COLUMNS: &[&str] = &[
    "id",
    "user_id",
    "role_id",
    "site_code",
    "assigned_by",
    "assigned_at",
    "expires_at",
    "is_active",
];

/// Column order for the MODULES sheet.
pub const MODULE_COLUMNS: &[&str] = &[
    "id",
    "code",
    "name",
    "description",
    "icon",
    "route",
    "is_active",
    "sort_order",
];

/// Column order for the PERMISSIONS sheet.
pub const PERMISSION_COLUMNS: &[&str] = &[
    "id",
    "role_id",
    "module_code",
    "action",
    "resource",
    "condition",
    "is_active",
];

/// Column order for the SITE_CONFIG sheet.
pub const SITE_CONFIG_COLUMNS: &[&str] = &[
    "id",
    "site_code",
    "key",
    "value",
    "value_type",
    "is_active",
];

/// Column order for the TRANSACTION_LOG sheet.
pub const TRANSACTION_LOG_COLUMNS: &[&str] = &[
    "tx_id",
    "user_id",
    "module_code",
    "action",
    "entity_type",
    "entity_id",
    "status",
    "payload",
    "error_message",
    "started_at",
    "completed_at",
    "duration_ms",
];

/// Column order for the SYSTEM_LOG sheet.
pub const SYSTEM_LOG_COLUMNS: &[&str] = &[
    "id",
    "level",
    "message",
    "context",
    "correlation_id",
    "logged_at",
];

/// Materialize a header row for a column table.
pub fn header_row(columns: &[&str]) -> Vec<String> {
    columns.iter().map(|c| (*c).to_owned()).collect()
}

/// A1 range addressing one full data row at the given 1-based sheet
/// position (the header row occupies position 1).
pub fn data_row_range(position: usize, width: usize) -> String {
    format!("A{position}:{}{position}", column_letter(width))
}

/// 1-based column index to spreadsheet letters (1 → A, 27 → AA).
fn column_letter(mut index: usize) -> String {
    debug_assert!(index >= 1);
    let mut letters = Vec::new();
    while index > 0 {
        let rem = (index - 1) % 26;
        letters.push(b'A' + rem as u8);
        index = (index - 1) / 26;
    }
    letters.reverse();
    String::from_utf8(letters).expect("ascii letters")
}
