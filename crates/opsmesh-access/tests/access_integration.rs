//! ---
//! mesh_section: "04-access-control"
//! mesh_subsection: "integration-test"
//! mesh_type: "test"
//! mesh_scope: "test"
//! mesh_description: "End-to-end access checks over the in-memory sheet store."
//! mesh_version: "v0.1.0"
//! mesh_owner: "tbd"
//! ---

use std::sync::Arc;
use std::time::Duration;

use chrono::Duration as ChronoDuration;
use opsmesh_access::{AccessError, AccessManager, AuditTrail, PermissionResolver};
use opsmesh_common::config::GatewayConfig;
use opsmesh_common::time::utc_now;
use opsmesh_directory::schema::{self, sheets};
use opsmesh_directory::{
    NewAssignment, Permission, Role, RoleAssignment, SheetDirectory, User,
};
use opsmesh_store::{MemorySheetStore, RemoteError, StorageGateway, TabularStore};

const CACHE_TTL: Duration = Duration::from_secs(300);

fn user_row(id: &str, email: &str, active: bool) -> Vec<String> {
    let now = utc_now();
    User {
        id: id.into(),
        email: email.into(),
        display_name: id.into(),
        auth_provider: "google".into(),
        is_active: active,
        created_at: now,
        updated_at: now,
        last_login_at: None,
        metadata: serde_json::json!({}),
    }
    .to_row()
}

fn role_row(id: &str, code: &str, active: bool) -> Vec<String> {
    Role {
        id: id.into(),
        code: code.into(),
        name: code.into(),
        description: String::new(),
        is_active: active,
    }
    .to_row()
}

fn assignment_row(
    id: &str,
    user_id: &str,
    role_id: &str,
    expires_in: Option<ChronoDuration>,
    active: bool,
) -> Vec<String> {
    let now = utc_now();
    RoleAssignment {
        id: id.into(),
        user_id: user_id.into(),
        role_id: role_id.into(),
        site_code: None,
        assigned_by: "u-root".into(),
        assigned_at: now,
        expires_at: expires_in.map(|d| now + d),
        is_active: active,
    }
    .to_row()
}

fn permission_row(
    id: &str,
    role_id: &str,
    module: &str,
    action: &str,
    resource: &str,
    active: bool,
) -> Vec<String> {
    Permission {
        id: id.into(),
        role_id: role_id.into(),
        module_code: module.into(),
        action: action.into(),
        resource: resource.into(),
        condition: None,
        is_active: active,
    }
    .to_row()
}

fn module_row(id: &str, code: &str, active: bool, sort: i64) -> Vec<String> {
    vec![
        id.into(),
        code.into(),
        code.into(),
        String::new(),
        "grid".into(),
        format!("/{}", code.to_ascii_lowercase()),
        if active { "TRUE".into() } else { "FALSE".into() },
        sort.to_string(),
    ]
}

fn seeded_store() -> Arc<MemorySheetStore> {
    let store = MemorySheetStore::new();
    store.insert_sheet(
        sheets::USERS,
        vec![
            schema::header_row(schema::USER_COLUMNS),
            user_row("u-admin", "admin@example.com", true),
            user_row("u-clerk", "clerk@example.com", true),
            user_row("u-none", "none@example.com", true),
            user_row("u-gone", "gone@example.com", false),
            user_row("u-late", "late@example.com", true),
            user_row("u-dead-role", "dead@example.com", true),
        ],
    );
    store.insert_sheet(
        sheets::ROLES,
        vec![
            schema::header_row(schema::ROLE_COLUMNS),
            role_row("r-super", "SUPER_ADMIN", true),
            role_row("r-hr", "HR_CLERK", true),
            role_row("r-dead", "RETIRED", false),
        ],
    );
    store.insert_sheet(
        sheets::ROLE_ASSIGNMENTS,
        vec![
            schema::header_row(schema::ASSIGNMENT_COLUMNS),
            assignment_row("a-1", "u-admin", "r-super", None, true),
            assignment_row("a-2", "u-clerk", "r-hr", Some(ChronoDuration::days(30)), true),
            assignment_row("a-3", "u-gone", "r-super", None, true),
            assignment_row("a-4", "u-late", "r-hr", Some(ChronoDuration::days(-1)), true),
            assignment_row("a-5", "u-dead-role", "r-dead", None, true),
        ],
    );
    store.insert_sheet(
        sheets::MODULES,
        vec![
            schema::header_row(schema::MODULE_COLUMNS),
            module_row("m-1", "HR", true, 1),
            module_row("m-2", "WMS", true, 2),
            module_row("m-3", "LEGACY", false, 3),
        ],
    );
    store.insert_sheet(
        sheets::PERMISSIONS,
        vec![
            schema::header_row(schema::PERMISSION_COLUMNS),
            permission_row("p-1", "r-super", "*", "*", "*", true),
            permission_row("p-2", "r-hr", "HR", "view", "*", true),
            permission_row("p-3", "r-hr", "HR", "edit", "timesheet", true),
            permission_row("p-4", "r-hr", "WMS", "view", "*", false),
            permission_row("p-5", "r-dead", "*", "*", "*", true),
        ],
    );
    store.insert_sheet(
        sheets::TRANSACTION_LOG,
        vec![schema::header_row(schema::TRANSACTION_LOG_COLUMNS)],
    );
    store.insert_sheet(
        sheets::SYSTEM_LOG,
        vec![schema::header_row(schema::SYSTEM_LOG_COLUMNS)],
    );
    Arc::new(store)
}

struct Harness {
    store: Arc<MemorySheetStore>,
    directory: Arc<SheetDirectory>,
    resolver: Arc<PermissionResolver>,
}

impl Harness {
    fn new(store: Arc<MemorySheetStore>) -> Self {
        let gateway = Arc::new(StorageGateway::new(
            store.clone(),
            &GatewayConfig::default(),
        ));
        let directory = Arc::new(SheetDirectory::new(gateway));
        let resolver = Arc::new(PermissionResolver::new(directory.clone(), CACHE_TTL));
        Self {
            store,
            directory,
            resolver,
        }
    }

    fn manager(&self) -> AccessManager {
        AccessManager::new(
            self.directory.clone(),
            self.resolver.clone(),
            AuditTrail::new(self.directory.clone()),
        )
    }
}

#[tokio::test(start_paused = true)]
async fn hr_clerk_sees_only_granted_actions() {
    let h = Harness::new(seeded_store());

    assert!(h.resolver.check("u-clerk", "HR", "view", None).await);
    assert!(h.resolver.check("u-clerk", "HR", "view", Some("candidate")).await);
    assert!(h.resolver.check("u-clerk", "HR", "edit", Some("timesheet")).await);
    assert!(!h.resolver.check("u-clerk", "HR", "edit", Some("payslip")).await);
    assert!(!h.resolver.check("u-clerk", "HR", "delete", None).await);
    // Inactive grant on WMS counts for nothing.
    assert!(!h.resolver.check("u-clerk", "WMS", "view", None).await);

    let modules = h.resolver.accessible_modules("u-clerk").await;
    let codes: Vec<&str> = modules.iter().map(|m| m.code.as_str()).collect();
    assert_eq!(codes, vec!["HR"]);

    assert_eq!(h.resolver.user_roles("u-clerk").await, vec!["HR_CLERK"]);
    let grants = h.resolver.user_permissions("u-clerk").await;
    let grant_ids: Vec<&str> = grants.iter().map(|p| p.id.as_str()).collect();
    assert_eq!(grant_ids, vec!["p-2", "p-3"]);
    assert!(h.resolver.can_access_module("u-clerk", "HR").await);
    assert!(!h.resolver.can_access_module("u-clerk", "WMS").await);
    assert!(!h.resolver.is_admin("u-clerk").await);
}

#[tokio::test(start_paused = true)]
async fn super_admin_wildcard_reaches_every_active_module() {
    let h = Harness::new(seeded_store());

    assert!(h.resolver.check("u-admin", "HR", "delete", Some("payslip")).await);
    assert!(h.resolver.check("u-admin", "WMS", "anything", None).await);
    assert!(h.resolver.is_super_admin("u-admin").await);
    assert!(h.resolver.is_admin("u-admin").await);

    // Wildcard grants reach every active module, but never inactive ones.
    let modules = h.resolver.accessible_modules("u-admin").await;
    let codes: Vec<&str> = modules.iter().map(|m| m.code.as_str()).collect();
    assert_eq!(codes, vec!["HR", "WMS"]);
}

#[tokio::test(start_paused = true)]
async fn users_without_effective_grants_get_nothing() {
    let h = Harness::new(seeded_store());

    // No assignments at all.
    assert!(!h.resolver.check("u-none", "HR", "view", None).await);
    assert!(h.resolver.accessible_modules("u-none").await.is_empty());
    // Deactivated user, even with a super-admin assignment.
    assert!(!h.resolver.check("u-gone", "HR", "view", None).await);
    // Assignment expired yesterday.
    assert!(!h.resolver.check("u-late", "HR", "view", None).await);
    // Assignment to a deactivated role.
    assert!(!h.resolver.check("u-dead-role", "HR", "view", None).await);
    // Unknown user.
    assert!(!h.resolver.check("u-nobody", "HR", "view", None).await);
}

#[tokio::test(start_paused = true)]
async fn cached_resolution_serves_repeat_checks_without_store_reads() {
    let h = Harness::new(seeded_store());

    assert!(h.resolver.check("u-clerk", "HR", "view", None).await);
    let calls_after_first = h.store.calls();

    assert!(h.resolver.check("u-clerk", "HR", "edit", Some("timesheet")).await);
    assert!(!h.resolver.check("u-clerk", "WMS", "view", None).await);
    assert_eq!(h.store.calls(), calls_after_first);

    // Past the TTL the next check resolves from the store again.
    tokio::time::advance(Duration::from_secs(301)).await;
    assert!(h.resolver.check("u-clerk", "HR", "view", None).await);
    assert!(h.store.calls() > calls_after_first);
}

#[tokio::test(start_paused = true)]
async fn assignment_mutations_invalidate_the_cache() {
    let h = Harness::new(seeded_store());
    let manager = h.manager();

    // Prime the cache with the deny answer.
    assert!(!h.resolver.check("u-none", "HR", "view", None).await);

    let assignment = manager
        .assign_role(
            "u-admin",
            NewAssignment {
                user_id: "u-none".into(),
                role_id: "r-hr".into(),
                site_code: None,
                assigned_by: "u-admin".into(),
                expires_at: None,
            },
        )
        .await
        .unwrap();

    // Visible on the very next check, not one TTL later.
    assert!(h.resolver.check("u-none", "HR", "view", None).await);

    manager.revoke_role("u-admin", &assignment.id).await.unwrap();
    assert!(!h.resolver.check("u-none", "HR", "view", None).await);
}

#[tokio::test(start_paused = true)]
async fn mutations_leave_a_completed_audit_trail() {
    let h = Harness::new(seeded_store());
    let manager = h.manager();

    manager
        .assign_role(
            "u-admin",
            NewAssignment {
                user_id: "u-none".into(),
                role_id: "r-hr".into(),
                site_code: Some("BKK-01".into()),
                assigned_by: "u-admin".into(),
                expires_at: None,
            },
        )
        .await
        .unwrap();

    let raw = h.store.read(sheets::TRANSACTION_LOG, None).await.unwrap();
    assert_eq!(raw.len(), 2); // header + one transaction
    let row = &raw[1];
    assert_eq!(row[1], "u-admin"); // acting user, not the target
    assert_eq!(row[3], "role.assign");
    assert_eq!(row[6], "SUCCESS");
    assert!(!row[10].is_empty()); // completed_at
    assert!(!row[11].is_empty()); // duration_ms
}

#[tokio::test(start_paused = true)]
async fn failed_mutations_audit_as_failed_and_propagate() {
    let h = Harness::new(seeded_store());
    let manager = h.manager();

    let err = manager
        .revoke_role("u-admin", "a-missing")
        .await
        .unwrap_err();
    assert!(matches!(err, AccessError::Store(_)));

    let raw = h.store.read(sheets::TRANSACTION_LOG, None).await.unwrap();
    assert_eq!(raw[1][3], "role.revoke");
    assert_eq!(raw[1][6], "FAILED");
    assert!(!raw[1][8].is_empty()); // error_message
}

#[tokio::test(start_paused = true)]
async fn unknown_and_inactive_roles_are_rejected_before_any_write() {
    let h = Harness::new(seeded_store());
    let manager = h.manager();
    let assignments_before = h
        .store
        .read(sheets::ROLE_ASSIGNMENTS, None)
        .await
        .unwrap()
        .len();

    let request = |role_id: &str| NewAssignment {
        user_id: "u-none".into(),
        role_id: role_id.into(),
        site_code: None,
        assigned_by: "u-admin".into(),
        expires_at: None,
    };

    let err = manager.assign_role("u-admin", request("r-void")).await.unwrap_err();
    assert!(matches!(err, AccessError::UnknownRole(_)));
    let err = manager.assign_role("u-admin", request("r-dead")).await.unwrap_err();
    assert!(matches!(err, AccessError::InactiveRole(_)));

    let assignments_after = h
        .store
        .read(sheets::ROLE_ASSIGNMENTS, None)
        .await
        .unwrap()
        .len();
    assert_eq!(assignments_after, assignments_before);
    // Validation failures never reach the audit trail either.
    let tx = h.store.read(sheets::TRANSACTION_LOG, None).await.unwrap();
    assert_eq!(tx.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn checks_fail_closed_during_a_store_outage() {
    let store = seeded_store();
    let h = Harness::new(store.clone());

    store.fail_always(RemoteError::server_error(503, "backend down"));
    assert!(!h.resolver.check("u-admin", "HR", "view", None).await);
    assert!(h.resolver.accessible_modules("u-admin").await.is_empty());
    assert!(h.resolver.user_permissions("u-admin").await.is_empty());
    assert!(h.resolver.user_roles("u-admin").await.is_empty());
    assert!(!h.resolver.is_super_admin("u-admin").await);

    // Recovery: once the store answers again, access comes back.
    store.clear_faults();
    tokio::time::advance(Duration::from_secs(61)).await; // past any breaker cooldown
    assert!(h.resolver.check("u-admin", "HR", "view", None).await);
}

#[tokio::test(start_paused = true)]
async fn outage_after_caching_still_serves_cached_answers() {
    let store = seeded_store();
    let h = Harness::new(store.clone());

    assert!(h.resolver.check("u-admin", "HR", "view", None).await);
    store.fail_always(RemoteError::server_error(503, "backend down"));

    // The cached set keeps answering; only uncached users fail closed.
    assert!(h.resolver.check("u-admin", "WMS", "edit", None).await);
    assert!(!h.resolver.check("u-clerk", "HR", "view", None).await);
}
