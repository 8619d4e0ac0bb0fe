//! ---
//! mesh_section: "03-directory-data-access"
//! mesh_subsection: "module"
//! mesh_type: "source"
//! mesh_scope: "code"
//! mesh_description: "Tabular store adapter and domain records."
//! mesh_version: "v0.1.0"
//! mesh_owner: "tbd"
//! ---
//! Maps the [`DirectoryStore`] contract onto raw sheet rows through the
//! storage gateway.
//!
//! Rows have no server-side addressing: an update scans the sheet, finds the
//! first row whose id column matches, and overwrites that single row by its
//! 1-based position (the header occupies position 1, so the data row at scan
//! index `i` lives at position `i + 1`). The position is only valid until
//! someone inserts or deletes a row above it, so every read-locate-write
//! sequence for a given sheet runs under that sheet's mutex. This serializes
//! writers within this process; concurrent human edits to the spreadsheet
//! remain a documented operational hazard.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use opsmesh_common::time::utc_now;
use opsmesh_store::{RangeSpec, Result, StorageGateway, StoreError};
use tokio::sync::Mutex;
use tracing::warn;
use uuid::Uuid;

use crate::contract::DirectoryStore;
use crate::records::{
    Module, NewAssignment, NewUser, Permission, Role, RoleAssignment, SignIn, SiteConfig,
    SystemLogEntry, TransactionLogEntry, TxStatus, User,
};
use crate::rows::{self, RowError};
use crate::schema::{self, sheets};

/// [`DirectoryStore`] implementation backed by the spreadsheet gateway.
pub struct SheetDirectory {
    gateway: Arc<StorageGateway>,
    // One lock per sheet that sees read-locate-write updates.
    users_lock: Mutex<()>,
    assignments_lock: Mutex<()>,
    transactions_lock: Mutex<()>,
}

impl SheetDirectory {
    /// Build the adapter over an already-configured gateway.
    pub fn new(gateway: Arc<StorageGateway>) -> Self {
        Self {
            gateway,
            users_lock: Mutex::new(()),
            assignments_lock: Mutex::new(()),
            transactions_lock: Mutex::new(()),
        }
    }

    /// Read a whole sheet and decode its data rows, skipping the header,
    /// blank rows, and rows that fail to decode (those are logged; a single
    /// mangled row must not take the directory down).
    async fn scan<T, F>(&self, sheet: &str, decode: F) -> Result<Vec<T>>
    where
        F: Fn(&[String]) -> std::result::Result<T, RowError>,
    {
        let raw = self.gateway.read(sheet, None).await?;
        Ok(decode_data_rows(sheet, &raw, decode))
    }

    /// Find the first data row whose `id_column` cell equals `id`, returning
    /// its 1-based sheet position and the raw row. Callers must hold the
    /// sheet's lock when they intend to write the position back.
    async fn locate(
        &self,
        sheet: &str,
        id_column: usize,
        id: &str,
    ) -> Result<Option<(usize, Vec<String>)>> {
        let raw = self.gateway.read(sheet, None).await?;
        for (index, row) in raw.iter().enumerate().skip(1) {
            if rows::cell(row, id_column).trim() == id {
                return Ok(Some((index + 1, row.clone())));
            }
        }
        Ok(None)
    }

    /// Overwrite one data row in place at its sheet position.
    async fn write_row(&self, sheet: &str, position: usize, row: Vec<String>) -> Result<()> {
        let range = schema::data_row_range(position, row.len());
        self.gateway.write(sheet, &range, vec![row]).await
    }
}

fn decode_data_rows<T, F>(sheet: &str, raw: &[Vec<String>], decode: F) -> Vec<T>
where
    F: Fn(&[String]) -> std::result::Result<T, RowError>,
{
    let mut decoded = Vec::with_capacity(raw.len().saturating_sub(1));
    for (index, row) in raw.iter().enumerate().skip(1) {
        if rows::is_blank(row) {
            continue;
        }
        match decode(row) {
            Ok(record) => decoded.push(record),
            Err(err) => warn!(
                target: "opsmesh::directory",
                sheet,
                position = index + 1,
                %err,
                "skipping undecodable row"
            ),
        }
    }
    decoded
}

fn corrupt(sheet: &str, err: RowError) -> StoreError {
    StoreError::Corrupt {
        sheet: sheet.to_owned(),
        detail: err.to_string(),
    }
}

#[async_trait]
impl DirectoryStore for SheetDirectory {
    async fn list_users(&self) -> Result<Vec<User>> {
        self.scan(sheets::USERS, User::from_row).await
    }

    async fn get_user(&self, user_id: &str) -> Result<Option<User>> {
        let users = self.list_users().await?;
        Ok(users.into_iter().find(|u| u.id == user_id))
    }

    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let users = self.list_users().await?;
        Ok(users
            .into_iter()
            .find(|u| u.email.eq_ignore_ascii_case(email)))
    }

    async fn create_user(&self, user: NewUser) -> Result<User> {
        let _guard = self.users_lock.lock().await;
        let now = utc_now();
        let record = User {
            id: user.id,
            email: user.email,
            display_name: user.display_name,
            auth_provider: user.auth_provider,
            is_active: true,
            created_at: now,
            updated_at: now,
            last_login_at: None,
            metadata: user.metadata,
        };
        self.gateway
            .append(sheets::USERS, vec![record.to_row()])
            .await?;
        Ok(record)
    }

    async fn update_user(&self, mut user: User) -> Result<User> {
        let _guard = self.users_lock.lock().await;
        let (position, _) = self
            .locate(sheets::USERS, 0, &user.id)
            .await?
            .ok_or_else(|| StoreError::NotFound {
                entity: "user",
                id: user.id.clone(),
            })?;
        user.updated_at = utc_now();
        self.write_row(sheets::USERS, position, user.to_row())
            .await?;
        Ok(user)
    }

    async fn record_sign_in(&self, sign_in: SignIn) -> Result<User> {
        let _guard = self.users_lock.lock().await;
        let now = utc_now();
        match self.locate(sheets::USERS, 0, &sign_in.user_id).await? {
            Some((position, raw)) => {
                let mut user = User::from_row(&raw).map_err(|e| corrupt(sheets::USERS, e))?;
                user.email = sign_in.email;
                user.display_name = sign_in.display_name;
                user.auth_provider = sign_in.auth_provider;
                user.last_login_at = Some(now);
                user.updated_at = now;
                self.write_row(sheets::USERS, position, user.to_row())
                    .await?;
                Ok(user)
            }
            None => {
                let user = User {
                    id: sign_in.user_id,
                    email: sign_in.email,
                    display_name: sign_in.display_name,
                    auth_provider: sign_in.auth_provider,
                    is_active: true,
                    created_at: now,
                    updated_at: now,
                    last_login_at: Some(now),
                    metadata: serde_json::Value::Object(serde_json::Map::new()),
                };
                self.gateway
                    .append(sheets::USERS, vec![user.to_row()])
                    .await?;
                Ok(user)
            }
        }
    }

    async fn list_roles(&self) -> Result<Vec<Role>> {
        self.scan(sheets::ROLES, Role::from_row).await
    }

    async fn get_role(&self, role_id: &str) -> Result<Option<Role>> {
        let roles = self.list_roles().await?;
        Ok(roles.into_iter().find(|r| r.id == role_id))
    }

    async fn get_role_by_code(&self, code: &str) -> Result<Option<Role>> {
        let roles = self.list_roles().await?;
        Ok(roles.into_iter().find(|r| r.code == code))
    }

    async fn list_assignments_for_user(&self, user_id: &str) -> Result<Vec<RoleAssignment>> {
        let assignments = self
            .scan(sheets::ROLE_ASSIGNMENTS, RoleAssignment::from_row)
            .await?;
        Ok(assignments
            .into_iter()
            .filter(|a| a.user_id == user_id)
            .collect())
    }

    async fn get_assignment(&self, assignment_id: &str) -> Result<Option<RoleAssignment>> {
        let assignments = self
            .scan(sheets::ROLE_ASSIGNMENTS, RoleAssignment::from_row)
            .await?;
        Ok(assignments.into_iter().find(|a| a.id == assignment_id))
    }

    async fn create_assignment(&self, assignment: NewAssignment) -> Result<RoleAssignment> {
        let _guard = self.assignments_lock.lock().await;
        let record = RoleAssignment {
            id: Uuid::new_v4().to_string(),
            user_id: assignment.user_id,
            role_id: assignment.role_id,
            site_code: assignment.site_code,
            assigned_by: assignment.assigned_by,
            assigned_at: utc_now(),
            expires_at: assignment.expires_at,
            is_active: true,
        };
        self.gateway
            .append(sheets::ROLE_ASSIGNMENTS, vec![record.to_row()])
            .await?;
        Ok(record)
    }

    async fn revoke_assignment(&self, assignment_id: &str) -> Result<RoleAssignment> {
        let _guard = self.assignments_lock.lock().await;
        let (position, raw) = self
            .locate(sheets::ROLE_ASSIGNMENTS, 0, assignment_id)
            .await?
            .ok_or_else(|| StoreError::NotFound {
                entity: "assignment",
                id: assignment_id.to_owned(),
            })?;
        let mut assignment =
            RoleAssignment::from_row(&raw).map_err(|e| corrupt(sheets::ROLE_ASSIGNMENTS, e))?;
        assignment.is_active = false;
        self.write_row(sheets::ROLE_ASSIGNMENTS, position, assignment.to_row())
            .await?;
        Ok(assignment)
    }

    async fn list_modules(&self) -> Result<Vec<Module>> {
        self.scan(sheets::MODULES, Module::from_row).await
    }

    async fn list_active_modules(&self) -> Result<Vec<Module>> {
        let mut modules: Vec<Module> = self
            .list_modules()
            .await?
            .into_iter()
            .filter(|m| m.is_active)
            .collect();
        modules.sort_by_key(|m| m.sort_order);
        Ok(modules)
    }

    async fn list_permissions_for_role(&self, role_id: &str) -> Result<Vec<Permission>> {
        let permissions = self.list_all_permissions().await?;
        Ok(permissions
            .into_iter()
            .filter(|p| p.role_id == role_id)
            .collect())
    }

    async fn list_all_permissions(&self) -> Result<Vec<Permission>> {
        let permissions = self.scan(sheets::PERMISSIONS, Permission::from_row).await?;
        Ok(permissions.into_iter().filter(|p| p.is_active).collect())
    }

    async fn roles_with_permissions(&self) -> Result<(Vec<Role>, Vec<Permission>)> {
        let specs = [
            RangeSpec::sheet(sheets::ROLES),
            RangeSpec::sheet(sheets::PERMISSIONS),
        ];
        let mut batches = self.gateway.batch_read(&specs).await?;
        let roles = batches
            .shift_remove(&specs[0])
            .map(|raw| decode_data_rows(sheets::ROLES, &raw, Role::from_row))
            .unwrap_or_default();
        let permissions = batches
            .shift_remove(&specs[1])
            .map(|raw| decode_data_rows(sheets::PERMISSIONS, &raw, Permission::from_row))
            .unwrap_or_default()
            .into_iter()
            .filter(|p: &Permission| p.is_active)
            .collect();
        Ok((roles, permissions))
    }

    async fn list_site_config(&self, site_code: &str) -> Result<Vec<SiteConfig>> {
        let settings = self.scan(sheets::SITE_CONFIG, SiteConfig::from_row).await?;
        Ok(settings
            .into_iter()
            .filter(|s| s.is_active && s.site_code == site_code)
            .collect())
    }

    async fn get_site_value(&self, site_code: &str, key: &str) -> Result<Option<String>> {
        let settings = self.list_site_config(site_code).await?;
        Ok(settings.into_iter().find(|s| s.key == key).map(|s| s.value))
    }

    async fn append_transaction(&self, entry: TransactionLogEntry) -> Result<()> {
        self.gateway
            .append(sheets::TRANSACTION_LOG, vec![entry.to_row()])
            .await
    }

    async fn complete_transaction(
        &self,
        tx_id: &str,
        status: TxStatus,
        entity_id: Option<String>,
        error_message: Option<String>,
        completed_at: DateTime<Utc>,
        duration_ms: i64,
    ) -> Result<TransactionLogEntry> {
        let _guard = self.transactions_lock.lock().await;
        let (position, raw) = self
            .locate(sheets::TRANSACTION_LOG, 0, tx_id)
            .await?
            .ok_or_else(|| StoreError::NotFound {
                entity: "transaction",
                id: tx_id.to_owned(),
            })?;
        let mut entry =
            TransactionLogEntry::from_row(&raw).map_err(|e| corrupt(sheets::TRANSACTION_LOG, e))?;
        entry.status = status;
        if entity_id.is_some() {
            entry.entity_id = entity_id;
        }
        entry.error_message = error_message;
        entry.completed_at = Some(completed_at);
        entry.duration_ms = Some(duration_ms);
        self.write_row(sheets::TRANSACTION_LOG, position, entry.to_row())
            .await?;
        Ok(entry)
    }

    async fn append_system_log(&self, entry: SystemLogEntry) -> Result<()> {
        self.gateway
            .append(sheets::SYSTEM_LOG, vec![entry.to_row()])
            .await
    }
}
