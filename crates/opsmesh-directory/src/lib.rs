//! ---
//! mesh_section: "03-directory-data-access"
//! mesh_subsection: "module"
//! mesh_type: "source"
//! mesh_scope: "code"
//! mesh_description: "Tabular store adapter and domain records."
//! mesh_version: "v0.1.0"
//! mesh_owner: "tbd"
//! ---
#![warn(missing_docs)]
//! Domain records for the OpsMesh platform directory and the adapter that
//! maps them onto the remote tabular store. The backing store has no foreign
//! keys, no secondary indexes, and no transactions; the adapter and the
//! resolver above it are the sole guardians of referential consistency.

pub mod adapter;
pub mod contract;
pub mod records;
pub mod rows;
pub mod schema;

pub use adapter::SheetDirectory;
pub use contract::DirectoryStore;
pub use records::{
    LogLevel, Module, NewAssignment, NewUser, Permission, Role, RoleAssignment, SignIn,
    SiteConfig, SystemLogEntry, TransactionLogEntry, TxStatus, User, ROLE_ADMIN,
    ROLE_SUPER_ADMIN, ROLE_VIEWER, WILDCARD,
};
pub use rows::RowError;
