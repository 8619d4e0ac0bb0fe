//! ---
//! mesh_section: "01-core-functionality"
//! mesh_subsection: "module"
//! mesh_type: "source"
//! mesh_scope: "code"
//! mesh_description: "Shared primitives and utilities for the OpsMesh services."
//! mesh_version: "v0.1.0"
//! mesh_owner: "tbd"
//! ---
use std::sync::Arc;

use prometheus::Registry;

/// Shared registry type used across services.
pub type SharedRegistry = Arc<Registry>;

/// Produce a new shared registry.
///
/// The host process owns exposition (an HTTP `/metrics` endpoint or push
/// gateway); the access-control crates only register families against the
/// handle they are given.
pub fn new_registry() -> SharedRegistry {
    Arc::new(Registry::new())
}
