//! ---
//! mesh_section: "01-core-functionality"
//! mesh_subsection: "module"
//! mesh_type: "source"
//! mesh_scope: "code"
//! mesh_description: "Shared primitives and utilities for the OpsMesh services."
//! mesh_version: "v0.1.0"
//! mesh_owner: "tbd"
//! ---
#![warn(missing_docs)]
//! Shared foundations for the OpsMesh access-control services: configuration
//! loading, tracing initialization, timestamp helpers, and the Prometheus
//! registry handle passed between subsystems.

pub mod config;
pub mod logging;
pub mod metrics;
pub mod time;

pub use config::{AppConfig, CacheConfig, ConfigError, GatewayConfig, StoreConfig};
pub use logging::{init_tracing, LogFormat};
pub use metrics::{new_registry, SharedRegistry};
pub use time::{format_timestamp, parse_timestamp, utc_now};
