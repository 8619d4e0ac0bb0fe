//! ---
//! mesh_section: "02-storage-resilience"
//! mesh_subsection: "module"
//! mesh_type: "source"
//! mesh_scope: "code"
//! mesh_description: "Resilient gateway over the remote tabular store."
//! mesh_version: "v0.1.0"
//! mesh_owner: "tbd"
//! ---
#![warn(missing_docs)]
//! Everything that talks to the remote tabular store lives behind this crate:
//! the [`TabularStore`] protocol trait, the three-state circuit breaker, the
//! bounded retry policy, and the [`StorageGateway`] that composes them. Layers
//! above (the directory adapter, the resolver) never see a raw
//! [`protocol::RemoteError`]; they see [`StoreError`].

use std::time::Duration;

use crate::protocol::RemoteErrorKind;

/// Result alias used throughout the storage crate and its consumers.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Error type surfaced by the storage gateway and the adapters built on it.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A transient remote failure that survived the retry budget.
    #[error("transient store failure ({kind}): {message}")]
    Transient {
        /// Classification of the final failed attempt.
        kind: RemoteErrorKind,
        /// Description from the remote protocol client.
        message: String,
    },
    /// The circuit breaker is OPEN; the call never reached the network.
    #[error("storage temporarily unavailable (circuit open, retry in {retry_after:?})")]
    CircuitOpen {
        /// Time remaining until the breaker admits a probe.
        retry_after: Duration,
    },
    /// The remote store rejected the call for a non-transient reason.
    #[error("remote store rejected call ({kind}): {message}")]
    Remote {
        /// Classification of the rejection.
        kind: RemoteErrorKind,
        /// Description from the remote protocol client.
        message: String,
    },
    /// A referenced entity does not exist. Raised by adapters, never retried.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Entity family (e.g. `role`, `assignment`).
        entity: &'static str,
        /// Identifier that failed to resolve.
        id: String,
    },
    /// A row could not be decoded where the operation demands it.
    #[error("corrupt row in sheet {sheet}: {detail}")]
    Corrupt {
        /// Sheet the row was read from.
        sheet: String,
        /// What failed to decode.
        detail: String,
    },
    /// Catch-all for wiring errors (metrics registration and the like).
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl StoreError {
    /// Whether the failure is an availability problem rather than a
    /// semantic rejection; callers may retry later without changing the call.
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            StoreError::Transient { .. } | StoreError::CircuitOpen { .. }
        )
    }
}

pub mod breaker;
pub mod gateway;
pub mod memory;
pub mod metrics;
pub mod protocol;
pub mod retry;

pub use breaker::{BreakerState, CircuitBreaker};
pub use gateway::StorageGateway;
pub use memory::MemorySheetStore;
pub use metrics::GatewayMetrics;
pub use protocol::{RangeSpec, RemoteError, RemoteErrorKind as ErrorKind, Row, TabularStore};
pub use retry::RetryPolicy;
