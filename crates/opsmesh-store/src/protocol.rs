//! ---
//! mesh_section: "02-storage-resilience"
//! mesh_subsection: "module"
//! mesh_type: "source"
//! mesh_scope: "code"
//! mesh_description: "Resilient gateway over the remote tabular store."
//! mesh_version: "v0.1.0"
//! mesh_owner: "tbd"
//! ---
use std::fmt;

use async_trait::async_trait;
use indexmap::IndexMap;

/// One row of untyped cell values as stored remotely.
pub type Row = Vec<String>;

/// A sheet plus an optional A1-style range within it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RangeSpec {
    /// Sheet (tab) name.
    pub sheet: String,
    /// A1-style range within the sheet; `None` addresses the whole sheet.
    pub range: Option<String>,
}

impl RangeSpec {
    /// Address an entire sheet.
    pub fn sheet(name: impl Into<String>) -> Self {
        Self {
            sheet: name.into(),
            range: None,
        }
    }

    /// Address a bounded range within a sheet.
    pub fn bounded(sheet: impl Into<String>, range: impl Into<String>) -> Self {
        Self {
            sheet: sheet.into(),
            range: Some(range.into()),
        }
    }

    /// Render the spec in `Sheet!A1:B2` notation.
    pub fn a1(&self) -> String {
        match &self.range {
            Some(range) => format!("{}!{}", self.sheet, range),
            None => self.sheet.clone(),
        }
    }
}

impl fmt::Display for RangeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.a1())
    }
}

/// Failure classification reported by protocol implementations.
///
/// The gateway's retry policy keys off [`RemoteErrorKind::is_transient`];
/// everything else propagates on the first attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteErrorKind {
    /// The call did not complete within the deadline.
    Timeout,
    /// The connection dropped mid-call.
    ConnectionReset,
    /// The remote answered with a 5xx status.
    ServerError(u16),
    /// The remote answered 429 or an equivalent quota rejection.
    RateLimited,
    /// The request itself was malformed (bad range, bad dimensions).
    BadRequest,
    /// The addressed sheet or range does not exist.
    NotFound,
    /// Credentials were rejected.
    Auth,
}

impl RemoteErrorKind {
    /// Whether a failure of this kind is worth retrying.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            RemoteErrorKind::Timeout
                | RemoteErrorKind::ConnectionReset
                | RemoteErrorKind::ServerError(_)
                | RemoteErrorKind::RateLimited
        )
    }

    /// Static label for logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            RemoteErrorKind::Timeout => "timeout",
            RemoteErrorKind::ConnectionReset => "connection-reset",
            RemoteErrorKind::ServerError(_) => "server-error",
            RemoteErrorKind::RateLimited => "rate-limited",
            RemoteErrorKind::BadRequest => "bad-request",
            RemoteErrorKind::NotFound => "not-found",
            RemoteErrorKind::Auth => "auth",
        }
    }
}

impl fmt::Display for RemoteErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RemoteErrorKind::ServerError(status) => write!(f, "server-error/{status}"),
            other => f.write_str(other.as_str()),
        }
    }
}

/// Error produced by a [`TabularStore`] implementation.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct RemoteError {
    /// Failure classification.
    pub kind: RemoteErrorKind,
    /// Human-readable description.
    pub message: String,
}

impl RemoteError {
    /// Construct an error of the given kind.
    pub fn new(kind: RemoteErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Deadline exceeded.
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(RemoteErrorKind::Timeout, message)
    }

    /// Quota/rate-limit rejection.
    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::new(RemoteErrorKind::RateLimited, message)
    }

    /// Remote-side 5xx.
    pub fn server_error(status: u16, message: impl Into<String>) -> Self {
        Self::new(RemoteErrorKind::ServerError(status), message)
    }

    /// Missing sheet or range.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(RemoteErrorKind::NotFound, message)
    }

    /// Malformed request.
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(RemoteErrorKind::BadRequest, message)
    }

    /// Whether the gateway may retry this failure.
    pub fn is_transient(&self) -> bool {
        self.kind.is_transient()
    }
}

/// Remote Store Protocol: the five operations the backing store offers.
///
/// Row 1 of every sheet is a header row and is never treated as data; that
/// convention is enforced by callers (the directory adapter), not here.
/// Implementations perform exactly one remote round trip per method and do
/// no retrying of their own; resilience belongs to the gateway.
#[async_trait]
pub trait TabularStore: Send + Sync {
    /// Read a range (or the whole sheet) as a 2D array of cell values.
    async fn read(&self, sheet: &str, range: Option<&str>) -> Result<Vec<Row>, RemoteError>;

    /// Overwrite the given range in place.
    async fn write(&self, sheet: &str, range: &str, rows: Vec<Row>) -> Result<(), RemoteError>;

    /// Append rows after the last populated row of the sheet.
    async fn append(&self, sheet: &str, rows: Vec<Row>) -> Result<(), RemoteError>;

    /// Read several ranges in one remote round trip.
    async fn batch_read(
        &self,
        specs: &[RangeSpec],
    ) -> Result<IndexMap<RangeSpec, Vec<Row>>, RemoteError>;

    /// Clear a range (or the whole sheet) without removing the sheet itself.
    async fn clear(&self, sheet: &str, range: Option<&str>) -> Result<(), RemoteError>;
}
