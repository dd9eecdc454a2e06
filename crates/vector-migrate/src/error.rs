//! Error types for `vector-migrate`.
//!
//! Every failure the engine can produce is a variant of [`Error`]. Variants
//! carry a stable code (`MIG-XXX`) and are grouped into an [`ErrorKind`] so
//! callers can tell retryable conditions from fatal ones without inspecting
//! messages.

use thiserror::Error;

/// Result type alias for migration operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Coarse classification of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Source collection is absent. Fatal, never retried.
    SourceNotFound,
    /// Network hiccup, timeout, 5xx or rate limiting. Retried locally.
    TransientNetwork,
    /// Destination exists with an incompatible dimension or metric.
    SchemaMismatch,
    /// A batch was only partially acknowledged by the destination.
    PartialBatchWrite,
    /// Another run holds the destination lock.
    LockHeld,
    /// The run was cancelled between batches.
    Cancelled,
    /// Invalid configuration or credentials.
    Config,
    /// Anything else (IO, parse, protocol errors).
    Other,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::SourceNotFound => "SourceNotFound",
            Self::TransientNetwork => "TransientNetworkError",
            Self::SchemaMismatch => "SchemaMismatch",
            Self::PartialBatchWrite => "PartialBatchWrite",
            Self::LockHeld => "LockHeld",
            Self::Cancelled => "Cancelled",
            Self::Config => "Config",
            Self::Other => "Other",
        };
        f.write_str(name)
    }
}

/// Errors that can occur while migrating a collection.
#[derive(Error, Debug)]
pub enum Error {
    /// Source collection does not exist (MIG-001).
    #[error("[MIG-001] Source collection '{0}' not found")]
    SourceNotFound(String),

    /// Transient network failure (MIG-002).
    #[error("[MIG-002] Transient network error: {0}")]
    TransientNetwork(String),

    /// Rate limited by the remote store, with a suggested wait in seconds (MIG-003).
    #[error("[MIG-003] Rate limited, retry after {0}s")]
    RateLimit(u64),

    /// Retry budget exhausted for a retryable operation (MIG-004).
    #[error("[MIG-004] {operation} failed after {attempts} attempts: {last}")]
    RetriesExhausted {
        /// Name of the operation that was retried.
        operation: String,
        /// Total attempts made, including the first.
        attempts: u32,
        /// Last error observed.
        last: Box<Error>,
    },

    /// Destination schema incompatible with the source (MIG-005).
    #[error("[MIG-005] Schema mismatch: {0}")]
    SchemaMismatch(String),

    /// Destination acknowledged only part of a batch (MIG-006).
    #[error("[MIG-006] Partial batch write: {written} of {expected} records acknowledged")]
    PartialBatchWrite {
        /// Records the destination confirmed.
        written: usize,
        /// Records in the batch.
        expected: usize,
    },

    /// Destination lock already held by another run (MIG-007).
    ///
    /// A run that was killed leaves its lock behind; `release` tells the
    /// operator how to clear it.
    #[error("[MIG-007] Destination '{destination}' is locked by another migration. If no other run is active, {release}")]
    LockHeld {
        /// Locked destination.
        destination: String,
        /// How to remove a stale lock.
        release: String,
    },

    /// Run cancelled (MIG-008).
    #[error("[MIG-008] Migration cancelled")]
    Cancelled,

    /// Configuration error (MIG-009).
    #[error("[MIG-009] Configuration error: {0}")]
    Config(String),

    /// Authentication rejected by the remote store (MIG-010).
    #[error("[MIG-010] Authentication failed: {0}")]
    Authentication(String),

    /// Non-retryable HTTP/protocol failure (MIG-011).
    #[error("[MIG-011] HTTP error: {0}")]
    Http(String),

    /// Malformed record or payload (MIG-012).
    #[error("[MIG-012] Invalid record: {0}")]
    InvalidRecord(String),

    /// IO error (MIG-013).
    #[error("[MIG-013] IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error (MIG-014).
    #[error("[MIG-014] JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML error (MIG-015).
    #[error("[MIG-015] YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// A writer task panicked or was aborted (MIG-016).
    #[error("[MIG-016] Writer task failed: {0}")]
    TaskJoin(String),
}

impl Error {
    /// Returns the error code (e.g., "MIG-001").
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::SourceNotFound(_) => "MIG-001",
            Self::TransientNetwork(_) => "MIG-002",
            Self::RateLimit(_) => "MIG-003",
            Self::RetriesExhausted { .. } => "MIG-004",
            Self::SchemaMismatch(_) => "MIG-005",
            Self::PartialBatchWrite { .. } => "MIG-006",
            Self::LockHeld { .. } => "MIG-007",
            Self::Cancelled => "MIG-008",
            Self::Config(_) => "MIG-009",
            Self::Authentication(_) => "MIG-010",
            Self::Http(_) => "MIG-011",
            Self::InvalidRecord(_) => "MIG-012",
            Self::Io(_) => "MIG-013",
            Self::Json(_) => "MIG-014",
            Self::Yaml(_) => "MIG-015",
            Self::TaskJoin(_) => "MIG-016",
        }
    }

    /// Returns the kind of this error.
    ///
    /// `RetriesExhausted` reports the kind of the last underlying failure.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::SourceNotFound(_) => ErrorKind::SourceNotFound,
            Self::TransientNetwork(_) | Self::RateLimit(_) => ErrorKind::TransientNetwork,
            Self::RetriesExhausted { last, .. } => last.kind(),
            Self::SchemaMismatch(_) => ErrorKind::SchemaMismatch,
            Self::PartialBatchWrite { .. } => ErrorKind::PartialBatchWrite,
            Self::LockHeld { .. } => ErrorKind::LockHeld,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::Config(_) | Self::Authentication(_) => ErrorKind::Config,
            Self::Http(_)
            | Self::InvalidRecord(_)
            | Self::Io(_)
            | Self::Json(_)
            | Self::Yaml(_)
            | Self::TaskJoin(_) => ErrorKind::Other,
        }
    }

    /// Returns true if the operation that produced this error may be retried.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::TransientNetwork(_) | Self::RateLimit(_) => true,
            Self::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::Interrupted
            ),
            _ => false,
        }
    }

    /// Maps a `reqwest` transport error into the taxonomy.
    pub(crate) fn from_transport(context: &str, err: &reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() || err.is_request() {
            Self::TransientNetwork(format!("{context}: {err}"))
        } else if err.is_decode() {
            Self::Http(format!("{context}: invalid response body: {err}"))
        } else {
            Self::Http(format!("{context}: {err}"))
        }
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
