//! Error taxonomy for the reconciliation core
//!
//! Remote failures arrive as structured [`RemoteError`] values and are sorted
//! into an [`ErrorClass`] by [`classify`]. The retry engine only ever looks at
//! that class. Everything the caller sees is a [`ReconcileError`], whose
//! [`ReconcileError::kind`] separates the kind of failure from its message.

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

/// Failure reported by the remote administrative API or the transport under it.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum RemoteError {
    /// The API answered with a non-success status.
    #[error("API request failed: {status} {}: {message}", .reason.as_deref().unwrap_or("UNKNOWN"))]
    Api {
        status: u16,
        /// Canonical status string from the error body (e.g. `NOT_FOUND`)
        reason: Option<String>,
        message: String,
    },

    /// The request never produced a response.
    #[error("transport failure: {message}")]
    Transport { message: String, timeout: bool },

    /// The response could not be understood.
    #[error("failed to decode response: {0}")]
    Decode(String),

    /// No usable access token could be obtained.
    #[error("authentication failed: {0}")]
    Auth(String),
}

impl RemoteError {
    pub fn api(status: u16, reason: Option<&str>, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            reason: reason.map(str::to_string),
            message: message.into(),
        }
    }
}

/// How a remote failure should be treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorClass {
    /// The identified resource does not exist
    NotFound,
    /// Expected to succeed if retried unchanged
    Transient,
    /// Will not succeed without a different request
    Permanent,
}

/// Canonical status strings that indicate a retryable condition.
const TRANSIENT_REASONS: &[&str] = &[
    "UNAVAILABLE",
    "DEADLINE_EXCEEDED",
    "RESOURCE_EXHAUSTED",
    "ABORTED",
    "INTERNAL",
    "rateLimitExceeded",
    "userRateLimitExceeded",
    "backendError",
];

/// Classify a remote failure from its structured fields.
///
/// A canonical `reason` decides on its own; the HTTP status is only
/// consulted when the body carried none. Message text is never inspected.
pub fn classify(error: &RemoteError) -> ErrorClass {
    match error {
        RemoteError::Api { status, reason, .. } => {
            if let Some(reason) = reason.as_deref() {
                return if reason == "NOT_FOUND" || reason == "notFound" {
                    ErrorClass::NotFound
                } else if TRANSIENT_REASONS.contains(&reason) {
                    ErrorClass::Transient
                } else {
                    ErrorClass::Permanent
                };
            }
            match status {
                404 => ErrorClass::NotFound,
                408 | 429 => ErrorClass::Transient,
                501 => ErrorClass::Permanent,
                500..=599 => ErrorClass::Transient,
                _ => ErrorClass::Permanent,
            }
        }
        RemoteError::Transport { .. } => ErrorClass::Transient,
        RemoteError::Decode(_) | RemoteError::Auth(_) => ErrorClass::Permanent,
    }
}

/// Kind of failure surfaced to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorKind {
    /// Retries were exhausted on a transient failure
    Transient,
    NotFound,
    /// Attempted change to a field that is fixed after creation
    ConfigurationConflict,
    Permanent,
    /// The operation was abandoned before it finished
    Cancelled,
}

/// Errors returned by the lifecycle controller.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ReconcileError {
    #[error("{operation} failed after {attempts} attempt(s): {source}")]
    Remote {
        operation: &'static str,
        class: ErrorClass,
        attempts: u32,
        #[source]
        source: RemoteError,
    },

    #[error("field {field:?} cannot be changed after creation (current {current}, desired {desired})")]
    ConfigurationConflict {
        field: String,
        current: Value,
        desired: Value,
    },

    #[error("required field {0:?} is missing")]
    MissingField(String),

    #[error("field {field:?} has an invalid value: {reason}")]
    InvalidField { field: String, reason: String },

    #[error("unknown field {0:?}")]
    UnknownField(String),

    #[error("import target {0} does not exist")]
    ImportTargetMissing(String),

    #[error("no remote resource is being tracked")]
    NotBound,

    #[error("already tracking remote resource {0}")]
    AlreadyBound(String),

    #[error("{operation} was cancelled after {elapsed_ms}ms")]
    Cancelled {
        operation: &'static str,
        elapsed_ms: u128,
    },
}

impl ReconcileError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Remote { class, .. } => match class {
                ErrorClass::NotFound => ErrorKind::NotFound,
                ErrorClass::Transient => ErrorKind::Transient,
                ErrorClass::Permanent => ErrorKind::Permanent,
            },
            Self::ConfigurationConflict { .. } => ErrorKind::ConfigurationConflict,
            Self::Cancelled { .. } => ErrorKind::Cancelled,
            Self::MissingField(_)
            | Self::InvalidField { .. }
            | Self::UnknownField(_)
            | Self::ImportTargetMissing(_)
            | Self::NotBound
            | Self::AlreadyBound(_) => ErrorKind::Permanent,
        }
    }
}

/// Non-fatal condition surfaced alongside a successful operation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Warning {
    /// A change was requested on a field the remote API cannot mutate
    UnsupportedChange {
        field: String,
        current: Value,
        desired: Value,
    },
    /// Tracking was dropped but the remote resource still exists
    RemoteResourceRetained { identity: String },
    /// The remote value of an immutable field no longer matches its creation-time value
    ImmutableDrift {
        field: String,
        pinned: Value,
        observed: Value,
    },
    /// A read returned a different identity than the one being tracked
    IdentityChanged { tracked: String, observed: String },
}

impl std::fmt::Display for Warning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnsupportedChange { field, current, desired } => write!(
                f,
                "changing {field:?} from {current} to {desired} is not supported by the remote API; the change is ignored"
            ),
            Self::RemoteResourceRetained { identity } => write!(
                f,
                "{identity} was removed from tracking but is neither deleted nor closed remotely"
            ),
            Self::ImmutableDrift { field, pinned, observed } => write!(
                f,
                "{field:?} was {pinned} at creation but the remote now reports {observed}"
            ),
            Self::IdentityChanged { tracked, observed } => write!(
                f,
                "tracked resource {tracked} was reported as {observed}; it may have been replaced remotely"
            ),
        }
    }
}
