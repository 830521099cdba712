//! Operation names, outcomes, and the error taxonomy of the domain directory.

use std::fmt;

use vmctl_core::DomainHandle;

/// Operations accepted by `POST` on the domain directory, keyed by the `op`
/// form field. Nothing outside this list is dispatchable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DomainOp {
    Create,
    Restore,
}

impl DomainOp {
    pub const ALL: [DomainOp; 2] = [DomainOp::Create, DomainOp::Restore];

    /// Maps an `op` field value to its operation.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|op| op.as_str() == name)
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Restore => "restore",
        }
    }
}

impl fmt::Display for DomainOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Successful result of a lifecycle operation.
///
/// `location` is always `<directory-url>/<encoded name>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationOutcome {
    Created {
        handle: DomainHandle,
        location: String,
        /// Configuration text exactly as submitted.
        config_text: String,
    },
    Restored {
        handle: DomainHandle,
        location: String,
    },
}

impl OperationOutcome {
    #[must_use]
    pub fn handle(&self) -> &DomainHandle {
        match self {
            Self::Created { handle, .. } | Self::Restored { handle, .. } => handle,
        }
    }

    #[must_use]
    pub fn location(&self) -> &str {
        match self {
            Self::Created { location, .. } | Self::Restored { location, .. } => location,
        }
    }
}

/// Coarse classification of [`OperationError`], stable for tests and metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    InvalidConfig,
    UnknownOperation,
    MissingField,
    MalformedRequest,
    CreationFailed,
    RestoreFailed,
    Overloaded,
    RestoreTimedOut,
    Cancelled,
    ShuttingDown,
}

impl ErrorKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::InvalidConfig => "invalid_config",
            Self::UnknownOperation => "unknown_operation",
            Self::MissingField => "missing_field",
            Self::MalformedRequest => "malformed_request",
            Self::CreationFailed => "creation_failed",
            Self::RestoreFailed => "restore_failed",
            Self::Overloaded => "overloaded",
            Self::RestoreTimedOut => "restore_timed_out",
            Self::Cancelled => "cancelled",
            Self::ShuttingDown => "shutting_down",
        }
    }
}

/// Errors returned to clients of the domain directory.
///
/// Messages are summaries safe to show a client; manager diagnostics go to
/// the log only.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OperationError {
    #[error("No such domain {name}")]
    NotFound { name: String },
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },
    #[error("Unknown operation: {name}")]
    UnknownOperation { name: String },
    #[error("Missing or invalid field '{field}': {reason}")]
    MissingField { field: String, reason: String },
    #[error("Malformed request: {message}")]
    MalformedRequest { message: String },
    #[error("Error creating domain: {message}")]
    CreationFailed { message: String },
    #[error("Error restoring domain: {message}")]
    RestoreFailed { message: String },
    #[error("Error restoring domain: restore queue is full, try again later")]
    Overloaded,
    /// The restore keeps running; the domain may still appear.
    #[error("Error restoring domain: still running after {timeout_ms}ms, the domain may appear later")]
    RestoreTimedOut { timeout_ms: u64 },
    #[error("Error restoring domain: cancelled before completion")]
    Cancelled,
    #[error("Server is shutting down, no new operations are accepted")]
    ShuttingDown,
}

impl OperationError {
    pub(crate) fn missing_field(field: &str, reason: impl Into<String>) -> Self {
        Self::MissingField {
            field: field.to_string(),
            reason: reason.into(),
        }
    }

    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::InvalidConfig { .. } => ErrorKind::InvalidConfig,
            Self::UnknownOperation { .. } => ErrorKind::UnknownOperation,
            Self::MissingField { .. } => ErrorKind::MissingField,
            Self::MalformedRequest { .. } => ErrorKind::MalformedRequest,
            Self::CreationFailed { .. } => ErrorKind::CreationFailed,
            Self::RestoreFailed { .. } => ErrorKind::RestoreFailed,
            Self::Overloaded => ErrorKind::Overloaded,
            Self::RestoreTimedOut { .. } => ErrorKind::RestoreTimedOut,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::ShuttingDown => ErrorKind::ShuttingDown,
        }
    }

    /// True when the request itself was at fault rather than the manager or
    /// the server.
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::NotFound
                | ErrorKind::InvalidConfig
                | ErrorKind::UnknownOperation
                | ErrorKind::MissingField
                | ErrorKind::MalformedRequest
        )
    }
}
