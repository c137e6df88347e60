//! Controller Error Types
//!
//! Every failure surfaced by the controller: adapter, schema and query
//! errors pass through verbatim, hooks add permission and contract errors.

use thiserror::Error;

use crate::adapter::AdapterError;
use crate::query::QueryError;
use crate::schema::SchemaError;

/// Controller result type
pub type ControllerResult<T> = Result<T, ControllerError>;

/// Error category reported to the calling layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Connection,
    NotFound,
    Permission,
    Validation,
    Conflict,
    Internal,
}

#[derive(Debug, Error)]
pub enum ControllerError {
    #[error(transparent)]
    Adapter(#[from] AdapterError),

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Query(#[from] QueryError),

    /// Access rejected by a permission or protected-field check
    #[error("Permission denied: {0}")]
    Permission(String),

    /// A hook used the hook object outside its contract
    #[error("Hook contract violation: {0}")]
    HookContract(String),

    #[error("Validation error: {0}")]
    Validation(String),
}

impl ControllerError {
    pub fn permission(msg: impl Into<String>) -> Self {
        Self::Permission(msg.into())
    }

    pub fn hook_contract(msg: impl Into<String>) -> Self {
        Self::HookContract(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Adapter(AdapterError::NotConnected)
            | Self::Adapter(AdapterError::ConnectFailed { .. }) => ErrorKind::Connection,
            Self::Adapter(AdapterError::NotFound { .. }) => ErrorKind::NotFound,
            Self::Adapter(AdapterError::Conflict { .. }) => ErrorKind::Conflict,
            Self::Adapter(AdapterError::Engine(_)) => ErrorKind::Internal,
            Self::Schema(_) | Self::Query(_) | Self::Validation(_) => ErrorKind::Validation,
            Self::Permission(_) => ErrorKind::Permission,
            Self::HookContract(_) => ErrorKind::Internal,
        }
    }

    /// Get error code for API responses
    pub fn code(&self) -> &'static str {
        match self {
            Self::HookContract(_) => "HOOK_CONTRACT_VIOLATION",
            _ => match self.kind() {
                ErrorKind::Connection => "CONNECTION_ERROR",
                ErrorKind::NotFound => "NOT_FOUND",
                ErrorKind::Permission => "PERMISSION_DENIED",
                ErrorKind::Validation => "VALIDATION_ERROR",
                ErrorKind::Conflict => "CONFLICT",
                ErrorKind::Internal => "INTERNAL_ERROR",
            },
        }
    }
}
