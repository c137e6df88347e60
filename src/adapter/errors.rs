//! # Adapter Errors
//!
//! Every adapter method reports failures through `AdapterError`. Native
//! driver failures are wrapped, never leaked.

use thiserror::Error;

/// Result type for adapter operations
pub type AdapterResult<T> = Result<T, AdapterError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AdapterError {
    /// A method was called before `connect()` succeeded
    #[error("Adapter not connected")]
    NotConnected,

    /// `connect()` exhausted its retry budget
    #[error("Connection failed after {attempts} attempts: {reason}")]
    ConnectFailed { attempts: u32, reason: String },

    /// Id (plus optional where-clause) matched nothing
    #[error("Object {id} not found in {class_name}")]
    NotFound { class_name: String, id: String },

    /// Unique index violation
    #[error("Duplicate value for unique field {class_name}.{field}")]
    Conflict { class_name: String, field: String },

    /// Storage engine failure
    #[error("Storage engine error: {0}")]
    Engine(String),
}

impl AdapterError {
    pub fn not_found(class_name: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            class_name: class_name.into(),
            id: id.into(),
        }
    }

    pub fn conflict(class_name: impl Into<String>, field: impl Into<String>) -> Self {
        Self::Conflict {
            class_name: class_name.into(),
            field: field.into(),
        }
    }

    /// Connection-class failures (not connected or retries exhausted)
    pub fn is_connection(&self) -> bool {
        matches!(self, Self::NotConnected | Self::ConnectFailed { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_connected_message_is_stable() {
        assert_eq!(AdapterError::NotConnected.to_string(), "Adapter not connected");
        assert!(AdapterError::NotConnected.is_connection());
    }

    #[test]
    fn test_not_found_message() {
        let err = AdapterError::not_found("Post", "42");
        assert_eq!(err.to_string(), "Object 42 not found in Post");
        assert!(!err.is_connection());
    }
}
