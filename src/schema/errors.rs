//! # Schema Errors
//!
//! Raised when a query or mutation references something the schema does not
//! declare, or when written values do not match their field descriptor.

use thiserror::Error;

/// Result type for schema operations
pub type SchemaResult<T> = Result<T, SchemaError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    /// Class name not declared
    #[error("Unknown class: {0}")]
    UnknownClass(String),

    /// Field not declared on the class
    #[error("Unknown field '{field}' on class {class_name}")]
    UnknownField { class_name: String, field: String },

    /// Value does not match the field descriptor
    #[error("Field '{field}' on class {class_name} expects {expected}, got {actual}")]
    TypeMismatch {
        class_name: String,
        field: String,
        expected: &'static str,
        actual: &'static str,
    },

    /// Required field absent on create
    #[error("Missing required field '{field}' on class {class_name}")]
    MissingRequiredField { class_name: String, field: String },

    /// Class definition rejected at boot
    #[error("Invalid class {class_name}: {reason}")]
    InvalidClass { class_name: String, reason: String },
}

impl SchemaError {
    pub fn unknown_field(class_name: impl Into<String>, field: impl Into<String>) -> Self {
        Self::UnknownField {
            class_name: class_name.into(),
            field: field.into(),
        }
    }

    pub fn type_mismatch(
        class_name: impl Into<String>,
        field: impl Into<String>,
        expected: &'static str,
        actual: &'static str,
    ) -> Self {
        Self::TypeMismatch {
            class_name: class_name.into(),
            field: field.into(),
            expected,
            actual,
        }
    }

    pub fn invalid_class(class_name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidClass {
            class_name: class_name.into(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = SchemaError::unknown_field("Post", "body");
        assert_eq!(err.to_string(), "Unknown field 'body' on class Post");

        let err = SchemaError::type_mismatch("Post", "views", "int", "string");
        assert!(err.to_string().contains("expects int, got string"));
    }
}
