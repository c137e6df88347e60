//! Class schemas
//!
//! Class schemas are assembled once at boot and immutable thereafter. They
//! drive value validation on writes, field checks on queries and the
//! protected-field and permission hooks.
//!
//! # Design Principles
//!
//! - Field descriptors are a closed sum type, matched exhaustively
//! - Built-in classes are always present
//! - No coercion: written values match their descriptor exactly

mod errors;
mod registry;
mod types;
mod validator;

pub use errors::{SchemaError, SchemaResult};
pub use registry::{
    SchemaRegistry, ACL_FIELD, CREATED_AT_FIELD, INTERNAL_CONFIG_CLASS, ROLE_CLASS,
    SESSION_CLASS, UPDATED_AT_FIELD, USER_CLASS,
};
pub use types::{
    ArrayElement, ClassPermissions, ClassSchema, FieldDef, FieldType, Fields, IndexDef,
    IndexOrder, PermissionOperation, PermissionRule, PrimitiveType, ProtectedField,
    ProtectedOperation, ROOT_ONLY,
};
pub use validator::{SchemaValidator, WriteMode};
