//! Hook Pipeline
//!
//! Class- and operation-scoped callbacks run around every controller
//! operation: exactly one Before tag, then the adapter call, then exactly one
//! After tag.
//!
//! - Before-hooks may rewrite the in-flight data through
//!   [`HookObject::upsert_new_data`].
//! - After-hooks see the persisted object and may issue further controller
//!   calls. Those cascades are not transactionally tied to the triggering
//!   write.
//! - Hooks run sequentially by ascending priority, then registration order.
//!   The first error aborts the remaining hooks and the operation.

mod builtin;
mod object;
mod registry;

use std::future::Future;
use std::pin::Pin;

use crate::core::ControllerResult;
use crate::schema::{PermissionOperation, ProtectedOperation};

pub use builtin::{
    ClassPermissionHook, DefaultAclHook, ProtectedFieldsHook, TimestampsHook,
    DEFAULT_ACL_PRIORITY, PERMISSION_PRIORITY, PROTECTED_FIELDS_PRIORITY, TIMESTAMPS_PRIORITY,
};
pub use object::HookObject;
pub use registry::{HookRegistry, HookRegistryBuilder};

/// Future returned by a hook
pub type HookFuture<'a> = Pin<Box<dyn Future<Output = ControllerResult<()>> + Send + 'a>>;

/// Operation tag a hook is registered for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationType {
    BeforeCreate,
    AfterCreate,
    BeforeRead,
    AfterRead,
    BeforeUpdate,
    AfterUpdate,
    BeforeDelete,
    AfterDelete,
}

impl OperationType {
    pub const ALL: [OperationType; 8] = [
        OperationType::BeforeCreate,
        OperationType::AfterCreate,
        OperationType::BeforeRead,
        OperationType::AfterRead,
        OperationType::BeforeUpdate,
        OperationType::AfterUpdate,
        OperationType::BeforeDelete,
        OperationType::AfterDelete,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OperationType::BeforeCreate => "beforeCreate",
            OperationType::AfterCreate => "afterCreate",
            OperationType::BeforeRead => "beforeRead",
            OperationType::AfterRead => "afterRead",
            OperationType::BeforeUpdate => "beforeUpdate",
            OperationType::AfterUpdate => "afterUpdate",
            OperationType::BeforeDelete => "beforeDelete",
            OperationType::AfterDelete => "afterDelete",
        }
    }

    pub fn is_before(&self) -> bool {
        matches!(
            self,
            OperationType::BeforeCreate
                | OperationType::BeforeRead
                | OperationType::BeforeUpdate
                | OperationType::BeforeDelete
        )
    }

    /// Class permission checked by this tag, for Before tags
    pub fn permission_operation(&self) -> Option<PermissionOperation> {
        match self {
            OperationType::BeforeCreate => Some(PermissionOperation::Create),
            OperationType::BeforeRead => Some(PermissionOperation::Read),
            OperationType::BeforeUpdate => Some(PermissionOperation::Update),
            OperationType::BeforeDelete => Some(PermissionOperation::Delete),
            _ => None,
        }
    }

    /// Field protection checked by this tag
    pub fn protected_operation(&self) -> Option<ProtectedOperation> {
        match self {
            OperationType::BeforeCreate => Some(ProtectedOperation::Create),
            OperationType::BeforeRead => Some(ProtectedOperation::Read),
            OperationType::BeforeUpdate => Some(ProtectedOperation::Update),
            _ => None,
        }
    }
}

impl std::fmt::Display for OperationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Callback run by the hook pipeline
pub trait Hook: Send + Sync {
    fn call<'a>(&'a self, object: &'a mut HookObject<'_>) -> HookFuture<'a>;
}
