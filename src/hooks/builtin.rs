//! Built-in hooks
//!
//! Registered on every class by
//! [`HookRegistryBuilder::with_defaults`](super::HookRegistryBuilder::with_defaults).
//! Root contexts pass every check.

use chrono::{SecondsFormat, Utc};
use serde_json::{json, Value};

use super::{Hook, HookFuture, HookObject, OperationType};
use crate::core::{ControllerError, ControllerResult};
use crate::schema::{ProtectedOperation, ACL_FIELD, CREATED_AT_FIELD, UPDATED_AT_FIELD};

pub const PERMISSION_PRIORITY: i32 = -40;
pub const PROTECTED_FIELDS_PRIORITY: i32 = -30;
pub const DEFAULT_ACL_PRIORITY: i32 = -20;
pub const TIMESTAMPS_PRIORITY: i32 = -10;

/// Rejects callers failing the class-level permission rule of the
/// operation: `requireAuthentication` needs a user, a non-empty
/// `authorizedRoles` needs one of the listed roles.
pub struct ClassPermissionHook;

impl Hook for ClassPermissionHook {
    fn call<'a>(&'a self, object: &'a mut HookObject<'_>) -> HookFuture<'a> {
        Box::pin(async move { check_class_permission(object) })
    }
}

fn check_class_permission(object: &HookObject<'_>) -> ControllerResult<()> {
    let context = object.context();
    if context.is_root {
        return Ok(());
    }

    let operation = match object.operation_type().permission_operation() {
        Some(operation) => operation,
        None => return Ok(()),
    };

    let class = object.controller().schema().class(object.class_name())?;
    let rule = match class.permissions.rule(operation) {
        Some(rule) => rule,
        None => return Ok(()),
    };

    if rule.require_authentication && context.user.is_none() {
        return Err(ControllerError::permission(format!(
            "{:?} on {} requires authentication",
            operation, class.name
        )));
    }

    if !rule.authorized_roles.is_empty() {
        let authorized = context
            .role_name()
            .map_or(false, |role| rule.authorized_roles.iter().any(|r| r == role));
        if !authorized {
            return Err(ControllerError::permission(format!(
                "{:?} on {} is restricted to roles {:?}",
                operation, class.name, rule.authorized_roles
            )));
        }
    }

    Ok(())
}

/// Rejects access to protected fields.
///
/// Reads check the requested projection (`Select::All` touches every
/// field), writes check the keys of the incoming data. A root-only field is
/// reachable by root contexts only; other protected fields need the
/// caller's role in the authorized list.
pub struct ProtectedFieldsHook;

impl Hook for ProtectedFieldsHook {
    fn call<'a>(&'a self, object: &'a mut HookObject<'_>) -> HookFuture<'a> {
        Box::pin(async move { check_protected_fields(object) })
    }
}

fn check_protected_fields(object: &HookObject<'_>) -> ControllerResult<()> {
    let context = object.context();
    if context.is_root {
        return Ok(());
    }

    let operation = match object.operation_type().protected_operation() {
        Some(operation) => operation,
        None => return Ok(()),
    };

    let class = object.controller().schema().class(object.class_name())?;

    for (field, protection) in class.protected_fields() {
        if !protection.protects(operation) {
            continue;
        }

        let touched = match operation {
            ProtectedOperation::Read => object.select().includes(field),
            ProtectedOperation::Create | ProtectedOperation::Update => object
                .new_data()
                .map_or(false, |data| data.contains_key(field.as_str())),
        };
        if !touched {
            continue;
        }

        let allowed = !protection.is_root_only()
            && context.role_name().map_or(false, |role| {
                protection.authorized_roles.iter().any(|r| r == role)
            });

        if !allowed {
            return Err(ControllerError::permission(format!(
                "field '{}' of {} is protected",
                field, class.name
            )));
        }
    }

    Ok(())
}

/// On create, grants the calling user read and write when no `acl` is
/// given. Anonymous creations are left without an ACL.
pub struct DefaultAclHook;

impl Hook for DefaultAclHook {
    fn call<'a>(&'a self, object: &'a mut HookObject<'_>) -> HookFuture<'a> {
        Box::pin(async move {
            let has_acl = object
                .new_data()
                .map_or(false, |data| data.get(ACL_FIELD).map_or(false, |v| !v.is_null()));
            if has_acl {
                return Ok(());
            }

            match object.context().user_id() {
                Some(user_id) => object.upsert_new_data(
                    ACL_FIELD,
                    json!({
                        "users": [{ "userId": user_id, "read": true, "write": true }],
                        "roles": []
                    }),
                ),
                None => Ok(()),
            }
        })
    }
}

/// Sets `createdAt` and `updatedAt` on create, `updatedAt` on update
pub struct TimestampsHook;

impl Hook for TimestampsHook {
    fn call<'a>(&'a self, object: &'a mut HookObject<'_>) -> HookFuture<'a> {
        Box::pin(async move {
            let now = Value::String(Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true));

            if object.operation_type() == OperationType::BeforeCreate {
                let missing = object
                    .new_data()
                    .map_or(true, |data| !data.contains_key(CREATED_AT_FIELD));
                if missing {
                    object.upsert_new_data(CREATED_AT_FIELD, now.clone())?;
                }
            }

            object.upsert_new_data(UPDATED_AT_FIELD, now)
        })
    }
}
