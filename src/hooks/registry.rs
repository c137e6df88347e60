//! Hook registry
//!
//! Built once at boot and immutable while requests run. Hooks are keyed by
//! class name and operation tag and kept sorted by ascending priority; equal
//! priorities keep registration order.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use super::builtin::{
    ClassPermissionHook, DefaultAclHook, ProtectedFieldsHook, TimestampsHook,
    DEFAULT_ACL_PRIORITY, PERMISSION_PRIORITY, PROTECTED_FIELDS_PRIORITY, TIMESTAMPS_PRIORITY,
};
use super::{Hook, HookObject, OperationType};
use crate::core::ControllerResult;
use crate::schema::SchemaRegistry;

struct RegisteredHook {
    priority: i32,
    hook: Arc<dyn Hook>,
}

/// Immutable registry of hooks
#[derive(Default)]
pub struct HookRegistry {
    hooks: HashMap<String, HashMap<OperationType, Vec<RegisteredHook>>>,
}

impl HookRegistry {
    /// Registry without hooks
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builder() -> HookRegistryBuilder {
        HookRegistryBuilder::new()
    }

    /// Whether any hook is registered for the pair
    pub fn has_hooks(&self, class_name: &str, operation_type: OperationType) -> bool {
        self.hooks
            .get(class_name)
            .and_then(|ops| ops.get(&operation_type))
            .map_or(false, |hooks| !hooks.is_empty())
    }

    pub fn hook_count(&self) -> usize {
        self.hooks
            .values()
            .flat_map(|ops| ops.values())
            .map(Vec::len)
            .sum()
    }

    /// Runs the hooks registered for the object's class and operation, in
    /// order. The first error aborts the rest.
    pub async fn run(&self, object: &mut HookObject<'_>) -> ControllerResult<()> {
        let hooks = match self
            .hooks
            .get(object.class_name())
            .and_then(|ops| ops.get(&object.operation_type()))
        {
            Some(hooks) => hooks,
            None => return Ok(()),
        };

        for registered in hooks {
            debug!(
                class = object.class_name(),
                operation = object.operation_type().as_str(),
                priority = registered.priority,
                request_id = %object.context().request_id,
                "running hook"
            );
            registered.hook.call(object).await?;
        }

        Ok(())
    }
}

impl std::fmt::Debug for HookRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HookRegistry")
            .field("hooks", &self.hook_count())
            .finish()
    }
}

/// Builder for registry construction
pub struct HookRegistryBuilder {
    entries: Vec<(String, OperationType, RegisteredHook)>,
}

impl HookRegistryBuilder {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Registers `hook` for `(class_name, operation_type)`
    pub fn register(
        mut self,
        class_name: impl Into<String>,
        operation_type: OperationType,
        priority: i32,
        hook: impl Hook + 'static,
    ) -> Self {
        self.entries.push((
            class_name.into(),
            operation_type,
            RegisteredHook {
                priority,
                hook: Arc::new(hook),
            },
        ));
        self
    }

    /// Registers the built-in hooks on every class of `schema`:
    /// class permissions, protected fields, default ACL and timestamps.
    pub fn with_defaults(mut self, schema: &SchemaRegistry) -> Self {
        let permission: Arc<dyn Hook> = Arc::new(ClassPermissionHook);
        let protected: Arc<dyn Hook> = Arc::new(ProtectedFieldsHook);
        let default_acl: Arc<dyn Hook> = Arc::new(DefaultAclHook);
        let timestamps: Arc<dyn Hook> = Arc::new(TimestampsHook);

        let mut names: Vec<&str> = schema.classes().map(|c| c.name.as_str()).collect();
        names.sort_unstable();

        for name in names {
            let mut add = |operation_type: OperationType, priority: i32, hook: &Arc<dyn Hook>| {
                self.entries.push((
                    name.to_string(),
                    operation_type,
                    RegisteredHook {
                        priority,
                        hook: Arc::clone(hook),
                    },
                ));
            };

            for op in [
                OperationType::BeforeCreate,
                OperationType::BeforeRead,
                OperationType::BeforeUpdate,
                OperationType::BeforeDelete,
            ] {
                add(op, PERMISSION_PRIORITY, &permission);
            }
            for op in [
                OperationType::BeforeCreate,
                OperationType::BeforeRead,
                OperationType::BeforeUpdate,
            ] {
                add(op, PROTECTED_FIELDS_PRIORITY, &protected);
            }
            add(OperationType::BeforeCreate, DEFAULT_ACL_PRIORITY, &default_acl);
            add(OperationType::BeforeCreate, TIMESTAMPS_PRIORITY, &timestamps);
            add(OperationType::BeforeUpdate, TIMESTAMPS_PRIORITY, &timestamps);
        }

        self
    }

    pub fn build(self) -> HookRegistry {
        let mut hooks: HashMap<String, HashMap<OperationType, Vec<RegisteredHook>>> =
            HashMap::new();

        for (class_name, operation_type, registered) in self.entries {
            hooks
                .entry(class_name)
                .or_default()
                .entry(operation_type)
                .or_default()
                .push(registered);
        }

        // Stable sort keeps registration order among equal priorities
        for ops in hooks.values_mut() {
            for list in ops.values_mut() {
                list.sort_by_key(|h| h.priority);
            }
        }

        HookRegistry { hooks }
    }
}

impl Default for HookRegistryBuilder {
    fn default() -> Self {
        Self::new()
    }
}
