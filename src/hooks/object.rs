//! Hook object handed to every hook callback

use serde_json::Value;

use super::OperationType;
use crate::adapter::Object;
use crate::core::{Context, ControllerError, ControllerResult, DatabaseController};
use crate::query::{Select, WhereClause};

/// View of one in-flight operation.
///
/// - `object`: the stored state. For Before update/delete it is the current
///   object, for After tags the persisted one. Absent for Before create/read.
/// - `new_data`: data about to be written, create/update only.
pub struct HookObject<'a> {
    class_name: &'a str,
    operation_type: OperationType,
    context: &'a Context,
    controller: &'a DatabaseController,
    select: &'a Select,
    id: Option<&'a str>,
    where_clause: Option<&'a WhereClause>,
    object: Option<Object>,
    new_data: Option<Object>,
}

impl<'a> HookObject<'a> {
    pub(crate) fn new(
        class_name: &'a str,
        operation_type: OperationType,
        context: &'a Context,
        controller: &'a DatabaseController,
        select: &'a Select,
    ) -> Self {
        Self {
            class_name,
            operation_type,
            context,
            controller,
            select,
            id: None,
            where_clause: None,
            object: None,
            new_data: None,
        }
    }

    pub(crate) fn with_id(mut self, id: &'a str) -> Self {
        self.id = Some(id);
        self
    }

    pub(crate) fn with_where(mut self, where_clause: Option<&'a WhereClause>) -> Self {
        self.where_clause = where_clause;
        self
    }

    pub(crate) fn with_object(mut self, object: Option<Object>) -> Self {
        self.object = object;
        self
    }

    pub(crate) fn with_new_data(mut self, data: Object) -> Self {
        self.new_data = Some(data);
        self
    }

    pub fn class_name(&self) -> &'a str {
        self.class_name
    }

    pub fn operation_type(&self) -> OperationType {
        self.operation_type
    }

    pub fn context(&self) -> &'a Context {
        self.context
    }

    /// Controller for nested calls (cascades)
    pub fn controller(&self) -> &'a DatabaseController {
        self.controller
    }

    /// Requested projection
    pub fn select(&self) -> &'a Select {
        self.select
    }

    /// Target identifier of single-object operations
    pub fn id(&self) -> Option<&'a str> {
        self.id
    }

    pub fn where_clause(&self) -> Option<&'a WhereClause> {
        self.where_clause
    }

    pub fn object(&self) -> Option<&Object> {
        self.object.as_ref()
    }

    pub fn new_data(&self) -> Option<&Object> {
        self.new_data.as_ref()
    }

    /// Sets `field` in the data about to be written.
    ///
    /// # Errors
    ///
    /// `HookContract` when called from an After-hook or on an operation
    /// that writes no data.
    pub fn upsert_new_data(&mut self, field: impl Into<String>, value: Value) -> ControllerResult<()> {
        let field = field.into();

        if !self.operation_type.is_before() {
            return Err(ControllerError::hook_contract(format!(
                "upsert_new_data('{}') called from {} hook on {}",
                field, self.operation_type, self.class_name
            )));
        }

        match self.new_data.as_mut() {
            Some(data) => {
                data.insert(field, value);
                Ok(())
            }
            None => Err(ControllerError::hook_contract(format!(
                "{} on {} carries no data to upsert '{}'",
                self.operation_type, self.class_name, field
            ))),
        }
    }

    pub(crate) fn into_new_data(self) -> Option<Object> {
        self.new_data
    }
}
