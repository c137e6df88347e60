//! Storage Adapter Contract
//!
//! The single interface every storage engine implements. The controller
//! depends only on this trait, never on a concrete engine.
//!
//! ## Contract
//!
//! - `connect()` is idempotent; every other method fails fast with
//!   `AdapterError::NotConnected` until it has succeeded.
//! - Reads accept a `Select` projection that always includes `id`.
//! - Single-object update/delete accept an extra where-clause that must
//!   also match; an id+where predicate matching nothing is
//!   `AdapterError::NotFound`, whereas a list query matching nothing
//!   simply returns no rows.
//! - Writes return identifiers; callers fetch the projection they need.

pub mod document;
mod errors;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::query::{FindOptions, Select, WhereClause};
use crate::schema::ClassSchema;

pub use errors::{AdapterError, AdapterResult};

/// A stored record as exchanged with the controller. Carries `id`.
pub type Object = Map<String, Value>;

/// The `id` of an object, if it has a string one
pub fn object_id(object: &Object) -> Option<String> {
    object.get("id").and_then(Value::as_str).map(str::to_string)
}

#[async_trait]
pub trait StorageAdapter: Send + Sync {
    /// Connects to the engine, retrying while it starts up
    async fn connect(&self) -> AdapterResult<()>;

    async fn close(&self) -> AdapterResult<()>;

    /// Creates backing structures and declared indexes for a class
    async fn create_class_if_not_exist(&self, class: &ClassSchema) -> AdapterResult<()>;

    /// Truncates every class except the adapter's protected classes
    async fn clear_database(&self) -> AdapterResult<()>;

    async fn count(&self, class_name: &str, where_clause: &WhereClause) -> AdapterResult<u64>;

    async fn get_object(
        &self,
        class_name: &str,
        id: &str,
        select: &Select,
        where_clause: Option<&WhereClause>,
    ) -> AdapterResult<Object>;

    async fn get_objects(
        &self,
        class_name: &str,
        where_clause: &WhereClause,
        select: &Select,
        options: &FindOptions,
    ) -> AdapterResult<Vec<Object>>;

    /// Returns the id of the created object
    async fn create_object(&self, class_name: &str, data: Object) -> AdapterResult<String>;

    async fn create_objects(&self, class_name: &str, data: Vec<Object>)
        -> AdapterResult<Vec<String>>;

    async fn update_object(
        &self,
        class_name: &str,
        id: &str,
        data: Object,
        where_clause: Option<&WhereClause>,
    ) -> AdapterResult<String>;

    /// Returns the ids of the updated objects
    async fn update_objects(
        &self,
        class_name: &str,
        where_clause: &WhereClause,
        data: Object,
    ) -> AdapterResult<Vec<String>>;

    async fn delete_object(
        &self,
        class_name: &str,
        id: &str,
        where_clause: Option<&WhereClause>,
    ) -> AdapterResult<()>;

    /// Returns the number of deleted objects
    async fn delete_objects(&self, class_name: &str, where_clause: &WhereClause)
        -> AdapterResult<u64>;
}
