//! # Document Store Adapter
//!
//! Reference implementation of [`StorageAdapter`] over the in-process
//! [`DocumentEngine`]. Where-clauses are compiled to native filters by
//! [`compile_where`]; `id` is stored as the `_id` primary key and renamed on
//! the way out.
//!
//! `connect()` pings the engine and retries with exponential backoff while
//! it is starting up. Until it succeeds every other method fails with
//! [`AdapterError::NotConnected`].

mod compiler;
mod config;
mod engine;
mod matcher;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use super::{AdapterError, AdapterResult, Object, StorageAdapter};
use crate::query::{FindOptions, Select, WhereClause, WhereNode};
use crate::schema::ClassSchema;

pub use compiler::{compile_where, NativeFilter, PRIMARY_KEY};
pub use config::DocumentAdapterConfig;
pub use engine::{Document, DocumentEngine, SortKey};

/// Storage adapter backed by a [`DocumentEngine`]
pub struct DocumentAdapter {
    config: DocumentAdapterConfig,
    engine: Arc<DocumentEngine>,
    connected: AtomicBool,
}

impl DocumentAdapter {
    /// Adapter over a fresh, empty engine
    pub fn new(config: DocumentAdapterConfig) -> Self {
        Self::with_engine(config, Arc::new(DocumentEngine::new()))
    }

    pub fn with_engine(config: DocumentAdapterConfig, engine: Arc<DocumentEngine>) -> Self {
        Self {
            config,
            engine,
            connected: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &DocumentAdapterConfig {
        &self.config
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn ensure_connected(&self) -> AdapterResult<()> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(AdapterError::NotConnected)
        }
    }
}

/// Filter for an id-targeted operation, optionally narrowed by `where`
fn id_filter(id: &str, where_clause: Option<&WhereClause>) -> NativeFilter {
    let clause = match where_clause {
        Some(extra) if !extra.is_empty() => {
            WhereClause::id_equal_to(id).with(WhereNode::And(vec![extra.clone()]))
        }
        _ => WhereClause::id_equal_to(id),
    };
    compile_where(&clause)
}

/// Stored document to public object: `_id` becomes `id`, then the
/// projection is applied.
fn project(mut document: Document, select: &Select) -> Object {
    let mut object = Object::new();
    if let Some(id) = document.remove(PRIMARY_KEY) {
        object.insert("id".to_string(), id);
    }

    for (key, value) in document {
        if select.includes(&key) {
            object.insert(key, value);
        }
    }
    object
}

/// Public object to stored document; a caller-supplied `id` is ignored.
fn to_document(mut data: Object) -> Document {
    data.remove("id");
    data.remove(PRIMARY_KEY);
    data
}

fn sort_keys(options: &FindOptions) -> Vec<SortKey> {
    options
        .order
        .iter()
        .map(|order| SortKey {
            path: if order.field == "id" {
                PRIMARY_KEY.to_string()
            } else {
                order.field.clone()
            },
            ascending: order.ascending,
        })
        .collect()
}

#[async_trait]
impl StorageAdapter for DocumentAdapter {
    async fn connect(&self) -> AdapterResult<()> {
        if self.is_connected() {
            return Ok(());
        }

        let attempts = self.config.connect_attempts.max(1);
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            match self.engine.ping() {
                Ok(()) => {
                    self.connected.store(true, Ordering::SeqCst);
                    info!(
                        database = %self.config.database_name,
                        attempt,
                        "document adapter connected"
                    );
                    return Ok(());
                }
                Err(e) => {
                    last_error = e.to_string();
                    if attempt < attempts {
                        let delay = self.config.backoff_for(attempt);
                        warn!(
                            database = %self.config.database_name,
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            error = %last_error,
                            "connect failed, retrying"
                        );
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }

        Err(AdapterError::ConnectFailed {
            attempts,
            reason: last_error,
        })
    }

    async fn close(&self) -> AdapterResult<()> {
        self.connected.store(false, Ordering::SeqCst);
        info!(database = %self.config.database_name, "document adapter closed");
        Ok(())
    }

    async fn create_class_if_not_exist(&self, class: &ClassSchema) -> AdapterResult<()> {
        self.ensure_connected()?;

        let unique: Vec<String> = class
            .indexes
            .iter()
            .filter(|index| index.unique)
            .map(|index| index.field.clone())
            .collect();

        debug!(
            class = %class.name,
            indexes = class.indexes.len(),
            unique = unique.len(),
            "ensuring collection"
        );
        self.engine.ensure_collection(&class.name, &unique)
    }

    async fn clear_database(&self) -> AdapterResult<()> {
        self.ensure_connected()?;
        self.engine.clear_except(&self.config.protected_classes)
    }

    async fn count(&self, class_name: &str, where_clause: &WhereClause) -> AdapterResult<u64> {
        self.ensure_connected()?;
        self.engine.count(class_name, &compile_where(where_clause))
    }

    async fn get_object(
        &self,
        class_name: &str,
        id: &str,
        select: &Select,
        where_clause: Option<&WhereClause>,
    ) -> AdapterResult<Object> {
        self.ensure_connected()?;
        if id.is_empty() {
            return Err(AdapterError::not_found(class_name, id));
        }

        let filter = id_filter(id, where_clause);
        self.engine
            .find(class_name, &filter, &[], 0, Some(1))?
            .into_iter()
            .next()
            .map(|document| project(document, select))
            .ok_or_else(|| AdapterError::not_found(class_name, id))
    }

    async fn get_objects(
        &self,
        class_name: &str,
        where_clause: &WhereClause,
        select: &Select,
        options: &FindOptions,
    ) -> AdapterResult<Vec<Object>> {
        self.ensure_connected()?;

        let documents = self.engine.find(
            class_name,
            &compile_where(where_clause),
            &sort_keys(options),
            options.offset.unwrap_or(0),
            options.first,
        )?;

        Ok(documents
            .into_iter()
            .map(|document| project(document, select))
            .collect())
    }

    async fn create_object(&self, class_name: &str, data: Object) -> AdapterResult<String> {
        self.ensure_connected()?;

        self.engine
            .insert_many(class_name, vec![to_document(data)])?
            .into_iter()
            .next()
            .ok_or_else(|| AdapterError::Engine("insert returned no id".to_string()))
    }

    async fn create_objects(
        &self,
        class_name: &str,
        data: Vec<Object>,
    ) -> AdapterResult<Vec<String>> {
        self.ensure_connected()?;
        self.engine
            .insert_many(class_name, data.into_iter().map(to_document).collect())
    }

    async fn update_object(
        &self,
        class_name: &str,
        id: &str,
        data: Object,
        where_clause: Option<&WhereClause>,
    ) -> AdapterResult<String> {
        self.ensure_connected()?;
        if id.is_empty() {
            return Err(AdapterError::not_found(class_name, id));
        }

        let filter = id_filter(id, where_clause);
        self.engine
            .update(class_name, &filter, &to_document(data), true)?
            .into_iter()
            .next()
            .ok_or_else(|| AdapterError::not_found(class_name, id))
    }

    async fn update_objects(
        &self,
        class_name: &str,
        where_clause: &WhereClause,
        data: Object,
    ) -> AdapterResult<Vec<String>> {
        self.ensure_connected()?;
        self.engine.update(
            class_name,
            &compile_where(where_clause),
            &to_document(data),
            false,
        )
    }

    async fn delete_object(
        &self,
        class_name: &str,
        id: &str,
        where_clause: Option<&WhereClause>,
    ) -> AdapterResult<()> {
        self.ensure_connected()?;
        if id.is_empty() {
            return Err(AdapterError::not_found(class_name, id));
        }

        match self
            .engine
            .delete(class_name, &id_filter(id, where_clause), true)?
        {
            0 => Err(AdapterError::not_found(class_name, id)),
            _ => Ok(()),
        }
    }

    async fn delete_objects(
        &self,
        class_name: &str,
        where_clause: &WhereClause,
    ) -> AdapterResult<u64> {
        self.ensure_connected()?;
        self.engine.delete(class_name, &compile_where(where_clause), false)
    }
}

impl std::fmt::Debug for DocumentAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentAdapter")
            .field("database", &self.config.database_name)
            .field("connected", &self.is_connected())
            .finish()
    }
}
