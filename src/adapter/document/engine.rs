//! In-process document engine
//!
//! Collections of schemaless JSON documents keyed by `_id`, queried with
//! native filters. Collections are created implicitly on first write.
//! Unique indexes are enforced on insert and update; a batch that would
//! violate one is rejected as a whole.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering as AtomicOrdering};
use std::sync::RwLock;

use serde_json::{Map, Value};
use uuid::Uuid;

use super::compiler::{NativeFilter, PRIMARY_KEY};
use super::matcher::{compare_for_sort, matches, values_at};
use crate::adapter::{AdapterError, AdapterResult};

/// Stored document, including `_id`
pub type Document = Map<String, Value>;

/// Native sort directive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    pub path: String,
    pub ascending: bool,
}

#[derive(Debug, Default)]
struct Collection {
    documents: Vec<Document>,
    unique_fields: Vec<String>,
}

impl Collection {
    /// First unique field on which `candidate` collides with a stored
    /// document other than `except`.
    fn unique_violation(&self, candidate: &Document, except: Option<&str>) -> Option<&str> {
        self.unique_fields.iter().map(String::as_str).find(|field| {
            let value = match candidate.get(*field) {
                Some(Value::Null) | None => return false,
                Some(value) => value,
            };

            self.documents.iter().any(|doc| {
                let same_doc = except.is_some() && doc.get(PRIMARY_KEY).and_then(Value::as_str) == except;
                !same_doc && doc.get(*field) == Some(value)
            })
        })
    }
}

pub struct DocumentEngine {
    collections: RwLock<HashMap<String, Collection>>,
    /// Pings left to fail before the engine reports ready
    warming_up: AtomicU32,
}

impl DocumentEngine {
    pub fn new() -> Self {
        Self {
            collections: RwLock::new(HashMap::new()),
            warming_up: AtomicU32::new(0),
        }
    }

    /// Engine that rejects its first `pings` health checks, as a freshly
    /// started server would.
    pub fn with_startup_delay(pings: u32) -> Self {
        Self {
            collections: RwLock::new(HashMap::new()),
            warming_up: AtomicU32::new(pings),
        }
    }

    pub fn ping(&self) -> AdapterResult<()> {
        let remaining = self.warming_up.load(AtomicOrdering::SeqCst);
        if remaining > 0 {
            self.warming_up.store(remaining - 1, AtomicOrdering::SeqCst);
            return Err(AdapterError::Engine("engine is starting up".to_string()));
        }
        Ok(())
    }

    /// Creates the collection if needed and registers unique fields.
    pub fn ensure_collection(&self, name: &str, unique_fields: &[String]) -> AdapterResult<()> {
        let mut collections = self.write_lock()?;
        let collection = collections.entry(name.to_string()).or_default();

        for field in unique_fields {
            if !collection.unique_fields.contains(field) {
                collection.unique_fields.push(field.clone());
            }
        }
        Ok(())
    }

    /// Removes every document outside the `keep` collections. Collection
    /// definitions and indexes survive.
    pub fn clear_except(&self, keep: &[String]) -> AdapterResult<()> {
        let mut collections = self.write_lock()?;
        for (name, collection) in collections.iter_mut() {
            if !keep.contains(name) {
                collection.documents.clear();
            }
        }
        Ok(())
    }

    pub fn find(
        &self,
        collection: &str,
        filter: &NativeFilter,
        sort: &[SortKey],
        skip: usize,
        limit: Option<usize>,
    ) -> AdapterResult<Vec<Document>> {
        let collections = self.read_lock()?;
        let documents = match collections.get(collection) {
            Some(c) => &c.documents,
            None => return Ok(Vec::new()),
        };

        let mut found: Vec<&Document> = documents.iter().filter(|d| matches(d, filter)).collect();

        if !sort.is_empty() {
            found.sort_by(|a, b| compare_documents(a, b, sort));
        }

        Ok(found
            .into_iter()
            .skip(skip)
            .take(limit.unwrap_or(usize::MAX))
            .cloned()
            .collect())
    }

    pub fn count(&self, collection: &str, filter: &NativeFilter) -> AdapterResult<u64> {
        let collections = self.read_lock()?;
        Ok(collections
            .get(collection)
            .map(|c| c.documents.iter().filter(|d| matches(d, filter)).count() as u64)
            .unwrap_or(0))
    }

    /// Inserts documents, assigning `_id` where missing. Returns the ids.
    pub fn insert_many(
        &self,
        collection_name: &str,
        documents: Vec<Document>,
    ) -> AdapterResult<Vec<String>> {
        let mut collections = self.write_lock()?;
        let collection = collections.entry(collection_name.to_string()).or_default();

        let mut staged: Vec<Document> = Vec::with_capacity(documents.len());
        for mut document in documents {
            let id = match document.get(PRIMARY_KEY).and_then(Value::as_str) {
                Some(id) => id.to_string(),
                None => Uuid::new_v4().to_string(),
            };
            document.insert(PRIMARY_KEY.to_string(), Value::String(id));

            if let Some(field) = collection.unique_violation(&document, None) {
                return Err(AdapterError::conflict(collection_name, field));
            }
            for field in &collection.unique_fields {
                let value = document.get(field);
                if value.map_or(false, |v| !v.is_null())
                    && staged.iter().any(|s| s.get(field) == value)
                {
                    return Err(AdapterError::conflict(collection_name, field.as_str()));
                }
            }
            staged.push(document);
        }

        let ids = staged.iter().filter_map(document_id).collect();
        collection.documents.extend(staged);
        Ok(ids)
    }

    /// Applies `set` (top-level field replacement) to matching documents.
    /// Returns the ids of the updated documents.
    pub fn update(
        &self,
        collection_name: &str,
        filter: &NativeFilter,
        set: &Document,
        first_only: bool,
    ) -> AdapterResult<Vec<String>> {
        let mut collections = self.write_lock()?;
        let collection = match collections.get_mut(collection_name) {
            Some(c) => c,
            None => return Ok(Vec::new()),
        };

        let positions: Vec<usize> = collection
            .documents
            .iter()
            .enumerate()
            .filter(|(_, d)| matches(d, filter))
            .map(|(i, _)| i)
            .take(if first_only { 1 } else { usize::MAX })
            .collect();

        let mut updated: Vec<(usize, Document)> = Vec::with_capacity(positions.len());
        for &position in &positions {
            let mut document = collection.documents[position].clone();
            for (key, value) in set {
                if key != PRIMARY_KEY {
                    document.insert(key.clone(), value.clone());
                }
            }

            let id = document_id(&document);
            if let Some(field) = collection.unique_violation(&document, id.as_deref()) {
                return Err(AdapterError::conflict(collection_name, field));
            }
            for field in &collection.unique_fields {
                let value = document.get(field);
                if value.map_or(false, |v| !v.is_null())
                    && updated.iter().any(|(_, staged)| staged.get(field) == value)
                {
                    return Err(AdapterError::conflict(collection_name, field.as_str()));
                }
            }
            updated.push((position, document));
        }

        let mut ids = Vec::with_capacity(updated.len());
        for (position, document) in updated {
            ids.extend(document_id(&document));
            collection.documents[position] = document;
        }
        Ok(ids)
    }

    /// Deletes matching documents and returns how many were removed.
    pub fn delete(
        &self,
        collection_name: &str,
        filter: &NativeFilter,
        first_only: bool,
    ) -> AdapterResult<u64> {
        let mut collections = self.write_lock()?;
        let collection = match collections.get_mut(collection_name) {
            Some(c) => c,
            None => return Ok(0),
        };

        let mut removed = 0u64;
        collection.documents.retain(|document| {
            if (first_only && removed > 0) || !matches(document, filter) {
                return true;
            }
            removed += 1;
            false
        });
        Ok(removed)
    }

    fn read_lock(
        &self,
    ) -> AdapterResult<std::sync::RwLockReadGuard<'_, HashMap<String, Collection>>> {
        self.collections
            .read()
            .map_err(|e| AdapterError::Engine(e.to_string()))
    }

    fn write_lock(
        &self,
    ) -> AdapterResult<std::sync::RwLockWriteGuard<'_, HashMap<String, Collection>>> {
        self.collections
            .write()
            .map_err(|e| AdapterError::Engine(e.to_string()))
    }
}

impl Default for DocumentEngine {
    fn default() -> Self {
        Self::new()
    }
}

fn document_id(document: &Document) -> Option<String> {
    document
        .get(PRIMARY_KEY)
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn compare_documents(a: &Document, b: &Document, sort: &[SortKey]) -> Ordering {
    for key in sort {
        let left = values_at(a, &key.path).into_iter().next();
        let right = values_at(b, &key.path).into_iter().next();

        let ordering = compare_for_sort(left, right);
        let ordering = if key.ascending {
            ordering
        } else {
            ordering.reverse()
        };

        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}
