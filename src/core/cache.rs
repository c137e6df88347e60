//! Request-scoped object cache
//!
//! Keyed by `(class name, id)`. Populated the first time the controller
//! computes an object for the hook pipeline and invalidated whenever the
//! controller writes that object, so nested hook cascades inside one request
//! do not refetch unchanged objects.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::adapter::Object;

type CacheKey = (String, String);

#[derive(Debug, Clone, Default)]
pub struct ObjectCache {
    entries: Arc<RwLock<HashMap<CacheKey, Object>>>,
}

impl ObjectCache {
    pub fn get(&self, class_name: &str, id: &str) -> Option<Object> {
        let entries = self.entries.read().ok()?;
        entries
            .get(&(class_name.to_string(), id.to_string()))
            .cloned()
    }

    pub fn insert(&self, class_name: &str, id: &str, object: Object) {
        if let Ok(mut entries) = self.entries.write() {
            entries.insert((class_name.to_string(), id.to_string()), object);
        }
    }

    pub fn invalidate(&self, class_name: &str, id: &str) {
        if let Ok(mut entries) = self.entries.write() {
            entries.remove(&(class_name.to_string(), id.to_string()));
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
