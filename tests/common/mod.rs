//! Shared fixtures for integration tests

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};

use async_trait::async_trait;
use datacontrol::adapter::document::{DocumentAdapter, DocumentAdapterConfig};
use datacontrol::adapter::{AdapterResult, Object, StorageAdapter};
use datacontrol::core::DatabaseController;
use datacontrol::hooks::{Hook, HookFuture, HookObject, HookRegistry};
use datacontrol::query::{FindOptions, Select, WhereClause};
use datacontrol::schema::{
    ClassSchema, FieldDef, IndexDef, PrimitiveType, ProtectedField, ProtectedOperation,
    SchemaRegistry,
};
use serde_json::Value;
use tracing_subscriber::{fmt, EnvFilter};

static TRACING: Once = Once::new();

/// Routes library logs to the test writer, filtered by `RUST_LOG`
/// (`datacontrol=debug` when unset).
pub fn init_tracing() {
    TRACING.call_once(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("datacontrol=debug"));
        let _ = fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}

/// Document adapter that records the name of every method called on it
pub struct RecordingAdapter {
    inner: DocumentAdapter,
    calls: Mutex<Vec<&'static str>>,
}

impl RecordingAdapter {
    pub fn new() -> Self {
        Self {
            inner: DocumentAdapter::new(DocumentAdapterConfig::new("test")),
            calls: Mutex::new(Vec::new()),
        }
    }

    fn record(&self, method: &'static str) {
        self.calls.lock().unwrap().push(method);
    }

    /// Number of calls to `method` since the last reset
    pub fn count(&self, method: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|m| **m == method)
            .count()
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().clone()
    }

    pub fn reset(&self) {
        self.calls.lock().unwrap().clear();
    }
}

#[async_trait]
impl StorageAdapter for RecordingAdapter {
    async fn connect(&self) -> AdapterResult<()> {
        self.record("connect");
        self.inner.connect().await
    }

    async fn close(&self) -> AdapterResult<()> {
        self.record("close");
        self.inner.close().await
    }

    async fn create_class_if_not_exist(&self, class: &ClassSchema) -> AdapterResult<()> {
        self.record("create_class_if_not_exist");
        self.inner.create_class_if_not_exist(class).await
    }

    async fn clear_database(&self) -> AdapterResult<()> {
        self.record("clear_database");
        self.inner.clear_database().await
    }

    async fn count(&self, class_name: &str, where_clause: &WhereClause) -> AdapterResult<u64> {
        self.record("count");
        self.inner.count(class_name, where_clause).await
    }

    async fn get_object(
        &self,
        class_name: &str,
        id: &str,
        select: &Select,
        where_clause: Option<&WhereClause>,
    ) -> AdapterResult<Object> {
        self.record("get_object");
        self.inner
            .get_object(class_name, id, select, where_clause)
            .await
    }

    async fn get_objects(
        &self,
        class_name: &str,
        where_clause: &WhereClause,
        select: &Select,
        options: &FindOptions,
    ) -> AdapterResult<Vec<Object>> {
        self.record("get_objects");
        self.inner
            .get_objects(class_name, where_clause, select, options)
            .await
    }

    async fn create_object(&self, class_name: &str, data: Object) -> AdapterResult<String> {
        self.record("create_object");
        self.inner.create_object(class_name, data).await
    }

    async fn create_objects(
        &self,
        class_name: &str,
        data: Vec<Object>,
    ) -> AdapterResult<Vec<String>> {
        self.record("create_objects");
        self.inner.create_objects(class_name, data).await
    }

    async fn update_object(
        &self,
        class_name: &str,
        id: &str,
        data: Object,
        where_clause: Option<&WhereClause>,
    ) -> AdapterResult<String> {
        self.record("update_object");
        self.inner
            .update_object(class_name, id, data, where_clause)
            .await
    }

    async fn update_objects(
        &self,
        class_name: &str,
        where_clause: &WhereClause,
        data: Object,
    ) -> AdapterResult<Vec<String>> {
        self.record("update_objects");
        self.inner
            .update_objects(class_name, where_clause, data)
            .await
    }

    async fn delete_object(
        &self,
        class_name: &str,
        id: &str,
        where_clause: Option<&WhereClause>,
    ) -> AdapterResult<()> {
        self.record("delete_object");
        self.inner.delete_object(class_name, id, where_clause).await
    }

    async fn delete_objects(
        &self,
        class_name: &str,
        where_clause: &WhereClause,
    ) -> AdapterResult<u64> {
        self.record("delete_objects");
        self.inner.delete_objects(class_name, where_clause).await
    }
}

/// Hook counting how often it runs
pub struct CountCalls(pub Arc<AtomicUsize>);

impl CountCalls {
    pub fn new() -> (Self, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        (Self(Arc::clone(&calls)), calls)
    }
}

impl Hook for CountCalls {
    fn call<'a>(&'a self, _object: &'a mut HookObject<'_>) -> HookFuture<'a> {
        Box::pin(async move {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }
}

/// Application schema used across the integration tests
pub fn schema() -> SchemaRegistry {
    SchemaRegistry::new(vec![
        ClassSchema::new("Post")
            .with_field("title", FieldDef::string())
            .with_field("views", FieldDef::int())
            .with_field("tags", FieldDef::array_of(PrimitiveType::String))
            .with_field("author", FieldDef::pointer("User"))
            .with_field("readers", FieldDef::relation("User"))
            .with_field(
                "draft",
                FieldDef::string().protected(ProtectedField::new(
                    ["Editor"],
                    [ProtectedOperation::Read, ProtectedOperation::Update],
                )),
            ),
        ClassSchema::new("Tag")
            .with_field("slug", FieldDef::string().required())
            .with_index(IndexDef::ascending("slug").unique()),
    ])
    .unwrap()
}

/// Connected controller over a recording adapter
pub async fn setup(hooks: Option<HookRegistry>) -> (DatabaseController, Arc<RecordingAdapter>) {
    init_tracing();
    let adapter = Arc::new(RecordingAdapter::new());
    let schema = Arc::new(schema());

    let mut controller = DatabaseController::new(
        Arc::clone(&schema),
        Arc::clone(&adapter) as Arc<dyn StorageAdapter>,
    );
    if let Some(hooks) = hooks {
        controller = controller.with_hooks(hooks);
    }

    controller.initialize().await.unwrap();
    adapter.reset();
    (controller, adapter)
}

/// Controller with the built-in hooks registered on every class
pub async fn setup_with_defaults() -> (DatabaseController, Arc<RecordingAdapter>) {
    let hooks = HookRegistry::builder().with_defaults(&schema()).build();
    setup(Some(hooks)).await
}

pub fn object(value: Value) -> Object {
    value.as_object().cloned().unwrap()
}

pub fn id_of(object: &Object) -> String {
    object["id"].as_str().unwrap().to_string()
}
