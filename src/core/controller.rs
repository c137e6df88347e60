//! # Data Access Controller
//!
//! Façade every create/read/update/delete request flows through exactly
//! once. For each operation it:
//!
//! 1. resolves the class and validates data, where-clause and projection
//! 2. resolves relation verbs into stored ids
//! 3. runs the Before-hooks of the class and operation
//! 4. narrows the adapter call with the caller's ACL (`read` for reads,
//!    `write` for updates and deletes)
//! 5. runs the After-hooks on the persisted object
//!
//! ## Round-trips
//!
//! The stored object is only computed for hooks when hooks are registered
//! for the pair, and is served from the request-scoped cache when a previous
//! step already fetched it. Without hooks, `create_object` issues one write
//! and one fetch. Bulk operations short-circuit on an empty match set
//! without calling the adapter's bulk primitive.
//!
//! Multi-object writes fan out per-object adapter calls concurrently; a
//! failed call does not roll back the others.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use futures_util::future::try_join_all;
use tracing::{debug, info};

use super::config::ControllerConfig;
use super::context::Context;
use super::error::ControllerResult;
use crate::adapter::{object_id, Object, StorageAdapter};
use crate::hooks::{HookObject, HookRegistry, OperationType};
use crate::query::{rewrite_with_acl, AclOperation, FindOptions, Select, WhereClause};
use crate::relation::{apply_relation_verbs, has_relation_verbs, RelationResolver};
use crate::schema::{ClassSchema, SchemaError, SchemaRegistry, SchemaValidator, WriteMode};

/// Boxed future returned by controller operations, which may recurse
/// through hooks and relation verbs.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub struct DatabaseController {
    schema: Arc<SchemaRegistry>,
    adapter: Arc<dyn StorageAdapter>,
    hooks: Arc<HookRegistry>,
    config: ControllerConfig,
}

impl DatabaseController {
    /// Controller without hooks and with the default configuration
    pub fn new(schema: Arc<SchemaRegistry>, adapter: Arc<dyn StorageAdapter>) -> Self {
        Self {
            schema,
            adapter,
            hooks: Arc::new(HookRegistry::new()),
            config: ControllerConfig::default(),
        }
    }

    pub fn with_hooks(mut self, hooks: HookRegistry) -> Self {
        self.hooks = Arc::new(hooks);
        self
    }

    pub fn with_config(mut self, config: ControllerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn schema(&self) -> &SchemaRegistry {
        &self.schema
    }

    pub fn adapter(&self) -> &dyn StorageAdapter {
        self.adapter.as_ref()
    }

    pub fn hooks(&self) -> &HookRegistry {
        &self.hooks
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    /// Connects the adapter and creates the backing structures of every
    /// class.
    pub async fn initialize(&self) -> ControllerResult<()> {
        self.adapter.connect().await?;

        for class in self.schema.classes() {
            self.adapter.create_class_if_not_exist(class).await?;
        }

        info!(classes = self.schema.class_count(), "controller initialized");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    /// Fetches one object visible to the caller.
    ///
    /// # Errors
    ///
    /// `NotFound` when the id, the optional where-clause and the caller's
    /// read ACL match nothing.
    pub fn get_object<'a>(
        &'a self,
        ctx: &'a Context,
        class_name: &'a str,
        id: &'a str,
        select: &'a Select,
        where_clause: Option<&'a WhereClause>,
    ) -> BoxFuture<'a, ControllerResult<Object>> {
        Box::pin(async move {
            debug!(class = class_name, id, request_id = %ctx.request_id, "get object");
            self.check_query(class_name, where_clause, select)?;

            if self.hooks.has_hooks(class_name, OperationType::BeforeRead) {
                let mut hook_object =
                    HookObject::new(class_name, OperationType::BeforeRead, ctx, self, select)
                        .with_id(id)
                        .with_where(where_clause);
                self.hooks.run(&mut hook_object).await?;
            }

            let base = where_clause.cloned().unwrap_or_default();
            let acl = rewrite_with_acl(&base, ctx, AclOperation::Read);
            let object = self
                .adapter
                .get_object(class_name, id, select, Some(&acl))
                .await?;

            if self.hooks.has_hooks(class_name, OperationType::AfterRead) {
                self.run_after(ctx, class_name, OperationType::AfterRead, select, object.clone())
                    .await?;
            }

            Ok(object)
        })
    }

    /// Fetches every object matching `where_clause` visible to the caller.
    pub fn get_objects<'a>(
        &'a self,
        ctx: &'a Context,
        class_name: &'a str,
        where_clause: &'a WhereClause,
        select: &'a Select,
        options: &'a FindOptions,
    ) -> BoxFuture<'a, ControllerResult<Vec<Object>>> {
        Box::pin(async move {
            debug!(class = class_name, request_id = %ctx.request_id, "get objects");
            self.check_query(class_name, Some(where_clause), select)?;
            self.check_order(class_name, options)?;

            if self.hooks.has_hooks(class_name, OperationType::BeforeRead) {
                let mut hook_object =
                    HookObject::new(class_name, OperationType::BeforeRead, ctx, self, select)
                        .with_where(Some(where_clause));
                self.hooks.run(&mut hook_object).await?;
            }

            let acl = rewrite_with_acl(where_clause, ctx, AclOperation::Read);
            let mut options = options.clone();
            if options.first.is_none() {
                options.first = self.config.default_limit;
            }

            let objects = self
                .adapter
                .get_objects(class_name, &acl, select, &options)
                .await?;

            if self.hooks.has_hooks(class_name, OperationType::AfterRead) {
                for object in &objects {
                    self.run_after(ctx, class_name, OperationType::AfterRead, select, object.clone())
                        .await?;
                }
            }

            Ok(objects)
        })
    }

    /// Counts the objects matching `where_clause` visible to the caller.
    pub fn count<'a>(
        &'a self,
        ctx: &'a Context,
        class_name: &'a str,
        where_clause: &'a WhereClause,
    ) -> BoxFuture<'a, ControllerResult<u64>> {
        Box::pin(async move {
            debug!(class = class_name, request_id = %ctx.request_id, "count");
            let select = Select::id_only();
            self.check_query(class_name, Some(where_clause), &select)?;

            if self.hooks.has_hooks(class_name, OperationType::BeforeRead) {
                let mut hook_object =
                    HookObject::new(class_name, OperationType::BeforeRead, ctx, self, &select)
                        .with_where(Some(where_clause));
                self.hooks.run(&mut hook_object).await?;
            }

            let acl = rewrite_with_acl(where_clause, ctx, AclOperation::Read);
            Ok(self.adapter.count(class_name, &acl).await?)
        })
    }

    // ------------------------------------------------------------------
    // Creates
    // ------------------------------------------------------------------

    /// Creates one object and returns it projected by `select`.
    pub fn create_object<'a>(
        &'a self,
        ctx: &'a Context,
        class_name: &'a str,
        data: Object,
        select: &'a Select,
    ) -> BoxFuture<'a, ControllerResult<Object>> {
        Box::pin(async move {
            debug!(class = class_name, request_id = %ctx.request_id, "create object");
            let id = self.create_one(ctx, class_name, data, select).await?;
            self.get_object(ctx, class_name, &id, select, None).await
        })
    }

    /// Creates objects in one adapter call and returns them projected by
    /// `select`. An empty batch returns `[]` without touching the adapter.
    pub fn create_objects<'a>(
        &'a self,
        ctx: &'a Context,
        class_name: &'a str,
        data: Vec<Object>,
        select: &'a Select,
    ) -> BoxFuture<'a, ControllerResult<Vec<Object>>> {
        Box::pin(async move {
            debug!(class = class_name, count = data.len(), request_id = %ctx.request_id, "create objects");
            let ids = self.create_many(ctx, class_name, data, select).await?;
            self.fetch_by_ids(ctx, class_name, &ids, select).await
        })
    }

    /// Creates one object and returns only its id
    pub(crate) fn create_object_id<'a>(
        &'a self,
        ctx: &'a Context,
        class_name: &'a str,
        data: Object,
    ) -> BoxFuture<'a, ControllerResult<String>> {
        Box::pin(async move {
            let select = Select::id_only();
            self.create_one(ctx, class_name, data, &select).await
        })
    }

    /// Creates objects and returns only their ids
    pub(crate) fn create_object_ids<'a>(
        &'a self,
        ctx: &'a Context,
        class_name: &'a str,
        data: Vec<Object>,
    ) -> BoxFuture<'a, ControllerResult<Vec<String>>> {
        Box::pin(async move {
            let select = Select::id_only();
            self.create_many(ctx, class_name, data, &select).await
        })
    }

    async fn create_one(
        &self,
        ctx: &Context,
        class_name: &str,
        data: Object,
        select: &Select,
    ) -> ControllerResult<String> {
        let class = self.schema.class(class_name)?;
        self.check_data(class_name, &data, WriteMode::Create)?;

        let data = RelationResolver::new(self, ctx)
            .resolve_creations(class, data)
            .await?;
        let data = apply_relation_verbs(class, data, None);
        let data = self
            .run_before_create(ctx, class_name, select, data)
            .await?;

        let id = self.adapter.create_object(class_name, data).await?;
        ctx.cache().invalidate(class_name, &id);

        if self.hooks.has_hooks(class_name, OperationType::AfterCreate) {
            let object = self.compute_object(ctx, class_name, &id).await?;
            self.run_after(ctx, class_name, OperationType::AfterCreate, select, object)
                .await?;
        }

        Ok(id)
    }

    async fn create_many(
        &self,
        ctx: &Context,
        class_name: &str,
        data: Vec<Object>,
        select: &Select,
    ) -> ControllerResult<Vec<String>> {
        let class = self.schema.class(class_name)?;
        if data.is_empty() {
            debug!(class = class_name, "empty batch, nothing to create");
            return Ok(Vec::new());
        }

        for item in &data {
            self.check_data(class_name, item, WriteMode::Create)?;
        }

        let resolver = RelationResolver::new(self, ctx);
        let resolved = try_join_all(
            data.into_iter()
                .map(|item| resolver.resolve_creations(class, item)),
        )
        .await?;

        let mut prepared = Vec::with_capacity(resolved.len());
        for item in resolved {
            let item = apply_relation_verbs(class, item, None);
            prepared.push(self.run_before_create(ctx, class_name, select, item).await?);
        }

        let ids = self.adapter.create_objects(class_name, prepared).await?;
        for id in &ids {
            ctx.cache().invalidate(class_name, id);
        }

        if self.hooks.has_hooks(class_name, OperationType::AfterCreate) {
            for id in &ids {
                let object = self.compute_object(ctx, class_name, id).await?;
                self.run_after(ctx, class_name, OperationType::AfterCreate, select, object)
                    .await?;
            }
        }

        Ok(ids)
    }

    async fn run_before_create(
        &self,
        ctx: &Context,
        class_name: &str,
        select: &Select,
        data: Object,
    ) -> ControllerResult<Object> {
        if !self.hooks.has_hooks(class_name, OperationType::BeforeCreate) {
            return Ok(data);
        }

        let mut hook_object =
            HookObject::new(class_name, OperationType::BeforeCreate, ctx, self, select)
                .with_new_data(data);
        self.hooks.run(&mut hook_object).await?;
        Ok(hook_object.into_new_data().unwrap_or_default())
    }

    // ------------------------------------------------------------------
    // Updates
    // ------------------------------------------------------------------

    /// Updates one object the caller may write and returns it projected by
    /// `select`.
    ///
    /// # Errors
    ///
    /// `NotFound` when the id and the caller's write ACL match nothing.
    pub fn update_object<'a>(
        &'a self,
        ctx: &'a Context,
        class_name: &'a str,
        id: &'a str,
        data: Object,
        select: &'a Select,
    ) -> BoxFuture<'a, ControllerResult<Object>> {
        Box::pin(async move {
            debug!(class = class_name, id, request_id = %ctx.request_id, "update object");
            let class = self.schema.class(class_name)?;
            self.check_query(class_name, None, select)?;
            self.check_data(class_name, &data, WriteMode::Update)?;

            let acl = rewrite_with_acl(&WhereClause::new(), ctx, AclOperation::Write);
            if self.hooks.has_hooks(class_name, OperationType::BeforeUpdate)
                || has_relation_verbs(class, &data)
            {
                // Hooks and verbs only ever see an object the caller may write
                let current = self
                    .adapter
                    .get_object(class_name, id, &Select::All, Some(&acl))
                    .await?;
                ctx.cache().insert(class_name, id, current);
            }

            let data = RelationResolver::new(self, ctx)
                .resolve_creations(class, data)
                .await?;
            self.update_one(ctx, class, id, data, Some(&acl), select)
                .await?;
            self.get_object(ctx, class_name, id, select, None).await
        })
    }

    /// Updates every object matching `where_clause` the caller may write.
    ///
    /// Without Before-hooks or relation verbs this is a single bulk adapter
    /// update; otherwise every matched object gets its own update. A
    /// where-clause matching nothing returns `[]` without an update call.
    pub fn update_objects<'a>(
        &'a self,
        ctx: &'a Context,
        class_name: &'a str,
        where_clause: &'a WhereClause,
        data: Object,
        select: &'a Select,
    ) -> BoxFuture<'a, ControllerResult<Vec<Object>>> {
        Box::pin(async move {
            debug!(class = class_name, request_id = %ctx.request_id, "update objects");
            let class = self.schema.class(class_name)?;
            self.check_query(class_name, Some(where_clause), select)?;
            self.check_data(class_name, &data, WriteMode::Update)?;

            let per_object = self.hooks.has_hooks(class_name, OperationType::BeforeUpdate)
                || has_relation_verbs(class, &data);
            let match_select = if per_object {
                Select::All
            } else {
                Select::id_only()
            };

            let acl = rewrite_with_acl(where_clause, ctx, AclOperation::Write);
            let matched = self
                .adapter
                .get_objects(class_name, &acl, &match_select, &FindOptions::new())
                .await?;

            if matched.is_empty() {
                debug!(class = class_name, "no object matched, nothing to update");
                return Ok(Vec::new());
            }

            let data = RelationResolver::new(self, ctx)
                .resolve_creations(class, data)
                .await?;
            let ids: Vec<String> = matched.iter().filter_map(object_id).collect();

            let updated = if per_object {
                // Matched objects are the current state the updates apply to
                for object in matched {
                    if let Some(id) = object_id(&object) {
                        ctx.cache().insert(class_name, &id, object);
                    }
                }

                try_join_all(
                    ids.iter()
                        .map(|id| self.update_one(ctx, class, id, data.clone(), None, select)),
                )
                .await?
            } else {
                let updated = self
                    .adapter
                    .update_objects(class_name, &WhereClause::id_in(ids.iter().cloned()), data)
                    .await?;
                for id in &updated {
                    ctx.cache().invalidate(class_name, id);
                }

                if self.hooks.has_hooks(class_name, OperationType::AfterUpdate) {
                    for id in &updated {
                        let object = self.compute_object(ctx, class_name, id).await?;
                        self.run_after(ctx, class_name, OperationType::AfterUpdate, select, object)
                            .await?;
                    }
                }
                updated
            };

            self.fetch_by_ids(ctx, class_name, &updated, select).await
        })
    }

    async fn update_one(
        &self,
        ctx: &Context,
        class: &ClassSchema,
        id: &str,
        data: Object,
        where_clause: Option<&WhereClause>,
        select: &Select,
    ) -> ControllerResult<String> {
        let class_name = class.name.as_str();
        let has_before = self.hooks.has_hooks(class_name, OperationType::BeforeUpdate);

        let current = if has_before || has_relation_verbs(class, &data) {
            Some(self.compute_object(ctx, class_name, id).await?)
        } else {
            None
        };
        let data = apply_relation_verbs(class, data, current.as_ref());

        let data = if has_before {
            let mut hook_object =
                HookObject::new(class_name, OperationType::BeforeUpdate, ctx, self, select)
                    .with_id(id)
                    .with_object(current)
                    .with_new_data(data);
            self.hooks.run(&mut hook_object).await?;
            hook_object.into_new_data().unwrap_or_default()
        } else {
            data
        };

        let updated = self
            .adapter
            .update_object(class_name, id, data, where_clause)
            .await?;
        ctx.cache().invalidate(class_name, id);

        if self.hooks.has_hooks(class_name, OperationType::AfterUpdate) {
            let object = self.compute_object(ctx, class_name, id).await?;
            self.run_after(ctx, class_name, OperationType::AfterUpdate, select, object)
                .await?;
        }

        Ok(updated)
    }

    // ------------------------------------------------------------------
    // Deletes
    // ------------------------------------------------------------------

    /// Deletes one object the caller may write and returns it as it was,
    /// projected by `select`.
    pub fn delete_object<'a>(
        &'a self,
        ctx: &'a Context,
        class_name: &'a str,
        id: &'a str,
        select: &'a Select,
    ) -> BoxFuture<'a, ControllerResult<Object>> {
        Box::pin(async move {
            debug!(class = class_name, id, request_id = %ctx.request_id, "delete object");
            self.check_query(class_name, None, select)?;

            let acl = rewrite_with_acl(&WhereClause::new(), ctx, AclOperation::Write);
            let object = self
                .adapter
                .get_object(class_name, id, &Select::All, Some(&acl))
                .await?;

            if self.hooks.has_hooks(class_name, OperationType::BeforeDelete) {
                let mut hook_object =
                    HookObject::new(class_name, OperationType::BeforeDelete, ctx, self, select)
                        .with_id(id)
                        .with_object(Some(object.clone()));
                self.hooks.run(&mut hook_object).await?;
            }

            self.adapter
                .delete_object(class_name, id, Some(&acl))
                .await?;
            ctx.cache().invalidate(class_name, id);

            if self.hooks.has_hooks(class_name, OperationType::AfterDelete) {
                self.run_after(ctx, class_name, OperationType::AfterDelete, select, object.clone())
                    .await?;
            }

            Ok(project(object, select))
        })
    }

    /// Deletes every object matching `where_clause` the caller may write
    /// and returns them as they were. A where-clause matching nothing
    /// returns `[]` without a delete call.
    pub fn delete_objects<'a>(
        &'a self,
        ctx: &'a Context,
        class_name: &'a str,
        where_clause: &'a WhereClause,
        select: &'a Select,
    ) -> BoxFuture<'a, ControllerResult<Vec<Object>>> {
        Box::pin(async move {
            debug!(class = class_name, request_id = %ctx.request_id, "delete objects");
            self.check_query(class_name, Some(where_clause), select)?;

            let acl = rewrite_with_acl(where_clause, ctx, AclOperation::Write);
            let matched = self
                .adapter
                .get_objects(class_name, &acl, &Select::All, &FindOptions::new())
                .await?;

            if matched.is_empty() {
                debug!(class = class_name, "no object matched, nothing to delete");
                return Ok(Vec::new());
            }

            if self.hooks.has_hooks(class_name, OperationType::BeforeDelete) {
                for object in &matched {
                    let id = object_id(object).unwrap_or_default();
                    let mut hook_object =
                        HookObject::new(class_name, OperationType::BeforeDelete, ctx, self, select)
                            .with_id(&id)
                            .with_object(Some(object.clone()));
                    self.hooks.run(&mut hook_object).await?;
                }
            }

            let ids: Vec<String> = matched.iter().filter_map(object_id).collect();
            self.adapter
                .delete_objects(class_name, &WhereClause::id_in(ids.iter().cloned()))
                .await?;
            for id in &ids {
                ctx.cache().invalidate(class_name, id);
            }

            if self.hooks.has_hooks(class_name, OperationType::AfterDelete) {
                for object in &matched {
                    self.run_after(ctx, class_name, OperationType::AfterDelete, select, object.clone())
                        .await?;
                }
            }

            Ok(matched
                .into_iter()
                .map(|object| project(object, select))
                .collect())
        })
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    /// Stored object for the hook pipeline, cached per request
    async fn compute_object(
        &self,
        ctx: &Context,
        class_name: &str,
        id: &str,
    ) -> ControllerResult<Object> {
        if let Some(object) = ctx.cache().get(class_name, id) {
            return Ok(object);
        }

        let object = self
            .adapter
            .get_object(class_name, id, &Select::All, None)
            .await?;
        ctx.cache().insert(class_name, id, object.clone());
        Ok(object)
    }

    async fn run_after(
        &self,
        ctx: &Context,
        class_name: &str,
        operation_type: OperationType,
        select: &Select,
        object: Object,
    ) -> ControllerResult<()> {
        let mut hook_object = HookObject::new(class_name, operation_type, ctx, self, select)
            .with_object(Some(object));
        self.hooks.run(&mut hook_object).await
    }

    /// Final read of written objects, in id order
    async fn fetch_by_ids(
        &self,
        ctx: &Context,
        class_name: &str,
        ids: &[String],
        select: &Select,
    ) -> ControllerResult<Vec<Object>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let where_clause = WhereClause::id_in(ids.iter().cloned());
        let options = FindOptions::new().first(ids.len());
        self.get_objects(ctx, class_name, &where_clause, select, &options)
            .await
    }

    fn check_data(&self, class_name: &str, data: &Object, mode: WriteMode) -> ControllerResult<()> {
        if self.config.enforce_schema_validation {
            SchemaValidator::new(&self.schema).validate_data(class_name, data, mode)?;
        }
        Ok(())
    }

    fn check_query(
        &self,
        class_name: &str,
        where_clause: Option<&WhereClause>,
        select: &Select,
    ) -> ControllerResult<()> {
        let validator = SchemaValidator::new(&self.schema);
        validator.class(class_name)?;

        if self.config.enforce_schema_validation {
            if let Some(where_clause) = where_clause {
                validator.validate_where(class_name, where_clause)?;
            }
            validator.validate_select(class_name, select)?;
        }
        Ok(())
    }

    fn check_order(&self, class_name: &str, options: &FindOptions) -> ControllerResult<()> {
        if !self.config.enforce_schema_validation {
            return Ok(());
        }

        let class = self.schema.class(class_name)?;
        match options
            .order
            .iter()
            .find(|o| o.field != "id" && !class.has_field(&o.field))
        {
            Some(order) => Err(SchemaError::unknown_field(class_name, order.field.as_str()).into()),
            None => Ok(()),
        }
    }
}

impl std::fmt::Debug for DatabaseController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseController")
            .field("classes", &self.schema.class_count())
            .field("hooks", &self.hooks)
            .field("config", &self.config)
            .finish()
    }
}

/// Keeps `id` and the selected fields
fn project(object: Object, select: &Select) -> Object {
    object
        .into_iter()
        .filter(|(key, _)| select.includes(key))
        .collect()
}
