//! Controller Invariant Tests
//!
//! Round-trip and access invariants of the data access controller:
//! - Creating without hooks fetches the stored object exactly once
//! - Bulk operations matching nothing never call the bulk primitive
//! - Non-root reads and writes are narrowed by the caller's ACL
//! - Single-object operations report `NotFound` for missing or hidden ids

mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;

use common::{id_of, object, setup, CountCalls, RecordingAdapter};
use datacontrol::core::{CallerUser, Context, DatabaseController, ErrorKind};
use datacontrol::hooks::{Hook, HookFuture, HookObject, HookRegistry, OperationType};
use datacontrol::query::{FindOptions, Operator, Select, WhereClause};
use serde_json::{json, Value};

struct NoopHook;

impl Hook for NoopHook {
    fn call<'a>(&'a self, _object: &'a mut HookObject<'_>) -> HookFuture<'a> {
        Box::pin(async move { Ok(()) })
    }
}

fn acl(users: Value, roles: Value) -> Value {
    json!({ "users": users, "roles": roles })
}

async fn seed_posts(controller: &DatabaseController, adapter: &RecordingAdapter) -> Vec<String> {
    let posts = vec![
        object(json!({
            "title": "mine",
            "acl": acl(json!([{ "userId": "u1", "read": true, "write": true }]), json!([]))
        })),
        object(json!({
            "title": "readable",
            "acl": acl(json!([{ "userId": "u1", "read": true, "write": false }]), json!([]))
        })),
        object(json!({
            "title": "editors",
            "acl": acl(json!([]), json!([{ "roleId": "r-editor", "read": true, "write": true }]))
        })),
        object(json!({ "title": "nobody", "acl": acl(json!([]), json!([])) })),
    ];

    let created = controller
        .create_objects(&Context::root(), "Post", posts, &Select::id_only())
        .await
        .unwrap();
    adapter.reset();
    created.iter().map(id_of).collect()
}

fn titles(objects: &[datacontrol::adapter::Object]) -> Vec<&str> {
    let mut titles: Vec<&str> = objects
        .iter()
        .filter_map(|o| o.get("title").and_then(Value::as_str))
        .collect();
    titles.sort_unstable();
    titles
}

// =============================================================================
// Round-trip Tests
// =============================================================================

/// Without hooks, create is one write followed by one fetch.
#[tokio::test]
async fn test_create_without_hooks_fetches_once() {
    let (controller, adapter) = setup(None).await;

    let created = controller
        .create_object(
            &Context::root(),
            "Post",
            object(json!({ "title": "hello" })),
            &Select::fields(["title"]),
        )
        .await
        .unwrap();

    assert_eq!(created["title"], json!("hello"));
    assert_eq!(adapter.calls(), vec!["create_object", "get_object"]);
}

/// An After-hook computes the stored object once, then the final fetch runs.
#[tokio::test]
async fn test_create_with_after_hook_computes_object() {
    let hooks = HookRegistry::builder()
        .register("Post", OperationType::AfterCreate, 0, NoopHook)
        .build();
    let (controller, adapter) = setup(Some(hooks)).await;

    controller
        .create_object(&Context::root(), "Post", object(json!({})), &Select::All)
        .await
        .unwrap();

    assert_eq!(adapter.count("create_object"), 1);
    assert_eq!(adapter.count("get_object"), 2);
}

/// Hooks on another operation do not trigger the compute step.
#[tokio::test]
async fn test_unrelated_hooks_do_not_compute() {
    let hooks = HookRegistry::builder()
        .register("Post", OperationType::AfterDelete, 0, NoopHook)
        .register("Tag", OperationType::AfterCreate, 0, NoopHook)
        .build();
    let (controller, adapter) = setup(Some(hooks)).await;

    controller
        .create_object(&Context::root(), "Post", object(json!({})), &Select::All)
        .await
        .unwrap();

    assert_eq!(adapter.count("get_object"), 1);
}

/// An empty batch reaches neither the adapter nor the create hooks.
#[tokio::test]
async fn test_empty_create_batch_skips_adapter() {
    let (before, before_calls) = CountCalls::new();
    let (after, after_calls) = CountCalls::new();
    let hooks = HookRegistry::builder()
        .register("Post", OperationType::BeforeCreate, 0, before)
        .register("Post", OperationType::AfterCreate, 0, after)
        .build();
    let (controller, adapter) = setup(Some(hooks)).await;

    let created = controller
        .create_objects(&Context::root(), "Post", Vec::new(), &Select::All)
        .await
        .unwrap();

    assert!(created.is_empty());
    assert!(adapter.calls().is_empty());
    assert_eq!(before_calls.load(Ordering::SeqCst), 0);
    assert_eq!(after_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_update_matching_nothing_skips_bulk_update() {
    let (after, after_calls) = CountCalls::new();
    let hooks = HookRegistry::builder()
        .register("Post", OperationType::AfterUpdate, 0, after)
        .build();
    let (controller, adapter) = setup(Some(hooks)).await;
    let missing = WhereClause::leaf("title", Operator::EqualTo, json!("missing"));

    let updated = controller
        .update_objects(&Context::root(), "Post", &missing, object(json!({ "views": 1 })), &Select::All)
        .await
        .unwrap();

    assert!(updated.is_empty());
    assert_eq!(adapter.count("update_objects"), 0);
    assert_eq!(adapter.count("update_object"), 0);
    assert_eq!(after_calls.load(Ordering::SeqCst), 0);

    // Relation verbs take the per-object path, which short-circuits too
    let updated = controller
        .update_objects(
            &Context::root(),
            "Post",
            &missing,
            object(json!({ "readers": { "add": ["u1"] } })),
            &Select::All,
        )
        .await
        .unwrap();

    assert!(updated.is_empty());
    assert_eq!(adapter.count("update_object"), 0);
    assert_eq!(after_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_delete_matching_nothing_skips_bulk_delete() {
    let (after, after_calls) = CountCalls::new();
    let hooks = HookRegistry::builder()
        .register("Post", OperationType::AfterDelete, 0, after)
        .build();
    let (controller, adapter) = setup(Some(hooks)).await;

    let deleted = controller
        .delete_objects(
            &Context::root(),
            "Post",
            &WhereClause::leaf("title", Operator::EqualTo, json!("missing")),
            &Select::All,
        )
        .await
        .unwrap();

    assert!(deleted.is_empty());
    assert_eq!(adapter.count("delete_objects"), 0);
    assert_eq!(after_calls.load(Ordering::SeqCst), 0);
}

/// Without Before-hooks or relation verbs, a bulk update is one adapter call.
#[tokio::test]
async fn test_bulk_update_is_single_call() {
    let (controller, adapter) = setup(None).await;
    seed_posts(&controller, &adapter).await;

    let updated = controller
        .update_objects(
            &Context::root(),
            "Post",
            &WhereClause::new(),
            object(json!({ "views": 7 })),
            &Select::fields(["views"]),
        )
        .await
        .unwrap();

    assert_eq!(updated.len(), 4);
    assert!(updated.iter().all(|o| o["views"] == json!(7)));
    assert_eq!(adapter.count("update_objects"), 1);
    assert_eq!(adapter.count("update_object"), 0);
}

/// A Before-update hook switches bulk updates to one update per object.
#[tokio::test]
async fn test_bulk_update_with_hook_is_per_object() {
    let hooks = HookRegistry::builder()
        .register("Post", OperationType::BeforeUpdate, 0, NoopHook)
        .build();
    let (controller, adapter) = setup(Some(hooks)).await;
    seed_posts(&controller, &adapter).await;

    controller
        .update_objects(
            &Context::root(),
            "Post",
            &WhereClause::new(),
            object(json!({ "views": 1 })),
            &Select::All,
        )
        .await
        .unwrap();

    assert_eq!(adapter.count("update_objects"), 0);
    assert_eq!(adapter.count("update_object"), 4);
    // Matched objects seed the request cache
    assert_eq!(adapter.count("get_object"), 0);
}

// =============================================================================
// ACL Tests
// =============================================================================

#[tokio::test]
async fn test_reads_are_narrowed_by_acl() {
    let (controller, adapter) = setup(None).await;
    seed_posts(&controller, &adapter).await;

    let u1 = Context::for_user(CallerUser::new("u1"));
    let editor = Context::for_user(CallerUser::new("u2").with_role("r-editor", "Editor"));
    let stranger = Context::for_user(CallerUser::new("u3"));

    let all = WhereClause::new();
    let options = FindOptions::new();

    let visible = controller
        .get_objects(&u1, "Post", &all, &Select::All, &options)
        .await
        .unwrap();
    assert_eq!(titles(&visible), vec!["mine", "readable"]);

    let visible = controller
        .get_objects(&editor, "Post", &all, &Select::fields(["title"]), &options)
        .await
        .unwrap();
    assert_eq!(titles(&visible), vec!["editors"]);

    assert_eq!(controller.count(&stranger, "Post", &all).await.unwrap(), 0);
    assert_eq!(controller.count(&Context::root(), "Post", &all).await.unwrap(), 4);
}

#[tokio::test]
async fn test_writes_need_write_permission() {
    let (controller, adapter) = setup(None).await;
    let ids = seed_posts(&controller, &adapter).await;
    let u1 = Context::for_user(CallerUser::new("u1"));

    let updated = controller
        .update_object(&u1, "Post", &ids[0], object(json!({ "views": 3 })), &Select::All)
        .await
        .unwrap();
    assert_eq!(updated["views"], json!(3));

    // Readable but not writable
    let err = controller
        .update_object(&u1, "Post", &ids[1], object(json!({ "views": 3 })), &Select::All)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    let updated = controller
        .update_objects(
            &u1,
            "Post",
            &WhereClause::new(),
            object(json!({ "views": 9 })),
            &Select::fields(["title"]),
        )
        .await
        .unwrap();
    assert_eq!(titles(&updated), vec!["mine"]);

    let deleted = controller
        .delete_objects(&u1, "Post", &WhereClause::new(), &Select::fields(["title"]))
        .await
        .unwrap();
    assert_eq!(titles(&deleted), vec!["mine"]);
    assert_eq!(
        controller
            .count(&Context::root(), "Post", &WhereClause::new())
            .await
            .unwrap(),
        3
    );
}

/// An explicit user entry wins over the caller's role grant.
#[tokio::test]
async fn test_user_entry_overrides_role_grant() {
    let (controller, _adapter) = setup(None).await;
    let root = Context::root();

    let post = controller
        .create_object(
            &root,
            "Post",
            object(json!({
                "title": "mixed",
                "acl": acl(
                    json!([{ "userId": "u1", "read": false, "write": false }]),
                    json!([{ "roleId": "r1", "read": true, "write": true }])
                )
            })),
            &Select::id_only(),
        )
        .await
        .unwrap();
    let id = id_of(&post);

    let listed = Context::for_user(CallerUser::new("u1").with_role("r1", "Editor"));
    let unlisted = Context::for_user(CallerUser::new("u2").with_role("r1", "Editor"));

    let err = controller
        .get_object(&listed, "Post", &id, &Select::All, None)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    assert!(controller
        .get_object(&unlisted, "Post", &id, &Select::All, None)
        .await
        .is_ok());
}

// =============================================================================
// Single-object Tests
// =============================================================================

#[tokio::test]
async fn test_missing_id_is_not_found() {
    let (controller, _adapter) = setup(None).await;
    let root = Context::root();

    for err in [
        controller
            .get_object(&root, "Post", "missing", &Select::All, None)
            .await
            .unwrap_err(),
        controller
            .update_object(&root, "Post", "missing", object(json!({})), &Select::All)
            .await
            .unwrap_err(),
        controller
            .delete_object(&root, "Post", "missing", &Select::All)
            .await
            .unwrap_err(),
    ] {
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(err.code(), "NOT_FOUND");
    }
}

#[tokio::test]
async fn test_get_object_honours_extra_where() {
    let (controller, _adapter) = setup(None).await;
    let root = Context::root();

    let post = controller
        .create_object(&root, "Post", object(json!({ "views": 5 })), &Select::id_only())
        .await
        .unwrap();
    let id = id_of(&post);

    let matching = WhereClause::leaf("views", Operator::GreaterThan, json!(1));
    let other = WhereClause::leaf("views", Operator::GreaterThan, json!(10));

    assert!(controller
        .get_object(&root, "Post", &id, &Select::All, Some(&matching))
        .await
        .is_ok());
    assert_eq!(
        controller
            .get_object(&root, "Post", &id, &Select::All, Some(&other))
            .await
            .unwrap_err()
            .kind(),
        ErrorKind::NotFound
    );
}

#[tokio::test]
async fn test_delete_returns_prior_state() {
    let (controller, adapter) = setup(None).await;
    let root = Context::root();

    let post = controller
        .create_object(&root, "Post", object(json!({ "title": "gone" })), &Select::id_only())
        .await
        .unwrap();
    adapter.reset();

    let deleted = controller
        .delete_object(&root, "Post", &id_of(&post), &Select::fields(["title"]))
        .await
        .unwrap();

    assert_eq!(deleted["title"], json!("gone"));
    assert_eq!(adapter.calls(), vec!["get_object", "delete_object"]);
}

#[tokio::test]
async fn test_unique_index_conflict() {
    let (controller, _adapter) = setup(None).await;
    let root = Context::root();

    controller
        .create_object(&root, "Tag", object(json!({ "slug": "rust" })), &Select::All)
        .await
        .unwrap();

    let err = controller
        .create_object(&root, "Tag", object(json!({ "slug": "rust" })), &Select::All)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);
    assert_eq!(err.code(), "CONFLICT");
}

#[tokio::test]
async fn test_required_field_is_validated() {
    let (controller, adapter) = setup(None).await;

    let err = controller
        .create_object(&Context::root(), "Tag", object(json!({})), &Select::All)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Validation);
    assert!(adapter.calls().is_empty());
}

#[tokio::test]
async fn test_controller_shared_across_tasks() {
    let (controller, _adapter) = setup(None).await;
    let controller = Arc::new(controller);

    let handles: Vec<_> = (0..4)
        .map(|n| {
            let controller = Arc::clone(&controller);
            tokio::spawn(async move {
                controller
                    .create_object(
                        &Context::root(),
                        "Post",
                        object(json!({ "views": n })),
                        &Select::id_only(),
                    )
                    .await
                    .map(|o| id_of(&o))
            })
        })
        .collect();

    for handle in handles {
        assert!(handle.await.unwrap().is_ok());
    }
    assert_eq!(
        controller
            .count(&Context::root(), "Post", &WhereClause::new())
            .await
            .unwrap(),
        4
    );
}
