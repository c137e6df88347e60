//! Hook Pipeline Tests
//!
//! Behaviour of class-scoped hooks around controller operations:
//! - Built-in hooks: default ACL, timestamps, protected fields
//! - Before-hooks can rewrite incoming data and abort the write
//! - After-hooks re-enter the controller (cascading deletes)

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use common::{id_of, object, schema, setup, CountCalls};
use datacontrol::adapter::object_id;
use datacontrol::core::{CallerUser, Context, ControllerError, ErrorKind};
use datacontrol::hooks::{Hook, HookFuture, HookObject, HookRegistry, OperationType};
use datacontrol::query::{FindOptions, Operator, Select, WhereClause};
use datacontrol::schema::{SESSION_CLASS, USER_CLASS};
use serde_json::{json, Value};

// =============================================================================
// Test Hooks
// =============================================================================

struct UppercaseTitle;

impl Hook for UppercaseTitle {
    fn call<'a>(&'a self, object: &'a mut HookObject<'_>) -> HookFuture<'a> {
        Box::pin(async move {
            let title = object
                .new_data()
                .and_then(|data| data.get("title"))
                .and_then(Value::as_str)
                .map(str::to_uppercase);

            match title {
                Some(title) => object.upsert_new_data("title", json!(title)),
                None => Ok(()),
            }
        })
    }
}

struct Reject;

impl Hook for Reject {
    fn call<'a>(&'a self, _object: &'a mut HookObject<'_>) -> HookFuture<'a> {
        Box::pin(async move { Err(ControllerError::validation("posts are closed")) })
    }
}

/// Deletes the sessions of a deleted user
struct DeleteSessions;

impl Hook for DeleteSessions {
    fn call<'a>(&'a self, object: &'a mut HookObject<'_>) -> HookFuture<'a> {
        Box::pin(async move {
            let user_id = match object.object().and_then(object_id) {
                Some(id) => id,
                None => return Ok(()),
            };

            let root = object.context().as_root();
            let sessions = WhereClause::leaf("user", Operator::EqualTo, json!(user_id));
            object
                .controller()
                .delete_objects(&root, SESSION_CLASS, &sessions, &Select::id_only())
                .await?;
            Ok(())
        })
    }
}

// =============================================================================
// Built-in Hooks
// =============================================================================

/// Objects created by a user are readable and writable by that user only.
#[tokio::test]
async fn test_default_acl_grants_creator() {
    let (controller, _adapter) = common::setup_with_defaults().await;
    let owner = Context::for_user(CallerUser::new("u1"));
    let stranger = Context::for_user(CallerUser::new("u2"));
    let title = Select::fields(["title"]);

    let post = controller
        .create_object(&owner, "Post", object(json!({ "title": "hi" })), &title)
        .await
        .unwrap();
    let id = id_of(&post);

    let stored = controller
        .get_object(&Context::root(), "Post", &id, &Select::fields(["acl"]), None)
        .await
        .unwrap();
    assert_eq!(
        stored["acl"],
        json!({ "users": [{ "userId": "u1", "read": true, "write": true }], "roles": [] })
    );

    let err = controller
        .get_object(&stranger, "Post", &id, &title, None)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    let updated = controller
        .update_object(&owner, "Post", &id, object(json!({ "title": "edited" })), &title)
        .await
        .unwrap();
    assert_eq!(updated["title"], json!("edited"));
}

#[tokio::test]
async fn test_timestamps_maintained() {
    let (controller, _adapter) = common::setup_with_defaults().await;
    let owner = Context::for_user(CallerUser::new("u1"));
    let select = Select::fields(["createdAt", "updatedAt"]);

    let post = controller
        .create_object(&owner, "Post", object(json!({ "views": 1 })), &select)
        .await
        .unwrap();
    assert!(post["createdAt"].is_string());
    assert!(post["updatedAt"].is_string());

    let updated = controller
        .update_object(&owner, "Post", &id_of(&post), object(json!({ "views": 2 })), &select)
        .await
        .unwrap();
    assert_eq!(updated["createdAt"], post["createdAt"]);
    assert!(updated["updatedAt"].is_string());
}

#[tokio::test]
async fn test_protected_field_needs_role() {
    let (controller, _adapter) = common::setup_with_defaults().await;

    let post = controller
        .create_object(
            &Context::root(),
            "Post",
            object(json!({
                "title": "t",
                "draft": "secret",
                "acl": {
                    "users": [{ "userId": "member", "read": true, "write": true }],
                    "roles": [{ "roleId": "r-editor", "read": true, "write": true }]
                }
            })),
            &Select::id_only(),
        )
        .await
        .unwrap();
    let id = id_of(&post);

    let member = Context::for_user(CallerUser::new("member").with_role("r-member", "Member"));
    let editor = Context::for_user(CallerUser::new("editor").with_role("r-editor", "Editor"));
    let with_draft = Select::fields(["title", "draft"]);

    assert!(controller
        .get_object(&member, "Post", &id, &Select::fields(["title"]), None)
        .await
        .is_ok());

    let err = controller
        .get_object(&member, "Post", &id, &with_draft, None)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Permission);
    assert_eq!(err.code(), "PERMISSION_DENIED");

    // Select::All touches the protected field as well
    let err = controller
        .get_object(&member, "Post", &id, &Select::All, None)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Permission);

    let read = controller
        .get_object(&editor, "Post", &id, &with_draft, None)
        .await
        .unwrap();
    assert_eq!(read["draft"], json!("secret"));

    let err = controller
        .update_object(&member, "Post", &id, object(json!({ "draft": "x" })), &Select::id_only())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Permission);

    let updated = controller
        .update_object(&editor, "Post", &id, object(json!({ "draft": "x" })), &with_draft)
        .await
        .unwrap();
    assert_eq!(updated["draft"], json!("x"));
}

#[tokio::test]
async fn test_session_tokens_are_root_only() {
    let (controller, _adapter) = common::setup_with_defaults().await;
    let root = Context::root();

    let user = controller
        .create_object(&root, USER_CLASS, object(json!({ "email": "a@b.co" })), &Select::id_only())
        .await
        .unwrap();
    let session = controller
        .create_object(
            &root,
            SESSION_CLASS,
            object(json!({ "user": id_of(&user), "accessToken": "tok" })),
            &Select::fields(["accessToken"]),
        )
        .await
        .unwrap();
    assert_eq!(session["accessToken"], json!("tok"));

    let admin = Context::for_user(CallerUser::new(id_of(&user)).with_role("r1", "Admin"));
    let err = controller
        .get_objects(
            &admin,
            SESSION_CLASS,
            &WhereClause::new(),
            &Select::fields(["accessToken"]),
            &FindOptions::new(),
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Permission);
}

// =============================================================================
// Custom Hooks
// =============================================================================

/// Data upserted by a Before-hook is what gets persisted.
#[tokio::test]
async fn test_before_hook_rewrites_data() {
    let hooks = HookRegistry::builder()
        .register("Post", OperationType::BeforeCreate, 0, UppercaseTitle)
        .register("Post", OperationType::BeforeUpdate, 0, UppercaseTitle)
        .build();
    let (controller, _adapter) = setup(Some(hooks)).await;
    let root = Context::root();
    let title = Select::fields(["title"]);

    let post = controller
        .create_object(&root, "Post", object(json!({ "title": "quiet" })), &title)
        .await
        .unwrap();
    assert_eq!(post["title"], json!("QUIET"));

    let updated = controller
        .update_objects(
            &root,
            "Post",
            &WhereClause::new(),
            object(json!({ "title": "again" })),
            &title,
        )
        .await
        .unwrap();
    assert_eq!(updated[0]["title"], json!("AGAIN"));
}

/// A failing Before-hook aborts the write before the adapter is called.
#[tokio::test]
async fn test_failing_hook_aborts_write() {
    let hooks = HookRegistry::builder()
        .register("Post", OperationType::BeforeCreate, 0, Reject)
        .build();
    let (controller, adapter) = setup(Some(hooks)).await;

    let err = controller
        .create_object(&Context::root(), "Post", object(json!({})), &Select::All)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Validation);
    assert_eq!(adapter.count("create_object"), 0);
}

/// A caller without write access never reaches the update hooks, and the
/// targets of its relation verbs are not created.
#[tokio::test]
async fn test_update_hooks_only_see_writable_objects() {
    let (before, before_calls) = CountCalls::new();
    let hooks = HookRegistry::builder()
        .register("Post", OperationType::BeforeUpdate, 0, before)
        .build();
    let (controller, adapter) = setup(Some(hooks)).await;

    let post = controller
        .create_object(
            &Context::root(),
            "Post",
            object(json!({
                "title": "owned",
                "acl": { "users": [{ "userId": "u1", "read": true, "write": true }], "roles": [] }
            })),
            &Select::id_only(),
        )
        .await
        .unwrap();
    let id = id_of(&post);
    adapter.reset();

    let stranger = Context::for_user(CallerUser::new("u2"));
    let err = controller
        .update_object(
            &stranger,
            "Post",
            &id,
            object(json!({
                "title": "taken",
                "readers": { "createAndAdd": [{ "email": "x@example.com" }] }
            })),
            &Select::All,
        )
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(before_calls.load(Ordering::SeqCst), 0);
    assert_eq!(adapter.calls(), vec!["get_object"]);

    let owner = Context::for_user(CallerUser::new("u1"));
    controller
        .update_object(&owner, "Post", &id, object(json!({ "title": "kept" })), &Select::id_only())
        .await
        .unwrap();
    assert_eq!(before_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_after_read_runs_per_object() {
    let calls = Arc::new(AtomicUsize::new(0));
    let hooks = HookRegistry::builder()
        .register("Post", OperationType::AfterRead, 0, CountCalls(Arc::clone(&calls)))
        .build();
    let (controller, _adapter) = setup(Some(hooks)).await;
    let root = Context::root();

    let data = (0..3).map(|n| object(json!({ "views": n }))).collect();
    controller
        .create_objects(&root, "Post", data, &Select::id_only())
        .await
        .unwrap();
    // The final fetch of the created objects is a read too
    assert_eq!(calls.load(Ordering::SeqCst), 3);

    controller
        .get_objects(&root, "Post", &WhereClause::new(), &Select::All, &FindOptions::new())
        .await
        .unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 6);
}

/// After-hooks may call back into the controller.
#[tokio::test]
async fn test_after_delete_cascades() {
    let hooks = HookRegistry::builder()
        .with_defaults(&schema())
        .register(USER_CLASS, OperationType::AfterDelete, 0, DeleteSessions)
        .build();
    let (controller, _adapter) = setup(Some(hooks)).await;
    let root = Context::root();

    let user = controller
        .create_object(&root, USER_CLASS, object(json!({ "email": "a@b.co" })), &Select::id_only())
        .await
        .unwrap();
    let user_id = id_of(&user);

    let sessions = (0..2)
        .map(|_| object(json!({ "user": user_id })))
        .collect();
    controller
        .create_objects(&root, SESSION_CLASS, sessions, &Select::id_only())
        .await
        .unwrap();

    controller
        .delete_object(&root, USER_CLASS, &user_id, &Select::id_only())
        .await
        .unwrap();

    assert_eq!(
        controller
            .count(&root, SESSION_CLASS, &WhereClause::new())
            .await
            .unwrap(),
        0
    );
}
