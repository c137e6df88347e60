//! Relation/Pointer Resolver
//!
//! Translates relationship verbs written on pointer and relation fields into
//! primitive controller calls and stored id values.
//!
//! | field | verb | stored value |
//! |---|---|---|
//! | pointer | `"id"` or `{ link: id }` | `id` |
//! | pointer | `{ createAndLink: {..} }` | id of the created target |
//! | relation | `[ids]` | `[ids]` |
//! | relation | `{ createAndAdd: [{..}] }` | ids of the created targets |
//! | relation | `{ add: [ids] }` | current ids followed by `ids` |
//! | relation | `{ remove: [ids] }` | current ids without `ids` |
//!
//! Resolution runs in two steps: [`RelationResolver::resolve_creations`]
//! performs the nested creations once per write, then
//! [`apply_relation_verbs`] merges `add` / `remove` into the current array of
//! each target object. On the create path there is no current array: `add`
//! passes its ids through and `remove` yields an empty list.
//!
//! `add` does not de-duplicate.

use serde_json::Value;
use tracing::warn;

use crate::adapter::Object;
use crate::core::{Context, ControllerResult, DatabaseController};
use crate::schema::{ClassSchema, FieldType};

const LINK: &str = "link";
const CREATE_AND_LINK: &str = "createAndLink";
const ADD: &str = "add";
const REMOVE: &str = "remove";
const CREATE_AND_ADD: &str = "createAndAdd";

/// Performs the nested creations requested by relation verbs
pub struct RelationResolver<'a> {
    controller: &'a DatabaseController,
    context: &'a Context,
}

impl<'a> RelationResolver<'a> {
    pub fn new(controller: &'a DatabaseController, context: &'a Context) -> Self {
        Self {
            controller,
            context,
        }
    }

    /// Resolves pointer verbs to ids and replaces a `createAndAdd` relation
    /// with the ids of the created targets. `add` / `remove` are left for
    /// [`apply_relation_verbs`].
    pub async fn resolve_creations(
        &self,
        class: &ClassSchema,
        mut data: Object,
    ) -> ControllerResult<Object> {
        for (field, def) in &class.fields {
            let value = match data.get_mut(field) {
                Some(value) => value,
                None => continue,
            };

            match &def.field_type {
                FieldType::Pointer { class: target } => {
                    if let Some(resolved) = self.resolve_pointer(target, value).await? {
                        *value = resolved;
                    }
                }
                FieldType::Relation { class: target } => {
                    let verbs = match value.as_object_mut() {
                        Some(verbs) => verbs,
                        None => continue,
                    };

                    let items = match verbs.remove(CREATE_AND_ADD) {
                        Some(Value::Array(items)) => items,
                        _ => continue,
                    };
                    if !verbs.is_empty() {
                        warn!(field = field.as_str(), "verbs next to createAndAdd are ignored");
                    }

                    let objects = items
                        .into_iter()
                        .filter_map(|item| match item {
                            Value::Object(object) => Some(object),
                            _ => None,
                        })
                        .collect();

                    let ids = self
                        .controller
                        .create_object_ids(self.context, target, objects)
                        .await?;
                    *value = Value::Array(ids.into_iter().map(Value::String).collect());
                }
                _ => {}
            }
        }

        Ok(data)
    }

    async fn resolve_pointer(&self, target: &str, value: &Value) -> ControllerResult<Option<Value>> {
        let verb = match value.as_object() {
            Some(verb) => verb,
            None => return Ok(None),
        };

        if let Some(id) = verb.get(LINK) {
            return Ok(Some(id.clone()));
        }

        match verb.get(CREATE_AND_LINK) {
            Some(Value::Object(object)) => {
                let id = self
                    .controller
                    .create_object_id(self.context, target, object.clone())
                    .await?;
                Ok(Some(Value::String(id)))
            }
            _ => Ok(None),
        }
    }
}

/// Whether `data` carries `add` / `remove` verbs needing the current value
pub fn has_relation_verbs(class: &ClassSchema, data: &Object) -> bool {
    data.iter().any(|(field, value)| {
        value.is_object()
            && matches!(
                class.field(field).map(|def| &def.field_type),
                Some(FieldType::Relation { .. })
            )
    })
}

/// Replaces `add` / `remove` verbs by the resulting id arrays.
///
/// `current` is the stored object the write applies to, `None` on the
/// create path. The current array is read one level deep, `current[field]`.
pub fn apply_relation_verbs(class: &ClassSchema, mut data: Object, current: Option<&Object>) -> Object {
    for (field, value) in data.iter_mut() {
        let is_relation = matches!(
            class.field(field).map(|def| &def.field_type),
            Some(FieldType::Relation { .. })
        );
        let verbs = match value {
            Value::Object(verbs) if is_relation => verbs,
            _ => continue,
        };

        let mut ids: Option<Vec<String>> = current.map(|object| string_list(object.get(field)));

        if let Some(added) = verbs.get(ADD) {
            ids = Some(add_ids(ids.as_deref(), &string_list(Some(added))));
        }
        if let Some(removed) = verbs.get(REMOVE) {
            ids = Some(remove_ids(ids.as_deref(), &string_list(Some(removed))));
        }

        *value = Value::Array(ids.unwrap_or_default().into_iter().map(Value::String).collect());
    }

    data
}

/// Appends `ids` to the current list; without one, `ids` pass through.
pub fn add_ids(current: Option<&[String]>, ids: &[String]) -> Vec<String> {
    match current {
        Some(current) => current.iter().chain(ids).cloned().collect(),
        None => ids.to_vec(),
    }
}

/// Filters `ids` out of the current list; without one, the result is empty.
pub fn remove_ids(current: Option<&[String]>, ids: &[String]) -> Vec<String> {
    match current {
        Some(current) => current
            .iter()
            .filter(|id| !ids.contains(id))
            .cloned()
            .collect(),
        None => Vec::new(),
    }
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::FieldDef;
    use serde_json::json;

    fn strings(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    fn object(value: Value) -> Object {
        value.as_object().cloned().unwrap()
    }

    fn post() -> ClassSchema {
        ClassSchema::new("Post")
            .with_field("readers", FieldDef::relation("User"))
            .with_field("author", FieldDef::pointer("User"))
            .with_field("meta", FieldDef::object(Default::default()))
    }

    #[test]
    fn test_add_appends_without_dedupe() {
        let current = strings(&["a", "b", "c"]);

        assert_eq!(add_ids(Some(current.as_slice()), &strings(&["d"])), strings(&["a", "b", "c", "d"]));
        assert_eq!(add_ids(Some(current.as_slice()), &strings(&["a"])), strings(&["a", "b", "c", "a"]));
    }

    #[test]
    fn test_remove_filters() {
        let current = strings(&["a", "b", "c"]);
        assert_eq!(remove_ids(Some(current.as_slice()), &strings(&["b"])), strings(&["a", "c"]));
    }

    #[test]
    fn test_create_path() {
        assert_eq!(add_ids(None, &strings(&["x"])), strings(&["x"]));
        assert!(remove_ids(None, &strings(&["x"])).is_empty());
    }

    #[test]
    fn test_apply_verbs_on_update() {
        let current = object(json!({ "id": "p1", "readers": ["a", "b", "c"] }));

        let added = apply_relation_verbs(
            &post(),
            object(json!({ "readers": { "add": ["d"] } })),
            Some(&current),
        );
        assert_eq!(added["readers"], json!(["a", "b", "c", "d"]));

        let removed = apply_relation_verbs(
            &post(),
            object(json!({ "readers": { "remove": ["b"] } })),
            Some(&current),
        );
        assert_eq!(removed["readers"], json!(["a", "c"]));
    }

    #[test]
    fn test_apply_verbs_on_create() {
        let added = apply_relation_verbs(&post(), object(json!({ "readers": { "add": ["x"] } })), None);
        assert_eq!(added["readers"], json!(["x"]));

        let removed =
            apply_relation_verbs(&post(), object(json!({ "readers": { "remove": ["x"] } })), None);
        assert_eq!(removed["readers"], json!([]));
    }

    #[test]
    fn test_plain_values_untouched() {
        let data = object(json!({ "readers": ["a"], "meta": { "add": ["x"] } }));
        assert_eq!(apply_relation_verbs(&post(), data.clone(), None), data);
    }

    #[test]
    fn test_has_relation_verbs() {
        assert!(has_relation_verbs(&post(), &object(json!({ "readers": { "add": [] } }))));
        assert!(!has_relation_verbs(&post(), &object(json!({ "readers": ["a"] }))));
        assert!(!has_relation_verbs(&post(), &object(json!({ "meta": { "add": [] } }))));
    }
}
