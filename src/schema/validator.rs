//! Schema validator for controller inputs
//!
//! Validation semantics:
//! - Every written field and every field a query references is declared
//! - Written values match their field descriptor, without coercion
//! - Required fields are present on create
//! - `null` unsets an optional field
//!
//! Pointer and relation fields also accept the relation verbs
//! (`link`, `createAndLink`, `add`, `remove`, `createAndAdd`); the
//! objects they create are validated against their own class when created.

use std::sync::OnceLock;

use chrono::DateTime;
use regex::Regex;
use serde_json::{Map, Value};

use super::errors::{SchemaError, SchemaResult};
use super::registry::SchemaRegistry;
use super::types::{ArrayElement, ClassSchema, FieldType, Fields, PrimitiveType};
use crate::query::{json_type_name, Select, WhereClause};

static EMAIL_PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
static PHONE_PATTERN: OnceLock<Option<Regex>> = OnceLock::new();

fn email_pattern() -> Option<&'static Regex> {
    EMAIL_PATTERN
        .get_or_init(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").ok())
        .as_ref()
}

fn phone_pattern() -> Option<&'static Regex> {
    PHONE_PATTERN
        .get_or_init(|| Regex::new(r"^\+?[0-9][0-9 ().-]{5,19}$").ok())
        .as_ref()
}

/// Whether a write creates an object or patches an existing one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    Create,
    Update,
}

/// Validates controller inputs against the schema registry.
///
/// Validator does not mutate its inputs.
pub struct SchemaValidator<'a> {
    registry: &'a SchemaRegistry,
}

impl<'a> SchemaValidator<'a> {
    pub fn new(registry: &'a SchemaRegistry) -> Self {
        Self { registry }
    }

    /// Resolves a class, failing for undeclared names
    pub fn class(&self, class_name: &str) -> SchemaResult<&'a ClassSchema> {
        self.registry.class(class_name)
    }

    /// Validates data written to `class_name`.
    ///
    /// # Errors
    ///
    /// - `UnknownClass` if the class is not declared
    /// - `UnknownField` for undeclared keys
    /// - `TypeMismatch` for values not matching their descriptor
    /// - `MissingRequiredField` on create when a required field is absent
    pub fn validate_data(
        &self,
        class_name: &str,
        data: &Map<String, Value>,
        mode: WriteMode,
    ) -> SchemaResult<()> {
        let class = self.class(class_name)?;

        for (key, value) in data {
            if key == "id" {
                continue;
            }

            let def = class
                .field(key)
                .ok_or_else(|| SchemaError::unknown_field(&class.name, key))?;

            if value.is_null() {
                if def.required {
                    return Err(SchemaError::MissingRequiredField {
                        class_name: class.name.clone(),
                        field: key.clone(),
                    });
                }
                continue;
            }

            validate_top_level(&class.name, key, value, &def.field_type)?;
        }

        if mode == WriteMode::Create {
            for (name, def) in &class.fields {
                if def.required && data.get(name).map_or(true, Value::is_null) {
                    return Err(SchemaError::MissingRequiredField {
                        class_name: class.name.clone(),
                        field: name.clone(),
                    });
                }
            }
        }

        Ok(())
    }

    /// Every top-level field a where-clause references must be declared,
    /// `id` aside.
    pub fn validate_where(&self, class_name: &str, clause: &WhereClause) -> SchemaResult<()> {
        let class = self.class(class_name)?;

        match clause
            .referenced_fields()
            .into_iter()
            .find(|field| *field != "id" && !class.has_field(field))
        {
            Some(field) => Err(SchemaError::unknown_field(&class.name, field)),
            None => Ok(()),
        }
    }

    /// Every selected field must be declared.
    pub fn validate_select(&self, class_name: &str, select: &Select) -> SchemaResult<()> {
        let class = self.class(class_name)?;

        if let Select::Fields(fields) = select {
            if let Some(field) = fields.iter().find(|f| *f != "id" && !class.has_field(f)) {
                return Err(SchemaError::unknown_field(&class.name, field.as_str()));
            }
        }
        Ok(())
    }
}

fn make_path(prefix: &str, field: &str) -> String {
    if prefix.is_empty() {
        field.to_string()
    } else {
        format!("{}.{}", prefix, field)
    }
}

fn mismatch(class_name: &str, path: &str, expected: &'static str, value: &Value) -> SchemaError {
    SchemaError::type_mismatch(class_name, path, expected, json_type_name(value))
}

/// Top-level values may carry relation verbs
fn validate_top_level(
    class_name: &str,
    field: &str,
    value: &Value,
    field_type: &FieldType,
) -> SchemaResult<()> {
    match field_type {
        FieldType::Pointer { .. } => validate_pointer(class_name, field, value),
        FieldType::Relation { .. } => validate_relation(class_name, field, value),
        other => validate_value(class_name, field, value, other),
    }
}

fn validate_pointer(class_name: &str, path: &str, value: &Value) -> SchemaResult<()> {
    const EXPECTED: &str = "pointer (id, link or createAndLink)";

    match value {
        Value::String(_) => Ok(()),
        Value::Object(verb) if verb.len() == 1 => match verb.iter().next() {
            Some((key, Value::String(_))) if key == "link" => Ok(()),
            Some((key, Value::Object(_))) if key == "createAndLink" => Ok(()),
            _ => Err(mismatch(class_name, path, EXPECTED, value)),
        },
        _ => Err(mismatch(class_name, path, EXPECTED, value)),
    }
}

fn validate_relation(class_name: &str, path: &str, value: &Value) -> SchemaResult<()> {
    const EXPECTED: &str = "relation (ids, add, remove or createAndAdd)";

    let all_strings = |items: &Value| {
        items
            .as_array()
            .map_or(false, |items| items.iter().all(Value::is_string))
    };
    let all_objects = |items: &Value| {
        items
            .as_array()
            .map_or(false, |items| items.iter().all(Value::is_object))
    };

    let valid = match value {
        Value::Array(_) => all_strings(value),
        Value::Object(verbs) if !verbs.is_empty() => verbs.iter().all(|(verb, items)| {
            match verb.as_str() {
                "add" | "remove" => all_strings(items),
                "createAndAdd" => all_objects(items),
                _ => false,
            }
        }),
        _ => false,
    };

    if valid {
        Ok(())
    } else {
        Err(mismatch(class_name, path, EXPECTED, value))
    }
}

fn validate_fields(
    class_name: &str,
    object: &Map<String, Value>,
    fields: &Fields,
    prefix: &str,
) -> SchemaResult<()> {
    for key in object.keys() {
        if !fields.contains_key(key) {
            return Err(SchemaError::unknown_field(class_name, make_path(prefix, key)));
        }
    }

    for (name, def) in fields {
        let path = make_path(prefix, name);
        match object.get(name) {
            Some(Value::Null) | None => {
                if def.required {
                    return Err(SchemaError::MissingRequiredField {
                        class_name: class_name.to_string(),
                        field: path,
                    });
                }
            }
            Some(value) => validate_value(class_name, &path, value, &def.field_type)?,
        }
    }

    Ok(())
}

fn validate_value(
    class_name: &str,
    path: &str,
    value: &Value,
    field_type: &FieldType,
) -> SchemaResult<()> {
    match field_type {
        FieldType::Primitive(primitive) => validate_primitive(class_name, path, value, *primitive),
        FieldType::Object(fields) => {
            let object = value
                .as_object()
                .ok_or_else(|| mismatch(class_name, path, "object", value))?;
            validate_fields(class_name, object, fields, path)
        }
        FieldType::Array(element) => {
            let items = value
                .as_array()
                .ok_or_else(|| mismatch(class_name, path, "array", value))?;

            for (i, item) in items.iter().enumerate() {
                let item_path = format!("{}[{}]", path, i);
                match element {
                    ArrayElement::Primitive(primitive) => {
                        validate_primitive(class_name, &item_path, item, *primitive)?
                    }
                    ArrayElement::Object(fields) => {
                        let object = item
                            .as_object()
                            .ok_or_else(|| mismatch(class_name, &item_path, "object", item))?;
                        validate_fields(class_name, object, fields, &item_path)?
                    }
                }
            }
            Ok(())
        }
        // Nested references are stored ids
        FieldType::Pointer { .. } => match value {
            Value::String(_) => Ok(()),
            _ => Err(mismatch(class_name, path, "pointer", value)),
        },
        FieldType::Relation { .. } => {
            let ids = value.as_array().filter(|ids| ids.iter().all(Value::is_string));
            match ids {
                Some(_) => Ok(()),
                None => Err(mismatch(class_name, path, "relation", value)),
            }
        }
    }
}

fn validate_primitive(
    class_name: &str,
    path: &str,
    value: &Value,
    primitive: PrimitiveType,
) -> SchemaResult<()> {
    let valid = match primitive {
        PrimitiveType::String => value.is_string(),
        PrimitiveType::Int => value.is_i64() || value.is_u64(),
        PrimitiveType::Float => value.is_number(),
        PrimitiveType::Boolean => value.is_boolean(),
        PrimitiveType::Date => value
            .as_str()
            .map_or(false, |s| DateTime::parse_from_rfc3339(s).is_ok()),
        PrimitiveType::Email => value
            .as_str()
            .zip(email_pattern())
            .map_or(false, |(s, re)| re.is_match(s)),
        PrimitiveType::Phone => value
            .as_str()
            .zip(phone_pattern())
            .map_or(false, |(s, re)| re.is_match(s)),
        PrimitiveType::File => value.is_string(),
    };

    if valid {
        Ok(())
    } else {
        Err(mismatch(class_name, path, primitive.type_name(), value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::types::FieldDef;
    use serde_json::json;

    fn registry() -> SchemaRegistry {
        SchemaRegistry::new(vec![ClassSchema::new("Post")
            .with_field("title", FieldDef::string().required())
            .with_field("views", FieldDef::int())
            .with_field("rating", FieldDef::float())
            .with_field("publishedAt", FieldDef::date())
            .with_field("contact", FieldDef::email())
            .with_field("phone", FieldDef::phone())
            .with_field("tags", FieldDef::array_of(PrimitiveType::String))
            .with_field(
                "items",
                FieldDef::array_of_objects(Fields::from([(
                    "name".to_string(),
                    FieldDef::string().required(),
                )])),
            )
            .with_field("author", FieldDef::pointer("User"))
            .with_field("readers", FieldDef::relation("User"))])
        .unwrap()
    }

    fn data(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_valid_create() {
        let registry = registry();
        let validator = SchemaValidator::new(&registry);

        let result = validator.validate_data(
            "Post",
            &data(json!({
                "title": "Hello",
                "views": 3,
                "rating": 4.5,
                "publishedAt": "2024-01-01T00:00:00Z",
                "contact": "a@b.co",
                "phone": "+33 6 12 34 56 78",
                "tags": ["a", "b"],
                "items": [{ "name": "x" }],
                "author": { "link": "u1" },
                "readers": { "add": ["u1"], "remove": ["u2"] }
            })),
            WriteMode::Create,
        );
        assert!(result.is_ok(), "{:?}", result);
    }

    #[test]
    fn test_missing_required_only_on_create() {
        let registry = registry();
        let validator = SchemaValidator::new(&registry);
        let patch = data(json!({ "views": 1 }));

        assert!(matches!(
            validator.validate_data("Post", &patch, WriteMode::Create),
            Err(SchemaError::MissingRequiredField { .. })
        ));
        assert!(validator.validate_data("Post", &patch, WriteMode::Update).is_ok());
    }

    #[test]
    fn test_unknown_field_rejected() {
        let registry = registry();
        let validator = SchemaValidator::new(&registry);

        let err = validator
            .validate_data("Post", &data(json!({ "nope": 1 })), WriteMode::Update)
            .unwrap_err();
        assert_eq!(err, SchemaError::unknown_field("Post", "nope"));
    }

    #[test]
    fn test_no_type_coercion() {
        let registry = registry();
        let validator = SchemaValidator::new(&registry);

        for bad in [
            json!({ "views": "3" }),
            json!({ "views": 1.5 }),
            json!({ "publishedAt": "yesterday" }),
            json!({ "contact": "not-an-email" }),
            json!({ "tags": ["a", 1] }),
            json!({ "items": [{ "name": "x", "extra": 1 }] }),
            json!({ "author": 42 }),
            json!({ "readers": { "replace": ["u1"] } }),
        ] {
            let result = validator.validate_data("Post", &data(bad.clone()), WriteMode::Update);
            assert!(result.is_err(), "{} should be rejected", bad);
        }
    }

    #[test]
    fn test_where_and_select_fields_must_be_declared() {
        let registry = registry();
        let validator = SchemaValidator::new(&registry);

        let clause = WhereClause::from_json(&json!({
            "id": { "equalTo": "x" },
            "OR": [{ "title": { "equalTo": "a" } }]
        }))
        .unwrap();
        assert!(validator.validate_where("Post", &clause).is_ok());

        let clause = WhereClause::from_json(&json!({ "secret": { "exists": true } })).unwrap();
        assert!(validator.validate_where("Post", &clause).is_err());

        assert!(validator
            .validate_select("Post", &Select::fields(["title", "id"]))
            .is_ok());
        assert!(validator
            .validate_select("Post", &Select::fields(["secret"]))
            .is_err());
    }

    #[test]
    fn test_unknown_class() {
        let registry = registry();
        let validator = SchemaValidator::new(&registry);

        assert_eq!(
            validator
                .validate_data("Nope", &Map::new(), WriteMode::Create)
                .unwrap_err(),
            SchemaError::UnknownClass("Nope".into())
        );
    }
}
