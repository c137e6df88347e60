//! Schema registry assembled once at boot
//!
//! User-declared classes are merged with the built-in classes (`User`,
//! `_Session`, `Role`, `_InternalConfig`). A user class sharing a built-in
//! name extends it: its fields, indexes and permissions are layered on top.
//! Every class implicitly carries `acl`, `createdAt` and `updatedAt`.
//!
//! The registry is immutable once built; the controller shares it behind an
//! `Arc`.

use std::collections::HashMap;

use super::errors::{SchemaError, SchemaResult};
use super::types::{ClassSchema, FieldDef, Fields, IndexDef, ProtectedField};

pub const USER_CLASS: &str = "User";
pub const SESSION_CLASS: &str = "_Session";
pub const ROLE_CLASS: &str = "Role";
pub const INTERNAL_CONFIG_CLASS: &str = "_InternalConfig";

/// Field holding the per-record access-control list
pub const ACL_FIELD: &str = "acl";
pub const CREATED_AT_FIELD: &str = "createdAt";
pub const UPDATED_AT_FIELD: &str = "updatedAt";

/// Immutable registry of every class known to the controller
#[derive(Debug, Clone)]
pub struct SchemaRegistry {
    classes: HashMap<String, ClassSchema>,
}

impl SchemaRegistry {
    /// Builds the registry from user-declared classes plus the built-ins.
    pub fn new(classes: impl IntoIterator<Item = ClassSchema>) -> SchemaResult<Self> {
        let mut registry: HashMap<String, ClassSchema> = builtin_classes()
            .into_iter()
            .map(|class| (class.name.clone(), class))
            .collect();

        let mut seen = Vec::new();
        for class in classes {
            if seen.contains(&class.name) {
                return Err(SchemaError::invalid_class(
                    &class.name,
                    "class declared more than once",
                ));
            }
            seen.push(class.name.clone());

            match registry.get_mut(&class.name) {
                Some(builtin) => merge_into(builtin, class),
                None => {
                    registry.insert(class.name.clone(), class);
                }
            }
        }

        for class in registry.values_mut() {
            add_implicit_fields(class);
        }

        let registry = Self { classes: registry };
        registry.validate_structure()?;
        Ok(registry)
    }

    /// Registry containing only the built-in classes
    pub fn builtin() -> SchemaResult<Self> {
        Self::new(Vec::new())
    }

    /// Gets a class by name.
    pub fn class(&self, name: &str) -> SchemaResult<&ClassSchema> {
        self.classes
            .get(name)
            .ok_or_else(|| SchemaError::UnknownClass(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.classes.contains_key(name)
    }

    /// Returns all classes.
    pub fn classes(&self) -> impl Iterator<Item = &ClassSchema> {
        self.classes.values()
    }

    pub fn class_count(&self) -> usize {
        self.classes.len()
    }

    fn validate_structure(&self) -> SchemaResult<()> {
        for class in self.classes.values() {
            if class.name.is_empty() {
                return Err(SchemaError::invalid_class("", "class name must not be empty"));
            }

            if class.fields.contains_key("id") {
                return Err(SchemaError::invalid_class(
                    &class.name,
                    "'id' is reserved for the primary key",
                ));
            }

            for (name, def) in &class.fields {
                if let Some(target) = def.field_type.target_class() {
                    if !self.classes.contains_key(target) {
                        return Err(SchemaError::invalid_class(
                            &class.name,
                            format!("field '{}' references unknown class {}", name, target),
                        ));
                    }
                }
            }

            for index in &class.indexes {
                if !class.fields.contains_key(&index.field) {
                    return Err(SchemaError::invalid_class(
                        &class.name,
                        format!("index on undeclared field '{}'", index.field),
                    ));
                }
            }
        }

        Ok(())
    }
}

fn merge_into(builtin: &mut ClassSchema, user: ClassSchema) {
    builtin.fields.extend(user.fields);
    builtin.indexes.extend(user.indexes);
    builtin.searchable_fields.extend(user.searchable_fields);

    let permissions = user.permissions;
    if permissions.create.is_some() {
        builtin.permissions.create = permissions.create;
    }
    if permissions.read.is_some() {
        builtin.permissions.read = permissions.read;
    }
    if permissions.update.is_some() {
        builtin.permissions.update = permissions.update;
    }
    if permissions.delete.is_some() {
        builtin.permissions.delete = permissions.delete;
    }

    if user.description.is_some() {
        builtin.description = user.description;
    }
}

fn add_implicit_fields(class: &mut ClassSchema) {
    class
        .fields
        .entry(ACL_FIELD.to_string())
        .or_insert_with(acl_field);
    class
        .fields
        .entry(CREATED_AT_FIELD.to_string())
        .or_insert_with(FieldDef::date);
    class
        .fields
        .entry(UPDATED_AT_FIELD.to_string())
        .or_insert_with(FieldDef::date);
}

/// `{ users: [{userId, read, write}], roles: [{roleId, read, write}] }`
fn acl_field() -> FieldDef {
    let grant = |key: &str| -> Fields {
        Fields::from([
            (key.to_string(), FieldDef::string().required()),
            ("read".to_string(), FieldDef::boolean().required()),
            ("write".to_string(), FieldDef::boolean().required()),
        ])
    };

    FieldDef::object(Fields::from([
        ("users".to_string(), FieldDef::array_of_objects(grant("userId"))),
        ("roles".to_string(), FieldDef::array_of_objects(grant("roleId"))),
    ]))
}

fn builtin_classes() -> Vec<ClassSchema> {
    vec![
        ClassSchema::new(USER_CLASS)
            .with_field("email", FieldDef::email())
            .with_field("role", FieldDef::pointer(ROLE_CLASS))
            .with_field("sessions", FieldDef::relation(SESSION_CLASS))
            .with_field("provider", FieldDef::string())
            .with_field("isOauth", FieldDef::boolean())
            .with_index(IndexDef::ascending("email").unique()),
        ClassSchema::new(SESSION_CLASS)
            .with_field("user", FieldDef::pointer(USER_CLASS).required())
            .with_field(
                "accessToken",
                FieldDef::string().protected(ProtectedField::root_only()),
            )
            .with_field("accessTokenExpiresAt", FieldDef::date())
            .with_field(
                "refreshToken",
                FieldDef::string().protected(ProtectedField::root_only()),
            )
            .with_field("refreshTokenExpiresAt", FieldDef::date()),
        ClassSchema::new(ROLE_CLASS)
            .with_field("name", FieldDef::string().required())
            .with_field("users", FieldDef::relation(USER_CLASS))
            .with_index(IndexDef::ascending("name").unique()),
        ClassSchema::new(INTERNAL_CONFIG_CLASS)
            .with_field("configKey", FieldDef::string().required())
            .with_field("configValue", FieldDef::string().required())
            .with_field("description", FieldDef::string())
            .with_index(IndexDef::ascending("configKey").unique()),
    ]
}
