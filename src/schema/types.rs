//! Class schema type definitions
//!
//! Field descriptors are an explicit sum type. Every consumer matches on
//! `FieldType` exhaustively instead of branching on a string tag.
//!
//! Supported field kinds:
//! - primitive: string, int, float, boolean, date, email, phone, file
//! - array: of a primitive or of nested objects
//! - object: nested field map
//! - pointer: single reference to another class by id
//! - relation: many references to another class

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Role marker that restricts a protected field to root contexts.
pub const ROOT_ONLY: &str = "rootOnly";

/// Ordered field map of a class or of a nested object.
pub type Fields = BTreeMap<String, FieldDef>;

/// Scalar value kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PrimitiveType {
    String,
    Int,
    Float,
    Boolean,
    /// RFC 3339 timestamp stored as a string
    Date,
    Email,
    Phone,
    /// File reference (url or storage key) stored as a string
    File,
}

impl PrimitiveType {
    /// Returns the type name for error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            PrimitiveType::String => "string",
            PrimitiveType::Int => "int",
            PrimitiveType::Float => "float",
            PrimitiveType::Boolean => "boolean",
            PrimitiveType::Date => "date",
            PrimitiveType::Email => "email",
            PrimitiveType::Phone => "phone",
            PrimitiveType::File => "file",
        }
    }
}

/// Element type of an array field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ArrayElement {
    Primitive(PrimitiveType),
    Object(Fields),
}

/// Field descriptor variants
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FieldType {
    Primitive(PrimitiveType),
    Array(ArrayElement),
    Object(Fields),
    Pointer { class: String },
    Relation { class: String },
}

impl FieldType {
    /// Returns the type name for error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            FieldType::Primitive(p) => p.type_name(),
            FieldType::Array(_) => "array",
            FieldType::Object(_) => "object",
            FieldType::Pointer { .. } => "pointer",
            FieldType::Relation { .. } => "relation",
        }
    }

    /// Target class of a pointer or relation field
    pub fn target_class(&self) -> Option<&str> {
        match self {
            FieldType::Pointer { class } | FieldType::Relation { class } => Some(class),
            FieldType::Primitive(_) | FieldType::Array(_) | FieldType::Object(_) => None,
        }
    }
}

/// Operations a protected field can be guarded for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ProtectedOperation {
    Create,
    Read,
    Update,
}

/// Protection metadata attached to a field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProtectedField {
    /// Role names allowed to touch the field. `ROOT_ONLY` restricts it to root.
    pub authorized_roles: Vec<String>,
    pub protected_operations: Vec<ProtectedOperation>,
}

impl ProtectedField {
    pub fn new(
        authorized_roles: impl IntoIterator<Item = impl Into<String>>,
        protected_operations: impl IntoIterator<Item = ProtectedOperation>,
    ) -> Self {
        Self {
            authorized_roles: authorized_roles.into_iter().map(Into::into).collect(),
            protected_operations: protected_operations.into_iter().collect(),
        }
    }

    /// Field readable and writable by root contexts only
    pub fn root_only() -> Self {
        Self::new(
            [ROOT_ONLY],
            [
                ProtectedOperation::Create,
                ProtectedOperation::Read,
                ProtectedOperation::Update,
            ],
        )
    }

    pub fn protects(&self, operation: ProtectedOperation) -> bool {
        self.protected_operations.contains(&operation)
    }

    pub fn is_root_only(&self) -> bool {
        self.authorized_roles.iter().any(|r| r == ROOT_ONLY)
    }
}

/// Field definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldDef {
    /// Field data type
    #[serde(rename = "type")]
    pub field_type: FieldType,
    /// Whether field must be present on create
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protected: Option<ProtectedField>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl FieldDef {
    pub fn new(field_type: FieldType) -> Self {
        Self {
            field_type,
            required: false,
            protected: None,
            description: None,
        }
    }

    pub fn primitive(primitive: PrimitiveType) -> Self {
        Self::new(FieldType::Primitive(primitive))
    }

    pub fn string() -> Self {
        Self::primitive(PrimitiveType::String)
    }

    pub fn int() -> Self {
        Self::primitive(PrimitiveType::Int)
    }

    pub fn float() -> Self {
        Self::primitive(PrimitiveType::Float)
    }

    pub fn boolean() -> Self {
        Self::primitive(PrimitiveType::Boolean)
    }

    pub fn date() -> Self {
        Self::primitive(PrimitiveType::Date)
    }

    pub fn email() -> Self {
        Self::primitive(PrimitiveType::Email)
    }

    pub fn phone() -> Self {
        Self::primitive(PrimitiveType::Phone)
    }

    pub fn file() -> Self {
        Self::primitive(PrimitiveType::File)
    }

    /// Array of scalars
    pub fn array_of(primitive: PrimitiveType) -> Self {
        Self::new(FieldType::Array(ArrayElement::Primitive(primitive)))
    }

    /// Array of nested objects
    pub fn array_of_objects(fields: Fields) -> Self {
        Self::new(FieldType::Array(ArrayElement::Object(fields)))
    }

    pub fn object(fields: Fields) -> Self {
        Self::new(FieldType::Object(fields))
    }

    pub fn pointer(class: impl Into<String>) -> Self {
        Self::new(FieldType::Pointer {
            class: class.into(),
        })
    }

    pub fn relation(class: impl Into<String>) -> Self {
        Self::new(FieldType::Relation {
            class: class.into(),
        })
    }

    /// Mark the field as required
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Attach protection metadata
    pub fn protected(mut self, protected: ProtectedField) -> Self {
        self.protected = Some(protected);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Sort direction of an index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum IndexOrder {
    Ascending,
    Descending,
}

/// Index declared on a class field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexDef {
    pub field: String,
    pub order: IndexOrder,
    #[serde(default)]
    pub unique: bool,
}

impl IndexDef {
    pub fn ascending(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            order: IndexOrder::Ascending,
            unique: false,
        }
    }

    pub fn descending(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            order: IndexOrder::Descending,
            unique: false,
        }
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }
}

/// Operation a class-level permission rule applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PermissionOperation {
    Create,
    Read,
    Update,
    Delete,
}

/// Class-level permission rule
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionRule {
    /// Role names allowed; empty means any role
    #[serde(default)]
    pub authorized_roles: Vec<String>,
    #[serde(default)]
    pub require_authentication: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassPermissions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create: Option<PermissionRule>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read: Option<PermissionRule>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update: Option<PermissionRule>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delete: Option<PermissionRule>,
}

impl ClassPermissions {
    pub fn rule(&self, operation: PermissionOperation) -> Option<&PermissionRule> {
        match operation {
            PermissionOperation::Create => self.create.as_ref(),
            PermissionOperation::Read => self.read.as_ref(),
            PermissionOperation::Update => self.update.as_ref(),
            PermissionOperation::Delete => self.delete.as_ref(),
        }
    }

    fn rule_mut(&mut self, operation: PermissionOperation) -> &mut Option<PermissionRule> {
        match operation {
            PermissionOperation::Create => &mut self.create,
            PermissionOperation::Read => &mut self.read,
            PermissionOperation::Update => &mut self.update,
            PermissionOperation::Delete => &mut self.delete,
        }
    }
}

/// Declared object class
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassSchema {
    /// Unique class name
    pub name: String,
    pub fields: Fields,
    #[serde(default)]
    pub permissions: ClassPermissions,
    #[serde(default)]
    pub indexes: Vec<IndexDef>,
    #[serde(default)]
    pub searchable_fields: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ClassSchema {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Fields::new(),
            permissions: ClassPermissions::default(),
            indexes: Vec::new(),
            searchable_fields: Vec::new(),
            description: None,
        }
    }

    pub fn with_field(mut self, name: impl Into<String>, def: FieldDef) -> Self {
        self.fields.insert(name.into(), def);
        self
    }

    pub fn with_index(mut self, index: IndexDef) -> Self {
        self.indexes.push(index);
        self
    }

    pub fn with_permission(mut self, operation: PermissionOperation, rule: PermissionRule) -> Self {
        *self.permissions.rule_mut(operation) = Some(rule);
        self
    }

    pub fn with_searchable_fields(
        mut self,
        fields: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.searchable_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.get(name)
    }

    /// `id` is implicit on every class
    pub fn has_field(&self, name: &str) -> bool {
        name == "id" || self.fields.contains_key(name)
    }

    /// Fields carrying protection metadata
    pub fn protected_fields(&self) -> impl Iterator<Item = (&String, &ProtectedField)> {
        self.fields
            .iter()
            .filter_map(|(name, def)| def.protected.as_ref().map(|p| (name, p)))
    }
}
