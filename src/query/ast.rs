//! # Where-Clause Tree
//!
//! A where-clause is a list of nodes combined with AND semantics. Each node
//! is one of:
//! - `Leaf`: a single `field operator value` test
//! - `Nested`: a sub-clause on the fields of a nested object
//! - `And` / `Or`: explicit combinators over nested clauses
//!
//! The JSON wire shape is a recursive object where a field key maps to an
//! operator set (`{"age": {"greaterThan": 18}}`) or to a nested clause
//! (`{"address": {"city": {"equalTo": "Paris"}}}`), and the reserved keys
//! `AND` / `OR` map to lists of clauses.

use serde_json::{Map, Value};

use super::errors::{QueryError, QueryResult};

/// Reserved combinator keys
pub const AND_KEY: &str = "AND";
pub const OR_KEY: &str = "OR";

/// Field operators of the where-clause language
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    EqualTo,
    NotEqualTo,
    GreaterThan,
    GreaterThanOrEqualTo,
    LessThan,
    LessThanOrEqualTo,
    In,
    NotIn,
    Contains,
    NotContains,
    Exists,
}

impl Operator {
    pub const ALL: [Operator; 11] = [
        Operator::EqualTo,
        Operator::NotEqualTo,
        Operator::GreaterThan,
        Operator::GreaterThanOrEqualTo,
        Operator::LessThan,
        Operator::LessThanOrEqualTo,
        Operator::In,
        Operator::NotIn,
        Operator::Contains,
        Operator::NotContains,
        Operator::Exists,
    ];

    /// Wire name of the operator
    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::EqualTo => "equalTo",
            Operator::NotEqualTo => "notEqualTo",
            Operator::GreaterThan => "greaterThan",
            Operator::GreaterThanOrEqualTo => "greaterThanOrEqualTo",
            Operator::LessThan => "lessThan",
            Operator::LessThanOrEqualTo => "lessThanOrEqualTo",
            Operator::In => "in",
            Operator::NotIn => "notIn",
            Operator::Contains => "contains",
            Operator::NotContains => "notContains",
            Operator::Exists => "exists",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|op| op.as_str() == name)
    }
}

/// One node of a where-clause
#[derive(Debug, Clone, PartialEq)]
pub enum WhereNode {
    Leaf {
        field: String,
        operator: Operator,
        value: Value,
    },
    Nested {
        field: String,
        clause: WhereClause,
    },
    And(Vec<WhereClause>),
    Or(Vec<WhereClause>),
}

/// Recursive filter tree. An empty clause matches everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WhereClause {
    nodes: Vec<WhereNode>,
}

impl WhereClause {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_nodes(nodes: Vec<WhereNode>) -> Self {
        Self { nodes }
    }

    /// `{ field: { operator: value } }`
    pub fn leaf(field: impl Into<String>, operator: Operator, value: Value) -> Self {
        Self::from_nodes(vec![WhereNode::Leaf {
            field: field.into(),
            operator,
            value,
        }])
    }

    /// `{ field: clause }`
    pub fn nested(field: impl Into<String>, clause: WhereClause) -> Self {
        Self::from_nodes(vec![WhereNode::Nested {
            field: field.into(),
            clause,
        }])
    }

    /// `{ AND: [..] }`
    pub fn and(clauses: Vec<WhereClause>) -> Self {
        Self::from_nodes(vec![WhereNode::And(clauses)])
    }

    /// `{ OR: [..] }`
    pub fn or(clauses: Vec<WhereClause>) -> Self {
        Self::from_nodes(vec![WhereNode::Or(clauses)])
    }

    /// `{ id: { equalTo: id } }`
    pub fn id_equal_to(id: impl Into<String>) -> Self {
        Self::leaf("id", Operator::EqualTo, Value::String(id.into()))
    }

    /// `{ id: { in: ids } }`
    pub fn id_in<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let ids = ids
            .into_iter()
            .map(|id| Value::String(id.into()))
            .collect();
        Self::leaf("id", Operator::In, Value::Array(ids))
    }

    /// Adds a node to this clause (AND semantics)
    pub fn with(mut self, node: WhereNode) -> Self {
        self.nodes.push(node);
        self
    }

    pub fn nodes(&self) -> &[WhereNode] {
        &self.nodes
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Top-level field names referenced by this clause, looking through
    /// `AND` / `OR` combinators but not into nested objects.
    pub fn referenced_fields(&self) -> Vec<&str> {
        let mut fields = Vec::new();
        self.collect_fields(&mut fields);
        fields
    }

    fn collect_fields<'a>(&'a self, out: &mut Vec<&'a str>) {
        for node in &self.nodes {
            match node {
                WhereNode::Leaf { field, .. } | WhereNode::Nested { field, .. } => {
                    if !out.contains(&field.as_str()) {
                        out.push(field);
                    }
                }
                WhereNode::And(clauses) | WhereNode::Or(clauses) => {
                    for clause in clauses {
                        clause.collect_fields(out);
                    }
                }
            }
        }
    }

    /// Parses the JSON wire shape.
    ///
    /// `null` parses to the empty clause. Unknown operator keys are dropped
    /// with a warning rather than rejected.
    pub fn from_json(value: &Value) -> QueryResult<Self> {
        match value {
            Value::Null => Ok(Self::default()),
            Value::Object(map) => Self::from_map(map),
            other => Err(QueryError::malformed(format!(
                "where clause must be an object, got {}",
                json_type_name(other)
            ))),
        }
    }

    fn from_map(map: &Map<String, Value>) -> QueryResult<Self> {
        let mut nodes = Vec::new();

        for (key, value) in map {
            if key == AND_KEY || key == OR_KEY {
                let items = value.as_array().ok_or_else(|| {
                    QueryError::malformed(format!("{} expects a list of clauses", key))
                })?;
                let clauses = items
                    .iter()
                    .map(Self::from_json)
                    .collect::<QueryResult<Vec<_>>>()?;

                nodes.push(if key == AND_KEY {
                    WhereNode::And(clauses)
                } else {
                    WhereNode::Or(clauses)
                });
                continue;
            }

            let inner = value.as_object().ok_or_else(|| {
                QueryError::malformed(format!(
                    "field '{}' expects an operator set or a nested clause",
                    key
                ))
            })?;

            let has_operator = inner.keys().any(|k| Operator::from_name(k).is_some());
            if !has_operator && !inner.is_empty() && inner.values().all(Value::is_object) {
                nodes.push(WhereNode::Nested {
                    field: key.clone(),
                    clause: Self::from_map(inner)?,
                });
                continue;
            }

            for (op_name, operand) in inner {
                match Operator::from_name(op_name) {
                    Some(operator) => nodes.push(WhereNode::Leaf {
                        field: key.clone(),
                        operator,
                        value: operand.clone(),
                    }),
                    None => {
                        tracing::warn!(field = %key, operator = %op_name, "dropping unknown where operator");
                    }
                }
            }
        }

        Ok(Self { nodes })
    }

    /// Renders the clause back to its JSON wire shape.
    pub fn to_json(&self) -> Value {
        let mut out = Map::new();

        for node in &self.nodes {
            match node {
                WhereNode::Leaf {
                    field,
                    operator,
                    value,
                } => {
                    let entry = out
                        .entry(field.clone())
                        .or_insert_with(|| Value::Object(Map::new()));
                    if let Value::Object(ops) = entry {
                        ops.insert(operator.as_str().to_string(), value.clone());
                    }
                }
                WhereNode::Nested { field, clause } => {
                    let rendered = clause.to_json();
                    match (out.get_mut(field), rendered) {
                        (Some(Value::Object(existing)), Value::Object(extra)) => {
                            existing.extend(extra);
                        }
                        (_, rendered) => {
                            out.insert(field.clone(), rendered);
                        }
                    }
                }
                WhereNode::And(clauses) => {
                    out.insert(
                        AND_KEY.to_string(),
                        Value::Array(clauses.iter().map(WhereClause::to_json).collect()),
                    );
                }
                WhereNode::Or(clauses) => {
                    out.insert(
                        OR_KEY.to_string(),
                        Value::Array(clauses.iter().map(WhereClause::to_json).collect()),
                    );
                }
            }
        }

        Value::Object(out)
    }
}

pub(crate) fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) => {
            if n.is_i64() || n.is_u64() {
                "int"
            } else {
                "float"
            }
        }
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
