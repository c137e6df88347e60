//! # Where-Clause Compiler
//!
//! Pure translation of a `WhereClause` into the document engine's native
//! filter: a Mongo-shaped document using `$eq`, `$in`, `$elemMatch`, `$and`,
//! `$or` and friends, keyed by dot-joined field paths.
//!
//! | operator | native form |
//! |---|---|
//! | `equalTo` / `notEqualTo` | `$eq` / `$ne` |
//! | `greaterThan` .. `lessThanOrEqualTo` | `$gt` `$gte` `$lt` `$lte` |
//! | `in` / `notIn` | `$in` / `$nin` |
//! | `contains` scalar or list | `$all` |
//! | `contains` object | `$elemMatch` |
//! | `notContains` | `$not` of the above |
//! | `exists` | `$exists` |
//!
//! Operands of `false`, `0` or `""` are treated as an absent operator for
//! every operator except `in`, `notIn` and `exists`; an explicit `null` is
//! present. Nested objects are flattened one level at a time and keep only
//! the first compiled entry, with a single operator, of the inner clause.

use serde_json::{Map, Value};
use uuid::Uuid;

use crate::query::{Operator, WhereClause, WhereNode};

/// Native filter document
pub type NativeFilter = Map<String, Value>;

/// Primary-key field of stored documents
pub const PRIMARY_KEY: &str = "_id";

/// Compiles a where-clause. The empty clause compiles to `{}` (match all).
pub fn compile_where(clause: &WhereClause) -> NativeFilter {
    let mut filter = NativeFilter::new();

    for node in clause.nodes() {
        match node {
            WhereNode::Leaf {
                field,
                operator,
                value,
            } => compile_leaf(&mut filter, field, *operator, value),
            WhereNode::Nested { field, clause } => {
                let inner = compile_where(clause);
                if let Some((key, condition)) = inner.into_iter().next() {
                    filter.insert(format!("{}.{}", field, key), first_operator(condition));
                }
            }
            WhereNode::And(clauses) => {
                filter.insert("$and".to_string(), compile_list(clauses));
            }
            WhereNode::Or(clauses) => {
                filter.insert("$or".to_string(), compile_list(clauses));
            }
        }
    }

    filter
}

fn compile_list(clauses: &[WhereClause]) -> Value {
    Value::Array(
        clauses
            .iter()
            .map(|c| Value::Object(compile_where(c)))
            .collect(),
    )
}

fn compile_leaf(filter: &mut NativeFilter, field: &str, operator: Operator, value: &Value) {
    if !is_present(operator, value) {
        tracing::debug!(field, operator = operator.as_str(), "operand treated as absent");
        return;
    }

    let (key, value) = if field == "id" {
        (PRIMARY_KEY.to_string(), coerce_primary_key(value))
    } else {
        (field.to_string(), value.clone())
    };

    let (native_op, operand) = match operator {
        Operator::EqualTo => ("$eq", value),
        Operator::NotEqualTo => ("$ne", value),
        Operator::GreaterThan => ("$gt", value),
        Operator::GreaterThanOrEqualTo => ("$gte", value),
        Operator::LessThan => ("$lt", value),
        Operator::LessThanOrEqualTo => ("$lte", value),
        Operator::In => ("$in", value),
        Operator::NotIn => ("$nin", value),
        Operator::Exists => ("$exists", value),
        Operator::Contains => contains_condition(value),
        Operator::NotContains => {
            let (op, operand) = contains_condition(value);
            let mut inner = Map::new();
            inner.insert(op.to_string(), operand);
            ("$not", Value::Object(inner))
        }
    };

    let entry = filter
        .entry(key)
        .or_insert_with(|| Value::Object(Map::new()));
    if let Value::Object(ops) = entry {
        ops.insert(native_op.to_string(), operand);
    }
}

/// Object operands match array elements structurally; scalars and lists
/// require every given value to be present.
fn contains_condition(value: Value) -> (&'static str, Value) {
    match value {
        Value::Object(_) => ("$elemMatch", value),
        Value::Array(_) => ("$all", value),
        other => ("$all", Value::Array(vec![other])),
    }
}

fn is_present(operator: Operator, value: &Value) -> bool {
    match operator {
        Operator::Exists => value.is_boolean(),
        Operator::In | Operator::NotIn => value.is_array(),
        _ => !is_falsy(value),
    }
}

fn is_falsy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Null | Value::Array(_) | Value::Object(_) => false,
    }
}

/// Canonical primary-key form of public ids; lists are coerced elementwise.
fn coerce_primary_key(value: &Value) -> Value {
    match value {
        Value::String(s) => match Uuid::parse_str(s) {
            Ok(id) => Value::String(id.hyphenated().to_string()),
            Err(_) => Value::String(s.clone()),
        },
        Value::Array(items) => Value::Array(items.iter().map(coerce_primary_key).collect()),
        other => other.clone(),
    }
}

fn first_operator(condition: Value) -> Value {
    match condition {
        Value::Object(ops) if ops.len() > 1 && ops.keys().all(|k| k.starts_with('$')) => {
            Value::Object(ops.into_iter().take(1).collect())
        }
        other => other,
    }
}
