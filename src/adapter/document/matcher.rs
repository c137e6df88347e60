//! Native filter evaluation
//!
//! Evaluates compiled filters against stored documents with document-store
//! semantics:
//! - dot-joined paths fan out across arrays of objects
//! - a condition matches when any value reached by the path satisfies it
//! - array values also match scalar operands through their elements
//! - no type coercion between numbers and strings

use std::cmp::Ordering;

use serde_json::{Map, Value};

use super::compiler::NativeFilter;

/// Checks if a document matches a native filter
pub fn matches(document: &Map<String, Value>, filter: &NativeFilter) -> bool {
    filter.iter().all(|(key, condition)| match key.as_str() {
        "$and" => each_filter(condition).all(|f| matches(document, f)),
        "$or" => {
            let mut any = false;
            for f in each_filter(condition) {
                if matches(document, f) {
                    any = true;
                    break;
                }
            }
            any
        }
        path => {
            let candidates = values_at(document, path);
            matches_condition(&candidates, condition)
        }
    })
}

fn each_filter(value: &Value) -> impl Iterator<Item = &Map<String, Value>> {
    value
        .as_array()
        .into_iter()
        .flatten()
        .filter_map(Value::as_object)
}

/// Values reached by a dot-joined path. Missing paths yield no values.
pub fn values_at<'a>(document: &'a Map<String, Value>, path: &str) -> Vec<&'a Value> {
    let mut current: Vec<&Value> = Vec::new();
    let mut segments = path.split('.');

    match segments.next().and_then(|first| document.get(first)) {
        Some(value) => current.push(value),
        None => return current,
    }

    for segment in segments {
        let mut next = Vec::new();
        for value in current {
            match value {
                Value::Object(map) => next.extend(map.get(segment)),
                Value::Array(items) => next.extend(
                    items
                        .iter()
                        .filter_map(Value::as_object)
                        .filter_map(|item| item.get(segment)),
                ),
                _ => {}
            }
        }
        current = next;
    }

    current
}

fn is_operator_document(value: &Value) -> bool {
    match value {
        Value::Object(map) => !map.is_empty() && map.keys().all(|k| k.starts_with('$')),
        _ => false,
    }
}

fn matches_condition(candidates: &[&Value], condition: &Value) -> bool {
    match condition {
        Value::Object(ops) if is_operator_document(condition) => ops
            .iter()
            .all(|(op, operand)| matches_operator(candidates, op, operand)),
        literal => equals_any(candidates, literal),
    }
}

fn matches_operator(candidates: &[&Value], op: &str, operand: &Value) -> bool {
    match op {
        "$eq" => equals_any(candidates, operand),
        "$ne" => !equals_any(candidates, operand),
        "$gt" => compare_any(candidates, operand, |o| o == Ordering::Greater),
        "$gte" => compare_any(candidates, operand, |o| o != Ordering::Less),
        "$lt" => compare_any(candidates, operand, |o| o == Ordering::Less),
        "$lte" => compare_any(candidates, operand, |o| o != Ordering::Greater),
        "$in" => in_list(candidates, operand),
        "$nin" => !in_list(candidates, operand),
        "$all" => contains_all(candidates, operand),
        "$elemMatch" => elem_match(candidates, operand),
        "$exists" => operand.as_bool() == Some(!candidates.is_empty()),
        "$not" => !matches_condition(candidates, operand),
        other => {
            tracing::warn!(operator = other, "unsupported native operator");
            false
        }
    }
}

/// Null equality also matches missing values
fn equals_any(candidates: &[&Value], expected: &Value) -> bool {
    if candidates.is_empty() {
        return expected.is_null();
    }

    candidates.iter().any(|actual| {
        *actual == expected
            || matches!(actual, Value::Array(items) if items.contains(expected))
    })
}

fn in_list(candidates: &[&Value], list: &Value) -> bool {
    match list.as_array() {
        Some(items) => items.iter().any(|item| equals_any(candidates, item)),
        None => false,
    }
}

fn contains_all(candidates: &[&Value], required: &Value) -> bool {
    let required = match required.as_array() {
        Some(items) => items,
        None => return false,
    };

    candidates.iter().any(|candidate| match candidate {
        Value::Array(items) => required.iter().all(|r| items.contains(r)),
        scalar => required.iter().all(|r| r == *scalar),
    })
}

fn elem_match(candidates: &[&Value], condition: &Value) -> bool {
    let operator_form = is_operator_document(condition);

    candidates.iter().any(|candidate| {
        let items = match candidate {
            Value::Array(items) => items,
            _ => return false,
        };

        items.iter().any(|item| {
            if operator_form {
                matches_condition(&[item], condition)
            } else {
                match (item.as_object(), condition.as_object()) {
                    (Some(doc), Some(filter)) => matches(doc, filter),
                    _ => false,
                }
            }
        })
    })
}

fn compare_any(candidates: &[&Value], bound: &Value, accept: impl Fn(Ordering) -> bool) -> bool {
    candidates.iter().any(|candidate| match candidate {
        Value::Array(items) => items
            .iter()
            .any(|item| compare_same_type(item, bound).map_or(false, &accept)),
        value => compare_same_type(value, bound).map_or(false, &accept),
    })
}

/// Ordering between values of the same JSON type
fn compare_same_type(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

/// Total order used for sorting: missing/null < bool < number < string < other
pub fn compare_for_sort(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    fn rank(v: Option<&Value>) -> u8 {
        match v {
            None | Some(Value::Null) => 0,
            Some(Value::Bool(_)) => 1,
            Some(Value::Number(_)) => 2,
            Some(Value::String(_)) => 3,
            Some(Value::Array(_)) | Some(Value::Object(_)) => 4,
        }
    }

    match (a, b) {
        (Some(x), Some(y)) => compare_same_type(x, y).unwrap_or_else(|| rank(a).cmp(&rank(b))),
        _ => rank(a).cmp(&rank(b)),
    }
}
