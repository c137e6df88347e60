//! # ACL Rewriter
//!
//! Wraps a where-clause with the constraints derived from the caller's
//! identity and the per-record access-control list stored in `acl`.
//!
//! ## Rules
//! - Root contexts bypass the rewrite entirely.
//! - A user grant matches when `acl.users` names the caller with the
//!   requested permission.
//! - A role grant is a fallback: it only applies when the record carries no
//!   entry for the caller's user id at all, so an explicit (even negative)
//!   user entry shadows the role.
//! - A caller with neither user nor role gets no ACL branch. The class-level
//!   permission check upstream is expected to have rejected such callers.

use serde_json::{json, Value};

use super::ast::{Operator, WhereClause};
use crate::core::context::Context;
use crate::schema::ACL_FIELD;

/// Permission an ACL entry grants
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AclOperation {
    Read,
    Write,
}

impl AclOperation {
    /// Name of the boolean flag on an ACL entry
    pub fn as_str(&self) -> &'static str {
        match self {
            AclOperation::Read => "read",
            AclOperation::Write => "write",
        }
    }
}

/// Returns `clause` narrowed to the records the caller may access.
///
/// The input is never mutated.
pub fn rewrite_with_acl(
    clause: &WhereClause,
    context: &Context,
    operation: AclOperation,
) -> WhereClause {
    if context.is_root {
        return clause.clone();
    }

    let mut branches = Vec::new();

    if let Some(user) = &context.user {
        branches.push(WhereClause::and(vec![
            acl_leaf("users", "userId", Operator::In, json!([user.id])),
            acl_leaf("users", operation.as_str(), Operator::In, json!([true])),
        ]));

        if let Some(role) = &user.role {
            branches.push(WhereClause::and(vec![
                acl_leaf("users", "userId", Operator::NotIn, json!([user.id])),
                acl_leaf("roles", "roleId", Operator::In, json!([role.id])),
                acl_leaf("roles", operation.as_str(), Operator::In, json!([true])),
            ]));
        }
    }

    if branches.is_empty() {
        return WhereClause::and(vec![clause.clone()]);
    }

    WhereClause::and(vec![clause.clone(), WhereClause::or(branches)])
}

/// `{ acl: { <list>: { <field>: { <operator>: value } } } }`
fn acl_leaf(list: &str, field: &str, operator: Operator, value: Value) -> WhereClause {
    WhereClause::nested(
        ACL_FIELD,
        WhereClause::nested(list, WhereClause::leaf(field, operator, value)),
    )
}
