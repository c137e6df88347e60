//! Query language: where-clause tree, projection, ordering and the ACL
//! rewriter that narrows every non-root query.

mod acl;
mod ast;
mod errors;
mod select;

pub use acl::{rewrite_with_acl, AclOperation};
pub(crate) use ast::json_type_name;
pub use ast::{Operator, WhereClause, WhereNode, AND_KEY, OR_KEY};
pub use errors::{QueryError, QueryResult};
pub use select::{FindOptions, OrderSpec, Select};
