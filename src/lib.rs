//! datacontrol - schema-driven data access controller
//!
//! Sits between an API layer and a storage engine. Every request is
//! validated against the declared schema, narrowed by the caller's ACL,
//! routed through class-scoped hooks and executed by a pluggable
//! [`StorageAdapter`](adapter::StorageAdapter).

pub mod adapter;
pub mod core;
pub mod hooks;
pub mod query;
pub mod relation;
pub mod schema;
