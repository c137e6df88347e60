//! # Controller Core
//!
//! The data access controller and the per-request state it threads through
//! every operation.
//!
//! ## Design Principles
//!
//! - Every create/read/update/delete flows through [`DatabaseController`]
//! - Non-root queries are always narrowed by the caller's ACL
//! - Hooks and relation verbs re-enter the controller, never the adapter
//! - One error enum with a stable code per failure class

mod cache;
pub mod config;
pub mod context;
mod controller;
pub mod error;

pub use cache::ObjectCache;
pub use config::ControllerConfig;
pub use context::{CallerRole, CallerUser, Context};
pub use controller::{BoxFuture, DatabaseController};
pub use error::{ControllerError, ControllerResult, ErrorKind};
