//! Caller Context
//!
//! Created once per inbound request by the calling layer and threaded
//! unchanged through every controller call. The controller only reads
//! `is_root` and `user`; the request-scoped object cache is shared by every
//! clone of the context.

use uuid::Uuid;

use super::cache::ObjectCache;

/// Context carried through every controller call
#[derive(Debug, Clone)]
pub struct Context {
    /// Request ID for tracing
    pub request_id: Uuid,

    /// Root contexts bypass ACL and protected-field checks
    pub is_root: bool,

    /// The authenticated caller, if any
    pub user: Option<CallerUser>,

    pub session_id: Option<String>,

    cache: ObjectCache,
}

impl Context {
    fn new(is_root: bool, user: Option<CallerUser>) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            is_root,
            user,
            session_id: None,
            cache: ObjectCache::default(),
        }
    }

    /// Create a root context (bypasses ACL)
    pub fn root() -> Self {
        Self::new(true, None)
    }

    /// Create an anonymous context
    pub fn anonymous() -> Self {
        Self::new(false, None)
    }

    /// Create context for an authenticated user
    pub fn for_user(user: CallerUser) -> Self {
        Self::new(false, Some(user))
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Root view of the same request, sharing request id, caller and cache.
    ///
    /// Used by hooks that cascade writes the caller could not perform itself.
    pub fn as_root(&self) -> Self {
        Self {
            is_root: true,
            ..self.clone()
        }
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user.as_ref().map(|u| u.id.as_str())
    }

    pub fn role_name(&self) -> Option<&str> {
        self.user
            .as_ref()
            .and_then(|u| u.role.as_ref())
            .map(|r| r.name.as_str())
    }

    pub(crate) fn cache(&self) -> &ObjectCache {
        &self.cache
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::anonymous()
    }
}

/// Authenticated caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerUser {
    pub id: String,
    pub role: Option<CallerRole>,
}

impl CallerUser {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role: None,
        }
    }

    pub fn with_role(mut self, id: impl Into<String>, name: impl Into<String>) -> Self {
        self.role = Some(CallerRole {
            id: id.into(),
            name: name.into(),
        });
        self
    }
}

/// Role of the authenticated caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerRole {
    pub id: String,
    pub name: String,
}
