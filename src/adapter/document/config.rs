//! Document adapter configuration
//!
//! Deserializable so a host application can embed it in its own config
//! file; every field has a default.

use std::time::Duration;

use serde::Deserialize;

use crate::schema::ROLE_CLASS;

/// Configuration for [`DocumentAdapter`](super::DocumentAdapter).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DocumentAdapterConfig {
    /// Logical database name, used in logs.
    pub database_name: String,
    /// Total connection attempts before giving up.
    pub connect_attempts: u32,
    /// Delay before the first retry, doubled on every further retry.
    pub base_backoff_ms: u64,
    /// Upper bound for a single retry delay.
    pub max_backoff_ms: u64,
    /// Classes `clear_database` leaves untouched.
    pub protected_classes: Vec<String>,
}

impl Default for DocumentAdapterConfig {
    fn default() -> Self {
        Self {
            database_name: "datacontrol".to_string(),
            connect_attempts: 5,
            base_backoff_ms: 100,
            max_backoff_ms: 5_000,
            protected_classes: vec![ROLE_CLASS.to_string()],
        }
    }
}

impl DocumentAdapterConfig {
    pub fn new(database_name: impl Into<String>) -> Self {
        Self {
            database_name: database_name.into(),
            ..Self::default()
        }
    }

    pub fn with_connect_attempts(mut self, attempts: u32) -> Self {
        self.connect_attempts = attempts.max(1);
        self
    }

    pub fn with_backoff(mut self, base: Duration, max: Duration) -> Self {
        self.base_backoff_ms = base.as_millis() as u64;
        self.max_backoff_ms = max.as_millis() as u64;
        self
    }

    pub fn with_protected_classes(
        mut self,
        classes: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.protected_classes = classes.into_iter().map(Into::into).collect();
        self
    }

    /// Delay before retry number `retry` (1-based)
    pub fn backoff_for(&self, retry: u32) -> Duration {
        let factor = 1u64.checked_shl(retry.saturating_sub(1)).unwrap_or(u64::MAX);
        let millis = self
            .base_backoff_ms
            .saturating_mul(factor)
            .min(self.max_backoff_ms);
        Duration::from_millis(millis)
    }
}
