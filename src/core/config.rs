//! Controller Configuration

use serde::Deserialize;

/// Configuration for the [`DatabaseController`](super::DatabaseController).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ControllerConfig {
    /// Check writes, where-clauses and projections against the schema.
    pub enforce_schema_validation: bool,
    /// Limit applied to multi-object reads that do not set `first`.
    pub default_limit: Option<usize>,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            enforce_schema_validation: true,
            default_limit: None,
        }
    }
}

impl ControllerConfig {
    /// Create config that skips value validation. Classes must still be
    /// declared.
    pub fn without_schema_validation() -> Self {
        Self {
            enforce_schema_validation: false,
            ..Self::default()
        }
    }

    pub fn with_default_limit(mut self, limit: usize) -> Self {
        self.default_limit = Some(limit);
        self
    }
}
