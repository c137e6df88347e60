//! Projection and ordering options for reads

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Fields a caller wants back. The identifier is always included.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Select {
    All,
    Fields(BTreeSet<String>),
}

impl Select {
    pub fn fields<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Fields(fields.into_iter().map(Into::into).collect())
    }

    /// Only the identifier
    pub fn id_only() -> Self {
        Self::Fields(BTreeSet::new())
    }

    pub fn includes(&self, field: &str) -> bool {
        match self {
            Select::All => true,
            Select::Fields(fields) => field == "id" || fields.contains(field),
        }
    }
}

impl Default for Select {
    fn default() -> Self {
        Self::All
    }
}

/// Sort order on one field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderSpec {
    pub field: String,
    #[serde(default = "default_ascending")]
    pub ascending: bool,
}

fn default_ascending() -> bool {
    true
}

impl OrderSpec {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            ascending: true,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            ascending: false,
        }
    }
}

/// Pagination and ordering for multi-object reads
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FindOptions {
    pub offset: Option<usize>,
    /// Maximum number of objects to return
    pub first: Option<usize>,
    pub order: Vec<OrderSpec>,
}

impl FindOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn first(mut self, first: usize) -> Self {
        self.first = Some(first);
        self
    }

    pub fn order_by(mut self, order: OrderSpec) -> Self {
        self.order.push(order);
        self
    }
}
