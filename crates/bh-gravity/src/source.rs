//! Rule database contract.
//!
//! The engine reads the persistent rule store only through [`RuleSource`].

use rustc_hash::FxHashSet;

use bh_core::{ClientId, OriginId, RuleCategory};

/// One row of a regex table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleRow {
    pub pattern: String,
    pub origin_id: OriginId,
}

impl RuleRow {
    pub fn new(pattern: impl Into<String>, origin_id: i64) -> Self {
        Self {
            pattern: pattern.into(),
            origin_id: OriginId(origin_id),
        }
    }
}

/// A client known to the resolver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Client {
    pub id: ClientId,
    /// Address the client queries from, used to look up its groups.
    pub address: String,
}

/// Errors raised while reading the rule database.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("failed to count {category} regex entries: {reason}")]
    CountUnavailable { category: RuleCategory, reason: String },

    #[error("{category} regex table grew while reading, stopped after {expected} entries")]
    RowOverflow { category: RuleCategory, expected: usize },

    #[error("failed to open {category} regex table: {reason}")]
    TableUnavailable { category: RuleCategory, reason: String },

    #[error("failed to look up {category} regex groups of client {client}: {reason}")]
    GroupLookup {
        client: String,
        category: RuleCategory,
        reason: String,
    },

    #[error("failed to read rule database: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse rule database: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Rows of one table. Dropping the iterator closes the table.
pub type Rows<'a> = Box<dyn Iterator<Item = RuleRow> + 'a>;

/// Read access to the persistent rule store.
pub trait RuleSource {
    /// Number of rows in the table backing `category`.
    fn count_rows(&self, category: RuleCategory) -> Result<usize, StoreError>;

    /// Open the table backing `category` for iteration.
    fn rows(&self, category: RuleCategory) -> Result<Rows<'_>, StoreError>;

    /// Origin ids of the `category` rules granted to `client` by its groups.
    fn client_group_origin_ids(
        &self,
        client: &Client,
        category: RuleCategory,
    ) -> Result<FxHashSet<OriginId>, StoreError>;
}

impl<S: RuleSource + ?Sized> RuleSource for &S {
    #[inline]
    fn count_rows(&self, category: RuleCategory) -> Result<usize, StoreError> {
        (**self).count_rows(category)
    }

    #[inline]
    fn rows(&self, category: RuleCategory) -> Result<Rows<'_>, StoreError> {
        (**self).rows(category)
    }

    #[inline]
    fn client_group_origin_ids(
        &self,
        client: &Client,
        category: RuleCategory,
    ) -> Result<FxHashSet<OriginId>, StoreError> {
        (**self).client_group_origin_ids(client, category)
    }
}

impl<S: RuleSource + ?Sized> RuleSource for Box<S> {
    #[inline]
    fn count_rows(&self, category: RuleCategory) -> Result<usize, StoreError> {
        (**self).count_rows(category)
    }

    #[inline]
    fn rows(&self, category: RuleCategory) -> Result<Rows<'_>, StoreError> {
        (**self).rows(category)
    }

    #[inline]
    fn client_group_origin_ids(
        &self,
        client: &Client,
        category: RuleCategory,
    ) -> Result<FxHashSet<OriginId>, StoreError> {
        (**self).client_group_origin_ids(client, category)
    }
}
