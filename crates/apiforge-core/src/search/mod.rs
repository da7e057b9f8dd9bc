//! Resource search: index adapter, intent detection, ranking and the
//! service that ties them to the descriptor table.

pub mod index;
pub mod intent;
pub mod ranking;
pub mod service;
pub mod stats;
pub mod tokenizer;

#[cfg(test)]
mod tests;

use thiserror::Error;

use crate::descriptor::ResourceType;

pub use index::{FieldBoosts, IndexHit, IndexedDocument, QueryOptions, TextIndex, ALL_SENTINEL};
pub use intent::QueryIntent;
pub use service::{SearchOptions, SearchService, SourceReplacement};
pub use stats::{SearchStats, SourceStats, UsageStats};

/// Errors raised by the search service.
///
/// Absent ids and empty matches are not errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SearchError {
    /// Ranking parameters are out of range.
    #[error("invalid search configuration: {0}")]
    InvalidConfig(String),

    /// An id was re-added with a different payload type.
    #[error("descriptor '{id}' is a {existing} and cannot become a {requested}")]
    TypeChanged {
        /// Descriptor id.
        id: String,
        /// Stored type.
        existing: ResourceType,
        /// Offered type.
        requested: ResourceType,
    },

    /// The underlying tantivy index failed to write, commit or search.
    #[error("search index error: {0}")]
    Index(String),
}

impl From<tantivy::TantivyError> for SearchError {
    fn from(err: tantivy::TantivyError) -> Self {
        Self::Index(err.to_string())
    }
}

/// Result alias for search operations.
pub type SearchResult<T> = std::result::Result<T, SearchError>;
