use serde::{Deserialize, Serialize};

use crate::query::Query;

/// Recoverable per-search-type failures.
///
/// Generation errors (unknown tags, failed validation) and execution errors
/// (engine query error, shard failure) are recorded against the offending
/// search-type id without aborting sibling types. A transport failure of the
/// whole batch is NOT represented here; it propagates to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SearchTypeErrorKind {
    #[error("unknown search type '{type_tag}', cannot generate query")]
    UnknownSearchType { type_tag: String },

    #[error("unknown bucket type '{type_tag}'")]
    UnknownBucketType { type_tag: String },

    #[error("unknown series type '{type_tag}'")]
    UnknownSeriesType { type_tag: String },

    #[error("invalid search type: {reason}")]
    InvalidSearchType { reason: String },

    #[error("query error ({error_type}): {reason}")]
    QueryError { error_type: String, reason: String },

    #[error("{failed} of {total} shards failed: {reason}")]
    ShardFailure {
        failed: u64,
        total: u64,
        reason: String,
    },
}

impl SearchTypeErrorKind {
    /// True for errors raised while generating the query, before execution.
    pub fn is_generation(&self) -> bool {
        !matches!(
            self,
            SearchTypeErrorKind::QueryError { .. } | SearchTypeErrorKind::ShardFailure { .. }
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("search type '{search_type_id}' of query '{query_id}': {kind}")]
pub struct SearchTypeError {
    pub query_id: String,
    pub search_type_id: String,
    pub kind: SearchTypeErrorKind,
}

impl SearchTypeError {
    pub fn new(query: &Query, search_type_id: impl Into<String>, kind: SearchTypeErrorKind) -> Self {
        Self {
            query_id: query.id.clone(),
            search_type_id: search_type_id.into(),
            kind,
        }
    }
}
