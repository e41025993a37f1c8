use hashbrown::HashSet;
use serde::{Deserialize, Serialize};

use crate::filter::Filter;
use crate::search_type::SearchType;
use crate::timerange::TimeRange;

/// Correlation handle for one submitted search, threaded through query-string
/// decoration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchJob {
    pub id: String,

    #[serde(default)]
    pub owner: Option<String>,
}

impl SearchJob {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            owner: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalOverride {
    #[serde(default)]
    pub timerange: Option<TimeRange>,

    #[serde(default)]
    pub limit: Option<u64>,
}

/// A reference to a saved search filter whose query string gets merged
/// conjunctively into the generated query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchFilter {
    #[serde(default)]
    pub title: Option<String>,

    pub query_string: String,

    #[serde(default)]
    pub disabled: bool,
}

impl SearchFilter {
    pub fn new(query_string: impl Into<String>) -> Self {
        Self {
            title: None,
            query_string: query_string.into(),
            disabled: false,
        }
    }
}

/// An abstract, backend-agnostic search request. Immutable once built; the id
/// correlates errors and results.
#[derive(Debug, Serialize, Deserialize)]
pub struct Query {
    pub id: String,

    /// The root free-text query string.
    pub query: String,

    pub timerange: TimeRange,

    #[serde(default)]
    pub filter: Option<Filter>,

    #[serde(default)]
    pub search_filters: Vec<SearchFilter>,

    #[serde(default)]
    pub search_types: Vec<Box<dyn SearchType>>,

    #[serde(default)]
    pub global_override: Option<GlobalOverride>,
}

impl Query {
    /// Stream ids mentioned anywhere in the filter tree.
    pub fn used_stream_ids(&self) -> HashSet<String> {
        let mut ids = HashSet::new();
        if let Some(filter) = &self.filter {
            filter.collect_stream_ids(&mut ids);
        }
        ids
    }

    /// The time range actually applied to a search type: its own override,
    /// else the global override, else the query default.
    pub fn effective_time_range(&self, search_type: &dyn SearchType) -> TimeRange {
        search_type
            .timerange()
            .cloned()
            .or_else(|| {
                self.global_override
                    .as_ref()
                    .and_then(|o| o.timerange.clone())
            })
            .unwrap_or_else(|| self.timerange.clone())
    }

    /// The stream set actually applied to a search type.
    pub fn effective_streams(&self, search_type: &dyn SearchType) -> HashSet<String> {
        if search_type.streams().is_empty() {
            self.used_stream_ids()
        } else {
            search_type.streams().clone()
        }
    }

    pub fn global_timerange_override(&self) -> Option<&TimeRange> {
        self.global_override
            .as_ref()
            .and_then(|o| o.timerange.as_ref())
    }
}
