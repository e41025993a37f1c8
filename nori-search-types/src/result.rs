use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::SearchTypeError;
use crate::query::Query;
use crate::timerange::AbsoluteRange;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RowSource {
    Leaf,
    NonLeaf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ValueSource {
    RowLeaf,
    RowInner,
    ColLeaf,
    ColInner,
}

/// One cell value: keyed by column key path plus the series id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PivotValue {
    pub key: Vec<String>,
    pub value: Value,
    pub rollup: bool,
    pub source: ValueSource,
}

impl PivotValue {
    pub fn new(key: Vec<String>, value: Value, rollup: bool, source: ValueSource) -> Self {
        Self {
            key,
            value,
            rollup,
            source,
        }
    }
}

/// One table row: the key has one entry per traversed row group (empty when
/// there are no row groups, or shorter for subtotal rows).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PivotRow {
    pub key: Vec<String>,
    pub values: Vec<PivotValue>,
    pub source: RowSource,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PivotResult {
    pub id: String,

    #[serde(default)]
    pub name: Option<String>,

    pub effective_timerange: AbsoluteRange,

    /// Total matched document count.
    pub total: u64,

    pub rows: Vec<PivotRow>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageListResult {
    pub id: String,

    #[serde(default)]
    pub name: Option<String>,

    pub total: u64,

    pub messages: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SearchTypeResult {
    Pivot(PivotResult),
    Messages(MessageListResult),
}

impl SearchTypeResult {
    pub fn as_pivot(&self) -> Option<&PivotResult> {
        match self {
            SearchTypeResult::Pivot(result) => Some(result),
            _ => None,
        }
    }

    pub fn as_messages(&self) -> Option<&MessageListResult> {
        match self {
            SearchTypeResult::Messages(result) => Some(result),
            _ => None,
        }
    }
}

/// The final outcome of one query: whatever search types succeeded, plus the
/// complete per-search-type error set. Partial success is the norm; callers
/// must render successful types even when siblings failed.
#[derive(Debug, Serialize)]
pub struct QueryResult {
    pub query: Query,
    pub search_types: HashMap<String, SearchTypeResult>,
    pub errors: Vec<SearchTypeError>,
}

impl QueryResult {
    pub fn empty(query: Query, errors: Vec<SearchTypeError>) -> Self {
        Self {
            query,
            search_types: HashMap::new(),
            errors,
        }
    }
}
