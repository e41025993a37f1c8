//! Builders for the small slice of the Elasticsearch query DSL this backend
//! emits. Everything bottoms out in `serde_json::Value`.

use color_eyre::eyre::{Result, eyre};
use nori_common::time_utils::format_rfc3339;
use nori_search_types::timerange::TimeRange;
use serde_json::{Map, Value, json};
use time::OffsetDateTime;

pub type JsonMap = Map<String, Value>;

pub const FIELD_TIMESTAMP: &str = "timestamp";
pub const FIELD_STREAMS: &str = "streams";

/// An empty or `*`-only query string matches everything; anything else is a
/// free-text `query_string` clause.
pub fn normalize_query_string(query_string: &str, allow_leading_wildcard: bool) -> Value {
    if query_string.is_empty() || query_string.trim() == "*" {
        json!({"match_all": {}})
    } else {
        json!({
            "query_string": {
                "query": query_string,
                "allow_leading_wildcard": allow_leading_wildcard,
            }
        })
    }
}

/// A `bool` query under construction. An empty builder renders to an empty
/// conjunction, which matches everything; that is deliberate policy, not an
/// omission.
#[derive(Debug, Clone, Default)]
pub struct BoolQuery {
    must: Vec<Value>,
    filter: Vec<Value>,
    should: Vec<Value>,
}

impl BoolQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_must(&mut self, clause: Value) {
        self.must.push(clause);
    }

    pub fn push_filter(&mut self, clause: Value) {
        self.filter.push(clause);
    }

    pub fn push_should(&mut self, clause: Value) {
        self.should.push(clause);
    }

    pub fn to_value(&self) -> Value {
        let mut body = JsonMap::new();
        if !self.must.is_empty() {
            body.insert("must".to_string(), json!(self.must));
        }
        if !self.filter.is_empty() {
            body.insert("filter".to_string(), json!(self.filter));
        }
        if !self.should.is_empty() {
            body.insert("should".to_string(), json!(self.should));
            body.insert("minimum_should_match".to_string(), json!(1));
        }
        json!({"bool": body})
    }
}

/// Range clause over the timestamp field. Relative ranges are anchored at
/// `now`; the all-messages sentinel starts at the epoch.
pub fn time_range_query(timerange: &TimeRange, now: OffsetDateTime) -> Result<Value> {
    let resolved = timerange.resolve(now);
    let from = format_rfc3339(resolved.from).map_err(|e| eyre!(e))?;
    let to = format_rfc3339(resolved.to).map_err(|e| eyre!(e))?;
    Ok(json!({
        "range": {
            FIELD_TIMESTAMP: {
                "gte": from,
                "lte": to,
            }
        }
    }))
}

/// Terms clause over a field. Values are sorted so that generating the same
/// query twice yields an identical document.
pub fn terms_query(field: &str, values: impl IntoIterator<Item = String>) -> Value {
    let mut values: Vec<String> = values.into_iter().collect();
    values.sort();
    json!({"terms": {field: values}})
}

/// The query document built for one search type: a boolean clause, paging
/// (zero by default, only aggregations and specialized results matter
/// downstream), optional sort and an ordered aggregation map.
#[derive(Debug, Clone)]
pub struct SearchSource {
    query: Value,
    from: u64,
    size: u64,
    sort: Option<Value>,
    aggs: JsonMap,
}

impl SearchSource {
    pub fn new(query: Value) -> Self {
        Self {
            query,
            from: 0,
            size: 0,
            sort: None,
            aggs: JsonMap::new(),
        }
    }

    pub fn query(&self) -> &Value {
        &self.query
    }

    pub fn set_query(&mut self, query: Value) {
        self.query = query;
    }

    pub fn set_from(&mut self, from: u64) {
        self.from = from;
    }

    pub fn set_size(&mut self, size: u64) {
        self.size = size;
    }

    pub fn set_sort(&mut self, sort: Value) {
        self.sort = Some(sort);
    }

    pub fn add_aggregation(&mut self, name: impl Into<String>, body: Value) {
        self.aggs.insert(name.into(), body);
    }

    pub fn aggregations(&self) -> &JsonMap {
        &self.aggs
    }

    pub fn to_value(&self) -> Value {
        let mut doc = JsonMap::new();
        doc.insert("query".to_string(), self.query.clone());
        doc.insert("from".to_string(), json!(self.from));
        doc.insert("size".to_string(), json!(self.size));
        if let Some(sort) = &self.sort {
            doc.insert("sort".to_string(), sort.clone());
        }
        if !self.aggs.is_empty() {
            doc.insert("aggs".to_string(), Value::Object(self.aggs.clone()));
        }
        Value::Object(doc)
    }
}
