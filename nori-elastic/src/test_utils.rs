use std::any::Any;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use color_eyre::eyre::Result;
use hashbrown::{HashMap, HashSet};
use nori_search_types::filter::Filter;
use nori_search_types::query::{Query, SearchJob};
use nori_search_types::search_type::SearchType;
use nori_search_types::timerange::TimeRange;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::index_lookup::IndexLookup;
use crate::transport::{MultiSearchRequest, SearchResponse, SearchTransport};

/// Captures every batch and answers from a queue, padding with empty
/// responses when the queue runs dry.
pub struct MockTransport {
    pub requests: Mutex<Vec<Vec<MultiSearchRequest>>>,
    responses: Mutex<Vec<SearchResponse>>,
}

impl MockTransport {
    pub fn new(responses: Vec<SearchResponse>) -> Arc<Self> {
        Arc::new(Self {
            requests: Mutex::new(Vec::new()),
            responses: Mutex::new(responses),
        })
    }
}

#[async_trait]
impl SearchTransport for MockTransport {
    async fn multi_search(&self, requests: &[MultiSearchRequest]) -> Result<Vec<SearchResponse>> {
        self.requests.lock().unwrap().push(requests.to_vec());

        let mut queued = self.responses.lock().unwrap();
        let take = requests.len().min(queued.len());
        let mut responses: Vec<SearchResponse> = queued.drain(..take).collect();
        responses.resize_with(requests.len(), SearchResponse::default);
        Ok(responses)
    }
}

pub struct MockIndexLookup {
    by_stream: HashMap<String, Vec<String>>,
}

impl MockIndexLookup {
    pub fn new(by_stream: impl IntoIterator<Item = (&'static str, Vec<&'static str>)>) -> Arc<Self> {
        Arc::new(Self {
            by_stream: by_stream
                .into_iter()
                .map(|(stream, indices)| {
                    (
                        stream.to_string(),
                        indices.into_iter().map(str::to_string).collect(),
                    )
                })
                .collect(),
        })
    }

    pub fn empty() -> Arc<Self> {
        Arc::new(Self {
            by_stream: HashMap::new(),
        })
    }
}

impl IndexLookup for MockIndexLookup {
    fn index_names_for_streams_in_time_range(
        &self,
        stream_ids: &HashSet<String>,
        _timerange: &TimeRange,
    ) -> HashSet<String> {
        stream_ids
            .iter()
            .flat_map(|stream| self.by_stream.get(stream).cloned().unwrap_or_default())
            .collect()
    }
}

pub fn search_response(value: Value) -> SearchResponse {
    serde_json::from_value(value).expect("valid search response json")
}

pub fn job() -> SearchJob {
    SearchJob::new("job-1")
}

pub fn query_with(search_types: Vec<Box<dyn SearchType>>) -> Query {
    Query {
        id: "q1".to_string(),
        query: "*".to_string(),
        timerange: TimeRange::Relative { range: 300 },
        filter: Some(Filter::stream(["s1"])),
        search_filters: vec![],
        search_types,
        global_override: None,
    }
}

/// A search type with no registered handler.
#[derive(Debug, Serialize, Deserialize)]
pub struct MysteryType {
    pub id: String,

    #[serde(default)]
    pub streams: HashSet<String>,
}

impl MysteryType {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            streams: HashSet::new(),
        }
    }
}

#[typetag::serde(name = "mystery")]
impl SearchType for MysteryType {
    fn id(&self) -> &str {
        &self.id
    }

    fn type_tag(&self) -> &'static str {
        "mystery"
    }

    fn streams(&self) -> &HashSet<String> {
        &self.streams
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
