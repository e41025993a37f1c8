//! The `_msearch` wire layer. One batch request in, one positionally aligned
//! list of per-search responses out.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use bytes::BytesMut;
use color_eyre::eyre::{Context, Result, bail, eyre};
use nori_common::{
    humantime_utils::{deserialize_duration, serialize_duration},
    metrics::{BACKEND_ELASTICSEARCH, METRICS, OP_MULTI_SEARCH},
};
use nori_search_types::errors::SearchTypeErrorKind;
use reqwest::{Client, RequestBuilder, Response, header};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, instrument};

use crate::BackendError;
use crate::dsl::{JsonMap, SearchSource};
use crate::instrumentation::record_operation_result;

/// One line pair of the `_msearch` body: target indices plus the query
/// document executed against them.
#[derive(Debug, Clone)]
pub struct MultiSearchRequest {
    pub indices: Vec<String>,
    pub source: SearchSource,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ErrorResponse {
    #[serde(rename = "type", default)]
    pub error_type: String,

    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ShardFailureInfo {
    #[serde(default)]
    pub reason: Option<ErrorResponse>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ShardInfo {
    pub total: u64,
    pub successful: u64,

    #[serde(default)]
    pub failed: u64,

    #[serde(default)]
    pub failures: Vec<ShardFailureInfo>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum TotalHits {
    /// Pre-7.0 servers report a bare number.
    Count(u64),
    Object { value: u64 },
}

impl TotalHits {
    pub fn value(&self) -> u64 {
        match self {
            TotalHits::Count(n) => *n,
            TotalHits::Object { value } => *value,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchHit {
    #[serde(rename = "_source", default)]
    pub source: Value,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchHits {
    #[serde(default)]
    pub total: Option<TotalHits>,

    #[serde(default)]
    pub hits: Vec<SearchHit>,
}

/// One entry of the `_msearch` `responses` array. An entry is either a
/// search result or an error object; both carry a status.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub error: Option<ErrorResponse>,

    #[serde(default)]
    pub status: Option<u16>,

    #[serde(rename = "_shards", default)]
    pub shards: Option<ShardInfo>,

    #[serde(default)]
    pub hits: Option<SearchHits>,

    #[serde(default)]
    pub aggregations: JsonMap,
}

impl SearchResponse {
    pub fn total(&self) -> u64 {
        self.hits
            .as_ref()
            .and_then(|h| h.total.as_ref())
            .map(|t| t.value())
            .unwrap_or(0)
    }

    /// A partial shard failure downgrades the whole entry to an error.
    pub fn failed_shards(&self) -> Option<SearchTypeErrorKind> {
        let shards = self.shards.as_ref()?;
        if shards.failed == 0 {
            return None;
        }
        let reason = shards
            .failures
            .iter()
            .filter_map(|f| f.reason.as_ref())
            .map(|r| r.reason.clone())
            .collect::<Vec<_>>()
            .join("; ");
        Some(SearchTypeErrorKind::ShardFailure {
            failed: shards.failed,
            total: shards.total,
            reason,
        })
    }
}

#[derive(Debug, Deserialize)]
struct MultiSearchResponse {
    responses: Vec<SearchResponse>,
}

/// Executes a batch of search documents, preserving order. The returned
/// vector has exactly one entry per request.
#[async_trait]
pub trait SearchTransport: Send + Sync {
    async fn multi_search(&self, requests: &[MultiSearchRequest]) -> Result<Vec<SearchResponse>>;
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
#[derive(Default)]
pub enum ElasticAuth {
    #[default]
    None,
    Basic {
        username: String,
        password: String,
    },
    ApiKey {
        key: String,
    },
}

impl ElasticAuth {
    fn apply_to_request(&self, req: RequestBuilder) -> RequestBuilder {
        match self {
            ElasticAuth::None => req,
            ElasticAuth::Basic { username, password } => {
                let credentials = format!("{username}:{password}");
                let encoded = BASE64.encode(credentials);
                req.header(header::AUTHORIZATION, format!("Basic {encoded}"))
            }
            ElasticAuth::ApiKey { key } => {
                req.header(header::AUTHORIZATION, format!("ApiKey {key}"))
            }
        }
    }
}

fn default_request_timeout() -> Duration {
    humantime::parse_duration("1m").expect("Invalid duration format")
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpTransportConfig {
    url: String,

    #[serde(default)]
    auth: ElasticAuth,

    #[serde(
        default = "default_request_timeout",
        serialize_with = "serialize_duration",
        deserialize_with = "deserialize_duration"
    )]
    request_timeout: Duration,
}

impl HttpTransportConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            auth: ElasticAuth::None,
            request_timeout: default_request_timeout(),
        }
    }
}

pub struct HttpTransport {
    config: HttpTransportConfig,
    client: Client,
}

impl HttpTransport {
    pub fn new(config: HttpTransportConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .context("build http client")?;
        Ok(Self { config, client })
    }

    fn ndjson_body(requests: &[MultiSearchRequest]) -> Result<String> {
        let mut body = String::new();
        for request in requests {
            let header = serde_json::json!({
                "index": request.indices,
                "ignore_unavailable": false,
                "allow_no_indices": false,
            });
            body.push_str(&serde_json::to_string(&header).context("serialize msearch header")?);
            body.push('\n');
            body.push_str(
                &serde_json::to_string(&request.source.to_value())
                    .context("serialize msearch body")?,
            );
            body.push('\n');
        }
        Ok(body)
    }
}

async fn response_to_bytes(response: Response) -> Result<BytesMut> {
    let status = response.status();
    if !status.is_success() {
        let text = response.text().await.unwrap_or_default();
        bail!(BackendError::ServerResp(status.as_u16(), text));
    }
    let bytes = response.bytes().await.context("bytes from response")?;
    METRICS
        .downloaded_bytes
        .with_label_values(&[BACKEND_ELASTICSEARCH])
        .inc_by(bytes.len() as u64);
    Ok(bytes.into())
}

#[instrument(skip_all, name = "elasticsearch send_request")]
async fn send_request(req: RequestBuilder) -> Result<BytesMut> {
    match req.send().await {
        Ok(response) => response_to_bytes(response).await,
        Err(e) => Err(eyre!(BackendError::Http(e))),
    }
}

#[async_trait]
impl SearchTransport for HttpTransport {
    #[instrument(skip_all, name = "elasticsearch multi_search", fields(batch = requests.len()))]
    async fn multi_search(&self, requests: &[MultiSearchRequest]) -> Result<Vec<SearchResponse>> {
        let start = Instant::now();
        let result = self.multi_search_inner(requests).await;
        record_operation_result(
            BACKEND_ELASTICSEARCH,
            OP_MULTI_SEARCH,
            &result,
            start.elapsed().as_secs_f64(),
        );
        result
    }
}

impl HttpTransport {
    async fn multi_search_inner(
        &self,
        requests: &[MultiSearchRequest],
    ) -> Result<Vec<SearchResponse>> {
        let body = Self::ndjson_body(requests)?;
        debug!("multi_search body: {body}");

        let url = format!("{}/_msearch", self.config.url);
        let req = self
            .config
            .auth
            .apply_to_request(self.client.post(&url))
            .header(header::CONTENT_TYPE, "application/x-ndjson")
            .body(body);

        let mut bytes = send_request(req).await?;
        let parsed: MultiSearchResponse =
            simd_json::serde::from_slice(bytes.as_mut()).context("parse msearch response")?;

        if parsed.responses.len() != requests.len() {
            bail!(
                "msearch returned {} responses for {} requests",
                parsed.responses.len(),
                requests.len()
            );
        }
        Ok(parsed.responses)
    }
}
