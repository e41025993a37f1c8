//! Elasticsearch query backend: translates abstract queries into `_msearch`
//! batches and demultiplexes the responses into per-search-type results.

use std::sync::Arc;
use std::time::Duration;

use color_eyre::eyre::Result;
use hashbrown::{HashMap, HashSet};
use nori_common::humantime_utils::{deserialize_opt_duration, serialize_opt_duration};
use nori_search_types::errors::{SearchTypeError, SearchTypeErrorKind};
use nori_search_types::query::{Query, SearchJob};
use nori_search_types::result::QueryResult;
use nori_search_types::search_type::SearchType;
use nori_search_types::timerange::TimeRange;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::instrument;

pub mod context;
pub mod decorators;
pub mod dsl;
pub mod filter_clause;
pub mod index_lookup;
mod instrumentation;
pub mod search_types;
pub mod transport;

#[cfg(test)]
mod test_utils;

use context::GeneratedQueryContext;
use decorators::{EnabledSearchFilterMapper, QueryStringDecorators, SearchFilterMapper};
use dsl::{BoolQuery, FIELD_STREAMS, SearchSource, normalize_query_string, terms_query, time_range_query};
use filter_clause::generate_filter_clause;
use index_lookup::IndexLookup;
use search_types::{SearchTypeHandlers, default_handlers};
use transport::{MultiSearchRequest, SearchTransport};

macro_rules! downcast_unwrap {
    ($any:expr, $ty:ty) => {
        $any.downcast_ref::<$ty>()
            .unwrap_or_else(|| panic!("expected {}", std::any::type_name::<$ty>()))
    };
}
pub(crate) use downcast_unwrap;

/// Transport-level failures that abort the whole batch, unlike the
/// per-search-type errors carried inside a [`QueryResult`].
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("server responded with status code {0}: {1}")]
    ServerResp(u16, String),
}

/// Operator-tunable execution limits.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Upper bound on how far back any search may reach. Unset means
    /// unlimited.
    #[serde(
        default,
        serialize_with = "serialize_opt_duration",
        deserialize_with = "deserialize_opt_duration"
    )]
    pub max_relative_range: Option<Duration>,
}

impl SearchConfig {
    /// Check a time range against the configured maximum reach. The
    /// all-messages sentinel counts as unbounded and fails whenever a
    /// maximum is set.
    pub fn validate_time_range(&self, timerange: &TimeRange) -> Result<(), String> {
        let Some(max) = self.max_relative_range else {
            return Ok(());
        };
        let max_secs = max.as_secs();
        let out_of_range = match timerange {
            TimeRange::Relative { range } => *range == 0 || *range > max_secs,
            TimeRange::Absolute { from, to } => {
                *to - *from > time::Duration::seconds(max_secs as i64)
            }
        };
        if out_of_range {
            Err(format!(
                "time range exceeds the configured maximum of {max_secs}s"
            ))
        } else {
            Ok(())
        }
    }
}

pub struct ElasticsearchBackend {
    search_type_handlers: SearchTypeHandlers,
    transport: Arc<dyn SearchTransport>,
    index_lookup: Arc<dyn IndexLookup>,
    decorators: QueryStringDecorators,
    search_filter_mapper: Arc<dyn SearchFilterMapper>,
    allow_leading_wildcard: bool,
}

impl ElasticsearchBackend {
    pub fn new(transport: Arc<dyn SearchTransport>, index_lookup: Arc<dyn IndexLookup>) -> Self {
        Self {
            search_type_handlers: default_handlers(),
            transport,
            index_lookup,
            decorators: QueryStringDecorators::default(),
            search_filter_mapper: Arc::new(EnabledSearchFilterMapper),
            allow_leading_wildcard: false,
        }
    }

    pub fn with_decorators(mut self, decorators: QueryStringDecorators) -> Self {
        self.decorators = decorators;
        self
    }

    pub fn with_handlers(mut self, handlers: SearchTypeHandlers) -> Self {
        self.search_type_handlers = handlers;
        self
    }

    pub fn with_allow_leading_wildcard(mut self, allow: bool) -> Self {
        self.allow_leading_wildcard = allow;
        self
    }

    fn decorated_clause(
        &self,
        query_string: &str,
        job: &SearchJob,
        query: &Query,
    ) -> Result<serde_json::Value> {
        let decorated = self.decorators.decorate(query_string, job, query)?;
        Ok(normalize_query_string(
            &decorated,
            self.allow_leading_wildcard,
        ))
    }

    /// Translate a query into per-search-type documents. Never fails on a
    /// single bad search type; those are recorded in the returned context
    /// and skipped. Generating the same query twice yields identical
    /// documents apart from the time anchor.
    #[instrument(skip_all, fields(query_id = %query.id))]
    pub fn generate(
        &self,
        job: &SearchJob,
        query: &Query,
        config: &SearchConfig,
    ) -> Result<GeneratedQueryContext> {
        let now = OffsetDateTime::now_utc();

        let mut root = BoolQuery::new();
        root.push_filter(self.decorated_clause(&query.query, job, query)?);
        for filter_string in self.search_filter_mapper.map(&query.search_filters) {
            root.push_filter(self.decorated_clause(&filter_string, job, query)?);
        }
        if let Some(filter) = &query.filter {
            if let Some(clause) = generate_filter_clause(
                filter,
                &self.decorators,
                job,
                query,
                self.allow_leading_wildcard,
            )? {
                root.push_filter(clause);
            }
        }

        let mut ctx = GeneratedQueryContext::new(SearchSource::new(root.to_value()), now);

        let mut seen_ids = HashSet::new();
        for search_type in &query.search_types {
            let id = search_type.id().to_string();
            if !seen_ids.insert(id.clone()) {
                ctx.add_error(SearchTypeError::new(
                    query,
                    &id,
                    SearchTypeErrorKind::InvalidSearchType {
                        reason: format!("duplicate search type id '{id}'"),
                    },
                ));
                continue;
            }

            let timerange = query.effective_time_range(search_type.as_ref());
            if let Err(reason) = config.validate_time_range(&timerange) {
                ctx.add_error(SearchTypeError::new(
                    query,
                    &id,
                    SearchTypeErrorKind::InvalidSearchType { reason },
                ));
                continue;
            }

            // Narrow the root query with the type's effective scope: time
            // range, streams and its own query string when set.
            let mut scoped = BoolQuery::new();
            scoped.push_must(ctx.search_source_mut(&id).query().clone());
            scoped.push_must(time_range_query(&timerange, now)?);

            let streams = query.effective_streams(search_type.as_ref());
            if !streams.is_empty() {
                scoped.push_must(terms_query(FIELD_STREAMS, streams));
            }

            if let Some(type_query) = search_type.query() {
                scoped.push_must(self.decorated_clause(type_query, job, query)?);
            }

            ctx.search_source_mut(&id).set_query(scoped.to_value());

            match self.search_type_handlers.get(search_type.type_tag()) {
                Some(handler) => {
                    handler.generate_query_part(job, query, search_type.as_ref(), &mut ctx)?;
                }
                None => ctx.add_error(SearchTypeError::new(
                    query,
                    &id,
                    SearchTypeErrorKind::UnknownSearchType {
                        type_tag: search_type.type_tag().to_string(),
                    },
                )),
            }
        }

        Ok(ctx)
    }

    fn indices_for(
        &self,
        query: &Query,
        search_type: &dyn SearchType,
        shared: &HashSet<String>,
    ) -> Vec<String> {
        let has_own_scope = !search_type.streams().is_empty()
            || search_type.timerange().is_some()
            || query.global_timerange_override().is_some();

        let mut indices: Vec<String> = if has_own_scope {
            let streams = query.effective_streams(search_type);
            let timerange = query.effective_time_range(search_type);
            self.index_lookup
                .index_names_for_streams_in_time_range(&streams, &timerange)
                .into_iter()
                .collect()
        } else {
            shared.iter().cloned().collect()
        };
        indices.sort();

        // An empty index set must still occupy its slot in the batch;
        // the empty name queries nothing but keeps responses aligned.
        if indices.is_empty() {
            indices.push(String::new());
        }
        indices
    }

    /// Execute a generated query and demultiplex the batched responses.
    /// Per-entry failures (engine errors, failed shards) become recorded
    /// errors; only a transport failure aborts.
    #[instrument(skip_all, fields(query_id = %query.id))]
    pub async fn run(
        &self,
        job: &SearchJob,
        query: Query,
        mut ctx: GeneratedQueryContext,
    ) -> Result<QueryResult> {
        if query.search_types.is_empty() {
            return Ok(QueryResult::empty(query, ctx.into_errors()));
        }

        let shared_indices = self.index_lookup.index_names_for_streams_in_time_range(
            &query.used_stream_ids(),
            &query.timerange,
        );

        let mut requests = Vec::new();
        for id in ctx.generated_ids() {
            let Some(search_type) = query.search_types.iter().find(|st| st.id() == id) else {
                continue;
            };
            let source = ctx
                .search_source(id)
                .expect("generated id has a source")
                .clone();
            requests.push(MultiSearchRequest {
                indices: self.indices_for(&query, search_type.as_ref(), &shared_indices),
                source,
            });
        }

        let responses = self.transport.multi_search(&requests).await?;

        let mut results = HashMap::new();
        for search_type in &query.search_types {
            let id = search_type.id();
            if ctx.has_error_for(id) {
                continue;
            }
            let Some(handler) = self.search_type_handlers.get(search_type.type_tag()) else {
                continue;
            };
            let Some(position) = ctx.generated_ids().iter().position(|g| g == id) else {
                continue;
            };
            let response = &responses[position];

            if let Some(error) = &response.error {
                ctx.add_error(SearchTypeError::new(
                    &query,
                    id,
                    SearchTypeErrorKind::QueryError {
                        error_type: error.error_type.clone(),
                        reason: error.reason.clone(),
                    },
                ));
                continue;
            }
            if let Some(kind) = response.failed_shards() {
                ctx.add_error(SearchTypeError::new(&query, id, kind));
                continue;
            }

            if let Some(result) =
                handler.extract_result(job, &query, search_type.as_ref(), response, &ctx)?
            {
                results.insert(id.to_string(), result);
            }
        }

        Ok(QueryResult {
            query,
            search_types: results,
            errors: ctx.into_errors(),
        })
    }
}
