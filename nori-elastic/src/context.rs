use hashbrown::{HashMap, HashSet};
use nori_common::metrics::{ERROR_EXECUTION, ERROR_GENERATION, METRICS};
use nori_search_types::errors::SearchTypeError;
use nori_search_types::pivot::{Pivot, SeriesSpec, SpecHandle};
use serde_json::Value;
use time::OffsetDateTime;

use crate::dsl::{JsonMap, SearchSource};

/// Side table from spec instance identity to the aggregation name it was
/// generated under. Written during generation, read during extraction;
/// keyed by [`SpecHandle`] so that two structurally equal specs at
/// different nesting levels never collide.
#[derive(Debug, Default)]
pub struct AggTypes {
    names: HashMap<SpecHandle, String>,
}

impl AggTypes {
    pub fn record(&mut self, handle: SpecHandle, name: impl Into<String>) {
        self.names.insert(handle, name.into());
    }

    pub fn name_of(&self, handle: SpecHandle) -> Option<&str> {
        self.names.get(&handle).map(String::as_str)
    }

    /// Pick the spec's sub-result out of the current aggregation scope.
    pub fn sub_aggregation<'a>(&self, handle: SpecHandle, scope: &'a JsonMap) -> Option<&'a Value> {
        scope.get(self.name_of(handle)?)
    }
}

/// Mutable build state scoped to exactly one generation/execution cycle of
/// one query. Never shared across queries and never reused; the whole
/// generate/run call chain is single threaded, so there is no locking.
#[derive(Debug)]
pub struct GeneratedQueryContext {
    root_source: SearchSource,
    now: OffsetDateTime,
    search_type_queries: HashMap<String, SearchSource>,
    search_type_order: Vec<String>,
    name_counter: usize,
    pub agg_types: AggTypes,
    errors: Vec<SearchTypeError>,
    errored_ids: HashSet<String>,
}

impl GeneratedQueryContext {
    pub fn new(root_source: SearchSource, now: OffsetDateTime) -> Self {
        Self {
            root_source,
            now,
            search_type_queries: HashMap::new(),
            search_type_order: Vec::new(),
            name_counter: 0,
            agg_types: AggTypes::default(),
            errors: Vec::new(),
            errored_ids: HashSet::new(),
        }
    }

    /// The wall-clock anchor of this cycle. Relative time ranges resolve
    /// against the same instant during generation and extraction.
    pub fn now(&self) -> OffsetDateTime {
        self.now
    }

    /// The working query document for a search type, cloned from the root
    /// document on first access. First accesses define the batch order.
    pub fn search_source_mut(&mut self, search_type_id: &str) -> &mut SearchSource {
        if !self.search_type_queries.contains_key(search_type_id) {
            self.search_type_order.push(search_type_id.to_string());
            self.search_type_queries
                .insert(search_type_id.to_string(), self.root_source.clone());
        }
        self.search_type_queries
            .get_mut(search_type_id)
            .expect("search source just inserted")
    }

    pub fn search_source(&self, search_type_id: &str) -> Option<&SearchSource> {
        self.search_type_queries.get(search_type_id)
    }

    /// Search-type ids with a generated query document, in batch order.
    pub fn generated_ids(&self) -> &[String] {
        &self.search_type_order
    }

    /// Allocate an aggregation name, unique across all nesting levels and
    /// search types sharing this context.
    pub fn next_name(&mut self) -> String {
        let name = format!("agg_{}", self.name_counter);
        self.name_counter += 1;
        name
    }

    /// Deterministic name for a metric sub-aggregation. The same series of
    /// the same pivot reuses one name at every nesting level; extraction
    /// looks it up within whatever scope it is currently walking.
    pub fn series_name(&self, series: &dyn SeriesSpec, pivot: &Pivot) -> String {
        format!("{}-series-{}", pivot.id, series.literal())
    }

    /// Record an error against its search type. Errors form a set: recording
    /// the same error twice (e.g. an unknown series tag seen once per nesting
    /// level) keeps a single entry.
    pub fn add_error(&mut self, error: SearchTypeError) {
        if self.errors.contains(&error) {
            return;
        }
        let phase = if error.kind.is_generation() {
            ERROR_GENERATION
        } else {
            ERROR_EXECUTION
        };
        METRICS
            .search_type_errors_total
            .with_label_values(&[phase])
            .inc();
        self.errored_ids.insert(error.search_type_id.clone());
        self.errors.push(error);
    }

    pub fn has_error_for(&self, search_type_id: &str) -> bool {
        self.errored_ids.contains(search_type_id)
    }

    pub fn errors(&self) -> &[SearchTypeError] {
        &self.errors
    }

    pub fn into_errors(self) -> Vec<SearchTypeError> {
        self.errors
    }
}
