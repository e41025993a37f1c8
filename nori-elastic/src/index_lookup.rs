use hashbrown::HashSet;
use nori_search_types::timerange::TimeRange;

/// Resolves the concrete index names covering a set of streams within a time
/// range. Implementations usually consult an index range catalog; tests use a
/// static map.
pub trait IndexLookup: Send + Sync {
    fn index_names_for_streams_in_time_range(
        &self,
        stream_ids: &HashSet<String>,
        timerange: &TimeRange,
    ) -> HashSet<String>;
}
