use hashbrown::HashSet;
use serde::{Deserialize, Serialize};

/// The abstract boolean filter tree attached to a query.
///
/// Finite and acyclic by construction: children are owned vectors, there is
/// no sharing and no back edges.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Filter {
    And { filters: Vec<Filter> },
    Or { filters: Vec<Filter> },
    Stream { stream_ids: Vec<String> },
    QueryString { query: String },
}

impl Filter {
    pub fn and(filters: Vec<Filter>) -> Self {
        Filter::And { filters }
    }

    pub fn or(filters: Vec<Filter>) -> Self {
        Filter::Or { filters }
    }

    pub fn stream(stream_ids: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Filter::Stream {
            stream_ids: stream_ids.into_iter().map(Into::into).collect(),
        }
    }

    pub fn query_string(query: impl Into<String>) -> Self {
        Filter::QueryString {
            query: query.into(),
        }
    }

    /// Gather every stream id mentioned anywhere in the tree. Stream
    /// membership is not compiled into the boolean clause, it is applied
    /// separately so that index resolution can use it.
    pub fn collect_stream_ids(&self, out: &mut HashSet<String>) {
        match self {
            Filter::And { filters } | Filter::Or { filters } => {
                for filter in filters {
                    filter.collect_stream_ids(out);
                }
            }
            Filter::Stream { stream_ids } => {
                out.extend(stream_ids.iter().cloned());
            }
            Filter::QueryString { .. } => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collect_stream_ids_walks_nested_tree() {
        let filter = Filter::and(vec![
            Filter::stream(["a", "b"]),
            Filter::or(vec![Filter::stream(["b", "c"]), Filter::query_string("*")]),
        ]);

        let mut ids = HashSet::new();
        filter.collect_stream_ids(&mut ids);

        let mut sorted: Vec<_> = ids.into_iter().collect();
        sorted.sort();
        assert_eq!(sorted, ["a", "b", "c"]);
    }
}
