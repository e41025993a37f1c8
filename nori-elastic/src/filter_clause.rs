use color_eyre::eyre::Result;
use nori_search_types::filter::Filter;
use nori_search_types::query::{Query, SearchJob};
use serde_json::Value;

use crate::decorators::QueryStringDecorators;
use crate::dsl::{BoolQuery, normalize_query_string};

/// Compiles a filter tree into a boolean clause. Stream filters contribute
/// nothing here; stream scoping is applied through index selection and the
/// per-search-type streams terms clause instead. And/Or nodes always
/// compile to a clause, even when every child reduced to nothing: the empty
/// conjunction matches everything, which is the intended policy for a
/// streams-only tree.
pub fn generate_filter_clause(
    filter: &Filter,
    decorators: &QueryStringDecorators,
    job: &SearchJob,
    query: &Query,
    allow_leading_wildcard: bool,
) -> Result<Option<Value>> {
    match filter {
        Filter::And { filters } => {
            let mut bool_query = BoolQuery::new();
            for child in filters {
                if let Some(clause) =
                    generate_filter_clause(child, decorators, job, query, allow_leading_wildcard)?
                {
                    bool_query.push_must(clause);
                }
            }
            Ok(Some(bool_query.to_value()))
        }
        Filter::Or { filters } => {
            let mut bool_query = BoolQuery::new();
            for child in filters {
                if let Some(clause) =
                    generate_filter_clause(child, decorators, job, query, allow_leading_wildcard)?
                {
                    bool_query.push_should(clause);
                }
            }
            Ok(Some(bool_query.to_value()))
        }
        Filter::Stream { .. } => Ok(None),
        Filter::QueryString { query: query_string } => {
            let decorated = decorators.decorate(query_string, job, query)?;
            Ok(Some(normalize_query_string(
                &decorated,
                allow_leading_wildcard,
            )))
        }
    }
}
