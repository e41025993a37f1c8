use std::sync::Arc;

use color_eyre::eyre::Result;
use nori_search_types::query::{Query, SearchFilter, SearchJob};

/// Rewrites a raw query string before it is compiled into a clause, e.g.
/// expanding saved search parameters. Failures abort the whole generation.
pub trait QueryStringDecorator: Send + Sync {
    fn decorate(&self, query_string: &str, job: &SearchJob, query: &Query) -> Result<String>;
}

/// An ordered chain of decorators, applied first to last.
#[derive(Clone, Default)]
pub struct QueryStringDecorators {
    decorators: Vec<Arc<dyn QueryStringDecorator>>,
}

impl QueryStringDecorators {
    pub fn new(decorators: Vec<Arc<dyn QueryStringDecorator>>) -> Self {
        Self { decorators }
    }

    pub fn decorate(&self, query_string: &str, job: &SearchJob, query: &Query) -> Result<String> {
        let mut decorated = query_string.to_string();
        for decorator in &self.decorators {
            decorated = decorator.decorate(&decorated, job, query)?;
        }
        Ok(decorated)
    }
}

/// Maps the query's saved search filters to query strings. Order is the
/// filters' own order; all resulting clauses are conjunctive, so order only
/// affects readability of the generated document.
pub trait SearchFilterMapper: Send + Sync {
    fn map(&self, filters: &[SearchFilter]) -> Vec<String>;
}

/// Default mapper: enabled filters contribute their query string verbatim.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnabledSearchFilterMapper;

impl SearchFilterMapper for EnabledSearchFilterMapper {
    fn map(&self, filters: &[SearchFilter]) -> Vec<String> {
        filters
            .iter()
            .filter(|filter| !filter.disabled)
            .map(|filter| filter.query_string.clone())
            .collect()
    }
}
