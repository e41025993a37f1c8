use std::sync::Arc;

use color_eyre::eyre::Result;
use hashbrown::HashMap;
use nori_search_types::query::{Query, SearchJob};
use nori_search_types::result::SearchTypeResult;
use nori_search_types::search_type::SearchType;

use crate::context::GeneratedQueryContext;
use crate::transport::SearchResponse;

pub mod message_list;
pub mod pivot;

/// Per-type-tag strategy for one search type kind: contribute to the query
/// document during generation, then read the matching response back out.
pub trait SearchTypeHandler: Send + Sync {
    fn generate_query_part(
        &self,
        job: &SearchJob,
        query: &Query,
        search_type: &dyn SearchType,
        ctx: &mut GeneratedQueryContext,
    ) -> Result<()>;

    /// `None` means the response held no data for this type; the type is
    /// then simply absent from the result map, without an error.
    fn extract_result(
        &self,
        job: &SearchJob,
        query: &Query,
        search_type: &dyn SearchType,
        response: &SearchResponse,
        ctx: &GeneratedQueryContext,
    ) -> Result<Option<SearchTypeResult>>;
}

pub type SearchTypeHandlers = HashMap<&'static str, Arc<dyn SearchTypeHandler>>;

/// The built-in handler registry. Fixed at backend construction; is not
/// mutated afterwards.
pub fn default_handlers() -> SearchTypeHandlers {
    let mut handlers: SearchTypeHandlers = HashMap::new();
    handlers.insert("messages", Arc::new(message_list::MessageListHandler));
    handlers.insert("pivot", Arc::new(pivot::PivotHandler::with_defaults()));
    handlers
}
