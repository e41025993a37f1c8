use color_eyre::eyre::Result;
use nori_search_types::message_list::{MessageList, SortOrder};
use nori_search_types::query::{Query, SearchJob};
use nori_search_types::result::{MessageListResult, SearchTypeResult};
use nori_search_types::search_type::SearchType;
use serde_json::{Value, json};

use crate::context::GeneratedQueryContext;
use crate::downcast_unwrap;
use crate::dsl::FIELD_TIMESTAMP;
use crate::search_types::SearchTypeHandler;
use crate::transport::SearchResponse;

pub struct MessageListHandler;

fn sort_value(message_list: &MessageList) -> Value {
    match &message_list.sort {
        Some(sorts) if !sorts.is_empty() => Value::Array(
            sorts
                .iter()
                .map(|sort| {
                    let order = match sort.order {
                        SortOrder::Asc => "asc",
                        SortOrder::Desc => "desc",
                    };
                    json!({sort.field.clone(): {"order": order}})
                })
                .collect(),
        ),
        _ => json!([{FIELD_TIMESTAMP: {"order": "desc"}}]),
    }
}

impl SearchTypeHandler for MessageListHandler {
    fn generate_query_part(
        &self,
        _job: &SearchJob,
        query: &Query,
        search_type: &dyn SearchType,
        ctx: &mut GeneratedQueryContext,
    ) -> Result<()> {
        let message_list = downcast_unwrap!(search_type.as_any(), MessageList);

        // A global override limit wins over the type's own page size.
        let limit = query
            .global_override
            .as_ref()
            .and_then(|o| o.limit)
            .unwrap_or(message_list.limit);

        let source = ctx.search_source_mut(message_list.id());
        source.set_from(message_list.offset);
        source.set_size(limit);
        source.set_sort(sort_value(message_list));
        Ok(())
    }

    fn extract_result(
        &self,
        _job: &SearchJob,
        _query: &Query,
        search_type: &dyn SearchType,
        response: &SearchResponse,
        _ctx: &GeneratedQueryContext,
    ) -> Result<Option<SearchTypeResult>> {
        let message_list = downcast_unwrap!(search_type.as_any(), MessageList);

        let messages = response
            .hits
            .as_ref()
            .map(|hits| hits.hits.iter().map(|hit| hit.source.clone()).collect())
            .unwrap_or_default();

        Ok(Some(SearchTypeResult::Messages(MessageListResult {
            id: message_list.id.clone(),
            name: message_list.name.clone(),
            total: response.total(),
            messages,
        })))
    }
}
