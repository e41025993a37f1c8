//! Pivot tables: a nested aggregation chain built from row and column
//! grouping specs with metric series hung at the leaves (and, with rollup,
//! at every intermediate level), plus the recursive walk that turns the
//! response's aggregation tree back into rows of keyed values.

use std::sync::Arc;

use color_eyre::eyre::Result;
use hashbrown::HashMap;
use nori_common::time_utils::parse_timestamp_millis_float;
use nori_search_types::errors::{SearchTypeError, SearchTypeErrorKind};
use nori_search_types::pivot::{
    Average, BucketSpec, Cardinality, Max, Min, Pivot, SeriesSpec, Sum,
};
use nori_search_types::query::{Query, SearchJob};
use nori_search_types::result::{PivotResult, PivotRow, PivotValue, RowSource, SearchTypeResult, ValueSource};
use nori_search_types::search_type::SearchType;
use nori_search_types::timerange::AbsoluteRange;
use serde_json::{Value, json};
use tracing::debug;

use crate::context::GeneratedQueryContext;
use crate::downcast_unwrap;
use crate::dsl::{FIELD_TIMESTAMP, JsonMap};
use crate::search_types::SearchTypeHandler;
use crate::transport::SearchResponse;

pub mod buckets;
pub mod series;

#[cfg(test)]
mod pivot_tests;

use buckets::{TimeBucketHandler, ValuesBucketHandler};
use series::{CountSeriesHandler, FieldMetricHandler};

const AGG_TIMESTAMP_MIN: &str = "timestamp-min";
const AGG_TIMESTAMP_MAX: &str = "timestamp-max";

/// One bucket of a grouping aggregation in the response, paired with the
/// scope its sub-aggregations live in.
pub struct ResultBucket<'a> {
    pub key: String,
    pub scope: &'a JsonMap,
}

fn bucket_key(entry: &Value) -> Option<String> {
    if let Some(key) = entry.get("key_as_string").and_then(Value::as_str) {
        return Some(key.to_string());
    }
    match entry.get("key")? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Strategy for one bucket spec kind.
pub trait PivotBucketHandler: Send + Sync {
    /// The aggregation body (without sub-aggregations) for this spec,
    /// recording its name in the context's side table. `None` means the spec
    /// contributes no grouping level.
    fn create_aggregation(
        &self,
        name: &str,
        pivot: &Pivot,
        spec: &dyn BucketSpec,
        ctx: &mut GeneratedQueryContext,
    ) -> Result<Option<Value>>;

    /// The spec's own sub-result within the current aggregation scope.
    fn extract_aggregation<'a>(
        &self,
        spec: &dyn BucketSpec,
        scope: &'a JsonMap,
        ctx: &GeneratedQueryContext,
    ) -> Option<&'a Value> {
        ctx.agg_types.sub_aggregation(spec.handle(), scope)
    }

    fn buckets<'a>(
        &self,
        _spec: &dyn BucketSpec,
        aggregation: &'a Value,
    ) -> Box<dyn Iterator<Item = ResultBucket<'a>> + 'a> {
        Box::new(
            aggregation
                .get("buckets")
                .and_then(Value::as_array)
                .into_iter()
                .flatten()
                .filter_map(|entry| {
                    let scope = entry.as_object()?;
                    let key = bucket_key(entry)?;
                    Some(ResultBucket { key, scope })
                }),
        )
    }
}

/// Strategy for one series spec kind.
pub trait PivotSeriesHandler: Send + Sync {
    /// The metric aggregation body for this spec, recording its name in the
    /// context's side table. `None` means no aggregation is needed and the
    /// value is derived from the enclosing scope instead.
    fn create_aggregation(
        &self,
        name: &str,
        pivot: &Pivot,
        spec: &dyn SeriesSpec,
        ctx: &mut GeneratedQueryContext,
    ) -> Result<Option<Value>>;

    /// The series value within one scope. `aggregation` is the spec's own
    /// sub-result there, when one was generated.
    fn handle_result(
        &self,
        spec: &dyn SeriesSpec,
        response: &SearchResponse,
        scope: &JsonMap,
        aggregation: Option<&Value>,
        ctx: &GeneratedQueryContext,
    ) -> Option<Value>;
}

pub type BucketHandlers = HashMap<&'static str, Arc<dyn PivotBucketHandler>>;
pub type SeriesHandlers = HashMap<&'static str, Arc<dyn PivotSeriesHandler>>;

struct Level {
    name: String,
    body: Value,
    series: JsonMap,
}

pub struct PivotHandler {
    bucket_handlers: BucketHandlers,
    series_handlers: SeriesHandlers,
}

impl PivotHandler {
    pub fn new(bucket_handlers: BucketHandlers, series_handlers: SeriesHandlers) -> Self {
        Self {
            bucket_handlers,
            series_handlers,
        }
    }

    pub fn with_defaults() -> Self {
        let mut bucket_handlers: BucketHandlers = HashMap::new();
        bucket_handlers.insert("values", Arc::new(ValuesBucketHandler));
        bucket_handlers.insert("time", Arc::new(TimeBucketHandler));

        let mut series_handlers: SeriesHandlers = HashMap::new();
        series_handlers.insert("count", Arc::new(CountSeriesHandler));
        series_handlers.insert("avg", Arc::new(FieldMetricHandler::<Average>::new("avg")));
        series_handlers.insert("min", Arc::new(FieldMetricHandler::<Min>::new("min")));
        series_handlers.insert("max", Arc::new(FieldMetricHandler::<Max>::new("max")));
        series_handlers.insert("sum", Arc::new(FieldMetricHandler::<Sum>::new("sum")));
        series_handlers.insert(
            "card",
            Arc::new(FieldMetricHandler::<Cardinality>::new("cardinality")),
        );

        Self::new(bucket_handlers, series_handlers)
    }

    /// The metric aggregations of all the pivot's series, named
    /// deterministically so extraction can find them in any scope.
    fn series_aggregations(
        &self,
        pivot: &Pivot,
        query: &Query,
        ctx: &mut GeneratedQueryContext,
    ) -> Result<JsonMap> {
        let mut aggs = JsonMap::new();
        for series in &pivot.series {
            let Some(handler) = self.series_handlers.get(series.type_tag()) else {
                ctx.add_error(SearchTypeError::new(
                    query,
                    pivot.id(),
                    SearchTypeErrorKind::UnknownSeriesType {
                        type_tag: series.type_tag().to_string(),
                    },
                ));
                continue;
            };
            let name = ctx.series_name(series.as_ref(), pivot);
            if let Some(body) = handler.create_aggregation(&name, pivot, series.as_ref(), ctx)? {
                aggs.insert(name, body);
            }
        }
        Ok(aggs)
    }

    fn bucket_levels(
        &self,
        pivot: &Pivot,
        query: &Query,
        ctx: &mut GeneratedQueryContext,
    ) -> Result<Vec<Level>> {
        let mut levels = Vec::new();

        let groups = pivot
            .row_groups
            .iter()
            .enumerate()
            .map(|(idx, spec)| (spec, idx + 1 == pivot.row_groups.len()))
            .chain(
                pivot
                    .column_groups
                    .iter()
                    .enumerate()
                    .map(|(idx, spec)| (spec, idx + 1 == pivot.column_groups.len())),
            );

        for (spec, last_in_list) in groups {
            let Some(handler) = self.bucket_handlers.get(spec.type_tag()) else {
                ctx.add_error(SearchTypeError::new(
                    query,
                    pivot.id(),
                    SearchTypeErrorKind::UnknownBucketType {
                        type_tag: spec.type_tag().to_string(),
                    },
                ));
                continue;
            };

            let name = ctx.next_name();
            let Some(body) = handler.create_aggregation(&name, pivot, spec.as_ref(), ctx)? else {
                continue;
            };

            let series = if last_in_list || pivot.rollup {
                self.series_aggregations(pivot, query, ctx)?
            } else {
                JsonMap::new()
            };

            levels.push(Level { name, body, series });
        }

        Ok(levels)
    }

    /// Time bounds actually covered by the result. For the all-messages
    /// sentinel the real bounds are read back from the timestamp min/max
    /// aggregations, when any document matched.
    fn extract_effective_time_range(
        &self,
        query: &Query,
        pivot: &Pivot,
        response: &SearchResponse,
        ctx: &GeneratedQueryContext,
    ) -> AbsoluteRange {
        let requested = query.effective_time_range(pivot);
        let resolved = requested.resolve(ctx.now());
        if !requested.is_all_messages() || response.total() == 0 {
            return resolved;
        }

        let bound = |agg_name: &str| {
            response
                .aggregations
                .get(agg_name)
                .and_then(|agg| agg.get("value"))
                .and_then(Value::as_f64)
                .and_then(|millis| parse_timestamp_millis_float(millis).ok())
        };

        AbsoluteRange {
            from: bound(AGG_TIMESTAMP_MIN).unwrap_or(resolved.from),
            to: bound(AGG_TIMESTAMP_MAX).unwrap_or(resolved.to),
        }
    }

    fn process_series(
        &self,
        values: &mut Vec<PivotValue>,
        response: &SearchResponse,
        ctx: &GeneratedQueryContext,
        pivot: &Pivot,
        column_keys: &[String],
        scope: &JsonMap,
        rollup: bool,
        source: ValueSource,
    ) {
        for series in &pivot.series {
            let Some(handler) = self.series_handlers.get(series.type_tag()) else {
                continue;
            };
            let aggregation = ctx.agg_types.sub_aggregation(series.handle(), scope);
            if let Some(value) =
                handler.handle_result(series.as_ref(), response, scope, aggregation, ctx)
            {
                let mut key = column_keys.to_vec();
                key.push(series.literal());
                values.push(PivotValue::new(key, value, rollup, source));
            }
        }
    }

    fn process_columns(
        &self,
        values: &mut Vec<PivotValue>,
        response: &SearchResponse,
        ctx: &GeneratedQueryContext,
        pivot: &Pivot,
        remaining: &[Box<dyn BucketSpec>],
        column_keys: &mut Vec<String>,
        scope: &JsonMap,
    ) {
        let Some(spec) = remaining.first() else {
            // The column-less case is covered by the row-level rollup.
            if !column_keys.is_empty() {
                self.process_series(
                    values,
                    response,
                    ctx,
                    pivot,
                    column_keys,
                    scope,
                    false,
                    ValueSource::ColLeaf,
                );
            }
            return;
        };

        let Some(handler) = self.bucket_handlers.get(spec.type_tag()) else {
            return;
        };
        let Some(aggregation) = handler.extract_aggregation(spec.as_ref(), scope, ctx) else {
            return;
        };

        for bucket in handler.buckets(spec.as_ref(), aggregation) {
            column_keys.push(bucket.key);
            self.process_columns(
                values,
                response,
                ctx,
                pivot,
                &remaining[1..],
                column_keys,
                bucket.scope,
            );
            column_keys.pop();
        }

        if pivot.rollup && !column_keys.is_empty() {
            self.process_series(
                values,
                response,
                ctx,
                pivot,
                column_keys,
                scope,
                true,
                ValueSource::ColInner,
            );
        }
    }

    fn process_rows(
        &self,
        rows: &mut Vec<PivotRow>,
        response: &SearchResponse,
        ctx: &GeneratedQueryContext,
        pivot: &Pivot,
        remaining: &[Box<dyn BucketSpec>],
        key_path: &mut Vec<String>,
        scope: &JsonMap,
    ) {
        let Some(spec) = remaining.first() else {
            let mut values = Vec::new();
            self.process_columns(
                &mut values,
                response,
                ctx,
                pivot,
                &pivot.column_groups,
                &mut Vec::new(),
                scope,
            );
            if pivot.rollup {
                self.process_series(
                    &mut values,
                    response,
                    ctx,
                    pivot,
                    &[],
                    scope,
                    true,
                    ValueSource::RowLeaf,
                );
            }
            rows.push(PivotRow {
                key: key_path.clone(),
                values,
                source: RowSource::Leaf,
            });
            return;
        };

        // Specs whose generation failed have no recorded aggregation and
        // fall through silently; the error was already captured.
        let Some(handler) = self.bucket_handlers.get(spec.type_tag()) else {
            return;
        };
        let Some(aggregation) = handler.extract_aggregation(spec.as_ref(), scope, ctx) else {
            return;
        };

        for bucket in handler.buckets(spec.as_ref(), aggregation) {
            key_path.push(bucket.key);
            self.process_rows(
                rows,
                response,
                ctx,
                pivot,
                &remaining[1..],
                key_path,
                bucket.scope,
            );
            key_path.pop();
        }

        // Subtotal row at this grouping level; at the top this is the
        // grand total row with an empty key.
        if pivot.rollup {
            let mut values = Vec::new();
            self.process_series(
                &mut values,
                response,
                ctx,
                pivot,
                &[],
                scope,
                true,
                ValueSource::RowInner,
            );
            rows.push(PivotRow {
                key: key_path.clone(),
                values,
                source: RowSource::NonLeaf,
            });
        }
    }
}

impl SearchTypeHandler for PivotHandler {
    fn generate_query_part(
        &self,
        _job: &SearchJob,
        query: &Query,
        search_type: &dyn SearchType,
        ctx: &mut GeneratedQueryContext,
    ) -> Result<()> {
        let pivot = downcast_unwrap!(search_type.as_any(), Pivot);

        let rollup_series = if pivot.rollup {
            self.series_aggregations(pivot, query, ctx)?
        } else {
            JsonMap::new()
        };

        let levels = self.bucket_levels(pivot, query, ctx)?;
        if levels.is_empty() && rollup_series.is_empty() {
            debug!("pivot '{}' generated no aggregations", pivot.id());
        }

        // Assemble the chain inside out: each level's sub-aggregations are
        // its series plus the next level down.
        let mut nested: Option<(String, Value)> = None;
        for level in levels.into_iter().rev() {
            let mut sub_aggs = level.series;
            if let Some((child_name, child_body)) = nested.take() {
                sub_aggs.insert(child_name, child_body);
            }

            let mut body = level.body;
            if !sub_aggs.is_empty() {
                if let Value::Object(map) = &mut body {
                    map.insert("aggs".to_string(), Value::Object(sub_aggs));
                }
            }
            nested = Some((level.name, body));
        }

        let source = ctx.search_source_mut(pivot.id());
        for (name, body) in rollup_series {
            source.add_aggregation(name, body);
        }
        if let Some((name, body)) = nested {
            source.add_aggregation(name, body);
        }
        source.add_aggregation(
            AGG_TIMESTAMP_MIN,
            json!({"min": {"field": FIELD_TIMESTAMP}}),
        );
        source.add_aggregation(
            AGG_TIMESTAMP_MAX,
            json!({"max": {"field": FIELD_TIMESTAMP}}),
        );
        Ok(())
    }

    fn extract_result(
        &self,
        _job: &SearchJob,
        query: &Query,
        search_type: &dyn SearchType,
        response: &SearchResponse,
        ctx: &GeneratedQueryContext,
    ) -> Result<Option<SearchTypeResult>> {
        let pivot = downcast_unwrap!(search_type.as_any(), Pivot);

        let mut rows = Vec::new();
        self.process_rows(
            &mut rows,
            response,
            ctx,
            pivot,
            &pivot.row_groups,
            &mut Vec::new(),
            &response.aggregations,
        );

        Ok(Some(SearchTypeResult::Pivot(PivotResult {
            id: pivot.id.clone(),
            name: pivot.name.clone(),
            effective_timerange: self.extract_effective_time_range(query, pivot, response, ctx),
            total: response.total(),
            rows,
        })))
    }
}
