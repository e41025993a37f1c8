use std::marker::PhantomData;

use color_eyre::eyre::Result;
use nori_search_types::pivot::{Count, FieldSeries, Pivot, SeriesSpec};
use serde_json::{Value, json};

use crate::context::GeneratedQueryContext;
use crate::downcast_unwrap;
use crate::dsl::JsonMap;
use crate::transport::SearchResponse;

use super::PivotSeriesHandler;

/// Document counts. The fieldless form needs no aggregation at all: every
/// bucket already carries its `doc_count`, and the root scope falls back to
/// the total hit count.
pub struct CountSeriesHandler;

impl PivotSeriesHandler for CountSeriesHandler {
    fn create_aggregation(
        &self,
        name: &str,
        _pivot: &Pivot,
        spec: &dyn SeriesSpec,
        ctx: &mut GeneratedQueryContext,
    ) -> Result<Option<Value>> {
        let count = downcast_unwrap!(spec.as_any(), Count);
        match &count.field {
            Some(field) => {
                ctx.agg_types.record(count.handle(), name);
                Ok(Some(json!({"value_count": {"field": field}})))
            }
            None => Ok(None),
        }
    }

    fn handle_result(
        &self,
        _spec: &dyn SeriesSpec,
        response: &SearchResponse,
        scope: &JsonMap,
        aggregation: Option<&Value>,
        _ctx: &GeneratedQueryContext,
    ) -> Option<Value> {
        match aggregation {
            Some(agg) => agg.get("value").cloned(),
            None => scope
                .get("doc_count")
                .cloned()
                .or_else(|| Some(json!(response.total()))),
        }
    }
}

/// A single-field metric (avg, min, max, sum, cardinality). The spec type
/// carries the field; `op` is the aggregation name on the wire.
pub struct FieldMetricHandler<S> {
    op: &'static str,
    _spec: PhantomData<S>,
}

impl<S> FieldMetricHandler<S> {
    pub fn new(op: &'static str) -> Self {
        Self {
            op,
            _spec: PhantomData,
        }
    }
}

impl<S: SeriesSpec + FieldSeries + 'static> PivotSeriesHandler for FieldMetricHandler<S> {
    fn create_aggregation(
        &self,
        name: &str,
        _pivot: &Pivot,
        spec: &dyn SeriesSpec,
        ctx: &mut GeneratedQueryContext,
    ) -> Result<Option<Value>> {
        let spec = downcast_unwrap!(spec.as_any(), S);
        ctx.agg_types.record(spec.handle(), name);

        let mut body = JsonMap::new();
        body.insert(self.op.to_string(), json!({"field": spec.field()}));
        Ok(Some(Value::Object(body)))
    }

    fn handle_result(
        &self,
        _spec: &dyn SeriesSpec,
        _response: &SearchResponse,
        _scope: &JsonMap,
        aggregation: Option<&Value>,
        _ctx: &GeneratedQueryContext,
    ) -> Option<Value> {
        aggregation?.get("value").cloned()
    }
}
