use color_eyre::eyre::Result;
use nori_search_types::pivot::{BucketSpec, Pivot, TimeHistogram, Values};
use serde_json::{Value, json};

use crate::context::GeneratedQueryContext;
use crate::downcast_unwrap;

use super::PivotBucketHandler;

/// Terms aggregation over a field's distinct values.
pub struct ValuesBucketHandler;

impl PivotBucketHandler for ValuesBucketHandler {
    fn create_aggregation(
        &self,
        name: &str,
        _pivot: &Pivot,
        spec: &dyn BucketSpec,
        ctx: &mut GeneratedQueryContext,
    ) -> Result<Option<Value>> {
        let values = downcast_unwrap!(spec.as_any(), Values);
        ctx.agg_types.record(values.handle(), name);
        Ok(Some(json!({
            "terms": {
                "field": values.field,
                "size": values.limit,
            }
        })))
    }
}

/// Fixed-interval date histogram over a timestamp field.
pub struct TimeBucketHandler;

impl PivotBucketHandler for TimeBucketHandler {
    fn create_aggregation(
        &self,
        name: &str,
        _pivot: &Pivot,
        spec: &dyn BucketSpec,
        ctx: &mut GeneratedQueryContext,
    ) -> Result<Option<Value>> {
        let histogram = downcast_unwrap!(spec.as_any(), TimeHistogram);
        ctx.agg_types.record(histogram.handle(), name);
        Ok(Some(json!({
            "date_histogram": {
                "field": histogram.field,
                "fixed_interval": format!("{}ms", histogram.interval.as_millis()),
            }
        })))
    }
}
