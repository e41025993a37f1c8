use std::any::Any;
use std::time::Duration;

use nori_search_types::errors::SearchTypeErrorKind;
use nori_search_types::pivot::{
    Average, Count, Pivot, SeriesSpec, SpecHandle, TimeHistogram, Values,
};
use nori_search_types::result::{RowSource, ValueSource};
use nori_search_types::timerange::TimeRange;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use test_case::test_case;
use time::OffsetDateTime;
use time::macros::datetime;

use crate::test_utils::{MockIndexLookup, MockTransport, job, query_with, search_response};
use crate::{ElasticsearchBackend, SearchConfig};

fn lookup() -> std::sync::Arc<MockIndexLookup> {
    MockIndexLookup::new([("s1", vec!["idx_s1"])])
}

fn generated_aggs(pivot: Pivot) -> Value {
    let backend = ElasticsearchBackend::new(MockTransport::new(vec![]), lookup());
    let query = query_with(vec![Box::new(pivot)]);
    let ctx = backend
        .generate(&job(), &query, &SearchConfig::default())
        .unwrap();
    ctx.search_source("p1").unwrap().to_value()["aggs"].clone()
}

async fn run_pivot(pivot: Pivot, timerange: TimeRange, response: Value) -> nori_search_types::result::PivotResult {
    let backend = ElasticsearchBackend::new(MockTransport::new(vec![search_response(response)]), lookup());
    let mut query = query_with(vec![Box::new(pivot)]);
    query.timerange = timerange;

    let ctx = backend
        .generate(&job(), &query, &SearchConfig::default())
        .unwrap();
    let result = backend.run(&job(), query, ctx).await.unwrap();
    result.search_types["p1"].as_pivot().unwrap().clone()
}

#[test]
fn test_builder_nests_rows_then_columns_with_leaf_series() {
    let mut pivot = Pivot::new("p1");
    pivot.rollup = false;
    pivot.row_groups.push(Box::new(Values::new("source", 10)));
    pivot
        .column_groups
        .push(Box::new(TimeHistogram::new("timestamp", Duration::from_secs(60))));
    pivot.series.push(Box::new(Average::new("took_ms")));

    let aggs = generated_aggs(pivot);

    assert_eq!(
        aggs["agg_0"]["terms"],
        json!({"field": "source", "size": 10})
    );
    assert_eq!(
        aggs["agg_0"]["aggs"]["agg_1"]["date_histogram"],
        json!({"field": "timestamp", "fixed_interval": "60000ms"})
    );
    assert_eq!(
        aggs["agg_0"]["aggs"]["agg_1"]["aggs"]["p1-series-avg(took_ms)"],
        json!({"avg": {"field": "took_ms"}})
    );

    assert_eq!(aggs["timestamp-min"], json!({"min": {"field": "timestamp"}}));
    assert_eq!(aggs["timestamp-max"], json!({"max": {"field": "timestamp"}}));
    assert!(aggs.get("p1-series-avg(took_ms)").is_none());
}

#[test]
fn test_builder_rollup_attaches_series_at_every_level() {
    let mut pivot = Pivot::new("p1");
    pivot.row_groups.push(Box::new(Values::new("source", 10)));
    pivot.row_groups.push(Box::new(Values::new("host", 10)));
    pivot.series.push(Box::new(Average::new("took_ms")));

    let aggs = generated_aggs(pivot);
    let series = "p1-series-avg(took_ms)";

    assert!(aggs.get(series).is_some());
    assert!(aggs["agg_0"]["aggs"].get(series).is_some());
    assert!(aggs["agg_0"]["aggs"]["agg_1"]["aggs"].get(series).is_some());
}

#[test]
fn test_builder_fieldless_count_needs_no_aggregation() {
    let mut pivot = Pivot::new("p1");
    pivot.row_groups.push(Box::new(Values::new("source", 10)));
    pivot.series.push(Box::new(Count::new()));

    let aggs = generated_aggs(pivot);
    assert!(aggs.get("p1-series-count()").is_none());
    assert!(aggs["agg_0"].get("aggs").is_none());
}

#[derive(Debug, Serialize, Deserialize)]
struct WeirdSeries {
    #[serde(skip_serializing, default = "SpecHandle::next")]
    handle: SpecHandle,
}

#[typetag::serde(name = "weird")]
impl SeriesSpec for WeirdSeries {
    fn type_tag(&self) -> &'static str {
        "weird"
    }

    fn literal(&self) -> String {
        "weird()".to_string()
    }

    fn handle(&self) -> SpecHandle {
        self.handle
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[test]
fn test_unknown_series_tag_records_single_error() {
    let backend = ElasticsearchBackend::new(MockTransport::new(vec![]), lookup());

    let mut pivot = Pivot::new("p1");
    pivot.row_groups.push(Box::new(Values::new("source", 10)));
    pivot.series.push(Box::new(WeirdSeries {
        handle: SpecHandle::next(),
    }));
    let query = query_with(vec![Box::new(pivot)]);

    let ctx = backend
        .generate(&job(), &query, &SearchConfig::default())
        .unwrap();

    // Rollup attaches series at two levels plus the root; the error is
    // still recorded once.
    assert_eq!(ctx.errors().len(), 1);
    assert_eq!(
        ctx.errors()[0].kind,
        SearchTypeErrorKind::UnknownSeriesType {
            type_tag: "weird".to_string(),
        }
    );
    assert_eq!(ctx.generated_ids(), ["p1"]);
}

#[tokio::test]
async fn test_extraction_rows_columns_and_rollup() {
    let mut pivot = Pivot::new("p1");
    pivot.row_groups.push(Box::new(Values::new("source", 10)));
    pivot.column_groups.push(Box::new(Values::new("host", 10)));
    pivot.series.push(Box::new(Count::new()));

    let result = run_pivot(
        pivot,
        TimeRange::Relative { range: 300 },
        json!({
            "hits": {"total": {"value": 100}, "hits": []},
            "aggregations": {
                "agg_0": {"buckets": [
                    {
                        "key": "a",
                        "doc_count": 60,
                        "agg_1": {"buckets": [
                            {"key": "h1", "doc_count": 40},
                            {"key": "h2", "doc_count": 20},
                        ]},
                    },
                    {
                        "key": "b",
                        "doc_count": 40,
                        "agg_1": {"buckets": [{"key": "h1", "doc_count": 40}]},
                    },
                ]},
                "timestamp-min": {"value": 1717200000000.0},
                "timestamp-max": {"value": 1717286400000.0},
            },
        }),
    )
    .await;

    assert_eq!(result.total, 100);
    assert_eq!(result.rows.len(), 3);

    let row_a = &result.rows[0];
    assert_eq!(row_a.key, ["a"]);
    assert_eq!(row_a.source, RowSource::Leaf);
    assert_eq!(row_a.values.len(), 3);
    assert_eq!(row_a.values[0].key, ["h1", "count()"]);
    assert_eq!(row_a.values[0].value, json!(40));
    assert_eq!(row_a.values[0].source, ValueSource::ColLeaf);
    assert!(!row_a.values[0].rollup);
    assert_eq!(row_a.values[1].key, ["h2", "count()"]);
    assert_eq!(row_a.values[2].key, ["count()"]);
    assert_eq!(row_a.values[2].value, json!(60));
    assert_eq!(row_a.values[2].source, ValueSource::RowLeaf);
    assert!(row_a.values[2].rollup);

    let row_b = &result.rows[1];
    assert_eq!(row_b.key, ["b"]);
    assert_eq!(row_b.values.len(), 2);

    // Grand total: empty key, count from the total hit count.
    let grand = &result.rows[2];
    assert_eq!(grand.key, Vec::<String>::new());
    assert_eq!(grand.source, RowSource::NonLeaf);
    assert_eq!(grand.values.len(), 1);
    assert_eq!(grand.values[0].value, json!(100));
    assert_eq!(grand.values[0].source, ValueSource::RowInner);
}

#[tokio::test]
async fn test_extraction_emits_subtotals_per_row_level() {
    let mut pivot = Pivot::new("p1");
    pivot.row_groups.push(Box::new(Values::new("source", 10)));
    pivot.row_groups.push(Box::new(Values::new("host", 10)));
    pivot.series.push(Box::new(Count::new()));

    let result = run_pivot(
        pivot,
        TimeRange::Relative { range: 300 },
        json!({
            "hits": {"total": {"value": 100}, "hits": []},
            "aggregations": {
                "agg_0": {"buckets": [
                    {
                        "key": "a",
                        "doc_count": 60,
                        "agg_1": {"buckets": [
                            {"key": "h1", "doc_count": 40},
                            {"key": "h2", "doc_count": 20},
                        ]},
                    },
                    {
                        "key": "b",
                        "doc_count": 40,
                        "agg_1": {"buckets": [{"key": "h3", "doc_count": 40}]},
                    },
                ]},
            },
        }),
    )
    .await;

    let keys: Vec<(Vec<String>, RowSource)> = result
        .rows
        .iter()
        .map(|row| (row.key.clone(), row.source))
        .collect();
    assert_eq!(
        keys,
        [
            (vec!["a".to_string(), "h1".to_string()], RowSource::Leaf),
            (vec!["a".to_string(), "h2".to_string()], RowSource::Leaf),
            (vec!["a".to_string()], RowSource::NonLeaf),
            (vec!["b".to_string(), "h3".to_string()], RowSource::Leaf),
            (vec!["b".to_string()], RowSource::NonLeaf),
            (vec![], RowSource::NonLeaf),
        ]
    );

    let subtotal_a = &result.rows[2];
    assert_eq!(subtotal_a.values[0].value, json!(60));
}

/// Synthetic response for a source × host row grid with a dc column group:
/// every leaf column bucket holds one document.
fn grid_response(rows: usize, hosts: usize, columns: usize) -> Value {
    let column_buckets: Vec<Value> = (0..columns)
        .map(|c| json!({"key": format!("dc{c}"), "doc_count": 1}))
        .collect();
    let host_buckets: Vec<Value> = (0..hosts)
        .map(|h| {
            json!({
                "key": format!("host{h}"),
                "doc_count": columns,
                "agg_2": {"buckets": column_buckets.clone()},
            })
        })
        .collect();
    let row_buckets: Vec<Value> = (0..rows)
        .map(|r| {
            json!({
                "key": format!("src{r}"),
                "doc_count": hosts * columns,
                "agg_1": {"buckets": host_buckets.clone()},
            })
        })
        .collect();

    json!({
        "hits": {"total": {"value": rows * hosts * columns}, "hits": []},
        "aggregations": {"agg_0": {"buckets": row_buckets}},
    })
}

#[test_case(1, 1, 1)]
#[test_case(2, 2, 2)]
#[test_case(2, 3, 1)]
#[test_case(3, 2, 4)]
#[tokio::test]
async fn test_extraction_row_and_value_counts_scale_with_the_grid(
    rows: usize,
    hosts: usize,
    columns: usize,
) {
    let mut pivot = Pivot::new("p1");
    pivot.row_groups.push(Box::new(Values::new("source", 10)));
    pivot.row_groups.push(Box::new(Values::new("host", 10)));
    pivot.column_groups.push(Box::new(Values::new("dc", 10)));
    pivot.series.push(Box::new(Count::new()));

    let result = run_pivot(
        pivot,
        TimeRange::Relative { range: 300 },
        grid_response(rows, hosts, columns),
    )
    .await;

    let leaves: Vec<_> = result
        .rows
        .iter()
        .filter(|row| row.source == RowSource::Leaf)
        .collect();
    let subtotals: Vec<_> = result
        .rows
        .iter()
        .filter(|row| row.source == RowSource::NonLeaf)
        .collect();

    // One leaf per row-key combination; one subtotal per first-level
    // bucket plus the grand total.
    assert_eq!(leaves.len(), rows * hosts);
    assert_eq!(subtotals.len(), rows + 1);
    assert_eq!(result.rows.len(), rows * hosts + rows + 1);

    // Leaves carry one value per column bucket plus the row-leaf rollup.
    for leaf in &leaves {
        assert_eq!(leaf.key.len(), 2);
        assert_eq!(leaf.values.len(), columns + 1);
        assert_eq!(
            leaf.values[columns].value,
            json!(columns),
            "row-leaf rollup is the bucket doc_count"
        );
    }

    for subtotal in &subtotals {
        assert_eq!(subtotal.values.len(), 1);
    }

    let first_level: Vec<_> = subtotals.iter().filter(|row| row.key.len() == 1).collect();
    assert_eq!(first_level.len(), rows);
    for subtotal in first_level {
        assert_eq!(subtotal.values[0].value, json!(hosts * columns));
    }

    let grand = subtotals.iter().find(|row| row.key.is_empty()).unwrap();
    assert_eq!(grand.values[0].value, json!(rows * hosts * columns));
}

#[tokio::test]
async fn test_extraction_without_rollup_has_no_subtotal_rows() {
    let mut pivot = Pivot::new("p1");
    pivot.rollup = false;
    pivot.row_groups.push(Box::new(Values::new("source", 10)));
    pivot.column_groups.push(Box::new(Values::new("host", 10)));
    pivot.series.push(Box::new(Count::new()));

    let result = run_pivot(
        pivot,
        TimeRange::Relative { range: 300 },
        json!({
            "hits": {"total": {"value": 60}, "hits": []},
            "aggregations": {
                "agg_0": {"buckets": [
                    {
                        "key": "a",
                        "doc_count": 60,
                        "agg_1": {"buckets": [{"key": "h1", "doc_count": 40}]},
                    },
                ]},
            },
        }),
    )
    .await;

    assert_eq!(result.rows.len(), 1);
    let row = &result.rows[0];
    assert_eq!(row.source, RowSource::Leaf);
    // Only the column-leaf value; no row-leaf rollup value.
    assert_eq!(row.values.len(), 1);
    assert_eq!(row.values[0].key, ["h1", "count()"]);
}

#[tokio::test]
async fn test_extraction_numeric_bucket_keys_become_strings() {
    let mut pivot = Pivot::new("p1");
    pivot
        .row_groups
        .push(Box::new(TimeHistogram::new("timestamp", Duration::from_secs(60))));
    pivot.series.push(Box::new(Count::new()));

    let result = run_pivot(
        pivot,
        TimeRange::Relative { range: 300 },
        json!({
            "hits": {"total": {"value": 7}, "hits": []},
            "aggregations": {
                "agg_0": {"buckets": [
                    {
                        "key": 1717200000000u64,
                        "key_as_string": "2024-06-01T00:00:00.000Z",
                        "doc_count": 7,
                    },
                ]},
            },
        }),
    )
    .await;

    assert_eq!(result.rows[0].key, ["2024-06-01T00:00:00.000Z"]);
}

#[tokio::test]
async fn test_effective_time_range_inferred_for_all_messages() {
    let mut pivot = Pivot::new("p1");
    pivot.series.push(Box::new(Count::new()));

    let result = run_pivot(
        pivot,
        TimeRange::all_messages(),
        json!({
            "hits": {"total": {"value": 5}, "hits": []},
            "aggregations": {
                "timestamp-min": {"value": 1717200000000.0},
                "timestamp-max": {"value": 1717286400000.0},
            },
        }),
    )
    .await;

    assert_eq!(result.effective_timerange.from, datetime!(2024-06-01 00:00 UTC));
    assert_eq!(result.effective_timerange.to, datetime!(2024-06-02 00:00 UTC));
}

#[tokio::test]
async fn test_effective_time_range_of_empty_all_messages_result() {
    let mut pivot = Pivot::new("p1");
    pivot.series.push(Box::new(Count::new()));

    let result = run_pivot(
        pivot,
        TimeRange::all_messages(),
        json!({"hits": {"total": {"value": 0}, "hits": []}}),
    )
    .await;

    assert_eq!(result.effective_timerange.from, OffsetDateTime::UNIX_EPOCH);
}

#[tokio::test]
async fn test_groupless_pivot_yields_single_row_with_totals() {
    let mut pivot = Pivot::new("p1");
    pivot.series.push(Box::new(Count::new()));

    let result = run_pivot(
        pivot,
        TimeRange::Relative { range: 300 },
        json!({"hits": {"total": {"value": 42}, "hits": []}}),
    )
    .await;

    assert_eq!(result.rows.len(), 1);
    let row = &result.rows[0];
    assert_eq!(row.key, Vec::<String>::new());
    assert_eq!(row.source, RowSource::Leaf);
    assert_eq!(row.values[0].key, ["count()"]);
    assert_eq!(row.values[0].value, json!(42));
    assert_eq!(row.values[0].source, ValueSource::RowLeaf);
}
