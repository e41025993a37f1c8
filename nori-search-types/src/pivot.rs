use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use hashbrown::HashSet;
use nori_common::humantime_utils::{deserialize_duration, serialize_duration};
use serde::{Deserialize, Serialize};

use crate::search_type::SearchType;
use crate::timerange::TimeRange;

/// Identity of one spec *instance*, assigned at construction.
///
/// The generation context keys its aggregation-name side table by this, not
/// by structural equality: two value-equal specs used at different nesting
/// levels must resolve independently. The handle is never serialized; a
/// deserialized spec gets a fresh one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SpecHandle(usize);

static SPEC_HANDLE_COUNTER: AtomicUsize = AtomicUsize::new(0);

impl SpecHandle {
    pub fn next() -> Self {
        SpecHandle(SPEC_HANDLE_COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

/// Partitions matched documents into named groups (terms, time intervals).
/// Semantics are owned entirely by the registered bucket handler.
#[typetag::serde]
pub trait BucketSpec: fmt::Debug + Send + Sync {
    fn type_tag(&self) -> &'static str;
    fn handle(&self) -> SpecHandle;
    fn as_any(&self) -> &dyn Any;
}

/// A scalar aggregate computed within a group (count, average, ...).
#[typetag::serde]
pub trait SeriesSpec: fmt::Debug + Send + Sync {
    fn type_tag(&self) -> &'static str;

    /// The series id appended to value keys, e.g. `avg(took_ms)`.
    fn literal(&self) -> String;

    fn handle(&self) -> SpecHandle;
    fn as_any(&self) -> &dyn Any;
}

/// A search type whose result is a row/column table built from grouping and
/// metric specs.
#[derive(Debug, Serialize, Deserialize)]
pub struct Pivot {
    pub id: String,

    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub row_groups: Vec<Box<dyn BucketSpec>>,

    #[serde(default)]
    pub column_groups: Vec<Box<dyn BucketSpec>>,

    #[serde(default)]
    pub series: Vec<Box<dyn SeriesSpec>>,

    /// When set, subtotals are computed at every intermediate grouping level
    /// in addition to the leaf-level aggregates.
    #[serde(default = "default_rollup")]
    pub rollup: bool,

    #[serde(default)]
    pub timerange: Option<TimeRange>,

    #[serde(default)]
    pub query: Option<String>,

    #[serde(default)]
    pub streams: HashSet<String>,
}

fn default_rollup() -> bool {
    true
}

impl Pivot {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
            row_groups: Vec::new(),
            column_groups: Vec::new(),
            series: Vec::new(),
            rollup: true,
            timerange: None,
            query: None,
            streams: HashSet::new(),
        }
    }
}

#[typetag::serde(name = "pivot")]
impl SearchType for Pivot {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    fn type_tag(&self) -> &'static str {
        "pivot"
    }

    fn timerange(&self) -> Option<&TimeRange> {
        self.timerange.as_ref()
    }

    fn query(&self) -> Option<&str> {
        self.query.as_deref()
    }

    fn streams(&self) -> &HashSet<String> {
        &self.streams
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

fn default_values_limit() -> u32 {
    15
}

/// Group by the distinct values of a field.
#[derive(Debug, Serialize, Deserialize)]
pub struct Values {
    pub field: String,

    #[serde(default = "default_values_limit")]
    pub limit: u32,

    #[serde(skip_serializing, default = "SpecHandle::next")]
    handle: SpecHandle,
}

impl Values {
    pub fn new(field: impl Into<String>, limit: u32) -> Self {
        Self {
            field: field.into(),
            limit,
            handle: SpecHandle::next(),
        }
    }
}

#[typetag::serde(name = "values")]
impl BucketSpec for Values {
    fn type_tag(&self) -> &'static str {
        "values"
    }

    fn handle(&self) -> SpecHandle {
        self.handle
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

fn default_timestamp_field() -> String {
    "timestamp".to_string()
}

/// Group into fixed-width time intervals of a date field.
#[derive(Debug, Serialize, Deserialize)]
pub struct TimeHistogram {
    #[serde(default = "default_timestamp_field")]
    pub field: String,

    #[serde(
        serialize_with = "serialize_duration",
        deserialize_with = "deserialize_duration"
    )]
    pub interval: Duration,

    #[serde(skip_serializing, default = "SpecHandle::next")]
    handle: SpecHandle,
}

impl TimeHistogram {
    pub fn new(field: impl Into<String>, interval: Duration) -> Self {
        Self {
            field: field.into(),
            interval,
            handle: SpecHandle::next(),
        }
    }
}

#[typetag::serde(name = "time")]
impl BucketSpec for TimeHistogram {
    fn type_tag(&self) -> &'static str {
        "time"
    }

    fn handle(&self) -> SpecHandle {
        self.handle
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Count of documents, optionally only those where a field is present.
#[derive(Debug, Serialize, Deserialize)]
pub struct Count {
    #[serde(default)]
    pub field: Option<String>,

    #[serde(skip_serializing, default = "SpecHandle::next")]
    handle: SpecHandle,
}

impl Count {
    pub fn new() -> Self {
        Self {
            field: None,
            handle: SpecHandle::next(),
        }
    }

    pub fn of_field(field: impl Into<String>) -> Self {
        Self {
            field: Some(field.into()),
            handle: SpecHandle::next(),
        }
    }
}

impl Default for Count {
    fn default() -> Self {
        Self::new()
    }
}

#[typetag::serde(name = "count")]
impl SeriesSpec for Count {
    fn type_tag(&self) -> &'static str {
        "count"
    }

    fn literal(&self) -> String {
        match &self.field {
            Some(field) => format!("count({field})"),
            None => "count()".to_string(),
        }
    }

    fn handle(&self) -> SpecHandle {
        self.handle
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Series specs that aggregate a single numeric field.
pub trait FieldSeries {
    fn field(&self) -> &str;
}

macro_rules! field_series_spec {
    ($name:ident, $tag:literal) => {
        #[derive(Debug, Serialize, Deserialize)]
        pub struct $name {
            pub field: String,

            #[serde(skip_serializing, default = "SpecHandle::next")]
            handle: SpecHandle,
        }

        impl $name {
            pub fn new(field: impl Into<String>) -> Self {
                Self {
                    field: field.into(),
                    handle: SpecHandle::next(),
                }
            }
        }

        impl FieldSeries for $name {
            fn field(&self) -> &str {
                &self.field
            }
        }

        #[typetag::serde(name = $tag)]
        impl SeriesSpec for $name {
            fn type_tag(&self) -> &'static str {
                $tag
            }

            fn literal(&self) -> String {
                format!("{}({})", $tag, self.field)
            }

            fn handle(&self) -> SpecHandle {
                self.handle
            }

            fn as_any(&self) -> &dyn Any {
                self
            }
        }
    };
}

field_series_spec!(Average, "avg");
field_series_spec!(Min, "min");
field_series_spec!(Max, "max");
field_series_spec!(Sum, "sum");
field_series_spec!(Cardinality, "card");
