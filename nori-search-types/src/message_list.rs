use std::any::Any;

use hashbrown::HashSet;
use serde::{Deserialize, Serialize};

use crate::search_type::SearchType;
use crate::timerange::TimeRange;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageSort {
    pub field: String,
    pub order: SortOrder,
}

fn default_limit() -> u64 {
    150
}

/// A search type that returns a page of raw matched messages.
#[derive(Debug, Serialize, Deserialize)]
pub struct MessageList {
    pub id: String,

    #[serde(default)]
    pub name: Option<String>,

    #[serde(default = "default_limit")]
    pub limit: u64,

    #[serde(default)]
    pub offset: u64,

    #[serde(default)]
    pub sort: Option<Vec<MessageSort>>,

    #[serde(default)]
    pub timerange: Option<TimeRange>,

    #[serde(default)]
    pub query: Option<String>,

    #[serde(default)]
    pub streams: HashSet<String>,
}

impl MessageList {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
            limit: default_limit(),
            offset: 0,
            sort: None,
            timerange: None,
            query: None,
            streams: HashSet::new(),
        }
    }
}

#[typetag::serde(name = "messages")]
impl SearchType for MessageList {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    fn type_tag(&self) -> &'static str {
        "messages"
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
