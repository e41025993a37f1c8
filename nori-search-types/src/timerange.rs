use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// The time window a query or a single search type is constrained to.
///
/// A relative range of 0 seconds is the "all messages" sentinel: it matches
/// every document regardless of age.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TimeRange {
    Relative {
        /// Seconds back from now. 0 means all messages.
        range: u64,
    },
    Absolute {
        #[serde(with = "time::serde::rfc3339")]
        from: OffsetDateTime,
        #[serde(with = "time::serde::rfc3339")]
        to: OffsetDateTime,
    },
}

impl TimeRange {
    pub const fn all_messages() -> Self {
        TimeRange::Relative { range: 0 }
    }

    pub fn is_all_messages(&self) -> bool {
        matches!(self, TimeRange::Relative { range: 0 })
    }

    /// Anchor a relative range at `now`, producing concrete bounds.
    pub fn resolve(&self, now: OffsetDateTime) -> AbsoluteRange {
        match self {
            TimeRange::Relative { range: 0 } => AbsoluteRange::new(OffsetDateTime::UNIX_EPOCH, now),
            TimeRange::Relative { range } => {
                AbsoluteRange::new(now - time::Duration::seconds(*range as i64), now)
            }
            TimeRange::Absolute { from, to } => AbsoluteRange::new(*from, *to),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbsoluteRange {
    #[serde(with = "time::serde::rfc3339")]
    pub from: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub to: OffsetDateTime,
}

impl AbsoluteRange {
    pub fn new(from: OffsetDateTime, to: OffsetDateTime) -> Self {
        Self { from, to }
    }
}
