use std::any::Any;
use std::fmt;

use hashbrown::HashSet;

use crate::timerange::TimeRange;

/// A single specialized result requested within a query: a pivot table, a
/// message list, or any externally registered kind.
///
/// The backend dispatches on [`SearchType::type_tag`] to a registered handler
/// which downcasts via [`SearchType::as_any`] to its concrete spec.
#[typetag::serde]
pub trait SearchType: fmt::Debug + Send + Sync {
    /// Unique within one query; errors and results are keyed by it.
    fn id(&self) -> &str;

    fn name(&self) -> Option<&str> {
        None
    }

    fn type_tag(&self) -> &'static str;

    /// Per-search-type time range override.
    fn timerange(&self) -> Option<&TimeRange> {
        None
    }

    /// Per-search-type free-text query override.
    fn query(&self) -> Option<&str> {
        None
    }

    /// Per-search-type stream override. Empty means "use the query's streams".
    fn streams(&self) -> &HashSet<String>;

    fn as_any(&self) -> &dyn Any;
}
