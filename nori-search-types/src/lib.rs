pub mod errors;
pub mod filter;
pub mod message_list;
pub mod pivot;
pub mod query;
pub mod result;
pub mod search_type;
pub mod timerange;
