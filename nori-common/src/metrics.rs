use once_cell::sync::Lazy;
use prometheus::{
    HistogramVec, IntCounterVec, exponential_buckets, register_histogram_vec,
    register_int_counter_vec,
};

pub static METRICS: Lazy<Metrics> = Lazy::new(Metrics::default);

// Backend name labels
pub const BACKEND_ELASTICSEARCH: &str = "elasticsearch";

// Backend operation labels
pub const OP_MULTI_SEARCH: &str = "multi_search";

// Status labels
pub const STATUS_SUCCESS: &str = "success";
pub const ERROR_UNKNOWN: &str = "unknown_error";
pub const ERROR_SERVER: &str = "server_error";
pub const ERROR_HTTP: &str = "http_error";

// Per-search-type error labels
pub const ERROR_GENERATION: &str = "generation";
pub const ERROR_EXECUTION: &str = "execution";

pub struct Metrics {
    pub downloaded_bytes: IntCounterVec,
    pub backend_request_duration: HistogramVec,
    pub backend_requests_total: IntCounterVec,
    pub backend_errors_total: IntCounterVec,
    pub search_type_errors_total: IntCounterVec,
}

/// From 0.05s to 508.798s
fn duration_buckets() -> Vec<f64> {
    exponential_buckets(0.05, 1.85, 15).unwrap()
}

impl Default for Metrics {
    fn default() -> Self {
        Self {
            downloaded_bytes: register_int_counter_vec!(
                "nori_downloaded_bytes",
                "Number of bytes downloaded from a search backend",
                &["backend"],
            )
            .expect("create downloaded_bytes"),

            backend_request_duration: register_histogram_vec!(
                "nori_backend_request_duration",
                "Duration of backend requests in seconds",
                &["backend", "operation"],
                duration_buckets(),
            )
            .expect("create backend_request_duration"),

            backend_requests_total: register_int_counter_vec!(
                "nori_backend_requests_total",
                "Total number of backend requests",
                &["backend", "status"]
            )
            .expect("create backend_requests_total"),

            backend_errors_total: register_int_counter_vec!(
                "nori_backend_errors_total",
                "Total number of backend request errors",
                &["backend", "error_type"]
            )
            .expect("create backend_errors_total"),

            search_type_errors_total: register_int_counter_vec!(
                "nori_search_type_errors_total",
                "Total number of per-search-type errors in query results",
                &["phase"]
            )
            .expect("create search_type_errors_total"),
        }
    }
}
