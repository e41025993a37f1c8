use color_eyre::eyre::Result;
use nori_common::metrics::{ERROR_HTTP, ERROR_SERVER, ERROR_UNKNOWN, METRICS, STATUS_SUCCESS};

use crate::BackendError;

pub fn error_type_label(err: &color_eyre::Report) -> &'static str {
    match err.downcast_ref::<BackendError>() {
        Some(BackendError::ServerResp(_, _)) => ERROR_SERVER,
        Some(BackendError::Http(_)) => ERROR_HTTP,
        _ => ERROR_UNKNOWN,
    }
}

pub fn record_operation_result<T>(
    backend_name: &str,
    operation: &str,
    result: &Result<T>,
    duration: f64,
) {
    METRICS
        .backend_request_duration
        .with_label_values(&[backend_name, operation])
        .observe(duration);

    match result {
        Ok(_) => {
            METRICS
                .backend_requests_total
                .with_label_values(&[backend_name, STATUS_SUCCESS])
                .inc();
        }
        Err(e) => {
            let error_type = error_type_label(e);
            METRICS
                .backend_errors_total
                .with_label_values(&[backend_name, error_type])
                .inc();
        }
    }
}
