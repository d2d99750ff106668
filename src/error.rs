//! Error taxonomy for the inference engine.
//!
//! One enum covers every failure kind the spec names (config, integrity,
//! I/O, network, quota, capability, dtype, cache, tensor, cancellation,
//! numerical). The `axum::IntoResponse` impl gives the HTTP facade a single
//! place to map kinds onto status codes; nothing downstream re-derives that
//! mapping.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DopplerError {
    #[error("config error: {0}")]
    Config(String),

    #[error("integrity error: {0}")]
    Integrity(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("network error: {0}")]
    Network(String),

    #[error("quota exceeded: {0}")]
    QuotaExceeded(String),

    #[error("capability error: {0}")]
    Capability(String),

    #[error("dtype mismatch: expected {expected}, got {actual}")]
    DtypeMismatch { expected: String, actual: String },

    #[error("cache overflow: start_pos {start_pos} + {num_tokens} > max_seq_len {max_seq_len}")]
    CacheOverflow {
        start_pos: usize,
        num_tokens: usize,
        max_seq_len: usize,
    },

    #[error("tensor missing: {0}")]
    TensorMissing(String),

    #[error("cancelled")]
    Cancelled,

    #[error("numerical error: {0}")]
    Numerical(String),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type DopplerResult<T> = Result<T, DopplerError>;

/// Structured context attached to a user-visible error (spec §7).
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct ErrorContext {
    pub shard_index: Option<usize>,
    pub tensor_name: Option<String>,
    pub model_id: Option<String>,
}

impl IntoResponse for DopplerError {
    fn into_response(self) -> Response {
        let (status, kind) = match &self {
            DopplerError::Config(_) => (StatusCode::BAD_REQUEST, "config_error"),
            DopplerError::Integrity(_) => (StatusCode::CONFLICT, "integrity_error"),
            DopplerError::Io(_) => (StatusCode::INTERNAL_SERVER_ERROR, "io_error"),
            DopplerError::Network(_) => (StatusCode::BAD_GATEWAY, "network_error"),
            DopplerError::QuotaExceeded(_) => {
                (StatusCode::INSUFFICIENT_STORAGE, "quota_exceeded")
            }
            DopplerError::Capability(_) => (StatusCode::SERVICE_UNAVAILABLE, "capability_error"),
            DopplerError::DtypeMismatch { .. } => {
                (StatusCode::INTERNAL_SERVER_ERROR, "dtype_mismatch")
            }
            DopplerError::CacheOverflow { .. } => (StatusCode::OK, "cache_overflow"),
            DopplerError::TensorMissing(_) => (StatusCode::INTERNAL_SERVER_ERROR, "tensor_missing"),
            DopplerError::Cancelled => (StatusCode::from_u16(499).unwrap(), "cancelled"),
            DopplerError::Numerical(_) => (StatusCode::INTERNAL_SERVER_ERROR, "numerical_error"),
            DopplerError::Json(_) => (StatusCode::BAD_REQUEST, "invalid_json"),
        };

        let body = Json(json!({
            "error": {
                "message": self.to_string(),
                "type": kind,
                "code": kind,
                "param": null,
            }
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_overflow_displays_operands() {
        let err = DopplerError::CacheOverflow {
            start_pos: 10,
            num_tokens: 5,
            max_seq_len: 12,
        };
        assert!(err.to_string().contains("10"));
        assert!(err.to_string().contains("12"));
    }

    #[test]
    fn dtype_mismatch_displays_both_sides() {
        let err = DopplerError::DtypeMismatch {
            expected: "F32".into(),
            actual: "F16".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("F32") && msg.contains("F16"));
    }
}
