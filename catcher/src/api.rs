use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::dedup::DedupError;
use crate::record::RecordError;

#[derive(Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct WebhookResponse {
    pub message: String,
}

impl WebhookResponse {
    pub fn success() -> Self {
        Self {
            message: "success".to_string(),
        }
    }
}

#[derive(Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Error, Debug)]
pub enum CatcherError {
    #[error("access key missing or invalid")]
    Unauthorized,
    #[error("invalid webhook batch: {0}")]
    InvalidBatch(String),
    #[error("record {index} could not be processed: {source}")]
    InvalidRecord {
        index: usize,
        #[source]
        source: RecordError,
    },

    #[error("dedup store unavailable: {0}")]
    DedupStoreUnavailable(#[from] DedupError),
    #[error("transient error, please retry")]
    RetryableSinkError,
    #[error("record could not be published")]
    NonRetryableSinkError,
}

impl CatcherError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            CatcherError::Unauthorized => StatusCode::UNAUTHORIZED,
            CatcherError::InvalidBatch(_) => StatusCode::BAD_REQUEST,
            CatcherError::InvalidRecord { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            CatcherError::DedupStoreUnavailable(_) | CatcherError::RetryableSinkError => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            CatcherError::NonRetryableSinkError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Body text returned to Firehose. Details stay in the logs.
    pub fn public_message(&self) -> &'static str {
        match self.status_code() {
            StatusCode::UNAUTHORIZED => "unauthorized",
            StatusCode::BAD_REQUEST => "bad request",
            StatusCode::UNPROCESSABLE_ENTITY => "unprocessable entity",
            StatusCode::SERVICE_UNAVAILABLE => "service unavailable",
            _ => "internal server error",
        }
    }
}

impl IntoResponse for CatcherError {
    fn into_response(self) -> Response {
        (
            self.status_code(),
            Json(ErrorResponse {
                error: self.public_message().to_string(),
            }),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::DecodeError;

    #[test]
    fn status_codes_follow_error_taxonomy() {
        let cases = [
            (CatcherError::Unauthorized, 401, "unauthorized"),
            (
                CatcherError::InvalidBatch("missing records".to_string()),
                400,
                "bad request",
            ),
            (
                CatcherError::InvalidRecord {
                    index: 0,
                    source: RecordError::Decode(DecodeError::Utf8),
                },
                422,
                "unprocessable entity",
            ),
            (CatcherError::RetryableSinkError, 503, "service unavailable"),
            (
                CatcherError::DedupStoreUnavailable(DedupError::Timeout),
                503,
                "service unavailable",
            ),
            (
                CatcherError::NonRetryableSinkError,
                500,
                "internal server error",
            ),
        ];

        for (err, status, message) in cases {
            assert_eq!(err.status_code().as_u16(), status, "{err}");
            assert_eq!(err.public_message(), message);
        }
    }
}
