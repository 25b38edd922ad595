use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

/// Payments service error variants.
///
/// `RateLimitExceeded` and `PaymentNotFound` are expected outcomes callers branch
/// on; the `*Unavailable` variants are infrastructure faults and reach HTTP
/// clients only as an opaque 500.
#[derive(Debug, thiserror::Error)]
pub enum PaymentServiceError {
    #[error("{0}")]
    InvalidRequest(String),
    #[error("rate limit exceeded")]
    RateLimitExceeded,
    #[error("payment not found")]
    PaymentNotFound,
    #[error("store unavailable: {0:#}")]
    StoreUnavailable(anyhow::Error),
    #[error("queue unavailable: {0:#}")]
    QueueUnavailable(anyhow::Error),
    #[error("malformed job payload: {0}")]
    MalformedPayload(#[from] serde_json::Error),
    #[error("internal error")]
    Internal(#[from] anyhow::Error),
}

impl PaymentServiceError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidRequest(_) => "INVALID_REQUEST",
            Self::RateLimitExceeded => "RATE_LIMIT_EXCEEDED",
            Self::PaymentNotFound => "PAYMENT_NOT_FOUND",
            Self::StoreUnavailable(_) => "STORE_UNAVAILABLE",
            Self::QueueUnavailable(_) => "QUEUE_UNAVAILABLE",
            Self::MalformedPayload(_) => "MALFORMED_PAYLOAD",
            Self::Internal(_) => "INTERNAL",
        }
    }
}

impl IntoResponse for PaymentServiceError {
    fn into_response(self) -> Response {
        let (status, kind, message) = match &self {
            Self::InvalidRequest(_) => (StatusCode::BAD_REQUEST, self.kind(), self.to_string()),
            Self::RateLimitExceeded => {
                (StatusCode::TOO_MANY_REQUESTS, self.kind(), self.to_string())
            }
            Self::PaymentNotFound => (StatusCode::NOT_FOUND, self.kind(), self.to_string()),
            // Infrastructure detail stays in the logs; clients get a fixed body.
            _ => {
                tracing::error!(error = %self, kind = self.kind(), "internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL",
                    "internal error".to_owned(),
                )
            }
        };
        let body = serde_json::json!({
            "kind": kind,
            "message": message,
        });
        (status, axum::Json(body)).into_response()
    }
}
