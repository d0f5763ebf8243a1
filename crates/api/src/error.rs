use axum::{http::StatusCode, response::IntoResponse, Json};
use notifyhub_engine::EngineError;
use serde::Serialize;

use crate::state::RequestId;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
    pub request_id: String,
    #[serde(rename = "affordableCount", skip_serializing_if = "Option::is_none")]
    pub affordable_count: Option<u64>,
}

#[derive(Debug)]
pub enum AppError {
    BadRequest(String),
    Unauthorized,
    Forbidden(String),
    NotFound(String),
    Conflict(String),
    InsufficientCredit {
        message: String,
        affordable_count: u64,
    },
    RateLimited,
    Provider(String),
    Gateway(String),
    Internal,
}

#[derive(Debug)]
pub struct ApiError {
    pub error: AppError,
    pub request_id: String,
}

impl AppError {
    pub fn with_request_id(self, request_id: &str) -> ApiError {
        ApiError {
            error: self,
            request_id: request_id.to_string(),
        }
    }
}

impl From<EngineError> for AppError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Validation(msg) => AppError::BadRequest(msg),
            EngineError::InsufficientCredit {
                affordable_count, ..
            } => AppError::InsufficientCredit {
                message: err.to_string(),
                affordable_count,
            },
            EngineError::Provider(msg) => AppError::Provider(msg),
            EngineError::Gateway(msg) => AppError::Gateway(msg),
            EngineError::NotFound(_) => AppError::NotFound(err.to_string()),
            EngineError::Conflict(msg) => AppError::Conflict(msg),
            EngineError::Store(err) => {
                tracing::error!(error = %err, "store error");
                AppError::Internal
            }
        }
    }
}

/// Attaches the request id to any error convertible into [`AppError`].
pub trait WithRequestId<T> {
    fn or_request(self, request_id: &RequestId) -> ApiResult<T>;
}

impl<T, E: Into<AppError>> WithRequestId<T> for Result<T, E> {
    fn or_request(self, request_id: &RequestId) -> ApiResult<T> {
        self.map_err(|err| err.into().with_request_id(&request_id.0))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let mut affordable_count = None;
        let (status, code, message) = match self.error {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "invalid_request", msg),
            AppError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "unauthorized",
                "Invalid API key".to_string(),
            ),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, "forbidden", msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, "conflict", msg),
            AppError::InsufficientCredit {
                message,
                affordable_count: count,
            } => {
                affordable_count = Some(count);
                (StatusCode::PAYMENT_REQUIRED, "insufficient_credit", message)
            }
            AppError::RateLimited => (
                StatusCode::TOO_MANY_REQUESTS,
                "rate_limited",
                "Too many requests".to_string(),
            ),
            AppError::Provider(msg) => (StatusCode::BAD_GATEWAY, "provider_error", msg),
            AppError::Gateway(msg) => (StatusCode::BAD_GATEWAY, "gateway_error", msg),
            AppError::Internal => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                "Unexpected error".to_string(),
            ),
        };

        (
            status,
            Json(ErrorResponse {
                error: ErrorBody {
                    code: code.to_string(),
                    message,
                    request_id: self.request_id,
                    affordable_count,
                },
            }),
        )
            .into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use notifyhub_core::credits::Credits;

    async fn body_of(err: ApiError) -> (StatusCode, serde_json::Value) {
        let response = err.into_response();
        let status = response.status();
        let body = to_bytes(response.into_body(), 4096).await.unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn test_bad_request_response() {
        let err = AppError::BadRequest("Message is required for SMS".to_string())
            .with_request_id("req_001");
        let (status, json) = body_of(err).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"]["code"], "invalid_request");
        assert_eq!(json["error"]["message"], "Message is required for SMS");
        assert_eq!(json["error"]["request_id"], "req_001");
        assert!(json["error"].get("affordableCount").is_none());
    }

    #[tokio::test]
    async fn test_insufficient_credit_carries_affordable_count() {
        let engine_err = EngineError::InsufficientCredit {
            required: Credits::whole(7),
            available: Credits::whole(5),
            affordable_count: 5,
        };
        let (status, json) = body_of(AppError::from(engine_err).with_request_id("req_002")).await;

        assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
        assert_eq!(json["error"]["code"], "insufficient_credit");
        assert_eq!(json["error"]["affordableCount"], 5);
    }

    #[tokio::test]
    async fn test_engine_errors_map_to_status() {
        let cases = [
            (EngineError::NotFound("payment session".into()), StatusCode::NOT_FOUND),
            (EngineError::Conflict("already claimed".into()), StatusCode::CONFLICT),
            (EngineError::Gateway("timeout".into()), StatusCode::BAD_GATEWAY),
            (EngineError::Provider("rejected".into()), StatusCode::BAD_GATEWAY),
        ];
        for (err, expected) in cases {
            let (status, _) = body_of(AppError::from(err).with_request_id("req")).await;
            assert_eq!(status, expected);
        }
    }

    #[tokio::test]
    async fn test_not_found_message() {
        let err = AppError::from(EngineError::NotFound("payment session".into()));
        let (_, json) = body_of(err.with_request_id("req_003")).await;
        assert_eq!(json["error"]["code"], "not_found");
        assert_eq!(json["error"]["message"], "payment session not found");
    }

    #[tokio::test]
    async fn test_rate_limited_response() {
        let (status, json) = body_of(AppError::RateLimited.with_request_id("req_004")).await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(json["error"]["message"], "Too many requests");
    }
}
