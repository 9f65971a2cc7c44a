use axum::extract::multipart::{MultipartError, MultipartRejection};
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::{Json, http::StatusCode, response::IntoResponse};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use sqlx::Error as SqlxError;
use thiserror::Error as ThisError;
use tracing::{error, warn};

use crate::service::quiz::QuizLevel;
use crate::service::usage::{Plan, UsageKind};

#[derive(Debug, ThisError)]
pub enum NexusError {
    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("HTTP request error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Multipart error: {0}")]
    Multipart(#[from] MultipartError),

    #[error("Invalid JSON body: {0}")]
    JsonBody(#[from] JsonRejection),

    #[error("Invalid query string: {0}")]
    QueryString(#[from] QueryRejection),

    #[error("Invalid multipart body: {0}")]
    MultipartBody(#[from] MultipartRejection),

    #[error("Not authenticated")]
    Unauthenticated,

    #[error("User not found")]
    UserNotFound,

    #[error("Not found")]
    NotFound,

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("LINE verification failed: {0}")]
    LineVerification(String),

    #[error("Daily limit exceeded for {kind}: {current}/{max}")]
    DailyLimitExceeded {
        kind: UsageKind,
        current: i64,
        max: i64,
    },

    #[error("{level} requires the plus plan (current: {plan})")]
    PlusRequired {
        feature: &'static str,
        level: QuizLevel,
        plan: Plan,
    },

    #[error("No AI provider configured")]
    NoProvider,

    #[error("Ractor error: {0}")]
    RactorError(String),

    #[error("Database error: {0}")]
    DatabaseError(#[from] SqlxError),

    #[error("Model returned no material")]
    EmptyCompletion,

    #[error("Upstream error with status: {0}")]
    UpstreamStatus(StatusCode),

    #[error("Upstream API error: {0:?}")]
    UpstreamApi(UpstreamError),
}

impl NexusError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }
}

impl IntoResponse for NexusError {
    fn into_response(self) -> axum::response::Response {
        let (status, body) = match self {
            NexusError::Unauthenticated => (
                StatusCode::UNAUTHORIZED,
                ApiErrorResponse::new("UNAUTHENTICATED", "Not authenticated"),
            ),
            NexusError::UserNotFound => (
                StatusCode::NOT_FOUND,
                ApiErrorResponse::new("USER_NOT_FOUND", "User not found"),
            ),
            NexusError::NotFound => (
                StatusCode::NOT_FOUND,
                ApiErrorResponse::new("NOT_FOUND", "Not found"),
            ),
            NexusError::BadRequest(msg) => (
                StatusCode::BAD_REQUEST,
                ApiErrorResponse::new("BAD_REQUEST", msg),
            ),
            NexusError::Multipart(err) => ApiErrorResponse::rejected(err.status(), err.body_text()),
            NexusError::JsonBody(rej) => ApiErrorResponse::rejected(rej.status(), rej.body_text()),
            NexusError::QueryString(rej) => ApiErrorResponse::rejected(rej.status(), rej.body_text()),
            NexusError::MultipartBody(rej) => {
                ApiErrorResponse::rejected(rej.status(), rej.body_text())
            }
            NexusError::LineVerification(reason) => {
                warn!(%reason, "LINE id token rejected");
                (
                    StatusCode::UNAUTHORIZED,
                    ApiErrorResponse::new("UNAUTHENTICATED", "LINE verification failed"),
                )
            }
            NexusError::DailyLimitExceeded { kind, current, max } => (
                StatusCode::FORBIDDEN,
                ApiErrorResponse::new(
                    "DAILY_LIMIT",
                    format!(
                        "Daily limit exceeded. {} limit is {} per day.",
                        kind.label(),
                        max
                    ),
                )
                .with_detail(json!({
                    "feature": kind.feature(),
                    "limit_exceeded": true,
                    "current_count": current,
                    "max_limit": max,
                })),
            ),
            NexusError::PlusRequired {
                feature,
                level,
                plan,
            } => (
                StatusCode::FORBIDDEN,
                ApiErrorResponse::new("PLAN_REQUIRED", "Advanced level requires PLUS subscription")
                    .with_detail(json!({
                        "feature": feature,
                        "allowed": false,
                        "level": level,
                        "plan": plan,
                    })),
            ),
            NexusError::NoProvider => (
                StatusCode::SERVICE_UNAVAILABLE,
                ApiErrorResponse::new("NO_PROVIDER", "No AI provider is available."),
            ),
            NexusError::DatabaseError(ref e) => {
                error!(error = %e, "database failure");
                (StatusCode::INTERNAL_SERVER_ERROR, ApiErrorResponse::internal())
            }
            NexusError::RactorError(ref e) => {
                error!(error = %e, "actor failure");
                (StatusCode::INTERNAL_SERVER_ERROR, ApiErrorResponse::internal())
            }
            NexusError::UpstreamApi(upstream) => {
                warn!(status = upstream.status, message = %upstream.message, "upstream API error");
                (
                    StatusCode::BAD_GATEWAY,
                    ApiErrorResponse::new("UPSTREAM_ERROR", "An upstream error occurred."),
                )
            }
            NexusError::EmptyCompletion => {
                warn!("model returned an empty completion");
                (
                    StatusCode::BAD_GATEWAY,
                    ApiErrorResponse::new("UPSTREAM_ERROR", "The model returned no output."),
                )
            }
            NexusError::Reqwest(ref e) => {
                warn!(error = %e, "upstream transport failure");
                (
                    StatusCode::BAD_GATEWAY,
                    ApiErrorResponse::new("BAD_GATEWAY", "Upstream service is unavailable."),
                )
            }
            NexusError::Json(_) | NexusError::UrlParse(_) => (
                StatusCode::BAD_GATEWAY,
                ApiErrorResponse::new("BAD_GATEWAY", "Upstream service is unavailable."),
            ),
            NexusError::UpstreamStatus(code) => {
                let (err_code, msg) = match code {
                    StatusCode::TOO_MANY_REQUESTS => {
                        ("RATE_LIMIT", "Upstream rate limit exceeded.")
                    }
                    StatusCode::UNAUTHORIZED => ("UNAUTHORIZED", "Upstream authentication failed."),
                    StatusCode::FORBIDDEN => ("FORBIDDEN", "Upstream permission denied."),
                    StatusCode::NOT_FOUND => ("NOT_FOUND", "Upstream resource not found."),
                    _ => ("UPSTREAM_ERROR", "An upstream error occurred."),
                };
                let status = if code == StatusCode::TOO_MANY_REQUESTS {
                    code
                } else {
                    StatusCode::BAD_GATEWAY
                };
                (status, ApiErrorResponse::new(err_code, msg))
            }
        };
        (status, Json(body)).into_response()
    }
}

/// Error envelope returned by every route: `{ "error": ..., "code": ..., ...detail }`.
#[derive(Debug, Serialize)]
pub struct ApiErrorResponse {
    pub error: String,
    pub code: String,
    #[serde(flatten)]
    pub detail: Map<String, Value>,
}

impl ApiErrorResponse {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
            code: code.into(),
            detail: Map::new(),
        }
    }

    /// A request the extractors refused; keeps axum's status and message.
    fn rejected(status: StatusCode, message: String) -> (StatusCode, Self) {
        let code = if status == StatusCode::PAYLOAD_TOO_LARGE {
            "PAYLOAD_TOO_LARGE"
        } else {
            "BAD_REQUEST"
        };
        (status, Self::new(code, message))
    }

    fn internal() -> Self {
        Self::new("INTERNAL_ERROR", "Internal server error")
    }

    fn with_detail(mut self, detail: Value) -> Self {
        if let Value::Object(map) = detail {
            self.detail.extend(map);
        }
        self
    }
}

/// Error payload shared by the Gemini and OpenAI style APIs:
/// `{ "error": { "code"|"status": ..., "message": ... } }`.
#[derive(Deserialize, Debug)]
pub struct UpstreamErrorEnvelope {
    pub error: UpstreamErrorBody,
}

#[derive(Deserialize, Debug)]
pub struct UpstreamErrorBody {
    #[serde(default)]
    pub message: String,
}

#[derive(Debug)]
pub struct UpstreamError {
    pub status: u16,
    pub message: String,
}

impl UpstreamError {
    /// Build from a non-success status and its raw body, keeping the provider message when parseable.
    pub fn from_body(status: StatusCode, body: &[u8]) -> Self {
        let message = serde_json::from_slice::<UpstreamErrorEnvelope>(body)
            .map(|env| env.error.message)
            .unwrap_or_else(|_| String::from_utf8_lossy(body).chars().take(200).collect());
        Self {
            status: status.as_u16(),
            message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    async fn body_json(err: NexusError) -> (StatusCode, Value) {
        let resp = err.into_response();
        let status = resp.status();
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn daily_limit_carries_counts() {
        let (status, body) = body_json(NexusError::DailyLimitExceeded {
            kind: UsageKind::Navi,
            current: 3,
            max: 3,
        })
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["code"], "DAILY_LIMIT");
        assert_eq!(body["feature"], "chat-limit");
        assert_eq!(body["current_count"], 3);
        assert_eq!(body["limit_exceeded"], true);
    }

    #[tokio::test]
    async fn database_errors_hide_details() {
        let (status, body) = body_json(NexusError::DatabaseError(SqlxError::RowNotFound)).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "Internal server error");
    }

    #[tokio::test]
    async fn plus_required_names_the_feature() {
        let (status, body) = body_json(NexusError::PlusRequired {
            feature: "quiz-advanced",
            level: QuizLevel::Advanced,
            plan: Plan::Free,
        })
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"], "Advanced level requires PLUS subscription");
        assert_eq!(body["feature"], "quiz-advanced");
        assert_eq!(body["allowed"], false);
        assert_eq!(body["level"], "advanced");
        assert_eq!(body["plan"], "free");
    }

    #[tokio::test]
    async fn empty_completion_is_a_gateway_error() {
        let (status, body) = body_json(NexusError::EmptyCompletion).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["code"], "UPSTREAM_ERROR");
    }

    #[tokio::test]
    async fn query_rejections_use_the_error_envelope() {
        use axum::extract::{FromRequestParts, Query};
        use axum::http::Request;

        #[derive(Debug, Deserialize)]
        struct Paging {
            #[allow(dead_code)]
            limit: i64,
        }

        let (mut parts, _) = Request::get("/api/answer-check?limit=ten")
            .body(())
            .unwrap()
            .into_parts();
        let rejection = Query::<Paging>::from_request_parts(&mut parts, &())
            .await
            .unwrap_err();
        let (status, body) = body_json(NexusError::from(rejection)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "BAD_REQUEST");
        assert!(
            body["error"]
                .as_str()
                .unwrap()
                .starts_with("Failed to deserialize query string")
        );
    }

    #[test]
    fn upstream_error_prefers_provider_message() {
        let err = UpstreamError::from_body(
            StatusCode::BAD_REQUEST,
            br#"{"error":{"code":400,"message":"API key not valid","status":"INVALID_ARGUMENT"}}"#,
        );
        assert_eq!(err.message, "API key not valid");
        let raw = UpstreamError::from_body(StatusCode::BAD_GATEWAY, b"gateway down");
        assert_eq!(raw.message, "gateway down");
    }
}
