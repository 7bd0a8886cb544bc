use std::time::Duration;

use axum::extract::rejection::JsonRejection;
use axum::http::header::RETRY_AFTER;
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use echomind_core::ConversationId;
use echomind_engine::ChatError;

use crate::auth::AuthError;

/// Error body: `{error, message, conversationId?}`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub error: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<ConversationId>,
}

/// Everything a handler can fail with.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("{error}")]
    Chat {
        error: ChatError,
        conversation_id: Option<ConversationId>,
    },

    /// Body could not be read or parsed.
    #[error("bad request body: {message}")]
    Body { status: StatusCode, message: String },
}

impl ApiError {
    pub fn chat(error: ChatError, conversation_id: ConversationId) -> Self {
        Self::Chat {
            error,
            conversation_id: Some(conversation_id),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Auth(_) => StatusCode::UNAUTHORIZED,
            Self::Chat { error, .. } => match error {
                ChatError::Validation(_) => StatusCode::BAD_REQUEST,
                ChatError::RateLimited { .. } | ChatError::QuotaExceeded { .. } => {
                    StatusCode::TOO_MANY_REQUESTS
                }
                ChatError::ProfileNotFound => StatusCode::NOT_FOUND,
                ChatError::Upstream(_) => StatusCode::BAD_GATEWAY,
            },
            Self::Body { status, .. } => *status,
        }
    }

    fn body(self) -> ErrorBody {
        match self {
            Self::Auth(e) => ErrorBody {
                error: "unauthenticated",
                message: e.to_string(),
                conversation_id: None,
            },
            Self::Chat {
                error,
                conversation_id,
            } => ErrorBody {
                error: error.kind(),
                message: error.public_message(),
                conversation_id,
            },
            Self::Body { status, message } => ErrorBody {
                error: if status == StatusCode::PAYLOAD_TOO_LARGE {
                    "payload_too_large"
                } else {
                    "validation_error"
                },
                message,
                conversation_id: None,
            },
        }
    }
}

impl From<ChatError> for ApiError {
    fn from(error: ChatError) -> Self {
        Self::Chat {
            error,
            conversation_id: None,
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        let status = match rejection.status() {
            StatusCode::PAYLOAD_TOO_LARGE => StatusCode::PAYLOAD_TOO_LARGE,
            _ => StatusCode::BAD_REQUEST,
        };
        Self::Body {
            status,
            message: rejection.body_text(),
        }
    }
}

/// Whole seconds, rounded up, never zero.
fn retry_after_secs(retry_after: Duration) -> u64 {
    let secs = retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0);
    secs.max(1)
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let retry_after = match &self {
            Self::Chat {
                error: ChatError::RateLimited { retry_after },
                ..
            } => Some(retry_after_secs(*retry_after)),
            _ => None,
        };

        let mut response = (status, Json(self.body())).into_response();
        if let Some(secs) = retry_after {
            let _ = response
                .headers_mut()
                .insert(RETRY_AFTER, HeaderValue::from(secs));
        }
        response
    }
}
