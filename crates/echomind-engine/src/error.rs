use std::time::Duration;

use echomind_core::GatewayError;
use echomind_store::StoreError;

const UPSTREAM_MESSAGE: &str = "The assistant is temporarily unavailable. Please try again shortly.";

/// Every way a chat operation can fail.
///
/// Detail strings inside [`ChatError::Upstream`] come from collaborators and
/// are for logs only; [`ChatError::public_message`] is what callers see.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Duration },

    #[error("quota exceeded ({used}/{limit})")]
    QuotaExceeded { used: u32, limit: u32 },

    #[error("usage profile not found")]
    ProfileNotFound,

    #[error("upstream failure: {0}")]
    Upstream(String),
}

impl ChatError {
    /// Stable machine-readable kind, used in response bodies and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_error",
            Self::RateLimited { .. } => "rate_limited",
            Self::QuotaExceeded { .. } => "quota_exceeded",
            Self::ProfileNotFound => "profile_not_found",
            Self::Upstream(_) => "upstream_failure",
        }
    }

    /// Message safe to return to the caller.
    pub fn public_message(&self) -> String {
        match self {
            Self::Validation(msg) => msg.clone(),
            Self::RateLimited { .. } => "Too many requests. Please slow down.".to_string(),
            Self::QuotaExceeded { .. } => "You have reached your usage limit".to_string(),
            Self::ProfileNotFound => "User profile not found".to_string(),
            Self::Upstream(_) => UPSTREAM_MESSAGE.to_string(),
        }
    }
}

impl From<GatewayError> for ChatError {
    fn from(e: GatewayError) -> Self {
        Self::Upstream(format!("{}: {e}", e.error_kind()))
    }
}

impl From<StoreError> for ChatError {
    fn from(e: StoreError) -> Self {
        Self::Upstream(format!("store: {e}"))
    }
}
