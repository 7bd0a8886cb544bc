use async_trait::async_trait;

use crate::errors::GatewayError;

/// A single completion request handed to the remote model.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GenerationRequest {
    /// Fully assembled prompt text, ending with an open assistant turn.
    pub prompt: String,
    /// Rendered persona, for backends that take the system prompt separately.
    pub system_prompt: String,
    /// Requested model; `None` means the client's default.
    pub model: Option<String>,
}

/// Boundary to the remote text-generation service.
///
/// Implementations must not retry on their own and must not assume anything
/// about model warm-up cost; callers bound every call with a timeout.
#[async_trait]
pub trait GenerationClient: Send + Sync {
    fn name(&self) -> &str;

    async fn generate(&self, request: &GenerationRequest) -> Result<String, GatewayError>;

    async fn list_models(&self) -> Result<Vec<String>, GatewayError>;
}
