//! HTTP client for OpenAI-compatible completion servers (vLLM, SambaNova).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use echomind_core::security::ApiKey;
use echomind_core::{GatewayError, GenerationClient, GenerationRequest};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Stop sequences that close a ChatML assistant turn.
pub const STOP_SEQUENCES: [&str; 2] = ["<|im_end|>", "<|endoftext|>"];

/// Sampling parameters sent with every completion.
#[derive(Clone, Debug, PartialEq)]
pub struct SamplingParams {
    pub temperature: f64,
    pub top_p: f64,
    pub max_tokens: u32,
}

impl Default for SamplingParams {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            top_p: 0.9,
            max_tokens: 512,
        }
    }
}

#[derive(Clone, Debug)]
pub struct HttpClientConfig {
    /// API root including the version segment, e.g. `http://host:8001/v1`.
    pub base_url: String,
    pub api_key: Option<ApiKey>,
    pub default_model: String,
    pub sampling: SamplingParams,
}

#[derive(Serialize)]
struct CompletionBody<'a> {
    model: &'a str,
    prompt: &'a str,
    temperature: f64,
    top_p: f64,
    max_tokens: u32,
    stop: [&'static str; 2],
}

#[derive(Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    #[serde(default)]
    text: String,
}

#[derive(Deserialize)]
struct ModelList {
    #[serde(default)]
    data: Vec<ModelEntry>,
}

#[derive(Deserialize)]
struct ModelEntry {
    id: String,
}

/// Sends the fully assembled ChatML prompt to `POST {base}/completions`.
///
/// The prompt already embeds the system segment, so
/// [`GenerationRequest::system_prompt`] is not sent separately.
pub struct HttpGenerationClient {
    client: Client,
    config: HttpClientConfig,
}

impl HttpGenerationClient {
    pub fn new(config: HttpClientConfig) -> Result<Self, GatewayError> {
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| GatewayError::NetworkError(format!("build HTTP client: {e}")))?;
        Ok(Self { client, config })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{path}", self.config.base_url.trim_end_matches('/'))
    }

    fn authorize(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.config.api_key {
            Some(key) => req.bearer_auth(key.expose()),
            None => req,
        }
    }

    async fn send(&self, req: reqwest::RequestBuilder) -> Result<reqwest::Response, GatewayError> {
        let response = self
            .authorize(req)
            .send()
            .await
            .map_err(|e| GatewayError::NetworkError(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok())
            .map(Duration::from_secs);
        let body = response.text().await.unwrap_or_default();
        warn!(status = status.as_u16(), "generation backend returned error");

        match GatewayError::from_status(status.as_u16(), body) {
            GatewayError::RateLimited { .. } => Err(GatewayError::RateLimited { retry_after }),
            other => Err(other),
        }
    }
}

#[async_trait]
impl GenerationClient for HttpGenerationClient {
    fn name(&self) -> &str {
        "openai-compatible"
    }

    #[instrument(skip_all, fields(model))]
    async fn generate(&self, request: &GenerationRequest) -> Result<String, GatewayError> {
        let model = request
            .model
            .as_deref()
            .unwrap_or(&self.config.default_model);
        tracing::Span::current().record("model", model);

        let body = CompletionBody {
            model,
            prompt: &request.prompt,
            temperature: self.config.sampling.temperature,
            top_p: self.config.sampling.top_p,
            max_tokens: self.config.sampling.max_tokens,
            stop: STOP_SEQUENCES,
        };

        let response = self
            .send(self.client.post(self.url("completions")).json(&body))
            .await?;
        let parsed: CompletionResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::InvalidResponse(e.to_string()))?;

        let text = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.text.trim().to_string())
            .ok_or_else(|| GatewayError::InvalidResponse("no choices in completion".into()))?;

        if text.is_empty() {
            return Err(GatewayError::InvalidResponse("empty completion".into()));
        }

        debug!(chars = text.len(), "completion received");
        Ok(text)
    }

    #[instrument(skip_all)]
    async fn list_models(&self) -> Result<Vec<String>, GatewayError> {
        let response = self.send(self.client.get(self.url("models"))).await?;
        let parsed: ModelList = response
            .json()
            .await
            .map_err(|e| GatewayError::InvalidResponse(e.to_string()))?;
        Ok(parsed.data.into_iter().map(|m| m.id).collect())
    }
}
