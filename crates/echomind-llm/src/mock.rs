use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use echomind_core::{GatewayError, GenerationClient, GenerationRequest};

/// Pre-programmed replies for deterministic testing without a model server.
#[derive(Clone, Debug)]
pub enum MockReply {
    /// Return this text.
    Text(String),
    /// Fail with this error.
    Error(GatewayError),
    /// Wait a duration, then resolve the inner reply.
    Delay(Duration, Box<MockReply>),
}

impl MockReply {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }

    pub fn delayed(delay: Duration, inner: MockReply) -> Self {
        Self::Delay(delay, Box::new(inner))
    }
}

/// Mock client that returns scripted replies in sequence and records every
/// request it receives.
pub struct MockGenerationClient {
    replies: Vec<MockReply>,
    models: Vec<String>,
    models_error: Option<GatewayError>,
    call_count: AtomicUsize,
    requests: Mutex<Vec<GenerationRequest>>,
}

impl MockGenerationClient {
    pub fn new(replies: Vec<MockReply>) -> Self {
        Self {
            replies,
            models: vec!["mock-model".into()],
            models_error: None,
            call_count: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn with_models(mut self, models: Vec<String>) -> Self {
        self.models = models;
        self
    }

    /// Make `list_models` fail with `error`.
    pub fn with_models_error(mut self, error: GatewayError) -> Self {
        self.models_error = Some(error);
        self
    }

    /// Number of `generate` calls so far.
    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::Relaxed)
    }

    /// Requests received by `generate`, in call order.
    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl GenerationClient for MockGenerationClient {
    fn name(&self) -> &str {
        "mock"
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<String, GatewayError> {
        let idx = self.call_count.fetch_add(1, Ordering::Relaxed);
        self.requests.lock().push(request.clone());

        let Some(reply) = self.replies.get(idx) else {
            return Err(GatewayError::InvalidRequest(format!(
                "MockGenerationClient: no reply configured for call {idx}"
            )));
        };

        resolve_reply(reply).await
    }

    async fn list_models(&self) -> Result<Vec<String>, GatewayError> {
        match &self.models_error {
            Some(e) => Err(e.clone()),
            None => Ok(self.models.clone()),
        }
    }
}

/// Unrolls nested delays iteratively to avoid recursive async.
async fn resolve_reply(reply: &MockReply) -> Result<String, GatewayError> {
    let mut current = reply;
    loop {
        match current {
            MockReply::Text(text) => return Ok(text.clone()),
            MockReply::Error(e) => return Err(e.clone()),
            MockReply::Delay(duration, inner) => {
                tokio::time::sleep(*duration).await;
                current = inner;
            }
        }
    }
}
