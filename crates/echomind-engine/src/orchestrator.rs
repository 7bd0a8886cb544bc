//! The chat pipeline.
//!
//! Order of operations for one request:
//!
//! 1. resolve the conversation id and reject an empty message
//! 2. rate check
//! 3. classify the input; crisis ends the request with the fixed safety text
//! 4. check length and model
//! 5. reserve one unit of quota
//! 6. assemble the prompt and generate under a timeout
//! 7. classify the output; crisis replaces the reply
//! 8. persist the exchange and refresh the running summary when due
//!
//! A crisis message always gets the safety text, whatever its length or
//! requested model. Nothing after step 5 gives quota back.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, instrument, warn};

use echomind_core::{ConversationId, GatewayError, GenerationClient, GenerationRequest, Principal, Turn};
use echomind_llm::ModelCatalog;
use echomind_safety::{SafetyClassifier, SafetyTier, CRISIS_RESPONSE_TEXT};
use echomind_store::{ConversationStore, UsageRecord};

use crate::conversation;
use crate::error::ChatError;
use crate::prompt::{Persona, PromptAssembler};
use crate::quota::{QuotaLedger, Reservation};
use crate::rate_limit::{Admission, RateLimiter};
use crate::state::{ChatState, StateTrail};
use crate::summary::{self, SummaryPolicy};

#[derive(Clone, Debug, Default)]
pub struct ChatRequest {
    pub message: String,
    pub conversation_id: Option<String>,
    pub model: Option<String>,
}

/// A request that produced a reply, including safety interceptions.
#[derive(Clone, Debug)]
pub struct ChatOutcome {
    pub reply: String,
    pub conversation_id: ConversationId,
    /// Highest tier seen across input and output.
    pub safety: SafetyTier,
    /// The reply is the fixed safety text rather than generated content.
    pub blocked: bool,
    /// Usage after this request, when quota was reserved.
    pub usage: Option<UsageRecord>,
    pub states: Vec<ChatState>,
}

/// A request that ended in an error terminal.
#[derive(Debug)]
pub struct ChatFailure {
    pub conversation_id: ConversationId,
    pub error: ChatError,
    pub states: Vec<ChatState>,
}

#[derive(Clone, Debug)]
pub struct OrchestratorConfig {
    pub max_message_chars: usize,
    pub history_limit: usize,
    pub generation_timeout: Duration,
    pub summary: SummaryPolicy,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_message_chars: 4000,
            history_limit: 10,
            generation_timeout: Duration::from_secs(60),
            summary: SummaryPolicy::default(),
        }
    }
}

/// Collaborators, constructed by the caller and shared by reference count.
pub struct ChatDeps {
    pub rate_limiter: RateLimiter,
    pub classifier: Arc<SafetyClassifier>,
    pub ledger: QuotaLedger,
    pub assembler: PromptAssembler,
    pub client: Arc<dyn GenerationClient>,
    pub conversations: Arc<dyn ConversationStore>,
    pub catalog: ModelCatalog,
}

pub struct ChatOrchestrator {
    deps: ChatDeps,
    config: OrchestratorConfig,
}

/// Per-request bookkeeping threaded through the pipeline.
struct Run {
    conversation_id: ConversationId,
    trail: StateTrail,
}

impl Run {
    fn fail(mut self, terminal: ChatState, error: ChatError) -> ChatFailure {
        self.trail.advance(terminal);
        ChatFailure {
            conversation_id: self.conversation_id,
            error,
            states: self.trail.into_states(),
        }
    }
}

impl ChatOrchestrator {
    pub fn new(deps: ChatDeps, config: OrchestratorConfig) -> Self {
        Self { deps, config }
    }

    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.deps.rate_limiter
    }

    /// Run one chat request through the full pipeline.
    #[instrument(skip_all, fields(principal = %principal, conversation_id = tracing::field::Empty))]
    pub async fn handle(
        &self,
        principal: &Principal,
        request: ChatRequest,
    ) -> Result<ChatOutcome, ChatFailure> {
        let mut run = Run {
            conversation_id: conversation::resolve(request.conversation_id.as_deref()),
            trail: StateTrail::new(),
        };
        tracing::Span::current().record("conversation_id", run.conversation_id.as_str());

        let message = request.message.trim();
        if message.is_empty() {
            return Err(run.fail(
                ChatState::Invalid,
                ChatError::Validation("Message must not be empty".into()),
            ));
        }

        // 1. rate
        match self.deps.rate_limiter.admit(principal) {
            Ok(Admission::Allowed { .. }) => run.trail.advance(ChatState::RateChecked),
            Ok(Admission::Rejected { retry_after }) => {
                return Err(run.fail(ChatState::RateLimited, ChatError::RateLimited { retry_after }));
            }
            Err(e) => {
                warn!(error = %e, "rate limit store failed");
                return Err(run.fail(ChatState::UpstreamFailure, e.into()));
            }
        }

        // 2. input safety
        let input = self.deps.classifier.classify(message);
        run.trail.advance(ChatState::SafetyInputChecked);
        if input.tier == SafetyTier::Crisis {
            warn!(
                rule = input.rule_id.as_deref().unwrap_or_default(),
                reason = %input.reason,
                "input intercepted"
            );
            run.trail.advance(ChatState::Blocked);
            return Ok(ChatOutcome {
                reply: CRISIS_RESPONSE_TEXT.to_string(),
                conversation_id: run.conversation_id,
                safety: SafetyTier::Crisis,
                blocked: true,
                usage: None,
                states: run.trail.into_states(),
            });
        }

        if let Err(e) = self.validate(message, request.model.as_deref()) {
            return Err(run.fail(ChatState::Invalid, e));
        }

        // 3. quota
        let usage = match self.deps.ledger.reserve(principal) {
            Ok(Reservation::Reserved(record)) => record,
            Ok(Reservation::QuotaExceeded(record)) => {
                info!(used = record.used, limit = record.limit, "quota exhausted");
                return Err(run.fail(
                    ChatState::QuotaExceeded,
                    ChatError::QuotaExceeded {
                        used: record.used,
                        limit: record.limit,
                    },
                ));
            }
            Ok(Reservation::ProfileNotFound) => {
                return Err(run.fail(ChatState::ProfileNotFound, ChatError::ProfileNotFound));
            }
            Err(e) => {
                warn!(error = %e, "quota store failed");
                return Err(run.fail(ChatState::UpstreamFailure, e.into()));
            }
        };
        run.trail.advance(ChatState::QuotaReserved);

        // 4. prompt + generation
        let persona = match input.tier {
            SafetyTier::Caution => Persona::Caution,
            SafetyTier::Safe | SafetyTier::Crisis => Persona::Standard,
        };
        let history = self.recent_history(principal, &run.conversation_id);
        let summary = self.summary(principal);
        let prompt = self
            .deps
            .assembler
            .assemble(&history, &summary, persona, message);

        let generation = GenerationRequest {
            prompt: prompt.text,
            system_prompt: prompt.system,
            model: request.model.clone(),
        };
        let generated = match tokio::time::timeout(
            self.config.generation_timeout,
            self.deps.client.generate(&generation),
        )
        .await
        {
            Ok(Ok(text)) => text,
            Ok(Err(e)) => {
                warn!(kind = e.error_kind(), error = %e, "generation failed");
                return Err(run.fail(ChatState::UpstreamFailure, e.into()));
            }
            Err(_) => {
                let e = GatewayError::Timeout(self.config.generation_timeout);
                warn!(timeout = ?self.config.generation_timeout, "generation timed out");
                return Err(run.fail(ChatState::UpstreamFailure, e.into()));
            }
        };
        run.trail.advance(ChatState::Generated);

        // 5. output safety
        let output = self.deps.classifier.classify_output(&generated);
        run.trail.advance(ChatState::SafetyOutputChecked);
        let safety = input.tier.max(output.tier);
        if output.tier == SafetyTier::Crisis {
            warn!(
                rule = output.rule_id.as_deref().unwrap_or_default(),
                reason = %output.reason,
                "output intercepted"
            );
            run.trail.advance(ChatState::Blocked);
            return Ok(ChatOutcome {
                reply: CRISIS_RESPONSE_TEXT.to_string(),
                conversation_id: run.conversation_id,
                safety,
                blocked: true,
                usage: Some(usage),
                states: run.trail.into_states(),
            });
        }

        run.trail.advance(ChatState::Completed);
        if self.persist(principal, &run.conversation_id, message, &generated) {
            self.refresh_summary(principal, &run.conversation_id);
        }
        info!(
            tier = %safety,
            used = usage.used,
            limit = usage.limit,
            "chat completed"
        );

        Ok(ChatOutcome {
            reply: generated,
            conversation_id: run.conversation_id,
            safety,
            blocked: false,
            usage: Some(usage),
            states: run.trail.into_states(),
        })
    }

    /// Models the backend serves, filtered to the allowlist. Rate gated.
    #[instrument(skip_all, fields(principal = %principal))]
    pub async fn list_models(&self, principal: &Principal) -> Result<Vec<String>, ChatError> {
        if let Admission::Rejected { retry_after } = self.deps.rate_limiter.admit(principal)? {
            return Err(ChatError::RateLimited { retry_after });
        }

        let models = tokio::time::timeout(
            self.config.generation_timeout,
            self.deps.client.list_models(),
        )
        .await
        .map_err(|_| GatewayError::Timeout(self.config.generation_timeout))
        .and_then(|listed| listed)
        .inspect_err(|e| warn!(kind = e.error_kind(), error = %e, "model listing failed"))?;

        Ok(self.deps.catalog.filter(models))
    }

    pub fn usage(&self, principal: &Principal) -> Result<UsageRecord, ChatError> {
        self.deps
            .ledger
            .usage(principal)?
            .ok_or(ChatError::ProfileNotFound)
    }

    pub fn provision(&self, principal: &Principal) -> Result<(UsageRecord, bool), ChatError> {
        Ok(self.deps.ledger.provision(principal)?)
    }

    /// Length and model checks; the empty check happens before rate accounting.
    fn validate(&self, message: &str, model: Option<&str>) -> Result<(), ChatError> {
        let chars = message.chars().count();
        if chars > self.config.max_message_chars {
            return Err(ChatError::Validation(format!(
                "Message is too long ({chars} characters, maximum {})",
                self.config.max_message_chars
            )));
        }
        if let Some(model) = model {
            if !self.deps.catalog.permits(model) {
                return Err(ChatError::Validation(format!("Model '{model}' is not available")));
            }
        }
        Ok(())
    }

    fn recent_history(&self, principal: &Principal, conversation: &ConversationId) -> Vec<Turn> {
        self.deps
            .conversations
            .recent_turns(principal, conversation, self.config.history_limit)
            .unwrap_or_else(|e| {
                warn!(error = %e, "history unavailable, continuing without it");
                Vec::new()
            })
    }

    fn summary(&self, principal: &Principal) -> String {
        self.deps.conversations.summary(principal).unwrap_or_else(|e| {
            warn!(error = %e, "summary unavailable, continuing without it");
            String::new()
        })
    }

    fn persist(
        &self,
        principal: &Principal,
        conversation: &ConversationId,
        message: &str,
        reply: &str,
    ) -> bool {
        let turns = [Turn::user(message), Turn::assistant(reply)];
        match self.deps.conversations.append(principal, conversation, &turns) {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "failed to persist exchange");
                false
            }
        }
    }

    /// Rebuild the principal's summary when the conversation crosses the
    /// refresh interval. Failures are logged only.
    fn refresh_summary(&self, principal: &Principal, conversation: &ConversationId) {
        let store = &self.deps.conversations;
        let policy = self.config.summary;
        let result = store.turn_count(principal, conversation).and_then(|count| {
            if !policy.is_due(count) {
                return Ok(None);
            }
            let turns = store.recent_turns(principal, conversation, policy.window)?;
            let digest = summary::digest(&turns);
            if digest.is_empty() {
                return Ok(None);
            }
            store.set_summary(principal, &digest)?;
            Ok(Some(count))
        });
        match result {
            Ok(Some(turns)) => debug!(turns, "running summary refreshed"),
            Ok(None) => {}
            Err(e) => warn!(error = %e, "failed to refresh running summary"),
        }
    }
}
