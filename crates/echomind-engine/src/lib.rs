//! # echomind-engine
//!
//! The chat pipeline: admission, safety screening, quota accounting, prompt
//! assembly and generation, wired together by [`ChatOrchestrator`].
//!
//! Every collaborator is injected; nothing here owns a socket or a file.

pub mod conversation;
pub mod error;
pub mod orchestrator;
pub mod prompt;
pub mod quota;
pub mod rate_limit;
pub mod state;
pub mod summary;

pub use error::ChatError;
pub use orchestrator::{ChatDeps, ChatFailure, ChatOrchestrator, ChatOutcome, ChatRequest, OrchestratorConfig};
pub use prompt::{AssembledPrompt, Persona, PromptAssembler};
pub use quota::{QuotaLedger, Reservation};
pub use rate_limit::{Admission, RateLimiter};
pub use state::{ChatState, StateTrail};
pub use summary::SummaryPolicy;
