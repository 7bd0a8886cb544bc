//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase", default)]` so a settings
//! file may be partial: missing fields keep their compiled default.

mod chat;
mod server;

pub use chat::*;
pub use server::*;

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings type.
///
/// ```json
/// {
///   "server": { "port": 9000 },
///   "rateLimit": { "capacity": 5 },
///   "generation": { "baseUrl": "http://localhost:8001/v1" }
/// }
/// ```
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EchomindSettings {
    pub server: ServerSettings,
    pub auth: AuthSettings,
    pub rate_limit: RateLimitSettings,
    pub quota: QuotaSettings,
    pub generation: GenerationSettings,
    pub prompt: PromptSettings,
    pub safety: SafetySettings,
    pub logging: LoggingSettings,
}

impl EchomindSettings {
    /// Reject values that would make the gateway unusable.
    pub fn validate(&self) -> Result<()> {
        if self.rate_limit.capacity == 0 {
            return Err(SettingsError::invalid("rateLimit.capacity", "must be > 0"));
        }
        if self.rate_limit.window_secs == 0 {
            return Err(SettingsError::invalid("rateLimit.windowSecs", "must be > 0"));
        }
        if self.quota.default_limit == 0 {
            return Err(SettingsError::invalid("quota.defaultLimit", "must be > 0"));
        }
        if self.generation.timeout_secs == 0 {
            return Err(SettingsError::invalid("generation.timeoutSecs", "must be > 0"));
        }
        if self.generation.base_url.trim().is_empty() {
            return Err(SettingsError::invalid("generation.baseUrl", "is empty"));
        }
        if self.server.max_message_chars == 0 {
            return Err(SettingsError::invalid("server.maxMessageChars", "must be > 0"));
        }
        if self.prompt.summary_every_turns > 0 && self.prompt.summary_window == 0 {
            return Err(SettingsError::invalid(
                "prompt.summaryWindow",
                "must be > 0 while summaryEveryTurns is set",
            ));
        }
        for rule in &self.safety.extra_rules {
            if rule.id.trim().is_empty() || rule.pattern.trim().is_empty() {
                return Err(SettingsError::invalid(
                    "safety.extraRules",
                    "entries need an id and a pattern",
                ));
            }
        }
        Ok(())
    }
}
