//! Settings for the chat pipeline: rate limiting, quota, generation, prompt, safety.

use serde::{Deserialize, Serialize};

/// Sliding-window admission control.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RateLimitSettings {
    pub window_secs: u64,
    pub capacity: u32,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            window_secs: 60,
            capacity: 10,
        }
    }
}

/// Usage ledger backing store and provisioning default.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct QuotaSettings {
    /// Limit given to newly provisioned profiles.
    pub default_limit: u32,
    /// SQLite file for usage records and history; `None` keeps everything in memory.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub db_path: Option<String>,
}

impl Default for QuotaSettings {
    fn default() -> Self {
        Self {
            default_limit: 25,
            db_path: None,
        }
    }
}

/// Remote text-generation service.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GenerationSettings {
    /// OpenAI-compatible API root, e.g. `http://localhost:8001/v1`.
    pub base_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    pub default_model: String,
    /// Models callers may request and `/models` may list. Empty means any.
    pub allowed_models: Vec<String>,
    /// Upper bound on a single generation call.
    pub timeout_secs: u64,
    pub temperature: f64,
    pub top_p: f64,
    pub max_tokens: u32,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8001/v1".to_string(),
            api_key: None,
            default_model: "Qwen/Qwen2.5-7B-Instruct".to_string(),
            allowed_models: vec!["Qwen/Qwen2.5-7B-Instruct".to_string()],
            timeout_secs: 60,
            temperature: 0.7,
            top_p: 0.9,
            max_tokens: 512,
        }
    }
}

/// Persona templates and history window.
///
/// Templates use `{user_summary}` as the placeholder for the running summary.
/// `None` selects the built-in template.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PromptSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub standard_persona: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub caution_persona: Option<String>,
    /// Prior turns included in each prompt.
    pub history_limit: usize,
    /// Refresh the running summary every this many stored turns; 0 turns it off.
    pub summary_every_turns: usize,
    /// Turns read when the summary is refreshed.
    pub summary_window: usize,
}

impl Default for PromptSettings {
    fn default() -> Self {
        Self {
            standard_persona: None,
            caution_persona: None,
            history_limit: 10,
            summary_every_turns: 10,
            summary_window: 20,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtraRuleTier {
    Caution,
    Crisis,
}

/// An operator-supplied classification rule, appended after the built-ins.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtraRuleSettings {
    pub id: String,
    pub tier: ExtraRuleTier,
    /// Alternation of phrases; anchored on word boundaries when compiled.
    pub pattern: String,
    pub reason: String,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SafetySettings {
    pub extra_rules: Vec<ExtraRuleSettings>,
}
