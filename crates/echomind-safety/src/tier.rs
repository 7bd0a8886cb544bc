//! Risk tiers and classification results.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Fixed reply sent in place of any content tagged [`SafetyTier::Crisis`].
pub const CRISIS_RESPONSE_TEXT: &str = "I'm very sorry you're going through this, but I'm an AI and I can't provide the help you need right now. \
If you are in danger or thinking about harming yourself, please call or text 988 (in the US) \
or go to the nearest emergency room immediately. You are not alone, and there is help available.";

/// Risk tier, ordered by severity: `Safe < Caution < Crisis`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SafetyTier {
    /// Normal flow.
    Safe,
    /// Passive distress. Changes persona framing, never blocks.
    Caution,
    /// Active intent. Always replaced by [`CRISIS_RESPONSE_TEXT`].
    Crisis,
}

impl SafetyTier {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Safe => "safe",
            Self::Caution => "caution",
            Self::Crisis => "crisis",
        }
    }
}

impl fmt::Display for SafetyTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a single classification.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SafetyDecision {
    pub tier: SafetyTier,
    /// Human-readable reason. Safe to log; never contains the input text.
    pub reason: String,
    /// Id of the rule that matched, if any.
    pub rule_id: Option<String>,
    /// Present only for [`SafetyTier::Crisis`].
    pub blocking_response: Option<&'static str>,
}

impl SafetyDecision {
    pub(crate) fn safe() -> Self {
        Self {
            tier: SafetyTier::Safe,
            reason: "No immediate risks detected.".to_string(),
            rule_id: None,
            blocking_response: None,
        }
    }

    /// True when the content must not be delivered.
    pub fn is_blocking(&self) -> bool {
        self.blocking_response.is_some()
    }
}
