//! Rule evaluation.

use std::collections::HashSet;

use tracing::debug;

use crate::errors::SafetyError;
use crate::rules::{builtin_rules, RuleSpec, SafetyRule};
use crate::tier::{SafetyDecision, SafetyTier, CRISIS_RESPONSE_TEXT};

/// Deterministic risk tagger for chat text.
///
/// Every crisis rule is evaluated before any caution rule and the first
/// match wins. Matching is keyword based: it will miss paraphrases and can
/// flag benign sentences that happen to contain a listed phrase. Treat the
/// result as a best-effort heuristic, not a clinical assessment.
#[derive(Clone, Debug)]
pub struct SafetyClassifier {
    crisis: Vec<SafetyRule>,
    caution: Vec<SafetyRule>,
}

impl SafetyClassifier {
    /// Classifier with only the built-in rules.
    pub fn new() -> Result<Self, SafetyError> {
        Self::with_extra_rules(Vec::new())
    }

    /// Built-in rules followed by `extra`, in the given order within each tier.
    pub fn with_extra_rules(extra: Vec<RuleSpec>) -> Result<Self, SafetyError> {
        let mut seen = HashSet::new();
        let mut crisis = Vec::new();
        let mut caution = Vec::new();

        for spec in builtin_rules().into_iter().chain(extra) {
            if !seen.insert(spec.id.clone()) {
                return Err(SafetyError::DuplicateRule { rule_id: spec.id });
            }
            let rule = SafetyRule::compile(spec)?;
            match rule.tier() {
                SafetyTier::Crisis => crisis.push(rule),
                SafetyTier::Caution => caution.push(rule),
                SafetyTier::Safe => {
                    return Err(SafetyError::SafeTierRule {
                        rule_id: rule.id().to_string(),
                    })
                }
            }
        }

        debug!(
            crisis_rules = crisis.len(),
            caution_rules = caution.len(),
            "safety classifier initialized"
        );
        Ok(Self { crisis, caution })
    }

    /// Classify user input.
    pub fn classify(&self, text: &str) -> SafetyDecision {
        let lowered = text.to_lowercase();

        if let Some(rule) = self.crisis.iter().find(|r| r.is_match(&lowered)) {
            return SafetyDecision {
                tier: SafetyTier::Crisis,
                reason: rule.reason().to_string(),
                rule_id: Some(rule.id().to_string()),
                blocking_response: Some(CRISIS_RESPONSE_TEXT),
            };
        }

        if let Some(rule) = self.caution.iter().find(|r| r.is_match(&lowered)) {
            return SafetyDecision {
                tier: SafetyTier::Caution,
                reason: rule.reason().to_string(),
                rule_id: Some(rule.id().to_string()),
                blocking_response: None,
            };
        }

        SafetyDecision::safe()
    }

    /// Classify generated text. Same rules as [`classify`](Self::classify);
    /// only a crisis match blocks delivery.
    pub fn classify_output(&self, text: &str) -> SafetyDecision {
        self.classify(text)
    }

    pub fn rule_count(&self) -> usize {
        self.crisis.len() + self.caution.len()
    }
}
