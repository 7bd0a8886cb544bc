//! Built-in rule set and rule compilation.
//!
//! ## Crisis rules
//! - `crisis.self-harm-method`: "(kill|hang|hurt|shoot|cut) myself"
//! - `crisis.suicidal-intent`: "suicide", "end my life", "want to die"
//! - `crisis.plan`: "take all the pills", "jump off"
//! - `crisis.better-off-dead`
//!
//! ## Caution rules
//! - `caution.non-existence`, `caution.emptiness`, `caution.futility`, `caution.low-mood`

use regex::Regex;

use crate::errors::SafetyError;
use crate::tier::SafetyTier;

/// Uncompiled rule definition.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RuleSpec {
    pub id: String,
    pub tier: SafetyTier,
    /// Phrase alternation, e.g. `feel empty|no point`. Wrapped in word
    /// boundaries and made case-insensitive at compile time.
    pub pattern: String,
    pub reason: String,
}

impl RuleSpec {
    pub fn new(
        id: impl Into<String>,
        tier: SafetyTier,
        pattern: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            tier,
            pattern: pattern.into(),
            reason: reason.into(),
        }
    }
}

/// A compiled rule.
#[derive(Clone, Debug)]
pub struct SafetyRule {
    pub(crate) spec: RuleSpec,
    pub(crate) regex: Regex,
}

impl SafetyRule {
    /// Compile a rule. The pattern is anchored as `\b(?:...)\b` with `(?i)`.
    pub fn compile(spec: RuleSpec) -> Result<Self, SafetyError> {
        let source = format!(r"(?i)\b(?:{})\b", spec.pattern);
        let regex = Regex::new(&source).map_err(|source| SafetyError::InvalidPattern {
            rule_id: spec.id.clone(),
            source,
        })?;
        Ok(Self { spec, regex })
    }

    pub fn id(&self) -> &str {
        &self.spec.id
    }

    pub fn tier(&self) -> SafetyTier {
        self.spec.tier
    }

    pub fn reason(&self) -> &str {
        &self.spec.reason
    }

    /// Match against already lower-cased text.
    pub(crate) fn is_match(&self, lowered: &str) -> bool {
        self.regex.is_match(lowered)
    }
}

const CRISIS_REASON: &str = "Detected active self-harm intent.";
const CAUTION_REASON: &str = "Detected passive distress or hopelessness.";

/// The rules every classifier starts with. They cannot be removed.
pub fn builtin_rules() -> Vec<RuleSpec> {
    vec![
        RuleSpec::new(
            "crisis.self-harm-method",
            SafetyTier::Crisis,
            "(kill|hang|hurt|shoot|cut) myself",
            CRISIS_REASON,
        ),
        RuleSpec::new(
            "crisis.suicidal-intent",
            SafetyTier::Crisis,
            "suicide|end my life|want to die",
            CRISIS_REASON,
        ),
        RuleSpec::new(
            "crisis.plan",
            SafetyTier::Crisis,
            "take all the pills|jump off",
            CRISIS_REASON,
        ),
        RuleSpec::new(
            "crisis.better-off-dead",
            SafetyTier::Crisis,
            "better off dead",
            CRISIS_REASON,
        ),
        RuleSpec::new(
            "caution.non-existence",
            SafetyTier::Caution,
            "don't want to exist|wish i wasn't here|wish i was gone",
            CAUTION_REASON,
        ),
        RuleSpec::new(
            "caution.emptiness",
            SafetyTier::Caution,
            "feel empty|no point|hopeless",
            CAUTION_REASON,
        ),
        RuleSpec::new(
            "caution.futility",
            SafetyTier::Caution,
            "why bother|what's the use",
            CAUTION_REASON,
        ),
        RuleSpec::new(
            "caution.low-mood",
            SafetyTier::Caution,
            "depressed|lonely|sad",
            CAUTION_REASON,
        ),
    ]
}

/// Check whether an id belongs to the built-in set.
pub fn is_builtin_rule(rule_id: &str) -> bool {
    builtin_rules().iter().any(|r| r.id == rule_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compiled(id: &str) -> SafetyRule {
        let spec = builtin_rules().into_iter().find(|r| r.id == id).unwrap();
        SafetyRule::compile(spec).unwrap()
    }

    #[test]
    fn all_builtins_compile() {
        for spec in builtin_rules() {
            let id = spec.id.clone();
            assert!(SafetyRule::compile(spec).is_ok(), "rule {id} failed to compile");
        }
    }

    #[test]
    fn builtins_have_unique_ids() {
        let rules = builtin_rules();
        let mut ids: Vec<_> = rules.iter().map(|r| r.id.as_str()).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), rules.len());
    }

    #[test]
    fn word_boundary_prevents_partial_match() {
        let rule = compiled("caution.low-mood");
        assert!(rule.is_match("i am sad"));
        assert!(!rule.is_match("sadly the shop closed"));
        assert!(!rule.is_match("crusade"));
    }

    #[test]
    fn method_rule_matches_variants() {
        let rule = compiled("crisis.self-harm-method");
        assert!(rule.is_match("i might hurt myself"));
        assert!(rule.is_match("want to cut myself"));
        assert!(!rule.is_match("i hurt my knee"));
    }

    #[test]
    fn apostrophe_phrases_match() {
        let rule = compiled("caution.futility");
        assert!(rule.is_match("honestly what's the use"));
        let rule = compiled("caution.non-existence");
        assert!(rule.is_match("i just don't want to exist"));
    }

    #[test]
    fn compile_is_case_insensitive() {
        let rule = SafetyRule::compile(RuleSpec::new(
            "custom.grief",
            SafetyTier::Caution,
            "grieving",
            "grief",
        ))
        .unwrap();
        assert!(rule.is_match("I am GRIEVING"));
    }

    #[test]
    fn invalid_pattern_is_error() {
        let err = SafetyRule::compile(RuleSpec::new(
            "custom.bad",
            SafetyTier::Caution,
            "(unclosed",
            "bad",
        ))
        .unwrap_err();
        assert!(matches!(err, SafetyError::InvalidPattern { .. }));
    }

    #[test]
    fn builtin_lookup() {
        assert!(is_builtin_rule("crisis.plan"));
        assert!(!is_builtin_rule("custom.grief"));
    }
}
