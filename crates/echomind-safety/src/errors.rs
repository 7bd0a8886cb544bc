//! Error types for rule compilation.

use thiserror::Error;

/// Errors raised while building a [`SafetyClassifier`](crate::SafetyClassifier).
///
/// Classification itself never fails; only compiling rules can.
#[derive(Debug, Error)]
pub enum SafetyError {
    /// A rule pattern is not a valid regular expression.
    #[error("invalid pattern for rule {rule_id}: {source}")]
    InvalidPattern {
        /// The offending rule.
        rule_id: String,
        /// Underlying regex error.
        #[source]
        source: regex::Error,
    },

    /// Two rules share an id.
    #[error("duplicate rule id: {rule_id}")]
    DuplicateRule {
        /// The repeated id.
        rule_id: String,
    },

    /// An extra rule tried to register as [`SafetyTier::Safe`](crate::SafetyTier::Safe).
    #[error("rule {rule_id} must be tagged caution or crisis")]
    SafeTierRule {
        /// The offending rule.
        rule_id: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_display() {
        let err = SafetyError::DuplicateRule {
            rule_id: "crisis.self-harm".into(),
        };
        assert_eq!(err.to_string(), "duplicate rule id: crisis.self-harm");
    }

    #[test]
    fn invalid_pattern_names_rule() {
        let source = regex::Regex::new("(unclosed").unwrap_err();
        let err = SafetyError::InvalidPattern {
            rule_id: "custom.bad".into(),
            source,
        };
        assert!(err.to_string().contains("custom.bad"));
    }
}
