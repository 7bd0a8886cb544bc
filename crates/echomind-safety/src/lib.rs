//! # echomind-safety
//!
//! Deterministic screening of chat input and model output.
//!
//! [`SafetyClassifier::classify`] tags text as [`SafetyTier::Safe`],
//! [`SafetyTier::Caution`] or [`SafetyTier::Crisis`] using ordered,
//! word-boundary-anchored rules. A crisis decision carries the fixed
//! [`CRISIS_RESPONSE_TEXT`]; a caution decision only changes how the reply
//! is framed. There is no I/O and no learned model.

#![deny(unsafe_code)]

pub mod classifier;
pub mod errors;
pub mod rules;
pub mod tier;

pub use classifier::SafetyClassifier;
pub use errors::SafetyError;
pub use rules::{builtin_rules, is_builtin_rule, RuleSpec, SafetyRule};
pub use tier::{SafetyDecision, SafetyTier, CRISIS_RESPONSE_TEXT};
