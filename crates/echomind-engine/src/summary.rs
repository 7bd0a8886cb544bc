//! Running per-principal summary, refreshed every few stored turns.
//!
//! The digest is built from the principal's own recent messages: no model
//! call, no I/O. Blocked exchanges never reach the store, so they never
//! reach the summary either.

use echomind_core::{Role, Turn};

const MAX_TOPICS: usize = 5;
const TOPIC_CHARS: usize = 80;

/// When and from how much history the summary is rebuilt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SummaryPolicy {
    /// Rebuild when the conversation's stored turn count is a multiple of
    /// this. `0` disables maintenance.
    pub every_turns: usize,
    /// Turns read when rebuilding.
    pub window: usize,
}

impl Default for SummaryPolicy {
    fn default() -> Self {
        Self {
            every_turns: 10,
            window: 20,
        }
    }
}

impl SummaryPolicy {
    pub fn is_due(&self, turn_count: usize) -> bool {
        self.every_turns > 0 && turn_count > 0 && turn_count % self.every_turns == 0
    }
}

/// Deterministic digest of the most recent user messages, newest last.
/// Empty when `turns` has no user message.
pub fn digest(turns: &[Turn]) -> String {
    let mut topics: Vec<String> = turns
        .iter()
        .rev()
        .filter(|t| t.role == Role::User)
        .map(|t| clip(&t.content))
        .filter(|t| !t.is_empty())
        .take(MAX_TOPICS)
        .collect();
    if topics.is_empty() {
        return String::new();
    }
    topics.reverse();

    let quoted: Vec<String> = topics.iter().map(|t| format!("\"{t}\"")).collect();
    format!("Recently the user talked about: {}.", quoted.join("; "))
}

fn clip(text: &str) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() <= TOPIC_CHARS {
        return collapsed;
    }
    let mut clipped: String = collapsed.chars().take(TOPIC_CHARS).collect();
    clipped.push_str("...");
    clipped
}
