//! Chat request lifecycle.

use std::fmt;

use tracing::error;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ChatState {
    Received,
    RateChecked,
    SafetyInputChecked,
    QuotaReserved,
    Generated,
    SafetyOutputChecked,
    // terminals
    Completed,
    Blocked,
    Invalid,
    RateLimited,
    QuotaExceeded,
    ProfileNotFound,
    UpstreamFailure,
}

impl ChatState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Received => "RECEIVED",
            Self::RateChecked => "RATE_CHECKED",
            Self::SafetyInputChecked => "SAFETY_INPUT_CHECKED",
            Self::QuotaReserved => "QUOTA_RESERVED",
            Self::Generated => "GENERATED",
            Self::SafetyOutputChecked => "SAFETY_OUTPUT_CHECKED",
            Self::Completed => "COMPLETED",
            Self::Blocked => "BLOCKED",
            Self::Invalid => "INVALID",
            Self::RateLimited => "RATE_LIMITED",
            Self::QuotaExceeded => "QUOTA_EXCEEDED",
            Self::ProfileNotFound => "PROFILE_NOT_FOUND",
            Self::UpstreamFailure => "UPSTREAM_FAILURE",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Completed
                | Self::Blocked
                | Self::Invalid
                | Self::RateLimited
                | Self::QuotaExceeded
                | Self::ProfileNotFound
                | Self::UpstreamFailure
        )
    }

    /// Allowed edges of the lifecycle graph.
    pub fn can_transition_to(self, next: ChatState) -> bool {
        use ChatState::*;
        matches!(
            (self, next),
            (Received, RateChecked | RateLimited | Invalid | UpstreamFailure)
                | (RateChecked, SafetyInputChecked)
                | (
                    SafetyInputChecked,
                    Blocked
                        | Invalid
                        | QuotaReserved
                        | QuotaExceeded
                        | ProfileNotFound
                        | UpstreamFailure
                )
                | (QuotaReserved, Generated | UpstreamFailure)
                | (Generated, SafetyOutputChecked)
                | (SafetyOutputChecked, Blocked | Completed)
        )
    }
}

impl fmt::Display for ChatState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered record of visited states, starting at [`ChatState::Received`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StateTrail {
    states: Vec<ChatState>,
}

impl Default for StateTrail {
    fn default() -> Self {
        Self::new()
    }
}

impl StateTrail {
    pub fn new() -> Self {
        Self {
            states: vec![ChatState::Received],
        }
    }

    pub fn current(&self) -> ChatState {
        // never empty: constructed with Received
        self.states.last().copied().unwrap_or(ChatState::Received)
    }

    /// Record a transition. An edge outside the lifecycle graph is a bug;
    /// it is logged and still recorded so the trail shows what happened.
    pub fn advance(&mut self, next: ChatState) {
        let from = self.current();
        if !from.can_transition_to(next) {
            error!(%from, to = %next, "invalid chat state transition");
            debug_assert!(false, "invalid chat state transition {from} -> {next}");
        }
        self.states.push(next);
    }

    pub fn states(&self) -> &[ChatState] {
        &self.states
    }

    pub fn into_states(self) -> Vec<ChatState> {
        self.states
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ChatState::*;

    #[test]
    fn happy_path_is_valid() {
        let mut trail = StateTrail::new();
        for next in [
            RateChecked,
            SafetyInputChecked,
            QuotaReserved,
            Generated,
            SafetyOutputChecked,
            Completed,
        ] {
            trail.advance(next);
        }
        assert_eq!(trail.current(), Completed);
        assert_eq!(trail.states().len(), 7);
        assert!(trail.current().is_terminal());
    }

    #[test]
    fn crisis_input_blocks_before_quota() {
        assert!(SafetyInputChecked.can_transition_to(Blocked));
        assert!(!RateChecked.can_transition_to(QuotaReserved));
    }

    #[test]
    fn length_and_model_checks_follow_input_screening() {
        assert!(Received.can_transition_to(Invalid));
        assert!(SafetyInputChecked.can_transition_to(Invalid));
        assert!(!QuotaReserved.can_transition_to(Invalid));
    }

    #[test]
    fn output_block_only_after_generation() {
        assert!(SafetyOutputChecked.can_transition_to(Blocked));
        assert!(!QuotaReserved.can_transition_to(Completed));
        assert!(!Generated.can_transition_to(Completed));
    }

    #[test]
    fn terminals_have_no_exits() {
        let all = [
            Received,
            RateChecked,
            SafetyInputChecked,
            QuotaReserved,
            Generated,
            SafetyOutputChecked,
            Completed,
            Blocked,
            Invalid,
            RateLimited,
            QuotaExceeded,
            ProfileNotFound,
            UpstreamFailure,
        ];
        for from in all.iter().filter(|s| s.is_terminal()) {
            for to in all {
                assert!(!from.can_transition_to(to), "{from} -> {to}");
            }
        }
    }

    #[test]
    fn display_uses_screaming_case() {
        assert_eq!(SafetyInputChecked.to_string(), "SAFETY_INPUT_CHECKED");
    }
}
