//! ChatML prompt assembly.
//!
//! Output layout:
//!
//! ```text
//! <|im_start|>system
//! {persona with summary}<|im_end|>
//! <|im_start|>user
//! ...<|im_end|>
//! <|im_start|>assistant
//! ...<|im_end|>
//! <|im_start|>user
//! {current message}<|im_end|>
//! <|im_start|>assistant
//! ```

use echomind_core::Turn;

/// Placeholder replaced by the running summary.
pub const SUMMARY_PLACEHOLDER: &str = "{user_summary}";

/// Substituted when no summary exists yet.
pub const EMPTY_SUMMARY: &str = "No prior conversations.";

pub const STANDARD_PERSONA: &str = "You are Dr. Lumi, a warm, empathetic AI companion for emotional wellbeing.
Your goal is to help the user feel heard, validated, and understood.

CORE DIRECTIVES:
1. VALIDATION FIRST: Always acknowledge the user's feelings before exploring solutions.
2. CURIOSITY: Ask open-ended questions to help the user reflect.
3. NON-CLINICAL conversation: Speak like a wise, supportive friend, not a textbook.
4. BOUNDARIES: Do not diagnose, prescribe meds, or guarantee outcomes.

USER CONTEXT:
{user_summary}

If the user asks for advice, offer gentle suggestions but emphasize that they know their life best.
Keep responses concise (under 4 sentences usually) and conversational.
";

pub const CAUTION_PERSONA: &str = "You are Dr. Lumi, a supportive AI assistant.
The user seems to be experiencing significant distress or hopelessness.

CRITICAL RULES:
1. PRIORITIZE SAFETY: Remind them their feelings are valid but transient.
2. NO SENSATIONALISM: Be calm, steady, and grounding.
3. RESOURCES: If they seem overwhelmed, gently suggest reaching out to a friend or professional.
4. DO NOT diagnose or act as a crisis counselor.

USER CONTEXT:
{user_summary}

Focus on grounding techniques (breathing, 5-4-3-2-1) and immediate comfort.
";

/// Which system persona frames the reply.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Persona {
    Standard,
    /// Used when the input was tagged caution.
    Caution,
}

/// A rendered prompt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AssembledPrompt {
    /// Persona text with the summary substituted.
    pub system: String,
    /// Full ChatML text ending with an open assistant turn.
    pub text: String,
}

#[derive(Clone, Debug)]
pub struct PromptAssembler {
    standard: String,
    caution: String,
}

impl Default for PromptAssembler {
    fn default() -> Self {
        Self::new(STANDARD_PERSONA, CAUTION_PERSONA)
    }
}

impl PromptAssembler {
    pub fn new(standard: impl Into<String>, caution: impl Into<String>) -> Self {
        Self {
            standard: standard.into(),
            caution: caution.into(),
        }
    }

    /// Built-in templates, each replaceable.
    pub fn with_overrides(standard: Option<String>, caution: Option<String>) -> Self {
        Self::new(
            standard.unwrap_or_else(|| STANDARD_PERSONA.to_string()),
            caution.unwrap_or_else(|| CAUTION_PERSONA.to_string()),
        )
    }

    pub fn assemble(
        &self,
        history: &[Turn],
        summary: &str,
        persona: Persona,
        user_message: &str,
    ) -> AssembledPrompt {
        let template = match persona {
            Persona::Standard => &self.standard,
            Persona::Caution => &self.caution,
        };
        let summary = if summary.is_empty() { EMPTY_SUMMARY } else { summary };
        let system = template.replace(SUMMARY_PLACEHOLDER, summary);

        let mut text = String::with_capacity(
            system.len()
                + user_message.len()
                + history.iter().map(|t| t.content.len() + 32).sum::<usize>()
                + 96,
        );
        push_segment(&mut text, "system", &system);
        for turn in history {
            push_segment(&mut text, turn.role.as_str(), &turn.content);
        }
        push_segment(&mut text, "user", user_message);
        text.push_str("<|im_start|>assistant\n");

        AssembledPrompt { system, text }
    }
}

fn push_segment(out: &mut String, role: &str, content: &str) {
    out.push_str("<|im_start|>");
    out.push_str(role);
    out.push('\n');
    out.push_str(content);
    out.push_str("<|im_end|>\n");
}
