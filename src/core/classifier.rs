//! Pure request classifier (C4, spec §4.3).
//!
//! Derives complexity, required capabilities, and a token estimate from the
//! message sequence alone. Deliberately dependency-free beyond `regex` so it
//! stays trivially unit-testable and side-effect-free.

use crate::core::types::{ChatMessage, Capability, Classification, Complexity};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

static CODE_KEYWORDS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(code|function|class|refactor|implement|debug)\b").unwrap()
});
static FENCED_CODE: Lazy<Regex> = Lazy::new(|| Regex::new(r"```").unwrap());
static MATH_INDICATORS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(integral|derivative|calculate|equation|solve|[0-9]+\s*[+\-*/^]\s*[0-9]+)")
        .unwrap()
});
static CREATIVE_KEYWORDS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(story|poem|creative|write a|imagine)\b").unwrap()
});

const LONG_CONTEXT_CHARS: usize = 2_000;
const MODERATE_TOKEN_THRESHOLD: u32 = 500;
const COMPLEX_TOKEN_THRESHOLD: u32 = 2_000;
const MODERATE_MESSAGE_COUNT: usize = 4;

pub struct Classifier;

impl Classifier {
    /// Classify a message sequence (spec §4.3, rules applied in order).
    pub fn classify(messages: &[ChatMessage]) -> Classification {
        let mut capabilities: HashSet<Capability> = HashSet::new();
        capabilities.insert(Capability::General);
        capabilities.insert(Capability::InstructionFollowing);

        let mut reasons: Vec<&'static str> = vec!["general+instruction-following baseline"];

        let total_chars: usize = messages.iter().map(|m| m.content.chars().count()).sum();
        let has_code = messages
            .iter()
            .any(|m| FENCED_CODE.is_match(&m.content) || CODE_KEYWORDS.is_match(&m.content));
        if has_code {
            capabilities.insert(Capability::Code);
            reasons.push("code indicators present");
        }

        let has_math = messages.iter().any(|m| MATH_INDICATORS.is_match(&m.content));
        if has_math {
            capabilities.insert(Capability::Math);
            reasons.push("math indicators present");
        }

        let has_creative = messages.iter().any(|m| CREATIVE_KEYWORDS.is_match(&m.content));
        if has_creative {
            capabilities.insert(Capability::Creative);
            reasons.push("creative-writing indicators present");
        }

        let has_long_message = messages
            .iter()
            .any(|m| m.content.chars().count() > LONG_CONTEXT_CHARS);
        if has_long_message {
            capabilities.insert(Capability::LongContext);
            reasons.push("a message exceeds 2000 characters");
        }

        let estimated_tokens = ((total_chars as f64) / 4.0).ceil().max(1.0) as u32;

        // The three moderate-upgrade conditions from spec §4.3 rule 7. Complex
        // requires two of *these three* to hold, not three separate keyword
        // hits within condition A.
        let cond_a_content_kind = has_code || has_math || has_creative;
        let cond_b_many_messages = messages.len() >= MODERATE_MESSAGE_COUNT;
        let cond_c_long_estimate = estimated_tokens > MODERATE_TOKEN_THRESHOLD;

        let conditions_met = usize::from(cond_a_content_kind)
            + usize::from(cond_b_many_messages)
            + usize::from(cond_c_long_estimate);

        let complexity = if estimated_tokens > COMPLEX_TOKEN_THRESHOLD || conditions_met >= 2 {
            Complexity::Complex
        } else if conditions_met >= 1 {
            Complexity::Moderate
        } else {
            Complexity::Simple
        };

        Classification {
            complexity,
            required_capabilities: capabilities,
            estimated_tokens,
            reasoning: reasons.join("; "),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Role;

    fn msg(content: &str) -> ChatMessage {
        ChatMessage {
            role: Role::User,
            content: content.to_string(),
        }
    }

    #[test]
    fn always_has_baseline_capabilities() {
        let c = Classifier::classify(&[msg("Hello")]);
        assert!(c.required_capabilities.contains(&Capability::General));
        assert!(
            c.required_capabilities
                .contains(&Capability::InstructionFollowing)
        );
    }

    #[test]
    fn hello_is_simple() {
        let c = Classifier::classify(&[msg("Hello")]);
        assert_eq!(c.complexity, Complexity::Simple);
    }

    #[test]
    fn estimated_tokens_positive_for_nonempty_content() {
        let c = Classifier::classify(&[msg("Hello")]);
        assert!(c.estimated_tokens > 0);
    }

    #[test]
    fn fenced_code_adds_code_capability() {
        let c = Classifier::classify(&[msg("```rust\nfn main() {}\n```")]);
        assert!(c.required_capabilities.contains(&Capability::Code));
    }

    #[test]
    fn math_expression_adds_math_capability_and_moderate_complexity() {
        let c = Classifier::classify(&[msg("please calculate 2 + 2 for me")]);
        assert!(c.required_capabilities.contains(&Capability::Math));
        assert_eq!(c.complexity, Complexity::Moderate);
    }

    #[test]
    fn long_message_adds_long_context() {
        let long = "a".repeat(2_500);
        let c = Classifier::classify(&[msg(&long)]);
        assert!(c.required_capabilities.contains(&Capability::LongContext));
    }

    #[test]
    fn many_messages_upgrade_to_moderate() {
        let msgs: Vec<_> = (0..5).map(|_| msg("hi")).collect();
        let c = Classifier::classify(&msgs);
        assert_eq!(c.complexity, Complexity::Moderate);
    }

    #[test]
    fn content_kind_alone_is_only_moderate() {
        // Code + math + creative keywords all present, but that's still just
        // one of the three upgrade conditions (content kind) — message count
        // and token estimate stay low, so this should not reach Complex.
        let c = Classifier::classify(&[msg(
            "```code```\n please solve this integral and write a poem too",
        )]);
        assert_eq!(c.complexity, Complexity::Moderate);
    }

    #[test]
    fn content_kind_plus_many_messages_is_complex() {
        let msgs: Vec<_> = (0..5).map(|_| msg("please refactor this code")).collect();
        let c = Classifier::classify(&msgs);
        assert_eq!(c.complexity, Complexity::Complex);
    }
}
