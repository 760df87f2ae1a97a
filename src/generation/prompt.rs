//! Prompt assembly for Qwen-family chat models
//!
//! Builds ChatML-formatted prompts and cleans model output of chat-control
//! artifacts before it reaches users.

/// System prompt for the serving paths (assistant, API, demo)
pub const COORDINATOR_SYSTEM_PROMPT: &str = "You are an expert emergency relief coordinator. \
    Provide detailed, actionable guidance for disaster response, resource coordination, and \
    emergency management. Always prioritize safety and follow established protocols.";

/// System prompt for scenario evaluation runs
pub const EVALUATOR_SYSTEM_PROMPT: &str = "You are an expert Emergency Relief Coordinator \
    with 20 years of experience. Provide clear, actionable, step-by-step emergency response \
    guidance. Focus on immediate actions, safety protocols, and resource coordination. Be \
    specific and prioritize life safety.";

/// Build a ChatML prompt ending with an open assistant turn
pub fn chat_prompt(system: &str, user: &str) -> String {
    format!(
        "<|im_start|>system\n{}<|im_end|>\n<|im_start|>user\n{}<|im_end|>\n<|im_start|>assistant\n",
        system, user
    )
}

/// Build a complete ChatML transcript including the assistant response.
///
/// Used to format training examples; the closed assistant turn gives the
/// model an end-of-turn target to learn.
pub fn chat_transcript(system: &str, user: &str, assistant: &str) -> String {
    format!(
        "<|im_start|>system\n{}<|im_end|>\n<|im_start|>user\n{}<|im_end|>\n<|im_start|>assistant\n{}<|im_end|>\n",
        system, user, assistant
    )
}

/// Frame a raw situation description the way the coordinator prompt expects
pub fn situation_prompt(situation: &str) -> String {
    format!(
        "EMERGENCY SITUATION: {}\n\nProvide immediate response guidance with specific action steps.",
        situation
    )
}

/// Chat-control tokens that occasionally survive decoding
const ARTIFACTS: &[&str] = &["<|im_end|>", "<|im_start|>", "<|endoftext|>"];

/// Strip chat-control artifacts and surrounding whitespace from model output
pub fn strip_artifacts(text: &str) -> String {
    let mut cleaned = text.to_string();
    for artifact in ARTIFACTS {
        cleaned = cleaned.replace(artifact, "");
    }
    cleaned.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_prompt_shape() {
        let prompt = chat_prompt("system text", "user text");

        assert!(prompt.starts_with("<|im_start|>system\nsystem text<|im_end|>\n"));
        assert!(prompt.contains("<|im_start|>user\nuser text<|im_end|>\n"));
        assert!(prompt.ends_with("<|im_start|>assistant\n"));
    }

    #[test]
    fn test_transcript_closes_assistant_turn() {
        let transcript = chat_transcript("sys", "question", "answer");
        assert!(transcript.ends_with("answer<|im_end|>\n"));
    }

    #[test]
    fn test_strip_artifacts() {
        assert_eq!(
            strip_artifacts("  Deploy rescue teams.<|im_end|>"),
            "Deploy rescue teams."
        );
        assert_eq!(strip_artifacts("<|endoftext|>"), "");
        assert_eq!(strip_artifacts("plain text"), "plain text");
    }
}
