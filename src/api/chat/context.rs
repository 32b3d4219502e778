//! Assembly of the provider-bound message list for one turn.

use crate::ai::core::ChatMessage;
use crate::database::models::{Assistant, Message};

/// Prior turns included when the assistant does not set its own window.
pub const DEFAULT_CONTEXT_WINDOW: u32 = 20;

/// Fixed clause appended to the system prompt when the assistant's
/// safety_prompt flag is set.
pub const SAFETY_CLAUSE: &str =
    "Decline requests for harmful, illegal, or sexually explicit content and say why briefly.";

/// Build the ordered message list: exactly one system message, then the most
/// recent window of prior turns oldest-first, then the new user turn.
///
/// The window is counted in messages, not tokens; stricter token budgeting
/// is deliberately out of scope here.
pub fn build_context(
    assistant: &Assistant,
    history: &[Message],
    new_user_text: &str,
) -> Vec<ChatMessage> {
    let mut system_prompt = assistant.instructions.clone().unwrap_or_default();
    if assistant.parameters.safety_prompt.unwrap_or(false) {
        if !system_prompt.is_empty() {
            system_prompt.push_str("\n\n");
        }
        system_prompt.push_str(SAFETY_CLAUSE);
    }

    let window = assistant
        .parameters
        .context_window
        .unwrap_or(DEFAULT_CONTEXT_WINDOW) as usize;

    let mut messages = Vec::with_capacity(window + 2);
    messages.push(ChatMessage {
        role: "system".to_string(),
        content: system_prompt,
    });

    let turns: Vec<&Message> = history
        .iter()
        .filter(|m| m.role == "user" || m.role == "assistant")
        .collect();
    let start = turns.len().saturating_sub(window);
    for message in &turns[start..] {
        messages.push(ChatMessage {
            role: message.role.clone(),
            content: message.content.clone(),
        });
    }

    messages.push(ChatMessage {
        role: "user".to_string(),
        content: new_user_text.to_string(),
    });

    messages
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::models::ModelParameters;
    use chrono::Utc;
    use uuid::Uuid;

    fn assistant(context_window: Option<u32>, safety_prompt: bool) -> Assistant {
        Assistant {
            id: Uuid::new_v4(),
            name: "support".to_string(),
            description: None,
            instructions: Some("You are a support agent.".to_string()),
            provider_id: Uuid::new_v4(),
            model: "gpt-4o".to_string(),
            parameters: ModelParameters {
                context_window,
                safety_prompt: Some(safety_prompt),
                ..ModelParameters::default()
            },
            use_knowledge_base: false,
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn message(role: &str, content: &str) -> Message {
        Message {
            id: Uuid::new_v4(),
            conversation_id: Uuid::new_v4(),
            role: role.to_string(),
            content: content.to_string(),
            input_tokens: 0,
            output_tokens: 0,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn starts_with_exactly_one_system_message() {
        let history = vec![message("user", "a"), message("assistant", "b")];
        let context = build_context(&assistant(None, false), &history, "c");

        assert_eq!(context[0].role, "system");
        assert_eq!(context[0].content, "You are a support agent.");
        assert_eq!(context.iter().filter(|m| m.role == "system").count(), 1);
    }

    #[test]
    fn new_user_turn_is_last() {
        let history = vec![message("user", "a"), message("assistant", "b")];
        let context = build_context(&assistant(None, false), &history, "newest");

        let last = context.last().unwrap();
        assert_eq!(last.role, "user");
        assert_eq!(last.content, "newest");
    }

    #[test]
    fn history_is_bounded_by_the_window_keeping_newest() {
        let history: Vec<Message> = (0..10)
            .map(|i| message(if i % 2 == 0 { "user" } else { "assistant" }, &i.to_string()))
            .collect();
        let context = build_context(&assistant(Some(4), false), &history, "tail");

        // system + 4 windowed turns + new user turn
        assert_eq!(context.len(), 6);
        let windowed: Vec<&str> = context[1..5].iter().map(|m| m.content.as_str()).collect();
        assert_eq!(windowed, vec!["6", "7", "8", "9"]);
    }

    #[test]
    fn history_stays_in_chronological_order() {
        let history = vec![
            message("user", "first"),
            message("assistant", "second"),
            message("user", "third"),
        ];
        let context = build_context(&assistant(None, false), &history, "fourth");

        let contents: Vec<&str> = context.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(
            contents[1..],
            ["first", "second", "third", "fourth"]
        );
    }

    #[test]
    fn safety_clause_is_appended_when_flagged() {
        let context = build_context(&assistant(None, true), &[], "hi");
        assert!(context[0].content.ends_with(SAFETY_CLAUSE));
        assert!(context[0].content.starts_with("You are a support agent."));
    }

    #[test]
    fn stored_system_messages_are_not_duplicated() {
        let history = vec![message("system", "legacy prompt"), message("user", "a")];
        let context = build_context(&assistant(None, false), &history, "b");
        assert_eq!(context.iter().filter(|m| m.role == "system").count(), 1);
    }
}
