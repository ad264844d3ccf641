// SPDX-License-Identifier: MIT OR Apache-2.0

//! Chat messages and prompt rendering.
//!
//! [`build_messages`] turns a sample's questions and answers into an
//! ordered list of [`ChatMessage`]s; a [`ChatTemplate`] renders them into
//! the prompt string that is then tokenized.

use std::fmt::Write as _;

use crate::config::ConversationTemplateConfig;
use crate::error::{MMError, Result};
use crate::sample::Conversation;

/// Role name of the system message.
pub const SYSTEM_ROLE: &str = "system";

/// One message of a conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    /// Role name (`system`, or one of the configured roles).
    pub role: String,
    /// Message text; may contain image placeholders.
    pub content: String,
}

impl ChatMessage {
    /// Create a message.
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }
}

/// Build the message list for one sample.
///
/// The optional system prompt comes first.  Single-turn samples produce
/// one question and one answer; multi-turn samples are paired positionally
/// and truncated to the shorter side.
///
/// # Errors
///
/// Returns [`MMError::Template`] if `context` and `answers` use different
/// shapes (one single turn, the other a list).
pub fn build_messages(
    config: &ConversationTemplateConfig,
    context: &Conversation,
    answers: &Conversation,
) -> Result<Vec<ChatMessage>> {
    let [user_role, assistant_role] = &config.roles;
    let mut messages = Vec::new();

    if let Some(system) = &config.system {
        messages.push(ChatMessage::new(SYSTEM_ROLE, system.as_str()));
    }

    match (context, answers) {
        (Conversation::Single(question), Conversation::Single(answer)) => {
            messages.push(ChatMessage::new(user_role.as_str(), question.as_str()));
            messages.push(ChatMessage::new(assistant_role.as_str(), answer.as_str()));
        }
        (Conversation::Turns(questions), Conversation::Turns(turns)) => {
            for (question, answer) in questions.iter().zip(turns) {
                messages.push(ChatMessage::new(user_role.as_str(), question.as_str()));
                messages.push(ChatMessage::new(assistant_role.as_str(), answer.as_str()));
            }
        }
        _ => {
            return Err(MMError::Template(
                "sample context and answers must both be single strings or both be lists".into(),
            ));
        }
    }

    Ok(messages)
}

/// Renders chat messages into a prompt string.
pub trait ChatTemplate: Send + Sync {
    /// Render `messages` without a trailing generation prompt.
    ///
    /// # Errors
    ///
    /// Returns [`MMError::Template`] if the messages cannot be rendered.
    fn render(&self, messages: &[ChatMessage]) -> Result<String>;
}

/// Llama 3 header-style chat template.
///
/// ```text
/// <|begin_of_text|><|start_header_id|>user<|end_header_id|>
///
/// <|image|>What is shown?<|eot_id|>...
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Llama3ChatTemplate;

impl ChatTemplate for Llama3ChatTemplate {
    fn render(&self, messages: &[ChatMessage]) -> Result<String> {
        if messages.is_empty() {
            return Err(MMError::Template("no messages to render".into()));
        }
        let mut prompt = String::from("<|begin_of_text|>");
        for message in messages {
            write!(
                prompt,
                "<|start_header_id|>{}<|end_header_id|>\n\n{}<|eot_id|>",
                message.role, message.content
            )
            .map_err(|e| MMError::Template(format!("render failed: {e}")))?;
        }
        Ok(prompt)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn turns(items: &[&str]) -> Conversation {
        Conversation::Turns(items.iter().map(|s| (*s).to_owned()).collect())
    }

    #[test]
    fn single_turn_with_system() {
        let config = ConversationTemplateConfig {
            system: Some("Be brief.".into()),
            ..ConversationTemplateConfig::default()
        };
        let messages = build_messages(&config, &"What?".into(), &"That.".into()).unwrap();
        assert_eq!(
            messages,
            vec![
                ChatMessage::new("system", "Be brief."),
                ChatMessage::new("user", "What?"),
                ChatMessage::new("assistant", "That."),
            ]
        );
    }

    #[test]
    fn multi_turn_truncates_to_shorter_side() {
        let config = ConversationTemplateConfig::default();
        let messages =
            build_messages(&config, &turns(&["q1", "q2", "q3"]), &turns(&["a1", "a2"])).unwrap();
        let roles: Vec<&str> = messages.iter().map(|m| m.role.as_str()).collect();
        assert_eq!(roles, vec!["user", "assistant", "user", "assistant"]);
        assert_eq!(messages[3].content, "a2");
    }

    #[test]
    fn mixed_shapes_error() {
        let config = ConversationTemplateConfig::default();
        let err = build_messages(&config, &"q".into(), &turns(&["a"])).unwrap_err();
        assert!(matches!(err, MMError::Template(_)));
    }

    #[test]
    fn llama3_rendering() {
        let prompt = Llama3ChatTemplate
            .render(&[
                ChatMessage::new("user", "<|image|>Hi"),
                ChatMessage::new("assistant", "Hello"),
            ])
            .unwrap();
        assert_eq!(
            prompt,
            "<|begin_of_text|>\
             <|start_header_id|>user<|end_header_id|>\n\n<|image|>Hi<|eot_id|>\
             <|start_header_id|>assistant<|end_header_id|>\n\nHello<|eot_id|>"
        );
    }

    #[test]
    fn empty_messages_error() {
        assert!(Llama3ChatTemplate.render(&[]).is_err());
    }
}
