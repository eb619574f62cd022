//! UI-agnostic chat state types
//!
//! These structures are shared between the TUI, the one-shot CLI and the
//! session store. Their JSON shape is the on-disk history format.

use serde::{Deserialize, Serialize};

/// Text of the message every new session starts with
pub const GREETING: &str = "Hello! I'm here to help you edit your images. Please upload an image or describe the changes you'd like to make.";

/// Id of the greeting message
pub const GREETING_ID: &str = "init";

/// The role of a chat message sender
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Model,
}

/// One piece of a message: text, an image reference, or both
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePart {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

impl MessagePart {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            image_url: None,
        }
    }

    pub fn image(url: impl Into<String>) -> Self {
        Self {
            text: None,
            image_url: Some(url.into()),
        }
    }

    /// Text content, if it has anything besides whitespace
    pub fn non_blank_text(&self) -> Option<&str> {
        self.text.as_deref().filter(|t| !t.trim().is_empty())
    }
}

/// A chat message in the conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub role: ChatRole,
    pub parts: Vec<MessagePart>,
}

impl ChatMessage {
    pub fn new(role: ChatRole, parts: Vec<MessagePart>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            role,
            parts,
        }
    }

    pub fn greeting() -> Self {
        Self {
            id: GREETING_ID.to_string(),
            role: ChatRole::Model,
            parts: vec![MessagePart::text(GREETING)],
        }
    }

    /// First image reference carried by this message
    pub fn first_image(&self) -> Option<&str> {
        self.parts.iter().find_map(|p| p.image_url.as_deref())
    }

    pub fn first_text(&self) -> Option<&str> {
        self.parts
            .iter()
            .find_map(|p| p.text.as_deref().filter(|t| !t.is_empty()))
    }
}

/// A chat session: an ordered thread of messages
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatSession {
    pub id: String,
    pub messages: Vec<ChatMessage>,
}

impl ChatSession {
    /// Fresh session seeded with the greeting, keyed by its creation time
    pub fn new() -> Self {
        Self {
            id: chrono::Utc::now().timestamp_millis().to_string(),
            messages: vec![ChatMessage::greeting()],
        }
    }

    /// Most recent message authored by the model
    pub fn last_model_message(&self) -> Option<&ChatMessage> {
        self.messages.iter().rev().find(|m| m.role == ChatRole::Model)
    }

    /// Short label for session lists.
    ///
    /// Prefers the first user text (40 chars), then the first model reply
    /// that isn't the greeting (30 chars), then "New Chat".
    pub fn title(&self) -> String {
        let user_text = self
            .messages
            .iter()
            .find(|m| m.role == ChatRole::User)
            .and_then(|m| m.first_text());
        if let Some(text) = user_text {
            return truncate_with_ellipsis(text, 40);
        }

        let model_text = self
            .messages
            .iter()
            .find(|m| m.role == ChatRole::Model && m.id != GREETING_ID)
            .and_then(|m| m.first_text());
        if let Some(text) = model_text {
            let head: String = text.chars().take(30).collect();
            return format!("AI: {}...", head);
        }

        "New Chat".to_string()
    }
}

impl Default for ChatSession {
    fn default() -> Self {
        Self::new()
    }
}

fn truncate_with_ellipsis(text: &str, max_chars: usize) -> String {
    let mut head: String = text.chars().take(max_chars).collect();
    if text.chars().count() > max_chars {
        head.push_str("...");
    }
    head
}
