//! Message domain types.
//!
//! Messages are the only conversation-scoped data that survives a turn.
//! Foreign shapes (role aliases, list-of-blocks content) are normalized here
//! once, at the boundary, so every other component sees `{role, content}`.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Error;

/// The role of a message sender in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The end user
    User,
    /// The assistant (final merged response)
    Assistant,
    /// System instructions (prompt prefix and expert suffix)
    System,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::System => "system",
        }
    }
}

impl FromStr for Role {
    type Err = Error;

    /// Accepts both chat-style (`user`/`assistant`) and transcript-style
    /// (`human`/`ai`) role names.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" | "human" => Ok(Self::User),
            "assistant" | "ai" => Ok(Self::Assistant),
            "system" => Ok(Self::System),
            other => Err(Error::Validation(format!("Unsupported role: {other}"))),
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single message in a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Who sent this message
    pub role: Role,

    /// The text content
    pub content: String,
}

impl Message {
    /// Create a new user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    /// Create a new assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }

    /// Create a new system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn is_user(&self) -> bool {
        self.role == Role::User
    }

    /// Normalize a loosely-shaped JSON message.
    ///
    /// The role is read from `role` or, failing that, `type`. Content may be a
    /// string or a list of blocks; see [`content_to_text`].
    pub fn from_json(value: &Value) -> Result<Self, Error> {
        let role = value
            .get("role")
            .or_else(|| value.get("type"))
            .and_then(Value::as_str)
            .ok_or_else(|| Error::Validation("Message has no role".into()))?;

        Ok(Self {
            role: role.parse()?,
            content: content_to_text(value.get("content").unwrap_or(&Value::Null)),
        })
    }
}

/// Flatten message content into plain text.
///
/// Strings pass through. Lists are concatenated: string items verbatim,
/// object items via their `text` field, else their `content` field.
/// `null` becomes empty; anything else is rendered as JSON.
pub fn content_to_text(content: &Value) -> String {
    match content {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(s.as_str()),
                Value::Object(block) => block
                    .get("text")
                    .and_then(Value::as_str)
                    .or_else(|| block.get("content").and_then(Value::as_str)),
                _ => None,
            })
            .collect(),
        other => other.to_string(),
    }
}
