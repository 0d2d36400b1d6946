//! Neutral request/response types the Proxy and every Provider Adapter
//! speak. Tool arguments
//! are kept as a generic `serde_json::Value`, never a pre-serialized
//! string, so each adapter decides its own wire encoding.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
    ToolResult,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDef {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolChoice {
    Auto,
    None,
    Required,
}

/// Tagged sum over `Role`: `tool_calls` is only meaningful on `Assistant`;
/// `tool_call_id`/`is_error` only on `ToolResult`. The constructors
/// are the only supported way to build one, so the invariant holds by
/// construction rather than by runtime assertion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_error: Option<bool>,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            tool_calls: None,
            tool_call_id: None,
            is_error: None,
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            tool_calls: None,
            tool_call_id: None,
            is_error: None,
        }
    }

    pub fn assistant_with_tool_calls(content: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            tool_calls: Some(tool_calls),
            tool_call_id: None,
            is_error: None,
        }
    }

    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>, is_error: bool) -> Self {
        Self {
            role: Role::ToolResult,
            content: content.into(),
            tool_calls: None,
            tool_call_id: Some(tool_call_id.into()),
            is_error: Some(is_error),
        }
    }
}

/// Logical capability label a caller attaches to a request (glossary
/// "Intent"); distinct from `Capability` in the data model only in that
/// `repair` is valid here but is not a declarable model capability.
pub type Intent = String;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub intent: Intent,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    pub messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<ToolDef>>,
    pub tool_choice: ToolChoice,
    pub max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_cost: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chain_id: Option<String>,
}

impl Request {
    /// `messages` must be non-empty.
    pub fn is_valid(&self) -> bool {
        !self.messages.is_empty()
    }

    pub fn needs_tools(&self) -> bool {
        self.tools.as_ref().is_some_and(|t| !t.is_empty())
    }

    /// Fills `max_tokens` with a sane default if the caller left it at 0,
    /// and `intent` with `"chat"` if empty — the first step of the Proxy lifecycle.
    pub fn with_defaults_filled(mut self) -> Self {
        if self.max_tokens == 0 {
            self.max_tokens = 4096;
        }
        if self.intent.is_empty() {
            self.intent = "chat".to_string();
        }
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub content: String,
    pub tool_calls: Vec<ToolCall>,
    pub done: bool,
    pub model_used: String,
    pub provider: String,
    pub tokens_in: i64,
    pub tokens_out: i64,
    pub cost: f64,
    pub total_chain_cost: f64,
    pub budget_remaining: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_defaults_fill_empty_fields() {
        let req = Request {
            intent: String::new(),
            system: None,
            messages: vec![Message::user("hi")],
            tools: None,
            tool_choice: ToolChoice::Auto,
            max_tokens: 0,
            max_cost: None,
            chain_id: None,
        }
        .with_defaults_filled();
        assert_eq!(req.intent, "chat");
        assert_eq!(req.max_tokens, 4096);
    }

    #[test]
    fn empty_messages_invalid() {
        let req = Request {
            intent: "chat".to_string(),
            system: None,
            messages: vec![],
            tools: None,
            tool_choice: ToolChoice::Auto,
            max_tokens: 100,
            max_cost: None,
            chain_id: None,
        };
        assert!(!req.is_valid());
    }
}
