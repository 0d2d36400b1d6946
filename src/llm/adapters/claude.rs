//! Adapter Claude-style. `system` is top-level, not a message;
//! assistant content is interleaved text/tool-use blocks; consecutive
//! `tool_result` messages MUST collapse into a single synthesized `user`
//! message carrying an array of `tool_result` blocks — the single most
//! fragile transformation in the proxy, and the reason it gets its own
//! dedicated test below.

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;

use crate::error::AdapterError;
use crate::llm::adapter::{HttpRequest, ParsedResponse, ProviderAdapter};
use crate::llm::types::{Message, Request, Role, ToolCall, ToolChoice, ToolDef};

pub struct ClaudeAdapter {
    client: reqwest::Client,
}

impl ClaudeAdapter {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

fn tool_choice_json(choice: ToolChoice) -> Option<serde_json::Value> {
    match choice {
        ToolChoice::Auto => Some(serde_json::json!({ "type": "auto" })),
        ToolChoice::None => None,
        ToolChoice::Required => Some(serde_json::json!({ "type": "any" })),
    }
}

fn tool_def_json(tool: &ToolDef) -> serde_json::Value {
    serde_json::json!({
        "name": tool.name,
        "description": tool.description,
        "input_schema": tool.parameters,
    })
}

/// Groups consecutive `tool_result` messages into one synthesized `user`
/// message whose content is an array of `tool_result` blocks.
fn build_messages(messages: &[Message]) -> Vec<serde_json::Value> {
    let mut out = Vec::with_capacity(messages.len());
    let mut i = 0;
    while i < messages.len() {
        match messages[i].role {
            Role::User => {
                out.push(serde_json::json!({ "role": "user", "content": messages[i].content }));
                i += 1;
            }
            Role::Assistant => {
                let mut blocks = Vec::new();
                if !messages[i].content.is_empty() {
                    blocks.push(serde_json::json!({ "type": "text", "text": messages[i].content }));
                }
                if let Some(tool_calls) = &messages[i].tool_calls {
                    for tc in tool_calls {
                        blocks.push(serde_json::json!({
                            "type": "tool_use",
                            "id": tc.id,
                            "name": tc.name,
                            "input": tc.arguments,
                        }));
                    }
                }
                out.push(serde_json::json!({ "role": "assistant", "content": blocks }));
                i += 1;
            }
            Role::ToolResult => {
                let mut blocks = Vec::new();
                while i < messages.len() && messages[i].role == Role::ToolResult {
                    let msg = &messages[i];
                    blocks.push(serde_json::json!({
                        "type": "tool_result",
                        "tool_use_id": msg.tool_call_id.clone().unwrap_or_default(),
                        "content": msg.content,
                        "is_error": msg.is_error.unwrap_or(false),
                    }));
                    i += 1;
                }
                out.push(serde_json::json!({ "role": "user", "content": blocks }));
            }
        }
    }
    out
}

#[async_trait]
impl ProviderAdapter for ClaudeAdapter {
    fn name(&self) -> &str {
        "anthropic"
    }

    fn supports_embed(&self) -> bool {
        false
    }

    fn build_request(&self, request: &Request, model_name: &str, api_key: Option<&str>, base_url: &str) -> Result<HttpRequest, AdapterError> {
        let mut body = serde_json::json!({
            "model": model_name,
            "max_tokens": request.max_tokens,
            "messages": build_messages(&request.messages),
        });
        if let Some(system) = &request.system {
            body["system"] = serde_json::json!(system);
        }
        if let Some(tools) = &request.tools {
            if !tools.is_empty() {
                body["tools"] = serde_json::json!(tools.iter().map(tool_def_json).collect::<Vec<_>>());
                if let Some(choice) = tool_choice_json(request.tool_choice) {
                    body["tool_choice"] = choice;
                }
            }
        }

        let body_bytes =
            Bytes::from(serde_json::to_vec(&body).map_err(|e| AdapterError::BuildFailed(e.to_string()))?);

        let mut headers = HashMap::new();
        headers.insert("content-type".to_string(), "application/json".to_string());
        headers.insert("anthropic-version".to_string(), "2023-06-01".to_string());
        if let Some(key) = api_key {
            headers.insert("x-api-key".to_string(), key.to_string());
        }

        Ok(HttpRequest {
            url: format!("{}/v1/messages", base_url.trim_end_matches('/')),
            headers,
            body_bytes,
        })
    }

    fn parse_response(&self, status_code: u16, body_bytes: &[u8]) -> Result<ParsedResponse, AdapterError> {
        if !(200..300).contains(&status_code) {
            return Err(AdapterError::ParseFailed(format!("non-2xx status {status_code}")));
        }
        let value: serde_json::Value =
            serde_json::from_slice(body_bytes).map_err(|e| AdapterError::ParseFailed(e.to_string()))?;

        let blocks = value["content"]
            .as_array()
            .ok_or_else(|| AdapterError::ParseFailed("missing content blocks".to_string()))?;

        let mut content = String::new();
        let mut tool_calls = Vec::new();
        for block in blocks {
            match block["type"].as_str() {
                Some("text") => content.push_str(block["text"].as_str().unwrap_or("")),
                Some("tool_use") => {
                    let id = block["id"]
                        .as_str()
                        .ok_or_else(|| AdapterError::ParseFailed("tool_use missing id".to_string()))?
                        .to_string();
                    let name = block["name"]
                        .as_str()
                        .ok_or_else(|| AdapterError::ParseFailed("tool_use missing name".to_string()))?
                        .to_string();
                    let arguments = block["input"].clone();
                    tool_calls.push(ToolCall { id, name, arguments });
                }
                _ => {}
            }
        }

        let stop_reason = value["stop_reason"].as_str().unwrap_or("end_turn");
        let done = stop_reason != "tool_use";

        let usage = &value["usage"];
        let tokens_in = usage["input_tokens"].as_i64().unwrap_or(0);
        let tokens_out = usage["output_tokens"].as_i64().unwrap_or(0);

        Ok(ParsedResponse {
            content,
            tool_calls,
            done,
            tokens_in,
            tokens_out,
        })
    }

    async fn embed(&self, _model_name: &str, _text: &str, _api_key: Option<&str>, _base_url: &str) -> Result<(Vec<f32>, i64), AdapterError> {
        Err(AdapterError::BuildFailed("anthropic adapter does not support embeddings".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn consecutive_tool_results_collapse_into_one_user_message() {
        let messages = vec![
            Message::user("go"),
            Message::assistant_with_tool_calls(
                "",
                vec![
                    ToolCall { id: "tc_1".into(), name: "a".into(), arguments: serde_json::json!({}) },
                    ToolCall { id: "tc_2".into(), name: "b".into(), arguments: serde_json::json!({}) },
                ],
            ),
            Message::tool_result("tc_1", "r1", false),
            Message::tool_result("tc_2", "r2", false),
        ];
        let built = build_messages(&messages);
        assert_eq!(built.len(), 3);
        let third = &built[2];
        assert_eq!(third["role"], "user");
        let content = third["content"].as_array().unwrap();
        assert_eq!(content.len(), 2);
        assert_eq!(content[0]["tool_use_id"], "tc_1");
        assert_eq!(content[1]["tool_use_id"], "tc_2");
    }

    #[test]
    fn done_is_false_when_stop_reason_is_tool_use() {
        let body = serde_json::to_vec(&serde_json::json!({
            "content": [{ "type": "tool_use", "id": "tc_1", "name": "search", "input": {} }],
            "stop_reason": "tool_use",
            "usage": { "input_tokens": 10, "output_tokens": 5 }
        }))
        .unwrap();
        let adapter = ClaudeAdapter::new(reqwest::Client::new());
        let parsed = adapter.parse_response(200, &body).unwrap();
        assert!(!parsed.done);
        assert_eq!(parsed.tool_calls.len(), 1);
    }

    #[test]
    fn tool_choice_required_maps_to_any() {
        assert_eq!(tool_choice_json(ToolChoice::Required), Some(serde_json::json!({ "type": "any" })));
    }

    #[test]
    fn system_is_top_level_not_a_message() {
        let req = Request {
            intent: "chat".into(),
            system: Some("be nice".into()),
            messages: vec![Message::user("hi")],
            tools: None,
            tool_choice: ToolChoice::Auto,
            max_tokens: 100,
            max_cost: None,
            chain_id: None,
        };
        let adapter = ClaudeAdapter::new(reqwest::Client::new());
        let http_req = adapter.build_request(&req, "claude-3", None, "https://api.anthropic.com").unwrap();
        let body: serde_json::Value = serde_json::from_slice(&http_req.body_bytes).unwrap();
        assert_eq!(body["system"], "be nice");
        assert!(body["messages"].as_array().unwrap().iter().all(|m| m["role"] != "system"));
    }
}
