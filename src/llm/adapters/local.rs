//! Adapter Local-chat: OpenAI-like wire envelope served by a local runtime
//! (e.g. Ollama).

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;

use crate::error::AdapterError;
use crate::llm::adapter::{truncate_embedding, HttpRequest, ParsedResponse, ProviderAdapter};
use crate::llm::adapters::shared::{build_wire_body, parse_wire_response, OpenAiStyleOptions};
use crate::llm::types::Request;

fn opts() -> OpenAiStyleOptions {
    OpenAiStyleOptions {
        args_as_json_string: false,
        include_tool_call_id: false,
    }
}

pub struct LocalAdapter {
    client: reqwest::Client,
}

impl LocalAdapter {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ProviderAdapter for LocalAdapter {
    fn name(&self) -> &str {
        "local"
    }

    fn supports_embed(&self) -> bool {
        true
    }

    fn build_request(&self, request: &Request, model_name: &str, _api_key: Option<&str>, base_url: &str) -> Result<HttpRequest, AdapterError> {
        let body = build_wire_body(request, model_name, &opts());
        let body_bytes =
            Bytes::from(serde_json::to_vec(&body).map_err(|e| AdapterError::BuildFailed(e.to_string()))?);

        let mut headers = HashMap::new();
        headers.insert("content-type".to_string(), "application/json".to_string());

        Ok(HttpRequest {
            url: format!("{}/v1/chat/completions", base_url.trim_end_matches('/')),
            headers,
            body_bytes,
        })
    }

    fn parse_response(&self, status_code: u16, body_bytes: &[u8]) -> Result<ParsedResponse, AdapterError> {
        if !(200..300).contains(&status_code) {
            return Err(AdapterError::ParseFailed(format!("non-2xx status {status_code}")));
        }
        let mut parsed = parse_wire_response(body_bytes, &opts())?;
        // Local runtimes don't always assign tool call ids; the adapter
        // generates one rather than leaving a shared "call_N" default clash.
        for (i, tc) in parsed.tool_calls.iter_mut().enumerate() {
            if tc.id.is_empty() || tc.id.starts_with("call_") {
                tc.id = format!("local_{}_{}", uuid::Uuid::new_v4().simple(), i);
            }
        }
        Ok(parsed)
    }

    async fn embed(&self, model_name: &str, text: &str, _api_key: Option<&str>, base_url: &str) -> Result<(Vec<f32>, i64), AdapterError> {
        let resp = self
            .client
            .post(format!("{}/api/embeddings", base_url.trim_end_matches('/')))
            .json(&serde_json::json!({ "model": model_name, "prompt": text }))
            .send()
            .await
            .map_err(|e| AdapterError::BuildFailed(e.to_string()))?;
        let value: serde_json::Value = resp.json().await.map_err(|e| AdapterError::ParseFailed(e.to_string()))?;

        let vector: Vec<f32> = value["embedding"]
            .as_array()
            .ok_or_else(|| AdapterError::ParseFailed("missing embedding array".to_string()))?
            .iter()
            .map(|v| v.as_f64().unwrap_or(0.0) as f32)
            .collect();
        // Local runtimes don't report token counts for embeddings; estimate
        // from text length (roughly 4 bytes/token) so budget accounting has
        // something non-zero to work with.
        let tokens_in = (text.len() as i64 / 4).max(1);

        Ok((truncate_embedding(vector), tokens_in))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_request_targets_ollama_style_path() {
        let req = Request {
            intent: "chat".into(),
            system: None,
            messages: vec![crate::llm::types::Message::user("hi")],
            tools: None,
            tool_choice: crate::llm::types::ToolChoice::Auto,
            max_tokens: 100,
            max_cost: None,
            chain_id: None,
        };
        let adapter = LocalAdapter::new(reqwest::Client::new());
        let http_req = adapter.build_request(&req, "llama3", None, "http://localhost:11434").unwrap();
        assert_eq!(http_req.url, "http://localhost:11434/v1/chat/completions");
    }

    #[test]
    fn parse_response_assigns_ids_to_nameless_tool_calls() {
        let body = serde_json::to_vec(&serde_json::json!({
            "choices": [{
                "message": {
                    "content": "",
                    "tool_calls": [{ "function": { "name": "search", "arguments": { "q": "hi" } } }]
                },
                "finish_reason": "tool_calls"
            }],
            "usage": { "prompt_tokens": 1, "completion_tokens": 2 }
        }))
        .unwrap();
        let adapter = LocalAdapter::new(reqwest::Client::new());
        let parsed = adapter.parse_response(200, &body).unwrap();
        assert!(!parsed.tool_calls[0].id.is_empty());
    }
}
