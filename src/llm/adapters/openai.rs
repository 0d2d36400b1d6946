//! Adapter OpenAI-style: cloud chat completions.

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;

use crate::error::AdapterError;
use crate::llm::adapter::{truncate_embedding, HttpRequest, ParsedResponse, ProviderAdapter};
use crate::llm::adapters::shared::{build_wire_body, parse_wire_response, OpenAiStyleOptions};
use crate::llm::types::Request;

fn opts() -> OpenAiStyleOptions {
    OpenAiStyleOptions {
        args_as_json_string: true,
        include_tool_call_id: true,
    }
}

pub struct OpenAiAdapter {
    client: reqwest::Client,
}

impl OpenAiAdapter {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ProviderAdapter for OpenAiAdapter {
    fn name(&self) -> &str {
        "openai"
    }

    fn supports_embed(&self) -> bool {
        true
    }

    fn build_request(&self, request: &Request, model_name: &str, api_key: Option<&str>, base_url: &str) -> Result<HttpRequest, AdapterError> {
        let body = build_wire_body(request, model_name, &opts());
        let body_bytes =
            Bytes::from(serde_json::to_vec(&body).map_err(|e| AdapterError::BuildFailed(e.to_string()))?);

        let mut headers = HashMap::new();
        headers.insert("content-type".to_string(), "application/json".to_string());
        if let Some(key) = api_key {
            headers.insert("authorization".to_string(), format!("Bearer {key}"));
        }

        Ok(HttpRequest {
            url: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            headers,
            body_bytes,
        })
    }

    fn parse_response(&self, status_code: u16, body_bytes: &[u8]) -> Result<ParsedResponse, AdapterError> {
        if !(200..300).contains(&status_code) {
            return Err(AdapterError::ParseFailed(format!("non-2xx status {status_code}")));
        }
        parse_wire_response(body_bytes, &opts())
    }

    async fn embed(&self, model_name: &str, text: &str, api_key: Option<&str>, base_url: &str) -> Result<(Vec<f32>, i64), AdapterError> {
        let mut req = self
            .client
            .post(format!("{}/embeddings", base_url.trim_end_matches('/')))
            .json(&serde_json::json!({ "model": model_name, "input": text }));
        if let Some(key) = api_key {
            req = req.bearer_auth(key);
        }
        let resp = req.send().await.map_err(|e| AdapterError::BuildFailed(e.to_string()))?;
        let value: serde_json::Value = resp.json().await.map_err(|e| AdapterError::ParseFailed(e.to_string()))?;

        let vector: Vec<f32> = value["data"][0]["embedding"]
            .as_array()
            .ok_or_else(|| AdapterError::ParseFailed("missing embedding array".to_string()))?
            .iter()
            .map(|v| v.as_f64().unwrap_or(0.0) as f32)
            .collect();
        let tokens_in = value["usage"]["prompt_tokens"].as_i64().unwrap_or(0);

        Ok((truncate_embedding(vector), tokens_in))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::types::{Message, ToolChoice};

    fn adapter() -> OpenAiAdapter {
        OpenAiAdapter::new(reqwest::Client::new())
    }

    #[test]
    fn build_request_targets_chat_completions() {
        let req = Request {
            intent: "chat".into(),
            system: None,
            messages: vec![Message::user("hi")],
            tools: None,
            tool_choice: ToolChoice::Auto,
            max_tokens: 100,
            max_cost: None,
            chain_id: None,
        };
        let http_req = adapter()
            .build_request(&req, "gpt-4o", Some("sk-test"), "https://api.openai.com/v1")
            .unwrap();
        assert_eq!(http_req.url, "https://api.openai.com/v1/chat/completions");
        assert_eq!(http_req.headers.get("authorization").unwrap(), "Bearer sk-test");
    }

    #[test]
    fn parse_response_rejects_non_2xx() {
        let err = adapter().parse_response(500, b"{}").unwrap_err();
        assert!(matches!(err, AdapterError::ParseFailed(_)));
    }
}
