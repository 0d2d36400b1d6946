//! Provider Adapter interface.

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;

use crate::error::AdapterError;
use crate::llm::types::{Request, ToolCall};

pub struct HttpRequest {
    pub url: String,
    pub headers: HashMap<String, String>,
    pub body_bytes: Bytes,
}

#[derive(Debug, Clone)]
pub struct ParsedResponse {
    pub content: String,
    pub tool_calls: Vec<ToolCall>,
    pub done: bool,
    pub tokens_in: i64,
    pub tokens_out: i64,
}

/// One per provider: translates the neutral request/response to and from
/// that provider's wire format, and owns its own embedding I/O.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    fn name(&self) -> &str;

    fn supports_embed(&self) -> bool;

    fn build_request(&self, request: &Request, model_name: &str, api_key: Option<&str>, base_url: &str) -> Result<HttpRequest, AdapterError>;

    fn parse_response(&self, status_code: u16, body_bytes: &[u8]) -> Result<ParsedResponse, AdapterError>;

    /// Embeds `text` with `model_name`, returning `(vector, tokens_in)`.
    /// The vector is truncated to 1024 dimensions by prefix truncation to
    /// accommodate Matryoshka-style embeddings.
    async fn embed(&self, model_name: &str, text: &str, api_key: Option<&str>, base_url: &str) -> Result<(Vec<f32>, i64), AdapterError>;
}

/// Matryoshka-style truncation shared by every adapter's `embed`.
pub const EMBED_DIM_CAP: usize = 1024;

pub fn truncate_embedding(mut vector: Vec<f32>) -> Vec<f32> {
    vector.truncate(EMBED_DIM_CAP);
    vector
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncation_caps_at_1024() {
        let long = vec![0.1f32; 2048];
        assert_eq!(truncate_embedding(long).len(), EMBED_DIM_CAP);
    }

    #[test]
    fn truncation_is_noop_under_cap() {
        let short = vec![0.1f32; 16];
        assert_eq!(truncate_embedding(short).len(), 16);
    }
}
