//! `llm_calls` — one row per proxy request/response, for audit
//! and for the budget/chain trackers to reconcile against.

use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::database::schema::llm_calls;
use crate::database::utils::now_rfc3339;

#[derive(Debug, Clone, Queryable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = llm_calls)]
pub struct LlmCallRow {
    pub id: String,
    pub chain_id: Option<String>,
    pub intent: String,
    pub provider: Option<String>,
    pub model: Option<String>,
    pub system_prompt: Option<String>,
    pub messages_json: String,
    pub tools_json: Option<String>,
    pub response_content: Option<String>,
    pub tool_calls_json: Option<String>,
    pub tokens_in: i64,
    pub tokens_out: i64,
    pub cost: f64,
    pub duration_ms: i64,
    pub error: Option<String>,
    pub created_at: String,
}

impl LlmCallRow {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = llm_calls)]
pub struct NewLlmCallRow {
    pub id: String,
    pub chain_id: Option<String>,
    pub intent: String,
    pub provider: Option<String>,
    pub model: Option<String>,
    pub system_prompt: Option<String>,
    pub messages_json: String,
    pub tools_json: Option<String>,
    pub response_content: Option<String>,
    pub tool_calls_json: Option<String>,
    pub tokens_in: i64,
    pub tokens_out: i64,
    pub cost: f64,
    pub duration_ms: i64,
    pub error: Option<String>,
    pub created_at: String,
}

impl NewLlmCallRow {
    /// Builds a failed-call record; the proxy fills in provider/model when
    /// routing succeeded but the adapter call itself failed.
    pub fn failed(
        chain_id: Option<String>,
        intent: impl Into<String>,
        messages_json: impl Into<String>,
        error: impl Into<String>,
        duration_ms: i64,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            chain_id,
            intent: intent.into(),
            provider: None,
            model: None,
            system_prompt: None,
            messages_json: messages_json.into(),
            tools_json: None,
            response_content: None,
            tool_calls_json: None,
            tokens_in: 0,
            tokens_out: 0,
            cost: 0.0,
            duration_ms,
            error: Some(error.into()),
            created_at: now_rfc3339(),
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn succeeded(
        chain_id: Option<String>,
        intent: impl Into<String>,
        provider: impl Into<String>,
        model: impl Into<String>,
        system_prompt: Option<String>,
        messages_json: impl Into<String>,
        tools_json: Option<String>,
        response_content: Option<String>,
        tool_calls_json: Option<String>,
        tokens_in: i64,
        tokens_out: i64,
        cost: f64,
        duration_ms: i64,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            chain_id,
            intent: intent.into(),
            provider: Some(provider.into()),
            model: Some(model.into()),
            system_prompt,
            messages_json: messages_json.into(),
            tools_json,
            response_content,
            tool_calls_json,
            tokens_in,
            tokens_out,
            cost,
            duration_ms,
            error: None,
            created_at: now_rfc3339(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failed_call_has_no_cost() {
        let row = NewLlmCallRow::failed(None, "chat", "[]", "timeout", 5000);
        assert_eq!(row.cost, 0.0);
        assert!(row.error.is_some());
    }
}
