//! Shared OpenAI-style wire transform: both the cloud OpenAI
//! adapter and the local-chat adapter speak the same envelope and differ
//! only in two booleans. Implement the transform once here; each adapter
//! calls into it rather than re-deriving the shape.

use serde_json::{json, Value};

use crate::error::AdapterError;
use crate::llm::adapter::ParsedResponse;
use crate::llm::types::{Message, Request, Role, ToolCall, ToolChoice, ToolDef};

pub struct OpenAiStyleOptions {
    /// `true`: tool call `arguments` is a JSON-encoded string (cloud OpenAI).
    /// `false`: `arguments` is a JSON object (local runtimes).
    pub args_as_json_string: bool,
    /// `true`: tool results carry `tool_call_id` (cloud OpenAI).
    /// `false`: the local runtime has no notion of correlation ids.
    pub include_tool_call_id: bool,
}

fn tool_choice_json(choice: ToolChoice) -> &'static str {
    match choice {
        ToolChoice::Auto => "auto",
        ToolChoice::None => "none",
        ToolChoice::Required => "required",
    }
}

fn tool_def_json(tool: &ToolDef) -> Value {
    json!({
        "type": "function",
        "function": {
            "name": tool.name,
            "description": tool.description,
            "parameters": tool.parameters,
        }
    })
}

fn message_json(msg: &Message, opts: &OpenAiStyleOptions) -> Value {
    match msg.role {
        Role::User => json!({ "role": "user", "content": msg.content }),
        Role::Assistant => {
            let mut obj = json!({ "role": "assistant", "content": msg.content });
            if let Some(tool_calls) = &msg.tool_calls {
                let calls: Vec<Value> = tool_calls
                    .iter()
                    .map(|tc| {
                        let arguments = if opts.args_as_json_string {
                            json!(serde_json::to_string(&tc.arguments).unwrap_or_default())
                        } else {
                            tc.arguments.clone()
                        };
                        json!({
                            "id": tc.id,
                            "type": "function",
                            "function": { "name": tc.name, "arguments": arguments },
                        })
                    })
                    .collect();
                obj["tool_calls"] = json!(calls);
            }
            obj
        }
        Role::ToolResult => {
            let mut obj = json!({ "role": "tool", "content": msg.content });
            if opts.include_tool_call_id {
                obj["tool_call_id"] = json!(msg.tool_call_id.clone().unwrap_or_default());
            }
            obj
        }
    }
}

/// Builds the `{messages, tools, tool_choice, max_tokens}` wire body
/// shared by both OpenAI-style adapters. System is prepended as the
/// first message.
pub fn build_wire_body(request: &Request, model_name: &str, opts: &OpenAiStyleOptions) -> Value {
    let mut messages = Vec::with_capacity(request.messages.len() + 1);
    if let Some(system) = &request.system {
        messages.push(json!({ "role": "system", "content": system }));
    }
    messages.extend(request.messages.iter().map(|m| message_json(m, opts)));

    let mut body = json!({
        "model": model_name,
        "messages": messages,
        "max_tokens": request.max_tokens,
    });

    if let Some(tools) = &request.tools {
        if !tools.is_empty() {
            body["tools"] = json!(tools.iter().map(tool_def_json).collect::<Vec<_>>());
            body["tool_choice"] = json!(tool_choice_json(request.tool_choice));
        }
    }

    body
}

/// Parses an OpenAI-style `choices[0]` completion body.
pub fn parse_wire_response(body_bytes: &[u8], opts: &OpenAiStyleOptions) -> Result<ParsedResponse, AdapterError> {
    let value: Value = serde_json::from_slice(body_bytes).map_err(|e| AdapterError::ParseFailed(e.to_string()))?;

    let choice = value["choices"][0].clone();
    if choice.is_null() {
        return Err(AdapterError::ParseFailed("no choices in response".to_string()));
    }

    let message = &choice["message"];
    let content = message["content"].as_str().unwrap_or("").to_string();
    let finish_reason = choice["finish_reason"].as_str().unwrap_or("stop").to_string();

    let tool_calls = parse_tool_calls(&message["tool_calls"], opts)?;

    let done = if opts.args_as_json_string {
        finish_reason != "tool_calls"
    } else {
        tool_calls.is_empty()
    };

    let usage = &value["usage"];
    let tokens_in = usage["prompt_tokens"].as_i64().unwrap_or(0);
    let tokens_out = usage["completion_tokens"].as_i64().unwrap_or(0);

    Ok(ParsedResponse {
        content,
        tool_calls,
        done,
        tokens_in,
        tokens_out,
    })
}

fn parse_tool_calls(value: &Value, opts: &OpenAiStyleOptions) -> Result<Vec<ToolCall>, AdapterError> {
    let Some(array) = value.as_array() else {
        return Ok(Vec::new());
    };

    let mut out = Vec::with_capacity(array.len());
    for (i, entry) in array.iter().enumerate() {
        let id = entry["id"]
            .as_str()
            .map(str::to_string)
            .unwrap_or_else(|| format!("call_{i}"));
        let name = entry["function"]["name"]
            .as_str()
            .ok_or_else(|| AdapterError::ParseFailed("tool call missing function.name".to_string()))?
            .to_string();
        let raw_args = &entry["function"]["arguments"];

        let arguments = if opts.args_as_json_string {
            let s = raw_args.as_str().unwrap_or("{}");
            serde_json::from_str(s).map_err(|e| AdapterError::ParseFailed(format!("bad tool arguments json: {e}")))?
        } else {
            decode_possibly_double_encoded(raw_args)?
        };

        out.push(ToolCall { id, name, arguments });
    }
    Ok(out)
}

/// Local runtimes sometimes return `arguments` as a JSON object, but
/// occasionally double-encode it as a string containing JSON.
/// Detect the leading `"` and decode twice in that case.
fn decode_possibly_double_encoded(value: &Value) -> Result<Value, AdapterError> {
    if let Some(s) = value.as_str() {
        return serde_json::from_str(s).map_err(|e| AdapterError::ParseFailed(format!("bad double-encoded arguments: {e}")));
    }
    Ok(value.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opts_cloud() -> OpenAiStyleOptions {
        OpenAiStyleOptions {
            args_as_json_string: true,
            include_tool_call_id: true,
        }
    }

    fn opts_local() -> OpenAiStyleOptions {
        OpenAiStyleOptions {
            args_as_json_string: false,
            include_tool_call_id: false,
        }
    }

    #[test]
    fn system_prepended_as_first_message() {
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
        let body = build_wire_body(&req, "gpt-4", &opts_cloud());
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["role"], "user");
    }

    #[test]
    fn cloud_done_is_based_on_finish_reason() {
        let body = serde_json::to_vec(&json!({
            "choices": [{ "message": { "content": "hi", "tool_calls": null }, "finish_reason": "stop" }],
            "usage": { "prompt_tokens": 10, "completion_tokens": 5 }
        }))
        .unwrap();
        let parsed = parse_wire_response(&body, &opts_cloud()).unwrap();
        assert!(parsed.done);
        assert_eq!(parsed.tokens_in, 10);
    }

    #[test]
    fn local_double_encoded_arguments_are_decoded() {
        let body = serde_json::to_vec(&json!({
            "choices": [{
                "message": {
                    "content": "",
                    "tool_calls": [{
                        "id": "tc_1",
                        "function": { "name": "search", "arguments": "{\"q\":\"hi\"}" }
                    }]
                },
                "finish_reason": "tool_calls"
            }],
            "usage": { "prompt_tokens": 1, "completion_tokens": 2 }
        }))
        .unwrap();
        let parsed = parse_wire_response(&body, &opts_local()).unwrap();
        assert_eq!(parsed.tool_calls[0].arguments, json!({ "q": "hi" }));
        assert!(!parsed.done);
    }

    #[test]
    fn local_object_arguments_pass_through() {
        let body = serde_json::to_vec(&json!({
            "choices": [{
                "message": {
                    "content": "",
                    "tool_calls": [{
                        "id": "tc_1",
                        "function": { "name": "search", "arguments": { "q": "hi" } }
                    }]
                },
                "finish_reason": "tool_calls"
            }],
            "usage": { "prompt_tokens": 1, "completion_tokens": 2 }
        }))
        .unwrap();
        let parsed = parse_wire_response(&body, &opts_local()).unwrap();
        assert_eq!(parsed.tool_calls[0].arguments, json!({ "q": "hi" }));
    }

    #[test]
    fn local_done_when_no_tool_calls() {
        let body = serde_json::to_vec(&json!({
            "choices": [{ "message": { "content": "hi" }, "finish_reason": "stop" }],
            "usage": { "prompt_tokens": 1, "completion_tokens": 2 }
        }))
        .unwrap();
        let parsed = parse_wire_response(&body, &opts_local()).unwrap();
        assert!(parsed.done);
    }
}
