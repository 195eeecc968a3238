//! Anthropic `POST /v1/messages` wire format (spec §4.E, §6).

use super::{LlmError, Reply, RequestContext, ToolCall, VendorCodec};
use crate::history::{Role, Turn};
use serde_json::{json, Value};

pub const ANTHROPIC_VERSION: &str = "2023-06-01";

pub struct AnthropicCodec;

impl VendorCodec for AnthropicCodec {
    fn encode_request(&self, ctx: &RequestContext<'_>, model: &str) -> Value {
        let messages: Vec<Value> = ctx.history.iter().map(encode_turn).collect();

        let tools: Vec<Value> = ctx
            .tools
            .iter()
            .map(|t| {
                json!({
                    "name": t.name,
                    "description": t.description,
                    "input_schema": t.parameters,
                })
            })
            .collect();

        let mut body = json!({
            "model": model,
            "system": ctx.system_prompt,
            "messages": messages,
            "max_tokens": 4096,
        });
        if !tools.is_empty() {
            body["tools"] = json!(tools);
        }
        body
    }

    fn decode_reply(&self, body: &[u8]) -> Result<Reply, LlmError> {
        if body.len() > super::buffer::MAX_RESPONSE_BYTES {
            return Err(LlmError::Truncated);
        }
        let value: Value = serde_json::from_slice(body)
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;

        if let Some(err) = value.get("error") {
            let message = err
                .get("message")
                .and_then(|m| m.as_str())
                .unwrap_or("unknown error")
                .to_string();
            let err_type = err.get("type").and_then(|t| t.as_str()).unwrap_or("");
            return match err_type {
                "authentication_error" | "permission_error" => Ok(Reply::Error(LlmError::Auth)),
                "rate_limit_error" => Ok(Reply::Error(LlmError::RateLimitedByVendor)),
                _ => Ok(Reply::Error(LlmError::InvalidResponse(message))),
            };
        }

        let content = value
            .get("content")
            .and_then(|c| c.as_array())
            .ok_or_else(|| LlmError::InvalidResponse("missing content array".to_string()))?;

        let mut text = String::new();
        for block in content {
            match block.get("type").and_then(|t| t.as_str()) {
                Some("text") => {
                    if let Some(t) = block.get("text").and_then(|t| t.as_str()) {
                        text.push_str(t);
                    }
                }
                Some("tool_use") => {
                    let id = block.get("id").and_then(|v| v.as_str()).unwrap_or_default();
                    let name = block.get("name").and_then(|v| v.as_str()).unwrap_or_default();
                    let input = block.get("input").cloned().unwrap_or(Value::Null);
                    return Ok(Reply::ToolCall(ToolCall {
                        id: id.to_string(),
                        name: name.to_string(),
                        arguments: input,
                    }));
                }
                _ => {}
            }
        }

        Ok(Reply::AssistantText(text))
    }

    fn auth_headers(&self, api_key: &str) -> Vec<(&'static str, String)> {
        vec![
            ("x-api-key", api_key.to_string()),
            ("anthropic-version", ANTHROPIC_VERSION.to_string()),
        ]
    }

    fn endpoint(&self) -> &'static str {
        "https://api.anthropic.com/v1/messages"
    }
}

fn encode_turn(turn: &Turn) -> Value {
    match turn.role {
        Role::User => json!({ "role": "user", "content": turn.content }),
        Role::Assistant => {
            let mut blocks = Vec::new();
            if !turn.content.is_empty() {
                blocks.push(json!({ "type": "text", "text": turn.content }));
            }
            if let Some(calls) = &turn.tool_calls {
                for call in calls {
                    blocks.push(json!({
                        "type": "tool_use",
                        "id": call.id,
                        "name": call.name,
                        "input": call.arguments,
                    }));
                }
            }
            json!({ "role": "assistant", "content": blocks })
        }
        Role::Tool => {
            let tool_use_id = turn.tool_call_id.clone().unwrap_or_default();
            json!({
                "role": "user",
                "content": [{
                    "type": "tool_result",
                    "tool_use_id": tool_use_id,
                    "content": turn.content,
                }]
            })
        }
    }
}
