//! OpenAI / OpenRouter `POST /v1/chat/completions` wire format (spec §4.E, §6).
//!
//! Both vendors share this exact message/tool-call shape; they differ only
//! in base URL, so one codec serves both, parameterised by `Variant`.

use super::{LlmError, Reply, RequestContext, ToolCall, VendorCodec};
use crate::history::{Role, Turn};
use serde_json::{json, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variant {
    OpenAi,
    OpenRouter,
}

pub struct OpenAiCodec {
    pub variant: Variant,
}

impl VendorCodec for OpenAiCodec {
    fn encode_request(&self, ctx: &RequestContext<'_>, model: &str) -> Value {
        let mut messages = vec![json!({ "role": "system", "content": ctx.system_prompt })];
        messages.extend(ctx.history.iter().map(encode_turn));

        let tools: Vec<Value> = ctx
            .tools
            .iter()
            .map(|t| {
                json!({
                    "type": "function",
                    "function": {
                        "name": t.name,
                        "description": t.description,
                        "parameters": t.parameters,
                    }
                })
            })
            .collect();

        let mut body = json!({
            "model": model,
            "messages": messages,
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
            let code = err.get("code").and_then(|c| c.as_str()).unwrap_or("");
            return match code {
                "invalid_api_key" => Ok(Reply::Error(LlmError::Auth)),
                "rate_limit_exceeded" => Ok(Reply::Error(LlmError::RateLimitedByVendor)),
                _ => Ok(Reply::Error(LlmError::InvalidResponse(message))),
            };
        }

        let message = value
            .get("choices")
            .and_then(|c| c.as_array())
            .and_then(|c| c.first())
            .and_then(|c| c.get("message"))
            .ok_or_else(|| LlmError::InvalidResponse("missing choices[0].message".to_string()))?;

        if let Some(calls) = message.get("tool_calls").and_then(|v| v.as_array()) {
            if let Some(call) = calls.first() {
                let id = call.get("id").and_then(|v| v.as_str()).unwrap_or_default();
                let function = call
                    .get("function")
                    .ok_or_else(|| LlmError::InvalidResponse("missing function".to_string()))?;
                let name = function.get("name").and_then(|v| v.as_str()).unwrap_or_default();
                let raw_args = function.get("arguments").and_then(|v| v.as_str()).unwrap_or("{}");
                let arguments: Value = serde_json::from_str(raw_args).unwrap_or(Value::Null);
                return Ok(Reply::ToolCall(ToolCall {
                    id: id.to_string(),
                    name: name.to_string(),
                    arguments,
                }));
            }
        }

        let text = message
            .get("content")
            .and_then(|c| c.as_str())
            .unwrap_or("")
            .to_string();
        Ok(Reply::AssistantText(text))
    }

    fn auth_headers(&self, api_key: &str) -> Vec<(&'static str, String)> {
        vec![("Authorization", format!("Bearer {api_key}"))]
    }

    fn endpoint(&self) -> &'static str {
        match self.variant {
            Variant::OpenAi => "https://api.openai.com/v1/chat/completions",
            Variant::OpenRouter => "https://openrouter.ai/api/v1/chat/completions",
        }
    }
}

fn encode_turn(turn: &Turn) -> Value {
    match turn.role {
        Role::User => json!({ "role": "user", "content": turn.content }),
        Role::Assistant => {
            let mut msg = json!({ "role": "assistant", "content": turn.content });
            if let Some(calls) = &turn.tool_calls {
                let tool_calls: Vec<Value> = calls
                    .iter()
                    .map(|c| {
                        json!({
                            "id": c.id,
                            "type": "function",
                            "function": {
                                "name": c.name,
                                "arguments": serde_json::to_string(&c.arguments).unwrap_or_default(),
                            }
                        })
                    })
                    .collect();
                msg["tool_calls"] = json!(tool_calls);
            }
            msg
        }
        Role::Tool => json!({
            "role": "tool",
            "tool_call_id": turn.tool_call_id.clone().unwrap_or_default(),
            "content": turn.content,
        }),
    }
}
