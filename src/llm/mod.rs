//! Vendor-agnostic LLM transport (spec §4.E).
//!
//! `VendorCodec` isolates the three incompatible wire formats behind
//! `encode_request` / `decode_reply` / `auth_headers`, matching spec §9's
//! "model as a tagged variant, no dynamic dispatch table needed" guidance.
//! [`transport::LlmTransport`] owns the actual HTTP round trip, retry, and
//! backoff; the codecs themselves do no I/O and are unit-testable in
//! isolation.

pub mod anthropic;
pub mod buffer;
pub mod openai;
pub mod transport;

use async_trait::async_trait;
use crate::history::Turn;
use serde::{Deserialize, Serialize};

pub use transport::LlmTransport;

/// Object-safe completion surface the agent loop depends on, so it can be
/// driven by a stub in tests without a network (spec §8 scenarios 1-3).
#[async_trait]
pub trait Completer: Send + Sync {
    async fn complete(
        &self,
        system_prompt: &str,
        history: &mut Vec<Turn>,
        tools: &[ToolDef],
    ) -> Reply;
}

#[async_trait]
impl Completer for LlmTransport {
    async fn complete(
        &self,
        system_prompt: &str,
        history: &mut Vec<Turn>,
        tools: &[ToolDef],
    ) -> Reply {
        self.send(system_prompt, history, tools).await
    }
}

/// A tool call requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: serde_json::Value,
}

/// A tool definition sent to the model as part of the tool manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDef {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// The result of one LLM round trip (spec §4.E).
#[derive(Debug, Clone)]
pub enum Reply {
    AssistantText(String),
    ToolCall(ToolCall),
    Error(LlmError),
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum LlmError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("authentication failed")]
    Auth,

    #[error("rate limited by vendor")]
    RateLimitedByVendor,

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("response truncated")]
    Truncated,
}

/// A request payload ready to hand to a vendor-specific codec: the static
/// system prompt, the rolling history, and the tool manifest.
pub struct RequestContext<'a> {
    pub system_prompt: &'a str,
    pub history: &'a [Turn],
    pub tools: &'a [ToolDef],
}

/// Isolates one vendor's wire format. No I/O — everything here is a pure
/// transform so it can be unit-tested without a network.
pub trait VendorCodec {
    fn encode_request(&self, ctx: &RequestContext<'_>, model: &str) -> serde_json::Value;
    fn decode_reply(&self, body: &[u8]) -> Result<Reply, LlmError>;
    fn auth_headers(&self, api_key: &str) -> Vec<(&'static str, String)>;
    fn endpoint(&self) -> &'static str;
}
