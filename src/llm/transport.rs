//! HTTP transport, vendor dispatch, and retry/backoff policy (spec §4.E).
//!
//! Transient transport errors and vendor 5xx responses are retried up to
//! three times with exponential backoff (base 1s, factor 2) plus ±25%
//! jitter. Auth failures and non-429 4xx responses are fatal for the turn.

use super::{
    anthropic::AnthropicCodec, buffer, openai::OpenAiCodec, openai::Variant as OpenAiVariant,
    LlmError, Reply, RequestContext, VendorCodec,
};
use crate::config::VendorProfile;
use crate::history::Turn;
use rand::Rng;
use std::time::Duration;

const MAX_RETRIES: u32 = 3;
const BACKOFF_BASE_SECS: u64 = 1;
const BACKOFF_FACTOR: u64 = 2;

pub struct LlmTransport {
    client: reqwest::Client,
    vendor: VendorProfile,
    api_key: String,
    model: String,
}

impl LlmTransport {
    pub fn new(vendor: VendorProfile, api_key: String, model: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            vendor,
            api_key,
            model,
        }
    }

    fn codec(&self) -> Box<dyn VendorCodec + Send + Sync> {
        match self.vendor {
            VendorProfile::Anthropic => Box::new(AnthropicCodec),
            VendorProfile::OpenAi => Box::new(OpenAiCodec { variant: OpenAiVariant::OpenAi }),
            VendorProfile::OpenRouter => Box::new(OpenAiCodec { variant: OpenAiVariant::OpenRouter }),
        }
    }

    /// Send `history` (shrinking it in place to fit the bounded request
    /// buffer) to the configured vendor, retrying transient failures.
    pub async fn send(
        &self,
        system_prompt: &str,
        history: &mut Vec<Turn>,
        tools: &[super::ToolDef],
    ) -> Reply {
        let codec = self.codec();
        let model = self.model.clone();

        let body = buffer::fit_request(history, |turns| {
            let ctx = RequestContext {
                system_prompt,
                history: turns,
                tools,
            };
            codec.encode_request(&ctx, &model)
        });

        let mut attempt = 0;
        loop {
            match self.try_once(codec.as_ref(), &body).await {
                Ok(reply) => return reply,
                Err(Retryable::Fatal(err)) => return Reply::Error(err),
                Err(Retryable::Transient(err)) => {
                    attempt += 1;
                    if attempt > MAX_RETRIES {
                        return Reply::Error(err);
                    }
                    log::warn!("llm transport retry {attempt}/{MAX_RETRIES}: {err}");
                    tokio::time::sleep(backoff_delay(attempt)).await;
                }
            }
        }
    }

    async fn try_once(
        &self,
        codec: &dyn VendorCodec,
        body: &serde_json::Value,
    ) -> Result<Reply, Retryable> {
        let mut request = self.client.post(codec.endpoint()).json(body);
        for (name, value) in codec.auth_headers(&self.api_key) {
            request = request.header(name, value);
        }

        let response = request
            .send()
            .await
            .map_err(|e| Retryable::Transient(LlmError::Transport(e.to_string())))?;

        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| Retryable::Transient(LlmError::Transport(e.to_string())))?;

        if status.is_server_error() {
            return Err(Retryable::Transient(LlmError::Transport(format!(
                "http {status}"
            ))));
        }
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(Retryable::Transient(LlmError::RateLimitedByVendor));
        }
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN
        {
            return Ok(Reply::Error(LlmError::Auth));
        }

        codec
            .decode_reply(&bytes)
            .map_err(Retryable::Fatal)
    }
}

enum Retryable {
    Transient(LlmError),
    Fatal(LlmError),
}

fn backoff_delay(attempt: u32) -> Duration {
    let base_secs = BACKOFF_BASE_SECS * BACKOFF_FACTOR.pow(attempt - 1);
    let jitter_frac = rand::thread_rng().gen_range(-0.25..=0.25);
    let secs = (base_secs as f64) * (1.0 + jitter_frac);
    Duration::from_secs_f64(secs.max(0.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_and_stays_within_jitter_bounds() {
        let d1 = backoff_delay(1);
        let d3 = backoff_delay(3);
        assert!(d1.as_secs_f64() <= 1.25);
        assert!(d3.as_secs_f64() >= 3.0);
        assert!(d3.as_secs_f64() <= 5.0);
    }

    #[test]
    fn picks_codec_by_vendor() {
        let t = LlmTransport::new(VendorProfile::Anthropic, "k".into(), "m".into());
        assert_eq!(t.codec().endpoint(), "https://api.anthropic.com/v1/messages");
        let t = LlmTransport::new(VendorProfile::OpenRouter, "k".into(), "m".into());
        assert!(t.codec().endpoint().contains("openrouter.ai"));
    }
}
