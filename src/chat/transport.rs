//! HTTP transport to the chat API (spec §6: Telegram-shaped `getUpdates` /
//! `sendMessage`).

use super::{ChatError, MAX_POLL_RESPONSE_BYTES};
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Update {
    pub update_id: i64,
    pub chat_id: Option<i64>,
    pub text: Option<String>,
}

#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn get_updates(
        &self,
        offset: i64,
        limit: u32,
        timeout_secs: u64,
    ) -> Result<Vec<Update>, ChatError>;

    async fn send_message(&self, chat_id: i64, text: &str) -> Result<(), ChatError>;
}

pub struct HttpChatTransport {
    client: reqwest::Client,
    token: String,
}

impl HttpChatTransport {
    pub fn new(token: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            token,
        }
    }

    fn base_url(&self) -> String {
        format!("https://api.telegram.org/bot{}", self.token)
    }
}

#[async_trait]
impl ChatTransport for HttpChatTransport {
    async fn get_updates(
        &self,
        offset: i64,
        limit: u32,
        timeout_secs: u64,
    ) -> Result<Vec<Update>, ChatError> {
        let transport_timeout =
            Duration::from_secs(timeout_secs + super::POLL_TRANSPORT_MARGIN_SECS);

        let response = self
            .client
            .post(format!("{}/getUpdates", self.base_url()))
            .json(&serde_json::json!({
                "offset": offset,
                "limit": limit,
                "timeout": timeout_secs,
            }))
            .timeout(transport_timeout)
            .send()
            .await
            .map_err(|e| ChatError::Transport(e.to_string()))?;

        let bytes = response
            .bytes()
            .await
            .map_err(|e| ChatError::Transport(e.to_string()))?;

        if bytes.len() > MAX_POLL_RESPONSE_BYTES {
            let partial = &bytes[..MAX_POLL_RESPONSE_BYTES];
            return match recover_highest_update_id(partial) {
                Some(id) => Err(ChatError::TruncatedRecovered(id)),
                None => Err(ChatError::Truncated),
            };
        }

        parse_updates(&bytes)
    }

    async fn send_message(&self, chat_id: i64, text: &str) -> Result<(), ChatError> {
        let response = self
            .client
            .post(format!("{}/sendMessage", self.base_url()))
            .json(&serde_json::json!({ "chat_id": chat_id, "text": text }))
            .send()
            .await
            .map_err(|e| ChatError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ChatError::Transport(format!("http {}", response.status())));
        }
        Ok(())
    }
}

fn parse_updates(bytes: &[u8]) -> Result<Vec<Update>, ChatError> {
    let value: Value =
        serde_json::from_slice(bytes).map_err(|e| ChatError::Transport(e.to_string()))?;
    let results = value
        .get("result")
        .and_then(|r| r.as_array())
        .ok_or_else(|| ChatError::Transport("missing result array".to_string()))?;

    let mut updates = Vec::with_capacity(results.len());
    for entry in results {
        let update_id = match parse_int64(entry.get("update_id")) {
            Some(id) => id,
            None => continue,
        };
        let message = entry.get("message");
        let chat_id = message
            .and_then(|m| m.get("chat"))
            .and_then(|c| parse_int64(c.get("id")));
        let text = message
            .and_then(|m| m.get("text"))
            .and_then(|t| t.as_str())
            .map(|s| s.to_string());
        updates.push(Update {
            update_id,
            chat_id,
            text,
        });
    }
    Ok(updates)
}

/// Read an id field as an exact `i64`, avoiding the double-precision path
/// (spec §9): `serde_json` already parses integer literals exactly, so a
/// failed `as_i64()` here means the literal had a fractional component or
/// exceeded 64 bits, which we treat as unrecoverable rather than guess.
fn parse_int64(value: Option<&Value>) -> Option<i64> {
    match value?.as_i64() {
        Some(id) => Some(id),
        None => {
            log::warn!("chat id field exceeds exact i64 precision, dropping");
            None
        }
    }
}

/// Scan a truncated response body for the highest `"update_id":N` literal
/// present, without attempting a full JSON parse (spec §4.H).
fn recover_highest_update_id(partial: &[u8]) -> Option<i64> {
    let text = String::from_utf8_lossy(partial);
    let marker = "\"update_id\":";
    let mut highest: Option<i64> = None;
    let mut search_from = 0;
    while let Some(rel) = text[search_from..].find(marker) {
        let start = search_from + rel + marker.len();
        let digits: String = text[start..]
            .chars()
            .skip_while(|c| c.is_whitespace())
            .take_while(|c| c.is_ascii_digit())
            .collect();
        if let Ok(id) = digits.parse::<i64>() {
            highest = Some(highest.map_or(id, |h: i64| h.max(id)));
        }
        search_from = start;
        if search_from >= text.len() {
            break;
        }
    }
    highest
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recovers_highest_id_from_partial_buffer() {
        let body = br#"{"ok":true,"result":[{"update_id":200,"message":{}},{"update_id":230,"message":{"#;
        assert_eq!(recover_highest_update_id(body), Some(230));
    }

    #[test]
    fn returns_none_when_no_id_present() {
        assert_eq!(recover_highest_update_id(b"garbage with no ids"), None);
    }

    #[test]
    fn parses_full_update_batch() {
        let body = br#"{"ok":true,"result":[{"update_id":1,"message":{"chat":{"id":42},"text":"hi"}}]}"#;
        let updates = parse_updates(body).unwrap();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].update_id, 1);
        assert_eq!(updates[0].chat_id, Some(42));
        assert_eq!(updates[0].text.as_deref(), Some("hi"));
    }
}
