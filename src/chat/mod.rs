//! Chat-API long-poll ingestion with replay suppression, and egress
//! (spec §4.H, §6, §9).
//!
//! Update and chat ids are parsed as `i64` straight from the `serde_json`
//! number (which itself parses integer literals exactly, unlike a
//! double-backed JSON reader) rather than via `as_f64()`, to avoid the
//! precision trap spec §9 calls out.

pub mod transport;

pub use transport::{ChatTransport, HttpChatTransport, Update};

use crate::queue::{InputSender, OutputReceiver};
use crate::store::{namespace, Store};
use std::sync::Arc;
use std::time::Duration;

/// Long-poll timeout requested from the chat API (spec §4.H).
pub const POLL_TIMEOUT_SECS: u64 = 30;
/// Transport timeout is the poll timeout plus this margin.
pub const POLL_TRANSPORT_MARGIN_SECS: u64 = 10;
/// Response buffer bound; overflow triggers truncation-safe recovery.
pub const MAX_POLL_RESPONSE_BYTES: usize = 4 * 1024;

const MAX_BACKOFF_SECS: u64 = 300;

#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("response truncated with no recoverable update id")]
    Truncated,

    /// Truncated, but the highest `update_id` was recoverable from the
    /// partial buffer (spec §4.H, §8 scenario 8).
    #[error("response truncated, recovered update id {0}")]
    TruncatedRecovered(i64),

    #[error("store error: {0}")]
    Store(#[from] crate::store::StoreError),
}

pub struct ChatPoller<T: ChatTransport> {
    transport: T,
    store: Arc<dyn Store>,
    authorised_chat_id: Option<i64>,
    consecutive_failures: u32,
}

impl<T: ChatTransport> ChatPoller<T> {
    pub fn new(transport: T, store: Arc<dyn Store>, authorised_chat_id: Option<i64>) -> Self {
        Self {
            transport,
            store,
            authorised_chat_id,
            consecutive_failures: 0,
        }
    }

    /// Startup flush sequence (spec §4.H): discover the highest pending
    /// update id, acknowledge it, and persist it so nothing queued before
    /// boot is ever delivered to the agent.
    pub async fn flush_on_startup(&mut self) -> Result<(), ChatError> {
        if self
            .store
            .get_string(namespace::CHAT_CONFIG, "last_update")
            .await?
            .is_some()
        {
            return Ok(());
        }

        let discovery = self.transport.get_updates(-1, 1, 0).await?;
        let highest = discovery.iter().map(|u| u.update_id).max().unwrap_or(0);
        if highest > 0 {
            let _ = self.transport.get_updates(highest + 1, 1, 0).await?;
        }
        self.persist_last_seen(highest).await
    }

    async fn last_seen(&self) -> Result<i64, ChatError> {
        Ok(self
            .store
            .get_string(namespace::CHAT_CONFIG, "last_update")
            .await?
            .and_then(|s| s.parse().ok())
            .unwrap_or(0))
    }

    async fn persist_last_seen(&self, id: i64) -> Result<(), ChatError> {
        self.store
            .put_string(namespace::CHAT_CONFIG, "last_update", &id.to_string())
            .await?;
        Ok(())
    }

    /// One steady-state long-poll round. Enqueues authorised updates onto
    /// `input`, persisting `last_seen` before any derived message reaches
    /// the queue (spec §8 invariant).
    pub async fn poll_once(&mut self, input: &InputSender) -> Result<(), ChatError> {
        let last_seen = self.last_seen().await?;
        let result = self
            .transport
            .get_updates(last_seen + 1, 1, POLL_TIMEOUT_SECS)
            .await;

        match result {
            Ok(updates) => {
                self.consecutive_failures = 0;
                for update in updates {
                    if update.update_id <= last_seen {
                        continue;
                    }
                    self.persist_last_seen(update.update_id).await?;
                    match (self.authorised_chat_id, update.chat_id, update.text) {
                        (Some(authorised), Some(chat_id), Some(text)) if chat_id == authorised => {
                            input.try_send_logged(
                                crate::message::Message::new(text, crate::message::Origin::Chat),
                                "chat",
                            );
                        }
                        (Some(_), Some(chat_id), _) => {
                            log::warn!("discarding update from unauthorised chat {chat_id}");
                        }
                        (None, _, _) => {
                            log::warn!("discarding update: no chat authorised yet");
                        }
                        _ => {}
                    }
                }
                Ok(())
            }
            Err(ChatError::TruncatedRecovered(id)) => {
                // Advance past the unparseable batch without replaying or
                // emitting any agent inputs for it (spec §4.H).
                self.consecutive_failures = 0;
                self.persist_last_seen(id).await?;
                Ok(())
            }
            Err(ChatError::Truncated) => {
                self.consecutive_failures += 1;
                Err(ChatError::Truncated)
            }
            Err(e) => {
                self.consecutive_failures += 1;
                Err(e)
            }
        }
    }

    /// `min(5s * 2^(n-1), 5min)` backoff after consecutive failures.
    pub fn backoff_delay(&self) -> Duration {
        if self.consecutive_failures == 0 {
            return Duration::ZERO;
        }
        let secs = 5u64.saturating_mul(1u64 << (self.consecutive_failures - 1).min(10));
        Duration::from_secs(secs.min(MAX_BACKOFF_SECS))
    }
}

/// Consumes the output queue and posts each reply to the chat API. Failures
/// are logged, never retried (spec §4.H: a missed reply beats a duplicate).
pub async fn run_egress<T: ChatTransport>(
    transport: &T,
    chat_id: i64,
    output: &mut OutputReceiver,
) {
    while let Some(text) = output.recv().await {
        if let Err(e) = transport.send_message(chat_id, &text).await {
            log::warn!("chat egress failed: {e}");
        }
    }
}
