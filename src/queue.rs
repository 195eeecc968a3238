//! Bounded FIFO queues shared between tasks (spec §5).
//!
//! The input queue feeds the agent from channel ingest, the chat poller,
//! and the scheduler; the output queue feeds channel egress and chat
//! egress. Both are drop-newest-with-log on overflow — producers never
//! block the agent.

use crate::message::Message;
use tokio::sync::mpsc;

/// Depth chosen generously relative to the agent's serial, one-at-a-time
/// processing discipline (spec §5): a burst of inputs queues rather than
/// drops in the common case, while still bounding memory.
pub const QUEUE_CAPACITY: usize = 32;

#[derive(Clone)]
pub struct InputSender(mpsc::Sender<Message>);
pub struct InputReceiver(mpsc::Receiver<Message>);

#[derive(Clone)]
pub struct OutputSender(mpsc::Sender<String>);
pub struct OutputReceiver(mpsc::Receiver<String>);

pub fn input_queue() -> (InputSender, InputReceiver) {
    let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);
    (InputSender(tx), InputReceiver(rx))
}

pub fn output_queue() -> (OutputSender, OutputReceiver) {
    let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);
    (OutputSender(tx), OutputReceiver(rx))
}

impl InputSender {
    /// Non-blocking enqueue; drops and logs on a full queue rather than
    /// backing up the producer (scheduler, poller, channel ingest).
    pub fn try_send_logged(&self, message: Message, source: &str) {
        if self.0.try_send(message).is_err() {
            log::warn!("input queue full, dropping message from {source}");
        }
    }

    /// Blocking send bounded by a timeout, per spec §4.G's channel-ingest
    /// discipline (100 ms).
    pub async fn send_with_timeout(
        &self,
        message: Message,
        timeout: std::time::Duration,
    ) -> bool {
        match tokio::time::timeout(timeout, self.0.send(message)).await {
            Ok(Ok(())) => true,
            _ => {
                log::warn!("input queue send timed out, dropping message");
                false
            }
        }
    }
}

impl InputReceiver {
    pub async fn recv(&mut self) -> Option<Message> {
        self.0.recv().await
    }

    /// Non-blocking receive, useful for asserting "nothing was enqueued".
    pub fn try_recv(&mut self) -> Option<Message> {
        self.0.try_recv().ok()
    }
}

impl OutputSender {
    pub fn try_send_logged(&self, text: String) {
        if self.0.try_send(text).is_err() {
            log::warn!("output queue full, dropping reply");
        }
    }
}

impl OutputReceiver {
    pub async fn recv(&mut self) -> Option<String> {
        self.0.recv().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Origin;

    #[tokio::test]
    async fn delivers_in_fifo_order() {
        let (tx, mut rx) = input_queue();
        tx.try_send_logged(Message::new("one", Origin::Local), "test");
        tx.try_send_logged(Message::new("two", Origin::Local), "test");
        assert_eq!(rx.recv().await.unwrap().text, "one");
        assert_eq!(rx.recv().await.unwrap().text, "two");
    }

    #[tokio::test]
    async fn drops_when_full_without_panicking() {
        let (tx, mut _rx) = input_queue();
        for i in 0..(QUEUE_CAPACITY + 5) {
            tx.try_send_logged(Message::new(format!("msg {i}"), Origin::Local), "test");
        }
        // Queue still usable; no panic on overflow.
    }
}
