//! Inbound message type shared by every ingest source.

/// Where a [`Message`] originated. The agent loop treats all three
/// identically once enqueued; origin only affects logging and, for
/// `Schedule`, which text is carried (a job's action-text).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    Local,
    Chat,
    Schedule,
}

/// Maximum UTF-8 byte length of a message, per spec §3.
pub const MAX_MESSAGE_BYTES: usize = 1024;

/// A single inbound message bound for the agent's input queue.
#[derive(Debug, Clone)]
pub struct Message {
    pub text: String,
    pub origin: Origin,
}

impl Message {
    /// Construct a message, truncating to [`MAX_MESSAGE_BYTES`] on a char
    /// boundary if the input is longer.
    pub fn new(text: impl Into<String>, origin: Origin) -> Self {
        let mut text = text.into();
        if text.len() > MAX_MESSAGE_BYTES {
            let mut end = MAX_MESSAGE_BYTES;
            while end > 0 && !text.is_char_boundary(end) {
                end -= 1;
            }
            text.truncate(end);
        }
        Self { text, origin }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncates_oversized_text() {
        let huge = "x".repeat(2000);
        let msg = Message::new(huge, Origin::Local);
        assert!(msg.text.len() <= MAX_MESSAGE_BYTES);
    }

    #[test]
    fn keeps_short_text_untouched() {
        let msg = Message::new("hello", Origin::Chat);
        assert_eq!(msg.text, "hello");
        assert_eq!(msg.origin, Origin::Chat);
    }
}
