//! Rolling conversation history: an ordered, bounded buffer of turns.
//!
//! Lives entirely in process memory; cleared on reboot (spec §3). Oldest
//! entries are evicted first once the cap is reached.

use crate::llm::ToolCall;
use std::collections::VecDeque;

/// Maximum number of turns retained, per spec §3.
pub const MAX_TURNS: usize = 12;

/// Maximum byte length of a single turn's content, per spec §3.
pub const MAX_TURN_BYTES: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
    Tool,
}

#[derive(Debug, Clone)]
pub struct Turn {
    pub role: Role,
    pub content: String,
    /// Present on Assistant turns that requested tool calls, and on Tool
    /// turns identifying which call they answer (via `tool_call_id` below).
    pub tool_calls: Option<Vec<ToolCall>>,
    pub tool_call_id: Option<String>,
}

impl Turn {
    pub fn user(content: impl Into<String>) -> Self {
        Self::plain(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::plain(Role::Assistant, content)
    }

    pub fn assistant_tool_calls(content: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        let mut turn = Self::plain(Role::Assistant, content);
        turn.tool_calls = Some(tool_calls);
        turn
    }

    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        let mut turn = Self::plain(Role::Tool, content);
        turn.tool_call_id = Some(tool_call_id.into());
        turn
    }

    fn plain(role: Role, content: impl Into<String>) -> Self {
        let mut content = content.into();
        if content.len() > MAX_TURN_BYTES {
            let mut end = MAX_TURN_BYTES;
            while end > 0 && !content.is_char_boundary(end) {
                end -= 1;
            }
            content.truncate(end);
        }
        Self {
            role,
            content,
            tool_calls: None,
            tool_call_id: None,
        }
    }
}

/// Bounded, oldest-first-eviction conversation buffer.
#[derive(Debug, Clone, Default)]
pub struct ConversationHistory {
    turns: VecDeque<Turn>,
}

impl ConversationHistory {
    pub fn new() -> Self {
        Self {
            turns: VecDeque::with_capacity(MAX_TURNS),
        }
    }

    /// Append a turn, evicting the oldest if the buffer is at capacity.
    pub fn push(&mut self, turn: Turn) {
        if self.turns.len() == MAX_TURNS {
            self.turns.pop_front();
        }
        self.turns.push_back(turn);
    }

    /// Remove and return the oldest turn, if any. Used by the LLM transport
    /// when shrinking a request to fit the bounded buffer (spec §4.E/§9).
    pub fn pop_oldest(&mut self) -> Option<Turn> {
        self.turns.pop_front()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Turn> {
        self.turns.iter()
    }

    pub fn clear(&mut self) {
        self.turns.clear();
    }

    pub fn to_vec(&self) -> Vec<Turn> {
        self.turns.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evicts_oldest_first_when_full() {
        let mut history = ConversationHistory::new();
        for i in 0..(MAX_TURNS + 3) {
            history.push(Turn::user(format!("turn {i}")));
        }
        assert_eq!(history.len(), MAX_TURNS);
        assert_eq!(history.iter().next().unwrap().content, "turn 3");
        assert_eq!(history.iter().last().unwrap().content, format!("turn {}", MAX_TURNS + 2));
    }

    #[test]
    fn preserves_insertion_order() {
        let mut history = ConversationHistory::new();
        for i in 0..5 {
            history.push(Turn::user(format!("{i}")));
        }
        let contents: Vec<_> = history.iter().map(|t| t.content.as_str()).collect();
        assert_eq!(contents, vec!["0", "1", "2", "3", "4"]);
    }

    #[test]
    fn truncates_oversized_turn_content() {
        let turn = Turn::user("a".repeat(2000));
        assert!(turn.content.len() <= MAX_TURN_BYTES);
    }
}
