//! Crate-wide error taxonomy.
//!
//! Each subsystem has its own `thiserror` enum at its boundary (mirroring the
//! teacher's `ProviderError`); `CoreError` unifies them for the agent loop
//! and supervisor, which are the only callers that need to render a single
//! user-visible failure line per spec §7.

use crate::chat::ChatError;
use crate::llm::LlmError;
use crate::scheduler::SchedulerError;
use crate::store::StoreError;
use crate::tools::ToolError;

/// Top-level error for anything the agent loop or supervisor can surface.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("validation error: {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error(transparent)]
    Tool(#[from] ToolError),

    #[error(transparent)]
    Scheduler(#[from] SchedulerError),

    #[error(transparent)]
    Chat(#[from] ChatError),

    #[error("rate limit reached, retry in {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },
}

impl CoreError {
    /// Render a single-line, ≤200-byte user-visible message naming the
    /// failing subsystem, per spec §7.
    pub fn user_message(&self) -> String {
        let text = match self {
            CoreError::Validation { field, reason } => format!("Invalid input ({field}): {reason}"),
            CoreError::Store(_) => "Storage unavailable".to_string(),
            CoreError::Llm(e) => format!("LLM unavailable: {e}"),
            CoreError::Tool(e) => format!("Tool failed: {e}"),
            CoreError::Scheduler(e) => format!("Scheduler error: {e}"),
            CoreError::Chat(e) => format!("Chat channel error: {e}"),
            CoreError::RateLimited { retry_after_secs } => {
                format!("Quota reached, try again in {retry_after_secs}s")
            }
        };
        truncate(&text, 200)
    }
}

fn truncate(s: &str, max_bytes: usize) -> String {
    if s.len() <= max_bytes {
        return s.to_string();
    }
    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}…", &s[..end])
}
