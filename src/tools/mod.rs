//! Tool registry and built-in handlers (spec §4.C, §4.D).

pub mod gpio;
pub mod i2c;
pub mod memory_tool;
pub mod registry;
pub mod schedule_tool;
pub mod system_tool;
pub mod timezone_tool;
pub mod user_tool;

pub use registry::{ToolRegistry, ToolSpec};
pub use user_tool::UserTool;

use async_trait::async_trait;

/// Results are bounded to this many bytes; handlers truncate with an
/// explicit "…" marker on overflow (spec §4.D).
pub const MAX_RESULT_BYTES: usize = 512;

/// Handlers must not block longer than this (spec §4.D). Hardware handlers
/// enforce it via driver timeouts; this constant documents the budget for
/// handlers that perform their own async waits.
pub const HANDLER_TIMEOUT_MS: u64 = 2_000;

#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("unknown tool: {0}")]
    UnknownTool(String),

    #[error("duplicate tool name: {0}")]
    DuplicateName(String),

    #[error("cannot remove built-in tool: {0}")]
    Immutable(String),

    #[error("invalid argument {field}: {reason}")]
    InvalidArgument { field: String, reason: String },

    #[error("{0}")]
    Handler(String),

    #[error("store error: {0}")]
    Store(#[from] crate::store::StoreError),

    #[error("scheduler error: {0}")]
    Scheduler(#[from] crate::scheduler::SchedulerError),
}

/// Common handler contract (spec §4.D): take a JSON argument object, return
/// a result string truncated to [`MAX_RESULT_BYTES`].
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn handle(&self, input: &serde_json::Value) -> Result<String, ToolError>;
}

/// Truncate `s` to [`MAX_RESULT_BYTES`], appending an explicit marker if it
/// had to cut content.
pub fn truncate_result(s: &str) -> String {
    if s.len() <= MAX_RESULT_BYTES {
        return s.to_string();
    }
    let mut end = MAX_RESULT_BYTES.saturating_sub(3);
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &s[..end])
}

/// Fetch a required string field from a JSON argument object.
pub(crate) fn require_str<'a>(
    input: &'a serde_json::Value,
    field: &str,
) -> Result<&'a str, ToolError> {
    input
        .get(field)
        .and_then(|v| v.as_str())
        .ok_or_else(|| ToolError::InvalidArgument {
            field: field.to_string(),
            reason: "missing or not a string".to_string(),
        })
}

/// Fetch a required i64 field from a JSON argument object.
pub(crate) fn require_i64(input: &serde_json::Value, field: &str) -> Result<i64, ToolError> {
    input
        .get(field)
        .and_then(|v| v.as_i64())
        .ok_or_else(|| ToolError::InvalidArgument {
            field: field.to_string(),
            reason: "missing or not an integer".to_string(),
        })
}
