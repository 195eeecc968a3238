//! Bounded tool-calling agent loop (spec §4.F).
//!
//! State machine: `Idle -> Admitting -> Thinking <-> ToolExecuting ->
//! Responding -> Idle`. A fatal transport error from Thinking goes
//! straight to Responding with an error message.

use crate::error::CoreError;
use crate::history::{ConversationHistory, Turn};
use crate::llm::{Completer, Reply, ToolCall, ToolDef};
use crate::queue::OutputSender;
use crate::ratelimit::{Admission, RateLimiter};
use crate::tools::registry::Dispatch;
use crate::tools::{truncate_result, ToolError, ToolRegistry, UserTool};
use std::sync::Arc;

/// Bounded tool-calling cycles per inbound message, and per user-tool
/// sub-loop (spec §3 `MAX_TOOL_ITERATIONS`, §9).
pub const MAX_TOOL_ITERATIONS: u32 = 5;

pub const ITERATION_LIMIT_MESSAGE: &str = "Reached iteration limit; stopping.";

pub struct Agent {
    rate_limiter: Arc<RateLimiter>,
    registry: Arc<ToolRegistry>,
    completer: Arc<dyn Completer>,
    system_prompt: String,
    outputs: Vec<OutputSender>,
    now_epoch: Arc<dyn Fn() -> i64 + Send + Sync>,
}

impl Agent {
    pub fn new(
        rate_limiter: Arc<RateLimiter>,
        registry: Arc<ToolRegistry>,
        completer: Arc<dyn Completer>,
        system_prompt: String,
        outputs: Vec<OutputSender>,
        now_epoch: Arc<dyn Fn() -> i64 + Send + Sync>,
    ) -> Self {
        Self {
            rate_limiter,
            registry,
            completer,
            system_prompt,
            outputs,
            now_epoch,
        }
    }

    fn emit(&self, text: &str) {
        for out in &self.outputs {
            out.try_send_logged(text.to_string());
        }
    }

    /// Process one inbound message end to end against the caller-owned
    /// rolling history (spec §4.F). At most one reply reaches the output
    /// channels per call (spec §8 invariant).
    pub async fn process(&self, message: crate::message::Message, history: &mut ConversationHistory) {
        let now = (self.now_epoch)();
        if let Admission::Deny { retry_after_secs } = self.rate_limiter.admit(now) {
            self.emit(&CoreError::RateLimited { retry_after_secs }.user_message());
            return;
        }

        history.push(Turn::user(message.text));
        let reply = self.run_tool_loop(history, MAX_TOOL_ITERATIONS).await;
        self.emit(&reply);
    }

    /// Runs the bounded tool-calling cycle against `history`, returning the
    /// final reply text without emitting it. Shared by the top-level turn
    /// and the user-tool re-feed sub-loop (spec §9).
    async fn run_tool_loop(&self, history: &mut ConversationHistory, max_iterations: u32) -> String {
        let tools: Vec<ToolDef> = match self.registry.describe_all().await {
            Ok(tools) => tools,
            Err(e) => return format!("Tool registry unavailable: {e}"),
        };

        for _ in 0..max_iterations {
            let mut turns = history.to_vec();
            let reply = self.completer.complete(&self.system_prompt, &mut turns, &tools).await;

            match reply {
                Reply::AssistantText(text) => {
                    history.push(Turn::assistant(text.clone()));
                    return text;
                }
                Reply::ToolCall(call) => {
                    let result = self.dispatch_tool(&call).await;
                    let mut turn = Turn::tool_result(call.id.clone(), result);
                    turn.tool_calls = Some(vec![call]);
                    history.push(turn);
                }
                Reply::Error(err) => {
                    return CoreError::Llm(err).user_message();
                }
            }
        }

        let message = ITERATION_LIMIT_MESSAGE.to_string();
        history.push(Turn::assistant(message.clone()));
        message
    }

    async fn dispatch_tool(&self, call: &ToolCall) -> String {
        match self.registry.resolve(&call.name).await {
            Ok(Dispatch::Builtin(handler)) => match handler.handle(&call.arguments).await {
                Ok(result) => truncate_result(&result),
                Err(e) => e.to_string(),
            },
            Ok(Dispatch::UserTool(tool)) => self.resolve_user_tool(&tool).await,
            Err(ToolError::UnknownTool(name)) => format!("Unknown tool: {name}"),
            Err(e) => e.to_string(),
        }
    }

    /// Re-feeds a user tool's action-text as a user-level directive inside
    /// a fresh bounded sub-loop with its own iteration cap (spec §3, §9:
    /// the reference resolution strategy, adopted here rather than
    /// executing a pre-parsed command).
    async fn resolve_user_tool(&self, tool: &UserTool) -> String {
        let mut sub_history = ConversationHistory::new();
        sub_history.push(Turn::user(tool.action.clone()));
        self.run_tool_loop(&mut sub_history, MAX_TOOL_ITERATIONS).await
    }
}
