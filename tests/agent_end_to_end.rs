//! End-to-end coverage of the bounded agent loop wired against the real
//! tool registry and an in-memory store, exercising the request/response
//! scenarios a live boot would hit rather than any single module in
//! isolation.

use async_trait::async_trait;
use concierge_core::agent::{Agent, ITERATION_LIMIT_MESSAGE};
use concierge_core::history::{ConversationHistory, Turn};
use concierge_core::llm::{Completer, LlmError, Reply, ToolCall, ToolDef};
use concierge_core::message::{Message, Origin};
use concierge_core::queue::output_queue;
use concierge_core::ratelimit::RateLimiter;
use concierge_core::store::memory::MemoryStore;
use concierge_core::store::Store;
use concierge_core::tools::memory_tool::{MemoryGetTool, MemoryPutTool};
use concierge_core::tools::system_tool::GetVersionTool;
use concierge_core::tools::{ToolRegistry, ToolSpec};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

struct ScriptedCompleter {
    replies: Mutex<Vec<Reply>>,
    calls: AtomicU32,
}

impl ScriptedCompleter {
    fn new(replies: Vec<Reply>) -> Self {
        Self {
            replies: Mutex::new(replies),
            calls: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl Completer for ScriptedCompleter {
    async fn complete(&self, _system_prompt: &str, _history: &mut Vec<Turn>, _tools: &[ToolDef]) -> Reply {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut replies = self.replies.lock().unwrap();
        if replies.is_empty() {
            Reply::AssistantText("no more scripted replies".to_string())
        } else {
            replies.remove(0)
        }
    }
}

fn registry_with_builtins(store: Arc<dyn Store>) -> ToolRegistry {
    let mut registry = ToolRegistry::new(store.clone());
    registry.register_builtin(
        ToolSpec {
            name: "get_version".to_string(),
            description: "Report the running firmware version.".to_string(),
            parameters: serde_json::json!({"type": "object", "properties": {}}),
        },
        Arc::new(GetVersionTool),
    );
    registry.register_builtin(
        ToolSpec {
            name: "memory_put".to_string(),
            description: "Store a key/value pair.".to_string(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {"key": {"type": "string"}, "value": {"type": "string"}},
                "required": ["key", "value"],
            }),
        },
        Arc::new(MemoryPutTool::new(store.clone())),
    );
    registry.register_builtin(
        ToolSpec {
            name: "memory_get".to_string(),
            description: "Fetch a stored value.".to_string(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {"key": {"type": "string"}},
                "required": ["key"],
            }),
        },
        Arc::new(MemoryGetTool::new(store)),
    );
    registry
}

/// Spec §8 scenario 1: a direct reply round-trips with no tool call and
/// grows history by exactly one user turn and one assistant turn.
#[tokio::test]
async fn direct_reply_scenario() {
    let (output, mut rx) = output_queue();
    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    let agent = Agent::new(
        Arc::new(RateLimiter::with_defaults(0)),
        Arc::new(registry_with_builtins(store)),
        Arc::new(ScriptedCompleter::new(vec![Reply::AssistantText(
            "It's currently sunny.".to_string(),
        )])),
        "system".to_string(),
        vec![output],
        Arc::new(|| 0),
    );
    let mut history = ConversationHistory::new();
    agent
        .process(Message::new("what's the weather", Origin::Local), &mut history)
        .await;

    assert_eq!(rx.recv().await.unwrap(), "It's currently sunny.");
    assert_eq!(history.len(), 2);
}

/// Spec §8 scenario 2: a single tool call is dispatched against the real
/// registry and store, and its result is fed back before the final reply.
#[tokio::test]
async fn single_tool_call_scenario() {
    let (output, mut rx) = output_queue();
    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    store
        .put_string(concierge_core::store::namespace::USER_MEMORY, "name", "bob")
        .await
        .unwrap();

    let call = ToolCall {
        id: "call-1".to_string(),
        name: "memory_get".to_string(),
        arguments: serde_json::json!({"key": "name"}),
    };
    let agent = Agent::new(
        Arc::new(RateLimiter::with_defaults(0)),
        Arc::new(registry_with_builtins(store)),
        Arc::new(ScriptedCompleter::new(vec![
            Reply::ToolCall(call),
            Reply::AssistantText("Your name is bob.".to_string()),
        ])),
        "system".to_string(),
        vec![output],
        Arc::new(|| 0),
    );
    let mut history = ConversationHistory::new();
    agent
        .process(Message::new("what's my name", Origin::Local), &mut history)
        .await;

    assert_eq!(rx.recv().await.unwrap(), "Your name is bob.");
    assert_eq!(history.len(), 3, "expected user, tool, assistant");
    let tool_turn = history
        .iter()
        .find(|t| t.role == concierge_core::history::Role::Tool)
        .unwrap();
    assert_eq!(tool_turn.content, "bob");
}

/// Spec §8 scenario 3: a model that never stops calling tools is cut off at
/// the iteration cap rather than looping forever.
#[tokio::test]
async fn iteration_cap_scenario() {
    let (output, mut rx) = output_queue();
    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    let call = ToolCall {
        id: "loop".to_string(),
        name: "get_version".to_string(),
        arguments: serde_json::json!({}),
    };
    let replies = (0..10).map(|_| Reply::ToolCall(call.clone())).collect();
    let agent = Agent::new(
        Arc::new(RateLimiter::with_defaults(0)),
        Arc::new(registry_with_builtins(store)),
        Arc::new(ScriptedCompleter::new(replies)),
        "system".to_string(),
        vec![output],
        Arc::new(|| 0),
    );
    let mut history = ConversationHistory::new();
    agent
        .process(Message::new("keep checking", Origin::Local), &mut history)
        .await;

    assert_eq!(rx.recv().await.unwrap(), ITERATION_LIMIT_MESSAGE);
}

/// Spec §8 scenario 6: once the hourly cap is exhausted, further messages are
/// denied before any LLM call, and the denial never touches history.
#[tokio::test]
async fn rate_limit_boundary_scenario() {
    let (output, mut rx) = output_queue();
    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    let rate_limiter = Arc::new(RateLimiter::new(1, 200, 0));
    let completer = Arc::new(ScriptedCompleter::new(vec![
        Reply::AssistantText("first reply".to_string()),
        Reply::AssistantText("should not be reached".to_string()),
    ]));
    let agent = Agent::new(
        rate_limiter,
        Arc::new(registry_with_builtins(store)),
        completer,
        "system".to_string(),
        vec![output],
        Arc::new(|| 0),
    );
    let mut history = ConversationHistory::new();

    agent.process(Message::new("first", Origin::Local), &mut history).await;
    assert_eq!(rx.recv().await.unwrap(), "first reply");
    assert_eq!(history.len(), 2);

    agent.process(Message::new("second", Origin::Local), &mut history).await;
    let denial = rx.recv().await.unwrap();
    assert!(denial.contains("Quota reached"));
    assert_eq!(history.len(), 2, "denied turns must not be appended to history");
}

/// A transport-level vendor error surfaces as a single informative reply
/// rather than aborting the process or retrying inside the agent loop
/// (spec §4.E, §7).
#[tokio::test]
async fn vendor_error_surfaces_as_single_reply() {
    let (output, mut rx) = output_queue();
    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    let agent = Agent::new(
        Arc::new(RateLimiter::with_defaults(0)),
        Arc::new(registry_with_builtins(store)),
        Arc::new(ScriptedCompleter::new(vec![Reply::Error(LlmError::RateLimitedByVendor)])),
        "system".to_string(),
        vec![output],
        Arc::new(|| 0),
    );
    let mut history = ConversationHistory::new();
    agent
        .process(Message::new("hello", Origin::Local), &mut history)
        .await;

    let text = rx.recv().await.unwrap();
    assert!(text.contains("LLM unavailable"));
}
