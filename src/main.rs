use clap::{Parser, Subcommand};
use concierge_core::agent::Agent;
use concierge_core::boot::{self, BootDecision, BOOT_SUCCESS_DELAY, SAFE_MODE_MESSAGE};
use concierge_core::channels::{run_egress as channel_egress, run_ingest, StdioTransport};
use concierge_core::chat::{run_egress as chat_egress, ChatPoller, HttpChatTransport};
use concierge_core::config::{self, VendorProfile};
use concierge_core::history::ConversationHistory;
use concierge_core::llm::{Completer, LlmTransport, Reply, ToolDef};
use concierge_core::queue::{input_queue, output_queue};
use concierge_core::ratelimit::RateLimiter;
use concierge_core::scheduler::Scheduler;
use concierge_core::store::sqlite::SqliteStore;
use concierge_core::store::Store;
use concierge_core::tools::gpio::{GpioSetTool, PinAllowList};
use concierge_core::tools::i2c::{I2cBus, I2cScanTool};
use concierge_core::tools::memory_tool::{MemoryDeleteTool, MemoryGetTool, MemoryListTool, MemoryPutTool};
use concierge_core::tools::schedule_tool::{ScheduleCreateTool, ScheduleDeleteTool, ScheduleListTool};
use concierge_core::tools::system_tool::{GetHealthTool, GetVersionTool};
use concierge_core::tools::timezone_tool::SetTimezoneTool;
use concierge_core::tools::user_tool::{CreateToolTool, DeleteUserToolTool, ListUserToolsTool};
use concierge_core::tools::{ToolRegistry, ToolSpec};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

const DEFAULT_STORE_PATH: &str = "concierge.db";
/// Pin range exposed to `gpio_set`/`i2c_scan`; the physical pin map is an
/// out-of-scope external collaborator, so this is a generic microcontroller
/// default (see DESIGN.md).
const DEFAULT_PIN_RANGE: PinAllowList = PinAllowList::Range { min: 0, max: 40 };

#[derive(Parser)]
#[command(name = "concierged")]
#[command(author, version, about = "On-device AI assistant runtime", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the assistant runtime.
    Run {
        #[arg(long, default_value = DEFAULT_STORE_PATH)]
        store_path: String,
        #[arg(long)]
        safe_mode: bool,
    },
    /// Provisioning helpers over the persistent store.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
        #[arg(long, default_value = DEFAULT_STORE_PATH, global = true)]
        store_path: String,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Set a raw `<namespace>_<key>` config value, e.g. `cc_provider anthropic`.
    Set { key: String, value: String },
    /// Read a raw `<namespace>_<key>` config value.
    Get { key: String },
}

/// Stands in for the physical I2C driver, which is an out-of-scope external
/// collaborator (spec §1).
struct NullI2cBus;

impl I2cBus for NullI2cBus {
    fn open(&self, _sda_pin: u32, _scl_pin: u32, _frequency_hz: u32) -> Result<u32, String> {
        Ok(1)
    }

    fn scan(&self, _handle: u32) -> Result<Vec<u8>, String> {
        Ok(Vec::new())
    }

    fn close(&self, _handle: u32) {}
}

/// Stands in for `LlmTransport` while the runtime is in safe mode: always
/// answers with the safe-mode notice, never calls out (spec §4.J, §9).
struct SafeModeCompleter;

#[async_trait::async_trait]
impl Completer for SafeModeCompleter {
    async fn complete(
        &self,
        _system_prompt: &str,
        _history: &mut Vec<concierge_core::history::Turn>,
        _tools: &[ToolDef],
    ) -> Reply {
        Reply::AssistantText(SAFE_MODE_MESSAGE.to_string())
    }
}

fn now_epoch() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// RTC/NTP sync itself is an out-of-scope external collaborator (spec §1):
/// the network stack that would carry NTP is explicitly out of scope, and
/// there's no real-time clock peripheral to query here. On this class of
/// hardware an unsynced clock reads at or near the Unix epoch until it is
/// set, so treating "before this build's floor" as unsynced is the standard
/// stand-in (see DESIGN.md).
const CLOCK_SYNC_FLOOR_EPOCH: i64 = 1_700_000_000;

fn clock_appears_synced(now_epoch: i64) -> bool {
    now_epoch >= CLOCK_SYNC_FLOOR_EPOCH
}

/// Periodically re-checks clock sync and propagates any change to the rate
/// limiter, so spec §4.B's quarter-cap degradation is never dead code.
async fn watch_clock_sync(clock_synced: Arc<AtomicBool>, rate_limiter: Arc<RateLimiter>) {
    let mut interval = tokio::time::interval(std::time::Duration::from_secs(30));
    loop {
        interval.tick().await;
        let synced_now = clock_appears_synced(now_epoch());
        let was_synced = clock_synced.swap(synced_now, Ordering::SeqCst);
        if synced_now && !was_synced {
            rate_limiter.mark_clock_synced();
            log::info!("clock sync acquired");
        } else if !synced_now && was_synced {
            rate_limiter.mark_clock_unsynced();
            log::warn!("clock sync lost");
        }
    }
}

fn split_key(key: &str) -> Option<(&str, &str)> {
    key.split_once('_')
}

fn build_registry(
    store: Arc<dyn Store>,
    rate_limiter: Arc<RateLimiter>,
    clock_synced: Arc<AtomicBool>,
    timezone: Arc<Mutex<Option<String>>>,
    scheduler: Arc<Scheduler>,
) -> ToolRegistry {
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
            name: "get_health".to_string(),
            description: "Report free memory, rate-limit usage, clock sync, and timezone.".to_string(),
            parameters: serde_json::json!({"type": "object", "properties": {}}),
        },
        Arc::new(GetHealthTool::new(
            rate_limiter,
            clock_synced,
            timezone.clone(),
            || 0,
            now_epoch,
        )),
    );
    registry.register_builtin(
        ToolSpec {
            name: "gpio_set".to_string(),
            description: "Set a GPIO pin's logic level.".to_string(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "pin": {"type": "integer"},
                    "level": {"type": "integer", "enum": [0, 1]},
                },
                "required": ["pin", "level"],
            }),
        },
        Arc::new(GpioSetTool::new(DEFAULT_PIN_RANGE, |pin, level| {
            log::info!("gpio {pin} -> {}", if level { "HIGH" } else { "LOW" });
        })),
    );
    registry.register_builtin(
        ToolSpec {
            name: "i2c_scan".to_string(),
            description: "Scan an I2C bus for responding device addresses.".to_string(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "sda_pin": {"type": "integer"},
                    "scl_pin": {"type": "integer"},
                    "frequency_hz": {"type": "integer"},
                },
                "required": ["sda_pin", "scl_pin", "frequency_hz"],
            }),
        },
        Arc::new(I2cScanTool::new(DEFAULT_PIN_RANGE, NullI2cBus)),
    );
    registry.register_builtin(
        ToolSpec {
            name: "memory_put".to_string(),
            description: "Store a key/value pair in persistent memory.".to_string(),
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
            description: "Fetch a value from persistent memory.".to_string(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {"key": {"type": "string"}},
                "required": ["key"],
            }),
        },
        Arc::new(MemoryGetTool::new(store.clone())),
    );
    registry.register_builtin(
        ToolSpec {
            name: "memory_list".to_string(),
            description: "List all keys in persistent memory.".to_string(),
            parameters: serde_json::json!({"type": "object", "properties": {}}),
        },
        Arc::new(MemoryListTool::new(store.clone())),
    );
    registry.register_builtin(
        ToolSpec {
            name: "memory_delete".to_string(),
            description: "Delete a key from persistent memory.".to_string(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {"key": {"type": "string"}},
                "required": ["key"],
            }),
        },
        Arc::new(MemoryDeleteTool::new(store.clone())),
    );
    registry.register_builtin(
        ToolSpec {
            name: "set_timezone".to_string(),
            description: "Set the runtime's IANA timezone, e.g. America/Los_Angeles.".to_string(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {"timezone": {"type": "string"}},
                "required": ["timezone"],
            }),
        },
        Arc::new(SetTimezoneTool::new(store.clone(), timezone.clone())),
    );
    registry.register_builtin(
        ToolSpec {
            name: "schedule_create".to_string(),
            description: "Create a scheduled job from a trigger phrase and an action.".to_string(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {"trigger": {"type": "string"}, "action": {"type": "string"}},
                "required": ["trigger", "action"],
            }),
        },
        Arc::new(ScheduleCreateTool::new(scheduler.clone(), timezone.clone(), now_epoch)),
    );
    registry.register_builtin(
        ToolSpec {
            name: "schedule_list".to_string(),
            description: "List scheduled jobs.".to_string(),
            parameters: serde_json::json!({"type": "object", "properties": {}}),
        },
        Arc::new(ScheduleListTool::new(scheduler.clone())),
    );
    registry.register_builtin(
        ToolSpec {
            name: "schedule_delete".to_string(),
            description: "Delete a scheduled job by id.".to_string(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {"id": {"type": "integer"}},
                "required": ["id"],
            }),
        },
        Arc::new(ScheduleDeleteTool::new(scheduler)),
    );
    registry.register_builtin(
        ToolSpec {
            name: "create_tool".to_string(),
            description: "Register a user-defined tool backed by a natural-language action.".to_string(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "name": {"type": "string"},
                    "description": {"type": "string"},
                    "action": {"type": "string"},
                    "replace": {"type": "boolean"},
                },
                "required": ["name", "description", "action"],
            }),
        },
        Arc::new(CreateToolTool::new(store.clone())),
    );
    registry.register_builtin(
        ToolSpec {
            name: "list_user_tools".to_string(),
            description: "List user-defined tools.".to_string(),
            parameters: serde_json::json!({"type": "object", "properties": {}}),
        },
        Arc::new(ListUserToolsTool::new(store.clone())),
    );
    registry.register_builtin(
        ToolSpec {
            name: "delete_user_tool".to_string(),
            description: "Delete a user-defined tool by name.".to_string(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {"name": {"type": "string"}},
                "required": ["name"],
            }),
        },
        Arc::new(DeleteUserToolTool::new(store)),
    );

    registry
}

async fn run(store_path: String, force_safe_mode: bool) -> Result<(), Box<dyn std::error::Error>> {
    concierge_core::logger::install_default();
    log::info!("concierge starting, store={store_path}");

    let store: Arc<dyn Store> = Arc::new(SqliteStore::open(&store_path)?);

    let decision = boot::record_boot_attempt(&store).await?;
    let safe_mode = force_safe_mode || decision == BootDecision::SafeMode;
    if safe_mode {
        log::warn!("entering safe mode");
    }

    let (input, mut input_rx) = input_queue();
    let (stdio_out, stdio_rx) = output_queue();
    tokio::spawn(run_ingest(StdioTransport::new(), input.clone()));
    tokio::spawn(channel_egress(StdioTransport::new(), stdio_rx));

    if safe_mode {
        while let Some(message) = input_rx.recv().await {
            log::info!("safe mode reply to input from {:?}", message.origin);
            stdio_out.try_send_logged(SAFE_MODE_MESSAGE.to_string());
        }
        return Ok(());
    }

    let runtime_config = config::load(&store).await?;
    let timezone = Arc::new(Mutex::new(runtime_config.timezone.clone()));
    let rate_limiter = Arc::new(RateLimiter::with_defaults(now_epoch()));
    let clock_synced = Arc::new(AtomicBool::new(clock_appears_synced(now_epoch())));
    if !clock_synced.load(Ordering::SeqCst) {
        rate_limiter.mark_clock_unsynced();
        log::warn!("clock not yet synced at boot; rate limiter admitting at quarter cap, scheduler ticks no-op");
    }
    tokio::spawn(watch_clock_sync(clock_synced.clone(), rate_limiter.clone()));
    let scheduler = Arc::new(Scheduler::load(store.clone()).await?);

    let registry = Arc::new(build_registry(
        store.clone(),
        rate_limiter.clone(),
        clock_synced.clone(),
        timezone.clone(),
        scheduler.clone(),
    ));

    let completer: Arc<dyn Completer> = match &runtime_config.llm {
        Some(llm) => Arc::new(LlmTransport::new(llm.vendor, llm.api_key.clone(), llm.model.clone())),
        None => {
            log::warn!("no LLM configured, replies are limited to the unconfigured notice");
            Arc::new(SafeModeCompleter)
        }
    };

    let mut outputs = vec![stdio_out];
    if let Some(chat) = &runtime_config.chat {
        let (chat_out, chat_rx) = output_queue();
        outputs.push(chat_out);
        let transport = HttpChatTransport::new(chat.token.clone());
        let authorised = chat.authorised_chat_id;
        let poll_store = store.clone();
        let poll_input = input.clone();
        tokio::spawn(async move {
            let mut poller = ChatPoller::new(transport, poll_store, authorised);
            if let Err(e) = poller.flush_on_startup().await {
                log::error!("chat startup flush failed: {e}");
            }
            loop {
                if let Err(e) = poller.poll_once(&poll_input).await {
                    log::warn!("chat poll failed: {e}");
                    tokio::time::sleep(poller.backoff_delay()).await;
                }
            }
        });

        if let Some(chat_id) = authorised {
            let egress_transport = HttpChatTransport::new(chat.token.clone());
            let mut chat_rx = chat_rx;
            tokio::spawn(async move {
                chat_egress(&egress_transport, chat_id, &mut chat_rx).await;
            });
        }
    }

    let scheduler_tz = timezone.clone();
    let scheduler_handle = scheduler.clone();
    let scheduler_input = input.clone();
    let scheduler_clock_synced = clock_synced.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(concierge_core::scheduler::SCHEDULER_TICK);
        loop {
            interval.tick().await;
            let tz = scheduler_tz
                .lock()
                .unwrap()
                .as_deref()
                .and_then(|s| s.parse().ok())
                .unwrap_or(chrono_tz::UTC);
            let now = scheduler_clock_synced
                .load(Ordering::SeqCst)
                .then(now_epoch);
            scheduler_handle.tick(now, tz, &scheduler_input).await;
        }
    });

    let boot_store = store.clone();
    tokio::spawn(async move {
        tokio::time::sleep(BOOT_SUCCESS_DELAY).await;
        if let Err(e) = boot::mark_stable(&boot_store, now_epoch()).await {
            log::error!("failed to record stable boot: {e}");
        }
    });

    let agent = Agent::new(
        rate_limiter,
        registry,
        completer,
        "You are an on-device assistant with access to a small set of hardware and memory tools.".to_string(),
        outputs,
        Arc::new(now_epoch),
    );

    let mut history = ConversationHistory::new();
    while let Some(message) = input_rx.recv().await {
        agent.process(message, &mut history).await;
    }

    Ok(())
}

async fn run_config(action: ConfigAction, store_path: String) -> Result<(), Box<dyn std::error::Error>> {
    let store: Arc<dyn Store> = Arc::new(SqliteStore::open(&store_path)?);
    match action {
        ConfigAction::Set { key, value } => {
            let (ns, sub_key) = split_key(&key).ok_or("config key must be <namespace>_<key>")?;
            store.put_string(ns, sub_key, &value).await?;
            println!("{key} set");
        }
        ConfigAction::Get { key } => {
            let (ns, sub_key) = split_key(&key).ok_or("config key must be <namespace>_<key>")?;
            match store.get_string(ns, sub_key).await? {
                Some(value) => println!("{value}"),
                None => println!("(unset)"),
            }
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Run { store_path, safe_mode } => run(store_path, safe_mode).await,
        Commands::Config { action, store_path } => run_config(action, store_path).await,
    }
}
