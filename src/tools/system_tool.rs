//! `get_version` / `get_health` built-ins (spec §4.D).

use super::{ToolError, ToolHandler};
use crate::ratelimit::RateLimiter;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

pub const FIRMWARE_VERSION: &str = env!("CARGO_PKG_VERSION");

pub struct GetVersionTool;

#[async_trait]
impl ToolHandler for GetVersionTool {
    async fn handle(&self, _input: &Value) -> Result<String, ToolError> {
        Ok(format!("concierge-core {FIRMWARE_VERSION}"))
    }
}

/// Free-memory probe is an out-of-scope external collaborator (spec §1);
/// injected as a closure so tests can stub it.
pub struct GetHealthTool {
    rate_limiter: Arc<RateLimiter>,
    clock_synced: Arc<AtomicBool>,
    timezone: Arc<Mutex<Option<String>>>,
    free_memory_bytes: Box<dyn Fn() -> u64 + Send + Sync>,
    now_epoch: Box<dyn Fn() -> i64 + Send + Sync>,
}

impl GetHealthTool {
    pub fn new(
        rate_limiter: Arc<RateLimiter>,
        clock_synced: Arc<AtomicBool>,
        timezone: Arc<Mutex<Option<String>>>,
        free_memory_bytes: impl Fn() -> u64 + Send + Sync + 'static,
        now_epoch: impl Fn() -> i64 + Send + Sync + 'static,
    ) -> Self {
        Self {
            rate_limiter,
            clock_synced,
            timezone,
            free_memory_bytes: Box::new(free_memory_bytes),
            now_epoch: Box::new(now_epoch),
        }
    }
}

#[async_trait]
impl ToolHandler for GetHealthTool {
    async fn handle(&self, _input: &Value) -> Result<String, ToolError> {
        let now = (self.now_epoch)();
        let (hour_count, day_count) = self.rate_limiter.snapshot(now);
        let synced = self.clock_synced.load(Ordering::SeqCst);
        let tz = self
            .timezone
            .lock()
            .unwrap()
            .clone()
            .unwrap_or_else(|| "unset".to_string());

        Ok(format!(
            "fw={} free_mem={}B rate={}/{} clock_synced={} tz={}",
            FIRMWARE_VERSION,
            (self.free_memory_bytes)(),
            hour_count,
            day_count,
            synced,
            tz
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn reports_firmware_version() {
        let tool = GetVersionTool;
        let out = tool.handle(&json!({})).await.unwrap();
        assert!(out.contains(FIRMWARE_VERSION));
    }

    #[tokio::test]
    async fn reports_rate_and_clock_state() {
        let limiter = Arc::new(RateLimiter::with_defaults(0));
        limiter.admit(0);
        let clock_synced = Arc::new(AtomicBool::new(true));
        let tz = Arc::new(Mutex::new(Some("America/Los_Angeles".to_string())));
        let tool = GetHealthTool::new(limiter, clock_synced, tz, || 4096, || 0);
        let out = tool.handle(&json!({})).await.unwrap();
        assert!(out.contains("rate=1/1"));
        assert!(out.contains("clock_synced=true"));
        assert!(out.contains("America/Los_Angeles"));
    }
}
