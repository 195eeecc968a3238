//! `set_timezone` built-in (spec §4.D).
//!
//! Resolves spec §9's open question: timezones are validated and stored as
//! IANA zone names (e.g. `America/Los_Angeles`) rather than hand-parsed
//! POSIX TZ strings, using `chrono-tz`'s database for DST-correct
//! recomputation (see DESIGN.md).

use super::{require_str, ToolError, ToolHandler};
use crate::store::{namespace, Store};
use async_trait::async_trait;
use serde_json::Value;
use std::str::FromStr;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};

pub struct SetTimezoneTool {
    store: Arc<dyn Store>,
    current: Arc<Mutex<Option<String>>>,
    clock_synced_hint: Option<Arc<std::sync::atomic::AtomicBool>>,
}

impl SetTimezoneTool {
    pub fn new(store: Arc<dyn Store>, current: Arc<Mutex<Option<String>>>) -> Self {
        Self {
            store,
            current,
            clock_synced_hint: None,
        }
    }
}

#[async_trait]
impl ToolHandler for SetTimezoneTool {
    async fn handle(&self, input: &Value) -> Result<String, ToolError> {
        let tz_name = require_str(input, "timezone")?;
        chrono_tz::Tz::from_str(tz_name).map_err(|_| ToolError::InvalidArgument {
            field: "timezone".to_string(),
            reason: format!("unrecognised IANA zone: {tz_name}"),
        })?;

        self.store
            .put_string(namespace::TIMEZONE, "posix", tz_name)
            .await?;
        *self.current.lock().unwrap() = Some(tz_name.to_string());
        if let Some(hint) = &self.clock_synced_hint {
            hint.store(true, Ordering::SeqCst);
        }
        Ok(format!("timezone set to {tz_name}"))
    }
}
