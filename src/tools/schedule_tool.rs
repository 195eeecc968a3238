//! `schedule_create` / `schedule_list` / `schedule_delete` built-ins
//! (spec §4.D), delegating to the scheduler (spec §4.I).

use super::{require_i64, require_str, ToolError, ToolHandler};
use crate::scheduler::Scheduler;
use async_trait::async_trait;
use chrono_tz::Tz;
use serde_json::Value;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

pub struct ScheduleCreateTool {
    scheduler: Arc<Scheduler>,
    timezone: Arc<Mutex<Option<String>>>,
    now_epoch: Box<dyn Fn() -> i64 + Send + Sync>,
}

impl ScheduleCreateTool {
    pub fn new(
        scheduler: Arc<Scheduler>,
        timezone: Arc<Mutex<Option<String>>>,
        now_epoch: impl Fn() -> i64 + Send + Sync + 'static,
    ) -> Self {
        Self {
            scheduler,
            timezone,
            now_epoch: Box::new(now_epoch),
        }
    }

    fn tz(&self) -> Tz {
        self.timezone
            .lock()
            .unwrap()
            .as_deref()
            .and_then(|s| Tz::from_str(s).ok())
            .unwrap_or(chrono_tz::UTC)
    }
}

#[async_trait]
impl ToolHandler for ScheduleCreateTool {
    async fn handle(&self, input: &Value) -> Result<String, ToolError> {
        let trigger = require_str(input, "trigger")?;
        let action = require_str(input, "action")?;
        let id = self
            .scheduler
            .create_job(trigger, action, (self.now_epoch)(), self.tz())
            .await?;
        Ok(format!("job {id} scheduled"))
    }
}

pub struct ScheduleListTool {
    scheduler: Arc<Scheduler>,
}

impl ScheduleListTool {
    pub fn new(scheduler: Arc<Scheduler>) -> Self {
        Self { scheduler }
    }
}

#[async_trait]
impl ToolHandler for ScheduleListTool {
    async fn handle(&self, _input: &Value) -> Result<String, ToolError> {
        let jobs = self.scheduler.list_jobs().await;
        Ok(jobs
            .iter()
            .map(|j| format!("{}:{}", j.id, j.trigger))
            .collect::<Vec<_>>()
            .join(";"))
    }
}

pub struct ScheduleDeleteTool {
    scheduler: Arc<Scheduler>,
}

impl ScheduleDeleteTool {
    pub fn new(scheduler: Arc<Scheduler>) -> Self {
        Self { scheduler }
    }
}

#[async_trait]
impl ToolHandler for ScheduleDeleteTool {
    async fn handle(&self, input: &Value) -> Result<String, ToolError> {
        let id = require_i64(input, "id")?;
        let id = u64::try_from(id).map_err(|_| ToolError::InvalidArgument {
            field: "id".to_string(),
            reason: "must be a non-negative integer".to_string(),
        })?;
        self.scheduler.delete_job(id).await?;
        Ok(format!("job {id} deleted"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;
    use crate::store::Store;
    use serde_json::json;

    async fn scheduler() -> Arc<Scheduler> {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        Arc::new(Scheduler::load(store).await.unwrap())
    }

    #[tokio::test]
    async fn creates_and_lists_a_job() {
        let scheduler = scheduler().await;
        let tz = Arc::new(Mutex::new(Some("UTC".to_string())));
        let create = ScheduleCreateTool::new(scheduler.clone(), tz, || 0);
        create
            .handle(&json!({"trigger": "once in 10 minutes", "action": "say hi"}))
            .await
            .unwrap();
        let list = ScheduleListTool::new(scheduler.clone()).handle(&json!({})).await.unwrap();
        assert!(list.contains("once in 10 minutes"));
    }

    #[tokio::test]
    async fn deletes_a_job() {
        let scheduler = scheduler().await;
        let tz = Arc::new(Mutex::new(Some("UTC".to_string())));
        let create = ScheduleCreateTool::new(scheduler.clone(), tz, || 0);
        create
            .handle(&json!({"trigger": "once in 10 minutes", "action": "say hi"}))
            .await
            .unwrap();
        let jobs = scheduler.list_jobs().await;
        let id = jobs[0].id;
        ScheduleDeleteTool::new(scheduler.clone())
            .handle(&json!({"id": id}))
            .await
            .unwrap();
        assert!(scheduler.list_jobs().await.is_empty());
    }
}
