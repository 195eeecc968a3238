//! Durable cron-like scheduler (spec §4.I).
//!
//! A single task wakes every [`SCHEDULER_TICK`] and fires due jobs as
//! synthetic [`Message`](crate::message::Message)s of origin `Schedule`.
//! Job state is persisted after every mutation so firings survive reboot.

pub mod grammar;
pub mod job;

pub use grammar::{parse_trigger, TriggerSpec};
pub use job::{JobKind, ScheduledJob};

use crate::message::{Message, Origin};
use crate::queue::InputSender;
use crate::store::{namespace, Store};
use chrono_tz::Tz;
use std::sync::Arc;
use std::time::Duration;

/// Default tick interval (spec §4.I).
pub const SCHEDULER_TICK: Duration = Duration::from_secs(60);

#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("invalid trigger spec: {0}")]
    InvalidTrigger(String),

    #[error("job not found: {0}")]
    NotFound(u64),

    #[error("action text exceeds 256 bytes")]
    ActionTooLong,

    #[error("store error: {0}")]
    Store(#[from] crate::store::StoreError),
}

pub struct Scheduler {
    store: Arc<dyn Store>,
    jobs: tokio::sync::Mutex<Vec<ScheduledJob>>,
    next_id: std::sync::atomic::AtomicU64,
}

impl Scheduler {
    /// Load the persisted job table (spec §4.I "loaded at startup"). Id
    /// allocation resumes from the persisted `cron_count` counter, not from
    /// the surviving jobs' ids, so a deleted job's id is never reused
    /// (spec §4.I "monotonic and skips gaps from deletion").
    pub async fn load(store: Arc<dyn Store>) -> Result<Self, SchedulerError> {
        let raw = store.iterate(namespace::SCHEDULER).await?;
        let mut jobs = Vec::new();
        for (key, bytes) in raw {
            if key == "count" {
                continue;
            }
            if let Ok(job) = serde_json::from_slice::<ScheduledJob>(&bytes) {
                jobs.push(job);
            }
        }
        let next_id = store
            .get_string(namespace::SCHEDULER, "count")
            .await?
            .and_then(|s| s.parse().ok())
            .unwrap_or(1);
        Ok(Self {
            store,
            jobs: tokio::sync::Mutex::new(jobs),
            next_id: std::sync::atomic::AtomicU64::new(next_id),
        })
    }

    async fn persist(&self, job: &ScheduledJob) -> Result<(), SchedulerError> {
        let key = format!("{}", job.id);
        self.store
            .put(namespace::SCHEDULER, &key, &serde_json::to_vec(job).unwrap())
            .await?;
        Ok(())
    }

    async fn persist_count(&self, next_id: u64) -> Result<(), SchedulerError> {
        self.store
            .put_string(namespace::SCHEDULER, "count", &next_id.to_string())
            .await?;
        Ok(())
    }

    /// Create and persist a new job, per the grammar in spec §6.
    pub async fn create_job(
        &self,
        trigger_text: &str,
        action: &str,
        now_epoch: i64,
        tz: Tz,
    ) -> Result<u64, SchedulerError> {
        if action.len() > 256 {
            return Err(SchedulerError::ActionTooLong);
        }
        let trigger = parse_trigger(trigger_text)
            .ok_or_else(|| SchedulerError::InvalidTrigger(trigger_text.to_string()))?;

        let id = self.next_id.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        self.persist_count(id + 1).await?;
        let (kind, next_fire) = trigger.resolve_initial(now_epoch, tz);
        let job = ScheduledJob {
            id,
            kind,
            trigger: trigger_text.to_string(),
            action: action.to_string(),
            next_fire_epoch: next_fire,
            creation_epoch: now_epoch,
            active: true,
        };
        self.persist(&job).await?;
        self.jobs.lock().await.push(job);
        Ok(id)
    }

    pub async fn list_jobs(&self) -> Vec<ScheduledJob> {
        self.jobs.lock().await.clone()
    }

    pub async fn delete_job(&self, id: u64) -> Result<(), SchedulerError> {
        let mut jobs = self.jobs.lock().await;
        let before = jobs.len();
        jobs.retain(|j| j.id != id);
        if jobs.len() == before {
            return Err(SchedulerError::NotFound(id));
        }
        self.store.delete(namespace::SCHEDULER, &id.to_string()).await?;
        Ok(())
    }

    /// One tick: fire every due job, recompute or deactivate, persist.
    /// No-ops if `now_epoch` is `None` (clock not yet synced).
    pub async fn tick(&self, now_epoch: Option<i64>, tz: Tz, input: &InputSender) {
        let Some(now) = now_epoch else {
            log::debug!("scheduler tick skipped: clock not synced");
            return;
        };

        let mut jobs = self.jobs.lock().await;
        for job in jobs.iter_mut() {
            if !job.active || job.next_fire_epoch > now {
                continue;
            }

            input.try_send_logged(
                Message::new(job.action.clone(), Origin::Schedule),
                "scheduler",
            );

            match job.kind {
                JobKind::Once => {
                    job.active = false;
                }
                JobKind::Daily { hour, minute } => {
                    job.next_fire_epoch = grammar::next_local_hhmm(now, hour, minute, tz);
                }
                JobKind::Periodic { interval_secs } => {
                    let mut next = job.next_fire_epoch + interval_secs as i64;
                    while next <= now {
                        next += interval_secs as i64;
                    }
                    job.next_fire_epoch = next;
                }
            }

            if let Err(e) = self.persist(job).await {
                log::error!("failed to persist job {}: {e}", job.id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;
    use chrono::TimeZone;
    use std::str::FromStr;

    fn tz() -> Tz {
        Tz::from_str("America/Los_Angeles").unwrap()
    }

    #[tokio::test]
    async fn once_job_deactivates_after_firing() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let scheduler = Scheduler::load(store).await.unwrap();
        let id = scheduler
            .create_job("once in 1 minute", "say hi", 0, tz())
            .await
            .unwrap();
        let (input, mut rx) = crate::queue::input_queue();
        scheduler.tick(Some(1000), tz(), &input).await;
        let msg = rx.recv().await.unwrap();
        assert_eq!(msg.text, "say hi");
        let jobs = scheduler.list_jobs().await;
        assert_eq!(jobs.iter().find(|j| j.id == id).unwrap().active, false);
    }

    #[tokio::test]
    async fn periodic_job_skips_missed_intervals() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let scheduler = Scheduler::load(store).await.unwrap();
        scheduler
            .create_job("every 60 minute", "tick", 0, tz())
            .await
            .unwrap();
        let (input, _rx) = crate::queue::input_queue();
        // Simulate a long gap offline: 10 intervals elapsed.
        scheduler.tick(Some(60 * 60 * 11), tz(), &input).await;
        let jobs = scheduler.list_jobs().await;
        assert!(jobs[0].next_fire_epoch > 60 * 60 * 11);
    }

    #[tokio::test]
    async fn dst_fall_back_daily_job_spans_25_hours() {
        // 2024-11-02 09:00 local America/Los_Angeles (PDT, UTC-7).
        let creation = chrono::Utc
            .with_ymd_and_hms(2024, 11, 2, 16, 0, 0)
            .unwrap()
            .timestamp();
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let scheduler = Scheduler::load(store).await.unwrap();
        scheduler
            .create_job("every day at 08:15", "good morning", creation, tz())
            .await
            .unwrap();
        let jobs = scheduler.list_jobs().await;
        let first_fire = jobs[0].next_fire_epoch;

        let (input, _rx) = crate::queue::input_queue();
        scheduler.tick(Some(first_fire), tz(), &input).await;
        let jobs = scheduler.list_jobs().await;
        let second_fire = jobs[0].next_fire_epoch;

        // Fall-back day, so the local-time gap is 25 hours, not 24.
        assert_eq!(second_fire - first_fire, 25 * 3600);
    }

    #[tokio::test]
    async fn deleted_job_id_is_not_reused_after_reboot() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let scheduler = Scheduler::load(store.clone()).await.unwrap();
        scheduler.create_job("once in 1 minute", "a", 0, tz()).await.unwrap();
        scheduler.create_job("once in 1 minute", "b", 0, tz()).await.unwrap();
        let third = scheduler
            .create_job("once in 1 minute", "c", 0, tz())
            .await
            .unwrap();
        scheduler.delete_job(third).await.unwrap();

        let rebooted = Scheduler::load(store).await.unwrap();
        let id = rebooted
            .create_job("once in 1 minute", "d", 0, tz())
            .await
            .unwrap();
        assert!(id > third, "id {id} must not reuse deleted id {third}");
    }

    #[tokio::test]
    async fn tick_without_synced_clock_is_a_no_op() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let scheduler = Scheduler::load(store).await.unwrap();
        scheduler
            .create_job("once in 1 minute", "say hi", 0, tz())
            .await
            .unwrap();
        let (input, mut rx) = crate::queue::input_queue();
        scheduler.tick(None, tz(), &input).await;
        assert!(rx.try_recv().is_none());
    }
}
