//! Persisted scheduler job record (spec §3 `ScheduledJob`).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobKind {
    Once,
    Daily { hour: u32, minute: u32 },
    Periodic { interval_secs: u32 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledJob {
    pub id: u64,
    pub kind: JobKind,
    pub trigger: String,
    pub action: String,
    pub next_fire_epoch: i64,
    pub creation_epoch: i64,
    pub active: bool,
}
