//! Boot-health tracking and safe-mode entry (spec §3 `BootHealth`, §4.J).

use crate::store::{namespace, Store};
use std::sync::Arc;
use std::time::Duration;

/// Consecutive failed boots at or above this threshold enters safe mode.
pub const MAX_BOOT_FAILURES: u32 = 3;

/// How long the system must run uninterrupted before a boot counts as
/// successful and the failure counter resets.
pub const BOOT_SUCCESS_DELAY: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BootHealth {
    pub consecutive_failed_boots: u32,
    pub last_success_epoch: i64,
}

/// Whether this boot should run the full subsystem set or the degraded
/// safe-mode branch (spec §4.J, §9): channels stay up, LLM and scheduler
/// are disabled, and any input gets a single informational reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootDecision {
    Normal,
    SafeMode,
}

pub const SAFE_MODE_MESSAGE: &str =
    "Running in safe mode after repeated boot failures; LLM and scheduler are disabled.";

/// Increment the failed-boot counter and decide whether this boot enters
/// safe mode. Call [`mark_stable`] once the system has run uninterrupted
/// for [`BOOT_SUCCESS_DELAY`] to reset the counter.
pub async fn record_boot_attempt(store: &Arc<dyn Store>) -> Result<BootDecision, crate::store::StoreError> {
    let health = load(store).await?;
    let failed = health.consecutive_failed_boots + 1;
    persist(store, failed, health.last_success_epoch).await?;

    if failed >= MAX_BOOT_FAILURES {
        log::error!("boot failure count {failed} reached safe-mode threshold");
        Ok(BootDecision::SafeMode)
    } else {
        Ok(BootDecision::Normal)
    }
}

/// Called after [`BOOT_SUCCESS_DELAY`] of uninterrupted operation; resets
/// the failure counter and records the success epoch.
pub async fn mark_stable(store: &Arc<dyn Store>, now_epoch: i64) -> Result<(), crate::store::StoreError> {
    persist(store, 0, now_epoch).await
}

pub async fn load(store: &Arc<dyn Store>) -> Result<BootHealth, crate::store::StoreError> {
    let failed = store
        .get_string(namespace::BOOT, "failed")
        .await?
        .and_then(|s| s.parse().ok())
        .unwrap_or(0);
    let last_success = store
        .get_string(namespace::BOOT, "last_ok")
        .await?
        .and_then(|s| s.parse().ok())
        .unwrap_or(0);
    Ok(BootHealth {
        consecutive_failed_boots: failed,
        last_success_epoch: last_success,
    })
}

async fn persist(
    store: &Arc<dyn Store>,
    failed: u32,
    last_success: i64,
) -> Result<(), crate::store::StoreError> {
    store.put_string(namespace::BOOT, "failed", &failed.to_string()).await?;
    store
        .put_string(namespace::BOOT, "last_ok", &last_success.to_string())
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;

    #[tokio::test]
    async fn enters_safe_mode_after_three_failed_boots() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        assert_eq!(record_boot_attempt(&store).await.unwrap(), BootDecision::Normal);
        assert_eq!(record_boot_attempt(&store).await.unwrap(), BootDecision::Normal);
        assert_eq!(record_boot_attempt(&store).await.unwrap(), BootDecision::SafeMode);
    }

    #[tokio::test]
    async fn mark_stable_resets_the_counter() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        record_boot_attempt(&store).await.unwrap();
        record_boot_attempt(&store).await.unwrap();
        mark_stable(&store, 1_000).await.unwrap();
        let health = load(&store).await.unwrap();
        assert_eq!(health.consecutive_failed_boots, 0);
        assert_eq!(health.last_success_epoch, 1_000);
        assert_eq!(record_boot_attempt(&store).await.unwrap(), BootDecision::Normal);
    }
}
