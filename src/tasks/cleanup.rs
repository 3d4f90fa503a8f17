//! TTL Cleanup Task
//!
//! Background task that periodically purges expired records from the
//! in-process cache engine. Index entries are left alone; readers skip the
//! stale ones.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cache::MemoryStore;

/// Spawns a background task that purges expired keys every
/// `cleanup_interval_secs` seconds.
///
/// Returns the task's JoinHandle so it can be aborted during graceful
/// shutdown.
///
/// # Example
/// ```ignore
/// let cache = Arc::new(MemoryStore::new());
/// let cleanup_handle = spawn_cleanup_task(cache.clone(), 1);
/// // Later, during shutdown:
/// cleanup_handle.abort();
/// ```
pub fn spawn_cleanup_task(cache: Arc<MemoryStore>, cleanup_interval_secs: u64) -> JoinHandle<()> {
    let interval = Duration::from_secs(cleanup_interval_secs.max(1));

    tokio::spawn(async move {
        info!(
            "Starting TTL cleanup task with interval of {} seconds",
            interval.as_secs()
        );

        loop {
            tokio::time::sleep(interval).await;

            match cache.purge_expired() {
                Ok(0) => debug!("TTL cleanup: no expired entries found"),
                Ok(removed) => info!("TTL cleanup: removed {} expired entries", removed),
                Err(e) => warn!(error = %e, "TTL cleanup failed"),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{KvConnection, SetMode};

    #[tokio::test]
    async fn test_cleanup_task_removes_expired_entries() {
        let cache = Arc::new(MemoryStore::new());
        cache
            .set(
                "user:object:1",
                "{}",
                Some(Duration::from_millis(500)),
                SetMode::Always,
            )
            .unwrap();

        let handle = spawn_cleanup_task(cache.clone(), 1);

        // Wait for entry to expire and cleanup to run
        tokio::time::sleep(Duration::from_millis(1500)).await;

        assert_eq!(cache.len().unwrap(), 0, "Expired entry should have been purged");
        assert_eq!(cache.stats().unwrap().expired, 1);

        handle.abort();
    }

    #[tokio::test]
    async fn test_cleanup_task_preserves_valid_entries() {
        let cache = Arc::new(MemoryStore::new());
        cache
            .set(
                "user:object:2",
                "{}",
                Some(Duration::from_secs(3600)),
                SetMode::Always,
            )
            .unwrap();
        cache.zadd("user:range:age", 30.0, "2").unwrap();

        let handle = spawn_cleanup_task(cache.clone(), 1);
        tokio::time::sleep(Duration::from_millis(1500)).await;

        assert_eq!(cache.get("user:object:2").unwrap(), Some("{}".to_string()));
        assert_eq!(cache.zcard("user:range:age").unwrap(), 1);

        handle.abort();
    }

    #[tokio::test]
    async fn test_cleanup_task_can_be_aborted() {
        let cache = Arc::new(MemoryStore::new());

        let handle = spawn_cleanup_task(cache, 1);
        handle.abort();

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(handle.is_finished(), "Task should be finished after abort");
    }
}
