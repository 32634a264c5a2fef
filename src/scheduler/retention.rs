//! Retention manager for pruning old heartbeats.

use crate::db::Store;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

/// Manager for deleting heartbeats past the retention period.
pub struct RetentionManager {
    store: Arc<Store>,
    retention_days: u32,
    stop: broadcast::Sender<()>,
}

impl RetentionManager {
    pub fn new(store: Arc<Store>, retention_days: u32) -> Self {
        let (stop, _) = broadcast::channel(1);
        Self {
            store,
            retention_days,
            stop,
        }
    }

    /// Start the retention manager background task. Returns `None` when
    /// retention is disabled.
    pub fn start(&self) -> Option<JoinHandle<()>> {
        if self.retention_days == 0 {
            tracing::info!("RetentionManager: Retention disabled, keeping all heartbeats");
            return None;
        }

        let store = self.store.clone();
        let retention_days = self.retention_days;
        // Subscribed before spawning so a stop sent right after start is seen.
        let mut rx = self.stop.subscribe();

        Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(3600));

            loop {
                tokio::select! {
                    _ = rx.recv() => break,
                    _ = interval.tick() => {
                        let store = store.clone();
                        let now = Utc::now();
                        if let Err(e) = tokio::task::spawn_blocking(move || {
                            process_retention(&store, retention_days, now)
                        })
                        .await
                        {
                            tracing::error!("RetentionManager: Pruning task failed: {}", e);
                        }
                    }
                }
            }

            tracing::info!("RetentionManager: Stopped");
        }))
    }

    /// Stop the retention manager.
    pub fn stop(&self) {
        let _ = self.stop.send(());
    }
}

/// Delete heartbeats older than `retention_days` before `now`. Returns the
/// number of rows removed, zero on failure.
fn process_retention(store: &Store, retention_days: u32, now: DateTime<Utc>) -> usize {
    let cutoff = match ChronoDuration::try_days(i64::from(retention_days))
        .and_then(|span| now.checked_sub_signed(span))
    {
        Some(cutoff) => cutoff,
        // Nothing can be older than the earliest representable time.
        None => return 0,
    };

    match store.delete_heartbeats_before(cutoff) {
        Ok(removed) => {
            if removed > 0 {
                tracing::info!(
                    "RetentionManager: Pruned {} heartbeats older than {}",
                    removed,
                    cutoff
                );
            }
            removed
        }
        Err(e) => {
            tracing::error!("RetentionManager: Failed to prune heartbeats: {}", e);
            0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{Heartbeat, Monitor};
    use chrono::TimeZone;
    use tempfile::NamedTempFile;

    #[test]
    fn test_process_retention_prunes_only_old_rows() {
        let tmp = NamedTempFile::new().unwrap();
        let store = Store::new(tmp.path()).unwrap();
        let mut monitor = Monitor {
            name: "web".to_string(),
            ..Default::default()
        };
        let id = store.add_monitor(&mut monitor).unwrap();

        let now = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        store
            .add_heartbeats(&[
                Heartbeat::down(id, now - ChronoDuration::days(40)),
                Heartbeat::up(id, now - ChronoDuration::days(31)),
                Heartbeat::up(id, now - ChronoDuration::days(29)),
            ])
            .unwrap();

        assert_eq!(process_retention(&store, 30, now), 2);
        let left = store
            .get_heartbeats(id, now - ChronoDuration::days(365), now)
            .unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(process_retention(&store, 30, now), 0);
    }

    #[test]
    fn test_huge_retention_prunes_nothing() {
        let tmp = NamedTempFile::new().unwrap();
        let store = Store::new(tmp.path()).unwrap();
        let mut monitor = Monitor {
            name: "web".to_string(),
            ..Default::default()
        };
        let id = store.add_monitor(&mut monitor).unwrap();
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        store.add_heartbeat(&Heartbeat::up(id, now)).unwrap();

        assert_eq!(process_retention(&store, u32::MAX, now), 0);
    }

    #[tokio::test]
    async fn test_stop_right_after_start_ends_the_task() {
        let tmp = NamedTempFile::new().unwrap();
        let store = Arc::new(Store::new(tmp.path()).unwrap());
        let manager = RetentionManager::new(store, 7);

        let handle = manager.start().unwrap();
        manager.stop();

        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("retention task did not stop")
            .unwrap();
    }

    #[test]
    fn test_disabled_retention_does_not_spawn() {
        let tmp = NamedTempFile::new().unwrap();
        let store = Arc::new(Store::new(tmp.path()).unwrap());
        let manager = RetentionManager::new(store, 0);
        assert!(manager.start().is_none());
    }
}
