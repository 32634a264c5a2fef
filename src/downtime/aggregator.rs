//! Fan-out of per-monitor folds with bounded parallelism.

use super::{
    fold_monitor, DowntimeError, DowntimeReport, DowntimeWindow, HeartbeatSource, MonitorDowntime,
    MonitorSource, PublishError, ReportSink,
};
use crate::db::DbError;

use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// Computes downtime reports across every monitor.
pub struct DowntimeAggregator {
    monitors: Arc<dyn MonitorSource>,
    heartbeats: Arc<dyn HeartbeatSource>,
    max_concurrent_fetches: usize,
}

impl DowntimeAggregator {
    pub fn new(
        monitors: Arc<dyn MonitorSource>,
        heartbeats: Arc<dyn HeartbeatSource>,
        max_concurrent_fetches: usize,
    ) -> Self {
        Self {
            monitors,
            heartbeats,
            max_concurrent_fetches: max_concurrent_fetches.max(1),
        }
    }

    /// Run one pass over `window`.
    ///
    /// Monitors are fetched and folded concurrently, at most
    /// `max_concurrent_fetches` at a time. The report lists intervals and
    /// totals in monitor listing order whatever order the fetches finish in.
    /// If any monitor's fetch fails the whole pass fails, naming it.
    pub async fn compute(&self, window: DowntimeWindow) -> Result<DowntimeReport, DowntimeError> {
        let started = Instant::now();

        let source = self.monitors.clone();
        let monitors = tokio::task::spawn_blocking(move || source.list_monitors())
            .await
            .map_err(|e| DowntimeError::WorkerPool(e.to_string()))?
            .map_err(DowntimeError::ListMonitors)?;

        tracing::info!(
            "Computing downtime for {} monitors between {} and {}",
            monitors.len(),
            window.start(),
            window.end()
        );

        let semaphore = Arc::new(Semaphore::new(self.max_concurrent_fetches));
        let mut slots: Vec<Option<MonitorDowntime>> = vec![None; monitors.len()];
        let mut tasks: JoinSet<(usize, Result<MonitorDowntime, DbError>)> = JoinSet::new();

        for (slot, monitor) in monitors.iter().cloned().enumerate() {
            let permit = semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|e| DowntimeError::WorkerPool(e.to_string()))?;
            let heartbeats = self.heartbeats.clone();

            tasks.spawn_blocking(move || {
                let _permit = permit;
                let result = heartbeats
                    .heartbeats_in_range(monitor.id, window.start(), window.end())
                    .map(|hbs| {
                        let folded = fold_monitor(&monitor, &window, &hbs);
                        tracing::debug!(
                            "Folded {} heartbeats for {}: {} intervals, {} down",
                            hbs.len(),
                            monitor.name,
                            folded.intervals.len(),
                            folded.total.total_downtime
                        );
                        folded
                    });
                (slot, result)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            let (slot, result) = joined.map_err(|e| DowntimeError::WorkerPool(e.to_string()))?;
            match result {
                Ok(folded) => slots[slot] = Some(folded),
                Err(source) => {
                    let monitor = &monitors[slot];
                    tracing::error!(
                        "Downtime pass failed on monitor {} ({}): {}",
                        monitor.id,
                        monitor.name,
                        source
                    );
                    tasks.abort_all();
                    return Err(DowntimeError::Fetch {
                        monitor_id: monitor.id,
                        monitor_name: monitor.name.clone(),
                        source,
                    });
                }
            }
        }

        let mut intervals = Vec::new();
        let mut totals = Vec::with_capacity(slots.len());
        for folded in slots.into_iter().flatten() {
            intervals.extend(folded.intervals);
            totals.push(folded.total);
        }

        tracing::info!(
            "Downtime pass finished in {:?}: {} intervals across {} monitors",
            started.elapsed(),
            intervals.len(),
            totals.len()
        );

        Ok(DowntimeReport {
            window_start: window.start(),
            window_end: window.end(),
            intervals,
            totals,
        })
    }

    /// Compute a report and hand it to `sink` for `requester`.
    pub async fn publish(
        &self,
        window: DowntimeWindow,
        requester: &str,
        sink: &dyn ReportSink,
    ) -> Result<(), PublishError> {
        let report = self.compute(window).await?;
        sink.emit(requester, report)?;
        Ok(())
    }
}
