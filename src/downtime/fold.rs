//! Per-monitor fold from heartbeats to downtime intervals.

use super::{DowntimeInterval, DowntimeWindow, TotalDowntime};
use crate::db::{Heartbeat, Monitor};

use chrono::{DateTime, Utc};

/// Observed link state of a monitor while walking its heartbeats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Up,
    Down { since: DateTime<Utc> },
}

impl LinkState {
    /// Feed one heartbeat. On recovery the closed `(down_at, up_at)` span is
    /// returned alongside the new state; a repeated status changes nothing.
    pub fn observe(
        self,
        at: DateTime<Utc>,
        is_up: bool,
    ) -> (LinkState, Option<(DateTime<Utc>, DateTime<Utc>)>) {
        match (self, is_up) {
            (LinkState::Up, false) => (LinkState::Down { since: at }, None),
            (LinkState::Down { since }, true) => (LinkState::Up, Some((since, at))),
            (state, _) => (state, None),
        }
    }
}

/// Result of folding one monitor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorDowntime {
    pub intervals: Vec<DowntimeInterval>,
    pub total: TotalDowntime,
}

/// Fold a monitor's heartbeats (oldest first) into downtime intervals.
///
/// A monitor still down when the window closes gets a final interval ending
/// at the window end. A monitor already down when the window opens starts
/// its first interval at the first down heartbeat inside the window, not at
/// the window start.
pub fn fold_monitor(
    monitor: &Monitor,
    window: &DowntimeWindow,
    heartbeats: &[Heartbeat],
) -> MonitorDowntime {
    let mut state = LinkState::Up;
    let mut intervals = Vec::new();
    let mut total_seconds: i64 = 0;

    for hb in heartbeats {
        if !window.contains(hb.time) {
            tracing::debug!(
                "Skipping heartbeat for {} at {} outside window",
                monitor.name,
                hb.time
            );
            continue;
        }

        let (next, closed) = state.observe(hb.time, hb.is_up);
        state = next;

        if let Some((down_at, up_at)) = closed {
            let interval = make_interval(monitor, down_at, up_at, false);
            total_seconds += interval.duration_seconds;
            intervals.push(interval);
        }
    }

    if let LinkState::Down { since } = state {
        let interval = make_interval(monitor, since, window.end(), true);
        total_seconds += interval.duration_seconds;
        intervals.push(interval);
    }

    MonitorDowntime {
        intervals,
        total: TotalDowntime {
            monitor_id: monitor.id,
            monitor_name: monitor.name.clone(),
            monitor_url: monitor.url.clone(),
            total_seconds,
            total_downtime: format_duration(total_seconds),
        },
    }
}

fn make_interval(
    monitor: &Monitor,
    down_at: DateTime<Utc>,
    up_at: DateTime<Utc>,
    ongoing: bool,
) -> DowntimeInterval {
    // Whole seconds; the total is summed from these same values.
    let duration_seconds = (up_at - down_at).num_seconds().max(0);

    DowntimeInterval {
        monitor_id: monitor.id,
        monitor_name: monitor.name.clone(),
        monitor_url: monitor.url.clone(),
        down_at,
        up_at,
        duration_seconds,
        duration: format_duration(duration_seconds),
        ongoing,
    }
}

/// Format seconds as `HH:MM:SS`. Hours keep counting past 24.
pub fn format_duration(seconds: i64) -> String {
    let seconds = seconds.max(0);
    format!(
        "{:02}:{:02}:{:02}",
        seconds / 3600,
        (seconds % 3600) / 60,
        seconds % 60
    )
}
