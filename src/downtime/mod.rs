//! Downtime aggregation.
//!
//! Turns each monitor's stored heartbeats into discrete downtime intervals
//! and a total per monitor, over a bounded `[start, end]` window.

mod aggregator;
mod fold;
mod sink;

pub use aggregator::*;
pub use fold::*;
pub use sink::*;

use crate::db::{DbError, Heartbeat, Monitor, Store};

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

/// Errors raised by a downtime pass.
#[derive(Error, Debug)]
pub enum DowntimeError {
    #[error("invalid window: start {start} is after end {end}")]
    InvalidWindow {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
    #[error("failed to list monitors: {0}")]
    ListMonitors(#[source] DbError),
    #[error("failed to fetch heartbeats for monitor {monitor_id} ({monitor_name}): {source}")]
    Fetch {
        monitor_id: i64,
        monitor_name: String,
        #[source]
        source: DbError,
    },
    #[error("worker pool error: {0}")]
    WorkerPool(String),
}

/// Failure to compute or deliver a report.
#[derive(Error, Debug)]
pub enum PublishError {
    #[error(transparent)]
    Downtime(#[from] DowntimeError),
    #[error(transparent)]
    Sink(#[from] SinkError),
}

/// A closed time range, `start <= end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DowntimeWindow {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl DowntimeWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, DowntimeError> {
        if start > end {
            return Err(DowntimeError::InvalidWindow { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    pub fn contains(&self, t: DateTime<Utc>) -> bool {
        self.start <= t && t <= self.end
    }
}

/// One contiguous span during which a monitor was observed down.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DowntimeInterval {
    pub monitor_id: i64,
    pub monitor_name: String,
    pub monitor_url: String,
    pub down_at: DateTime<Utc>,
    pub up_at: DateTime<Utc>,
    pub duration_seconds: i64,
    /// `HH:MM:SS`
    pub duration: String,
    /// The monitor was still down when the window closed; `up_at` is the
    /// window end, so the duration is a lower bound.
    pub ongoing: bool,
}

/// Sum of a monitor's downtime inside the window. Present for every
/// monitor, even with no downtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TotalDowntime {
    pub monitor_id: i64,
    pub monitor_name: String,
    pub monitor_url: String,
    pub total_seconds: i64,
    /// `HH:MM:SS`
    pub total_downtime: String,
}

/// The payload of a single pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DowntimeReport {
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub intervals: Vec<DowntimeInterval>,
    pub totals: Vec<TotalDowntime>,
}

/// Lists the monitors to include in a pass.
pub trait MonitorSource: Send + Sync {
    fn list_monitors(&self) -> Result<Vec<Monitor>, DbError>;
}

/// Range reads over stored heartbeats. Must tolerate concurrent calls.
pub trait HeartbeatSource: Send + Sync {
    /// Heartbeats with `start <= time <= end`, oldest first.
    fn heartbeats_in_range(
        &self,
        monitor_id: i64,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Heartbeat>, DbError>;
}

impl MonitorSource for Store {
    fn list_monitors(&self) -> Result<Vec<Monitor>, DbError> {
        self.get_monitors()
    }
}

impl HeartbeatSource for Store {
    fn heartbeats_in_range(
        &self,
        monitor_id: i64,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Heartbeat>, DbError> {
        self.get_heartbeats(monitor_id, start, end)
    }
}
