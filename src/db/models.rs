//! Database model types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A monitored endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Monitor {
    pub id: i64,
    pub name: String,
    /// Where the monitor points (URL, hostname, container name...).
    pub url: String,
}

/// A single up/down observation for a monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Heartbeat {
    pub monitor_id: i64,
    pub time: DateTime<Utc>,
    pub is_up: bool,
}

impl Heartbeat {
    pub fn up(monitor_id: i64, time: DateTime<Utc>) -> Self {
        Self { monitor_id, time, is_up: true }
    }

    pub fn down(monitor_id: i64, time: DateTime<Utc>) -> Self {
        Self { monitor_id, time, is_up: false }
    }
}
