//! Delivery of downtime reports to subscribers.
//!
//! Library-side delivery surface for embedders that push reports to
//! long-lived consumers via [`DowntimeAggregator::publish`]. The bundled
//! server does not route through it; `GET /api/downtime` returns the same
//! [`DowntimeReport`] payload directly in the response.
//!
//! [`DowntimeAggregator::publish`]: super::DowntimeAggregator::publish

use super::DowntimeReport;

use std::collections::HashMap;
use std::sync::RwLock;
use thiserror::Error;
use tokio::sync::mpsc;

/// Sink delivery errors.
#[derive(Error, Debug)]
pub enum SinkError {
    #[error("no subscriber registered for {0}")]
    NoSubscriber(String),
    #[error("subscriber {0} is not keeping up")]
    Full(String),
    #[error("subscriber {0} has gone away")]
    Closed(String),
}

/// Accepts a finished report for a requester.
pub trait ReportSink: Send + Sync {
    fn emit(&self, requester: &str, report: DowntimeReport) -> Result<(), SinkError>;
}

/// Push channels keyed by requester.
pub struct SubscriberHub {
    capacity: usize,
    subscribers: RwLock<HashMap<String, mpsc::Sender<DowntimeReport>>>,
}

impl SubscriberHub {
    /// Each subscriber gets a channel buffering up to `capacity` reports.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            subscribers: RwLock::new(HashMap::new()),
        }
    }

    /// Register `requester`, replacing any previous channel for it.
    pub fn subscribe(&self, requester: &str) -> mpsc::Receiver<DowntimeReport> {
        let (tx, rx) = mpsc::channel(self.capacity);
        let mut subscribers = self.subscribers.write().unwrap_or_else(|e| e.into_inner());
        subscribers.insert(requester.to_string(), tx);
        tracing::debug!("Subscriber {} registered", requester);
        rx
    }

    pub fn unsubscribe(&self, requester: &str) {
        let mut subscribers = self.subscribers.write().unwrap_or_else(|e| e.into_inner());
        subscribers.remove(requester);
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }
}

impl ReportSink for SubscriberHub {
    fn emit(&self, requester: &str, report: DowntimeReport) -> Result<(), SinkError> {
        let tx = {
            let subscribers = self.subscribers.read().unwrap_or_else(|e| e.into_inner());
            subscribers
                .get(requester)
                .cloned()
                .ok_or_else(|| SinkError::NoSubscriber(requester.to_string()))?
        };

        match tx.try_send(report) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!("Dropping downtime report for slow subscriber {}", requester);
                Err(SinkError::Full(requester.to_string()))
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.unsubscribe(requester);
                Err(SinkError::Closed(requester.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn report() -> DowntimeReport {
        let t = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        DowntimeReport {
            window_start: t,
            window_end: t,
            intervals: vec![],
            totals: vec![],
        }
    }

    #[test]
    fn test_emit_reaches_only_the_requester() {
        let hub = SubscriberHub::new(2);
        let mut a = hub.subscribe("a");
        let mut b = hub.subscribe("b");

        hub.emit("a", report()).unwrap();

        assert_eq!(tokio_test::block_on(a.recv()), Some(report()));
        assert!(b.try_recv().is_err());
    }

    #[test]
    fn test_emit_without_subscriber_is_an_error() {
        let hub = SubscriberHub::new(1);
        assert!(matches!(hub.emit("nobody", report()), Err(SinkError::NoSubscriber(_))));
    }

    #[test]
    fn test_full_channel_is_reported() {
        let hub = SubscriberHub::new(1);
        let _rx = hub.subscribe("slow");

        hub.emit("slow", report()).unwrap();
        assert!(matches!(hub.emit("slow", report()), Err(SinkError::Full(_))));
    }

    #[test]
    fn test_closed_subscriber_is_dropped() {
        let hub = SubscriberHub::new(1);
        drop(hub.subscribe("gone"));
        assert_eq!(hub.subscriber_count(), 1);

        assert!(matches!(hub.emit("gone", report()), Err(SinkError::Closed(_))));
        assert_eq!(hub.subscriber_count(), 0);
    }
}
