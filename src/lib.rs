//! downtrail - downtime reporting for heartbeat-monitored services.
//!
//! Folds each monitor's stored up/down heartbeats into downtime intervals
//! and per-monitor totals over a requested window.

pub mod config;
pub mod db;
pub mod downtime;
pub mod scheduler;
pub mod web;
