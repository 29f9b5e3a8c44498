//! # Telemetry Module
//!
//! Collection and persistence of everything the device reports.
//!
//! This module handles:
//! - The three journaled record kinds and their line grammar
//! - Bounded in-memory buffering with flush-at-capacity
//! - Append-only durable storage with tolerant read-back
//! - The last-known device snapshot and its recovery from history
//! - Derived battery and WiFi metrics

pub mod buffer;
pub mod journal;
pub mod query;
pub mod record;
pub mod state;
pub mod store;

pub use journal::{AppendOutcome, Journal};
pub use record::{DeviceLogEntry, LogEntry, LogRecord, TelemetrySample};
pub use state::{battery_state, wifi_quality, BatteryLevel, DeviceState, TelemetryReading, TelemetrySnapshot};
pub use store::LogStore;
