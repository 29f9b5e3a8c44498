//! # Telemetry State
//!
//! Last-known device snapshot plus the pure metrics derived from it.
//!
//! ## Battery state
//!
//! ```text
//! voltage > 4.6 V            -> Charging (external power)
//! otherwise                  -> clamp(0, 100, (v - min) / (max - min) * 100), one decimal
//! ```
//!
//! ## WiFi quality
//!
//! ```text
//! rssi <= -100 dBm           -> 0 %
//! rssi >=  -50 dBm           -> 100 %
//! otherwise                  -> 2 * (rssi + 100)
//! ```

use serde::{Serialize, Serializer};
use std::sync::{PoisonError, RwLock, RwLockWriteGuard};

/// Above this voltage the device runs on external power
pub const CHARGING_THRESHOLD_VOLTS: f64 = 4.6;

/// Value the charging state takes in JSON payloads
pub const CHARGING_SENTINEL: u8 = 255;

/// `last_contact` used when no telemetry exists anywhere (2025-01-01 00:00 CET)
pub const FALLBACK_LAST_CONTACT: i64 = 1_735_686_000;

/// Battery charge as shown to operators and drawn in the footer
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BatteryLevel {
    /// Charge in percent, 0.0 - 100.0
    Percent(f64),
    /// Voltage above [`CHARGING_THRESHOLD_VOLTS`]
    Charging,
}

impl BatteryLevel {
    pub fn is_charging(&self) -> bool {
        matches!(self, BatteryLevel::Charging)
    }
}

impl Serialize for BatteryLevel {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            BatteryLevel::Percent(pct) => serializer.serialize_f64(*pct),
            BatteryLevel::Charging => serializer.serialize_u8(CHARGING_SENTINEL),
        }
    }
}

/// Battery charge for `voltage` between the configured bounds.
///
/// # Examples
///
/// ```
/// use epaper_server::telemetry::state::{battery_state, BatteryLevel};
///
/// assert_eq!(battery_state(3.2, 2.3, 4.1), BatteryLevel::Percent(50.0));
/// assert_eq!(battery_state(5.0, 2.3, 4.1), BatteryLevel::Charging);
/// ```
pub fn battery_state(voltage: f64, min: f64, max: f64) -> BatteryLevel {
    if voltage > CHARGING_THRESHOLD_VOLTS {
        return BatteryLevel::Charging;
    }
    let span = max - min;
    if span <= 0.0 || !span.is_finite() || !voltage.is_finite() {
        return BatteryLevel::Percent(0.0);
    }
    let pct = ((voltage - min) / span * 1000.0).round() / 10.0;
    BatteryLevel::Percent(pct.clamp(0.0, 100.0))
}

/// WiFi link quality in percent for `rssi` in dBm.
///
/// # Examples
///
/// ```
/// use epaper_server::telemetry::state::wifi_quality;
///
/// assert_eq!(wifi_quality(-100), 0);
/// assert_eq!(wifi_quality(-75), 50);
/// assert_eq!(wifi_quality(-50), 100);
/// ```
pub fn wifi_quality(rssi: i32) -> u8 {
    if rssi <= -100 {
        0
    } else if rssi >= -50 {
        100
    } else {
        (2 * (rssi + 100)) as u8
    }
}

/// One telemetry reading as carried by a poll
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TelemetryReading {
    pub refresh_rate: u32,
    pub battery_voltage: f64,
    pub rssi: i32,
}

/// Last-known device state
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TelemetrySnapshot {
    pub refresh_rate: u32,
    pub battery_voltage: f64,
    pub rssi: i32,
    /// Unix epoch seconds of the last contact; 0 until the first poll or recovery
    pub last_contact: i64,
}

impl TelemetrySnapshot {
    pub fn has_contact(&self) -> bool {
        self.last_contact != 0
    }
}

/// Lock-guarded owner of the process-wide [`TelemetrySnapshot`]
#[derive(Debug)]
pub struct DeviceState {
    inner: RwLock<TelemetrySnapshot>,
}

impl DeviceState {
    pub fn new(initial: TelemetrySnapshot) -> Self {
        Self {
            inner: RwLock::new(initial),
        }
    }

    /// Consistent copy of all fields
    pub fn snapshot(&self) -> TelemetrySnapshot {
        *self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Exclusive access for read-modify-write sequences.
    ///
    /// Other readers block until the guard drops, so they observe either the
    /// old or the new snapshot, never a mix.
    pub fn write(&self) -> RwLockWriteGuard<'_, TelemetrySnapshot> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Overwrite all telemetry fields and the contact time as one unit.
    pub fn record(&self, reading: TelemetryReading, contact: i64) -> TelemetrySnapshot {
        let mut guard = self.write();
        apply_reading(&mut guard, reading, contact);
        *guard
    }

    /// Backfill from history when no poll has landed in this process lifetime.
    ///
    /// `latest` is only called when recovery is needed; it returns the last
    /// known `(battery_voltage, rssi, last_contact)`. Without any history the
    /// fixed sentinel is used.
    pub fn recover_with<F>(&self, latest: F) -> TelemetrySnapshot
    where
        F: FnOnce() -> Option<(f64, i32, i64)>,
    {
        let mut guard = self.write();
        if !guard.has_contact() {
            let (voltage, rssi, contact) = latest().unwrap_or((0.0, 0, FALLBACK_LAST_CONTACT));
            guard.battery_voltage = voltage;
            guard.rssi = rssi;
            guard.last_contact = contact;
        }
        *guard
    }
}

/// Apply a reading to a snapshot held under the write lock
pub fn apply_reading(snapshot: &mut TelemetrySnapshot, reading: TelemetryReading, contact: i64) {
    snapshot.refresh_rate = reading.refresh_rate;
    snapshot.battery_voltage = reading.battery_voltage;
    snapshot.rssi = reading.rssi;
    snapshot.last_contact = contact;
}
