//! # Journal Records
//!
//! The three record kinds the server keeps and their line grammar on disk.
//!
//! ```text
//! telemetry:  2024-01-01 12:00:00 -- bVolt: 3.9, rssi: -67
//! server log: 2024-01-01 12:00:00 -- [context] -- info
//! device log: 2024-01-01 12:00:00 -- opaque device text
//! ```
//!
//! Every line starts with a second-precision timestamp followed by the
//! ` -- ` separator. Free text is flattened to a single line when rendered.

use chrono::NaiveDateTime;
use serde::Serialize;
use thiserror::Error;

/// Timestamp format used on disk and in every JSON payload.
///
/// Lexicographic order of formatted timestamps equals chronological order.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Separator between the timestamp and the payload of a line
pub const FIELD_SEPARATOR: &str = " -- ";

/// Why a line could not be read back
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LineError {
    #[error("missing ' -- ' separator")]
    MissingSeparator,

    #[error("invalid timestamp '{0}'")]
    Timestamp(String),

    #[error("missing field '{0}'")]
    MissingField(&'static str),

    #[error("invalid value '{value}' for field '{field}'")]
    InvalidValue { field: &'static str, value: String },
}

/// A record that can be journaled as one text line
pub trait LogRecord: Clone + Send + Sync + 'static {
    /// Moment the record was created
    fn timestamp(&self) -> NaiveDateTime;

    /// Render as a single line without trailing newline
    fn to_line(&self) -> String;

    /// Parse a line produced by [`LogRecord::to_line`]
    fn parse_line(line: &str) -> Result<Self, LineError>;
}

/// Format a timestamp the way it is stored
pub fn format_timestamp(timestamp: &NaiveDateTime) -> String {
    timestamp.format(TIMESTAMP_FORMAT).to_string()
}

/// Parse a stored timestamp
pub fn parse_timestamp(text: &str) -> Result<NaiveDateTime, LineError> {
    NaiveDateTime::parse_from_str(text, TIMESTAMP_FORMAT)
        .map_err(|_| LineError::Timestamp(text.to_string()))
}

fn split_timestamp(line: &str) -> Result<(NaiveDateTime, &str), LineError> {
    let (timestamp, rest) = line
        .split_once(FIELD_SEPARATOR)
        .ok_or(LineError::MissingSeparator)?;
    Ok((parse_timestamp(timestamp)?, rest))
}

fn single_line(text: &str) -> String {
    text.replace(['\r', '\n'], " ")
}

mod timestamp_text {
    use super::format_timestamp;
    use chrono::NaiveDateTime;
    use serde::Serializer;

    pub fn serialize<S: Serializer>(ts: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format_timestamp(ts))
    }
}

/// One battery/signal observation reported by the device
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TelemetrySample {
    #[serde(with = "timestamp_text")]
    pub timestamp: NaiveDateTime,
    pub battery_voltage: f64,
    pub rssi: i32,
}

impl TelemetrySample {
    pub fn new(timestamp: NaiveDateTime, battery_voltage: f64, rssi: i32) -> Self {
        Self { timestamp, battery_voltage, rssi }
    }

    /// Timestamp in its stored text form
    pub fn timestamp_text(&self) -> String {
        format_timestamp(&self.timestamp)
    }
}

impl LogRecord for TelemetrySample {
    fn timestamp(&self) -> NaiveDateTime {
        self.timestamp
    }

    fn to_line(&self) -> String {
        // `{:?}` keeps the decimal point on whole voltages ("4.0", not "4").
        format!(
            "{}{}bVolt: {:?}, rssi: {}",
            format_timestamp(&self.timestamp),
            FIELD_SEPARATOR,
            self.battery_voltage,
            self.rssi
        )
    }

    fn parse_line(line: &str) -> Result<Self, LineError> {
        let (timestamp, rest) = split_timestamp(line)?;
        let (volt_field, rssi_field) = rest
            .split_once(", ")
            .ok_or(LineError::MissingField("rssi"))?;

        let volt_text = volt_field
            .strip_prefix("bVolt: ")
            .ok_or(LineError::MissingField("bVolt"))?;
        let rssi_text = rssi_field
            .strip_prefix("rssi: ")
            .ok_or(LineError::MissingField("rssi"))?;

        let battery_voltage = volt_text
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .ok_or_else(|| LineError::InvalidValue {
                field: "bVolt",
                value: volt_text.to_string(),
            })?;
        let rssi = rssi_text.trim().parse::<i32>().map_err(|_| LineError::InvalidValue {
            field: "rssi",
            value: rssi_text.to_string(),
        })?;

        Ok(Self { timestamp, battery_voltage, rssi })
    }
}

/// Server activity record shown at `/server/log`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogEntry {
    #[serde(with = "timestamp_text")]
    pub timestamp: NaiveDateTime,
    pub context: String,
    pub info: String,
}

impl LogEntry {
    pub fn new(timestamp: NaiveDateTime, context: impl Into<String>, info: impl Into<String>) -> Self {
        Self {
            timestamp,
            context: context.into(),
            info: info.into(),
        }
    }
}

impl LogRecord for LogEntry {
    fn timestamp(&self) -> NaiveDateTime {
        self.timestamp
    }

    fn to_line(&self) -> String {
        // A ']' inside the context would end the bracket early on read-back.
        format!(
            "{}{}[{}]{}{}",
            format_timestamp(&self.timestamp),
            FIELD_SEPARATOR,
            single_line(&self.context).replace(']', ")"),
            FIELD_SEPARATOR,
            single_line(&self.info)
        )
    }

    fn parse_line(line: &str) -> Result<Self, LineError> {
        let (timestamp, rest) = split_timestamp(line)?;
        let rest = rest.strip_prefix('[').ok_or(LineError::MissingField("context"))?;
        let (context, info) = rest
            .split_once(&format!("]{}", FIELD_SEPARATOR))
            .ok_or(LineError::MissingField("info"))?;

        Ok(Self {
            timestamp,
            context: context.to_string(),
            info: info.to_string(),
        })
    }
}

/// Opaque log text posted by the device
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceLogEntry {
    #[serde(with = "timestamp_text")]
    pub timestamp: NaiveDateTime,
    pub message: String,
}

impl DeviceLogEntry {
    pub fn new(timestamp: NaiveDateTime, message: impl Into<String>) -> Self {
        Self {
            timestamp,
            message: message.into(),
        }
    }
}

impl LogRecord for DeviceLogEntry {
    fn timestamp(&self) -> NaiveDateTime {
        self.timestamp
    }

    fn to_line(&self) -> String {
        format!(
            "{}{}{}",
            format_timestamp(&self.timestamp),
            FIELD_SEPARATOR,
            single_line(&self.message)
        )
    }

    fn parse_line(line: &str) -> Result<Self, LineError> {
        let (timestamp, message) = split_timestamp(line)?;
        Ok(Self {
            timestamp,
            message: message.to_string(),
        })
    }
}
