//! Telemetry carried in poll request headers.

use axum::http::HeaderMap;
use std::str::FromStr;
use thiserror::Error;

use crate::telemetry::TelemetryReading;

pub const REFRESH_RATE: &str = "Refresh-Rate";
pub const BATTERY_VOLTAGE: &str = "Battery-Voltage";
pub const RSSI: &str = "RSSI";

/// Why a poll's telemetry headers were not ingested
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HeaderError {
    #[error("header '{0}' missing while other telemetry headers are present")]
    Missing(&'static str),

    #[error("header '{name}' has invalid value '{value}'")]
    Invalid { name: &'static str, value: String },
}

fn field<T: FromStr>(headers: &HeaderMap, name: &'static str) -> Result<T, HeaderError> {
    let raw = headers.get(name).ok_or(HeaderError::Missing(name))?;
    let text = raw.to_str().map_err(|_| HeaderError::Invalid {
        name,
        value: String::from_utf8_lossy(raw.as_bytes()).into_owned(),
    })?;
    text.trim().parse().map_err(|_| HeaderError::Invalid {
        name,
        value: text.to_string(),
    })
}

/// Extract the telemetry reading of a poll.
///
/// Returns `Ok(None)` when the request carries none of the telemetry
/// headers, and an error when it carries some but they are incomplete or
/// malformed.
pub fn parse_telemetry(headers: &HeaderMap) -> Result<Option<TelemetryReading>, HeaderError> {
    if [REFRESH_RATE, BATTERY_VOLTAGE, RSSI]
        .iter()
        .all(|name| !headers.contains_key(*name))
    {
        return Ok(None);
    }

    let battery_voltage: f64 = field(headers, BATTERY_VOLTAGE)?;
    if !battery_voltage.is_finite() {
        return Err(HeaderError::Invalid {
            name: BATTERY_VOLTAGE,
            value: battery_voltage.to_string(),
        });
    }

    Ok(Some(TelemetryReading {
        refresh_rate: field(headers, REFRESH_RATE)?,
        battery_voltage,
        rssi: field(headers, RSSI)?,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderName, HeaderValue};

    fn headers(pairs: &[(&'static str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(
                HeaderName::from_bytes(name.as_bytes()).unwrap(),
                HeaderValue::from_str(value).unwrap(),
            );
        }
        map
    }

    #[test]
    fn test_no_telemetry_headers() {
        let map = headers(&[("ID", "AA:BB:CC:DD:EE:FF")]);
        assert_eq!(parse_telemetry(&map), Ok(None));
    }

    #[test]
    fn test_complete_headers() {
        let map = headers(&[("Refresh-Rate", "900"), ("Battery-Voltage", "3.87"), ("RSSI", "-67")]);
        assert_eq!(
            parse_telemetry(&map),
            Ok(Some(TelemetryReading {
                refresh_rate: 900,
                battery_voltage: 3.87,
                rssi: -67,
            }))
        );
    }

    #[test]
    fn test_header_names_are_case_insensitive() {
        let map = headers(&[("refresh-rate", "60"), ("battery-voltage", "4"), ("rssi", "-50")]);
        let reading = parse_telemetry(&map).unwrap().unwrap();
        assert_eq!(reading.battery_voltage, 4.0);
    }

    #[test]
    fn test_partial_headers() {
        let map = headers(&[("Battery-Voltage", "3.9")]);
        assert_eq!(parse_telemetry(&map), Err(HeaderError::Missing(REFRESH_RATE)));
    }

    #[test]
    fn test_malformed_values() {
        let map = headers(&[("Refresh-Rate", "soon"), ("Battery-Voltage", "3.9"), ("RSSI", "-60")]);
        assert!(matches!(
            parse_telemetry(&map),
            Err(HeaderError::Invalid { name: "Refresh-Rate", .. })
        ));

        let map = headers(&[("Refresh-Rate", "900"), ("Battery-Voltage", "NaN"), ("RSSI", "-60")]);
        assert!(matches!(
            parse_telemetry(&map),
            Err(HeaderError::Invalid { name: "Battery-Voltage", .. })
        ));
    }
}
