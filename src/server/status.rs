//! `/status`: server health and the last known device state.

use axum::extract::State;
use axum::Json;
use serde::Serialize;
use std::sync::PoisonError;
use std::time::Duration;

use super::AppState;
use crate::telemetry::{battery_state, wifi_quality, BatteryLevel, TelemetrySample};

#[derive(Debug, Serialize)]
pub struct ServerStatus {
    pub uptime: String,
    pub cpu_load: f64,
    pub current_time: String,
}

#[derive(Debug, Serialize)]
pub struct ClientStatus {
    pub battery_voltage: f64,
    pub battery_voltage_max: f64,
    pub battery_voltage_min: f64,
    pub battery_state: BatteryLevel,
    pub wifi_signal: i32,
    pub wifi_signal_strength: u8,
    pub refresh_time: u32,
    pub last_contact: i64,
    pub current_image_url: String,
    pub current_image_url_adapted: String,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub server: ServerStatus,
    pub client: ClientStatus,
    pub client_data_db: Vec<TelemetrySample>,
}

/// `H:MM:SS`, prefixed with the day count once past 24 hours
fn format_uptime(uptime: Duration) -> String {
    let secs = uptime.as_secs();
    let (days, rest) = (secs / 86_400, secs % 86_400);
    let clock = format!("{}:{:02}:{:02}", rest / 3600, rest % 3600 / 60, rest % 60);
    match days {
        0 => clock,
        1 => format!("1 day, {}", clock),
        n => format!("{} days, {}", n, clock),
    }
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

impl AppState {
    fn cpu_load(&self) -> f64 {
        let mut system = self.system.lock().unwrap_or_else(PoisonError::into_inner);
        system.refresh_cpu_usage();
        round_to(f64::from(system.global_cpu_usage()), 1)
    }
}

pub async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    let service = &state.service;
    let settings = service.settings().snapshot();
    let snapshot = service.recovered_snapshot().await;
    let (original, composed) = service.rotation().current_paths();

    let server = ServerStatus {
        uptime: format_uptime(service.uptime()),
        cpu_load: state.cpu_load(),
        current_time: service.now().format("%Y-%m-%d %H:%M:%S").to_string(),
    };

    let client = ClientStatus {
        battery_voltage: round_to(snapshot.battery_voltage, 2),
        battery_voltage_max: settings.battery_max_voltage,
        battery_voltage_min: settings.battery_min_voltage,
        battery_state: battery_state(
            snapshot.battery_voltage,
            settings.battery_min_voltage,
            settings.battery_max_voltage,
        ),
        wifi_signal: snapshot.rssi,
        wifi_signal_strength: wifi_quality(snapshot.rssi),
        refresh_time: snapshot.refresh_rate,
        last_contact: snapshot.last_contact,
        current_image_url: service.url_for(original),
        current_image_url_adapted: service.url_for(composed),
    };

    Json(StatusResponse {
        server,
        client,
        client_data_db: service.telemetry().resident(),
    })
}
