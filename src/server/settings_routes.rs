//! `/settings/*`: runtime changes to the display settings.
//!
//! Bodies are parsed loosely as JSON objects so that a missing or mistyped
//! field produces the same `{"status": "error"}` answer as a rejected value.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};

use super::{ApiError, AppState};
use crate::settings::Settings;

type SettingsResult = Result<Json<Value>, ApiError>;

fn body(payload: Result<Json<Value>, JsonRejection>) -> Result<Value, ApiError> {
    payload
        .map(|Json(value)| value)
        .map_err(|rejection| ApiError::bad_request(rejection.body_text()))
}

fn required<'a>(body: &'a Value, field: &str) -> Result<&'a Value, ApiError> {
    body.get(field)
        .filter(|value| !value.is_null())
        .ok_or_else(|| ApiError::bad_request(format!("{} is required", field)))
}

fn optional_f64(body: &Value, field: &str) -> Result<Option<f64>, ApiError> {
    match body.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => value
            .as_f64()
            .map(Some)
            .ok_or_else(|| ApiError::bad_request(format!("{} must be a number", field))),
    }
}

fn settings_json(settings: &Settings) -> Value {
    json!({
        "config_image_path": settings.image_path,
        "config_refresh_time": settings.refresh_time,
        "config_manipulate_image": settings.image_modification,
        "battery_max_voltage": settings.battery_max_voltage,
        "battery_min_voltage": settings.battery_min_voltage,
        "time_zone": settings.time_zone,
        "footer_background": settings.footer_background,
    })
}

pub async fn current(State(state): State<AppState>) -> Json<Value> {
    Json(settings_json(&state.service.settings().snapshot()))
}

pub async fn refresh_time(
    State(state): State<AppState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> SettingsResult {
    let body = body(payload)?;
    let refresh_rate = required(&body, "refresh_rate")?
        .as_u64()
        .and_then(|value| u32::try_from(value).ok())
        .ok_or_else(|| ApiError::bad_request("refresh_rate must be a positive integer"))?;

    let settings = state.service.settings().set_refresh_time(refresh_rate)?;
    Ok(Json(json!({ "status": "success", "refresh_rate": settings.refresh_time })))
}

pub async fn image_path(
    State(state): State<AppState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> SettingsResult {
    let body = body(payload)?;
    let bmp_path = required(&body, "bmp_path")?
        .as_str()
        .ok_or_else(|| ApiError::bad_request("bmp_path must be a string"))?;

    let settings = state.service.settings().set_image_path(bmp_path.to_string())?;
    Ok(Json(json!({ "status": "success", "bmp_path": settings.image_path })))
}

pub async fn image_modification(
    State(state): State<AppState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> SettingsResult {
    let body = body(payload)?;
    let enabled = required(&body, "image_modification")?
        .as_bool()
        .ok_or_else(|| ApiError::bad_request("image_modification must be a boolean"))?;

    let settings = state.service.settings().set_image_modification(enabled)?;
    Ok(Json(json!({
        "status": "success",
        "image_modification": settings.image_modification,
    })))
}

pub async fn battery(
    State(state): State<AppState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> SettingsResult {
    let body = body(payload)?;
    let max = optional_f64(&body, "battery_max_voltage")?;
    let min = optional_f64(&body, "battery_min_voltage")?;
    if max.is_none() && min.is_none() {
        return Err(ApiError::bad_request(
            "battery_max_voltage or battery_min_voltage is required",
        ));
    }

    let settings = state.service.settings().set_battery_bounds(max, min)?;
    Ok(Json(json!({
        "status": "success",
        "battery_max_voltage": settings.battery_max_voltage,
        "battery_min_voltage": settings.battery_min_voltage,
    })))
}

pub async fn time_zone(
    State(state): State<AppState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> SettingsResult {
    let body = body(payload)?;
    let time_zone = required(&body, "time_zone")?
        .as_str()
        .ok_or_else(|| ApiError::bad_request("time_zone must be a string"))?;

    let settings = state.service.settings().set_time_zone(time_zone.to_string())?;
    Ok(Json(json!({ "status": "success", "time_zone": settings.time_zone })))
}
