//! Device protocol, image and journal endpoints.

use axum::extract::{ConnectInfo, Query, State};
use axum::http::{header, HeaderMap, Uri};
use axum::response::{IntoResponse, Response};
use axum::Json;
use bytes::Bytes;
use serde::Serialize;
use serde_json::{json, Value};
use std::net::SocketAddr;
use tracing::{debug, info, warn};

use super::{ApiError, AppState};
use crate::poll::rotation::DUMMY_PATH;
use crate::poll::{self, DisplayResponse};
use crate::telemetry::query::{HistoryParams, HistoryQuery};
use crate::telemetry::TelemetrySample;

const BMP_CONTENT_TYPE: &str = "image/bmp";

/// Header carrying the device MAC address on registration
const DEVICE_ID: &str = "ID";

fn bmp(bytes: impl Into<Bytes>) -> Response {
    ([(header::CONTENT_TYPE, BMP_CONTENT_TYPE)], bytes.into()).into_response()
}

fn peer(addr: &Option<ConnectInfo<SocketAddr>>) -> String {
    addr.as_ref()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

pub async fn display(State(state): State<AppState>, headers: HeaderMap, uri: Uri) -> Json<DisplayResponse> {
    let request_url = state.service.url_for(&uri.to_string());
    Json(poll::handle_poll(&state.service, &headers, &request_url).await)
}

pub async fn screen(
    State(state): State<AppState>,
    addr: Option<ConnectInfo<SocketAddr>>,
    uri: Uri,
) -> Result<Response, ApiError> {
    debug!("Serving composed image {} to {}", uri.path(), peer(&addr));
    Ok(bmp(poll::screen_bitmap(&state.service)?))
}

pub async fn original(
    State(state): State<AppState>,
    addr: Option<ConnectInfo<SocketAddr>>,
    uri: Uri,
) -> Result<Response, ApiError> {
    debug!("Serving original image {} to {}", uri.path(), peer(&addr));
    Ok(bmp(poll::original_bitmap(&state.service)?))
}

pub async fn dummy(State(state): State<AppState>) -> Result<Response, ApiError> {
    Ok(bmp(state.service.placeholder_bitmap()?))
}

pub async fn adapted_preview(State(state): State<AppState>) -> Result<Response, ApiError> {
    state
        .service
        .log_event("Request received at /test/adapted_image.bmp", "render preview")
        .await;
    Ok(bmp(poll::render_preview(&state.service).await?))
}

fn device_log_line(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

pub async fn device_log(State(state): State<AppState>, Json(body): Json<Value>) -> Json<Value> {
    let service = &state.service;
    service.log_event("Request received at /api/log", format!("Content: {}", body)).await;

    let entries = body
        .get("log")
        .and_then(|log| log.get("logs_array"))
        .and_then(Value::as_array);

    match entries {
        Some(entries) => {
            for entry in entries {
                if let Err(e) = service.record_device_log(device_log_line(entry)).await {
                    warn!("Could not journal device log entry: {}", e);
                }
            }
            info!("Stored {} device log entries", entries.len());
        }
        None => debug!("Device log request without log.logs_array"),
    }

    Json(json!({ "status": "logged" }))
}

/// Answer to `/api/setup`
#[derive(Debug, Serialize)]
pub struct SetupResponse {
    pub status: u16,
    pub api_key: Option<String>,
    pub friendly_id: Option<String>,
    pub image_url: Option<String>,
    pub message: String,
}

/// Last six hex digits of the MAC address, upper case
fn friendly_id(mac: &str) -> String {
    let digits: Vec<char> = mac
        .chars()
        .filter(char::is_ascii_hexdigit)
        .map(|c| c.to_ascii_uppercase())
        .collect();
    digits[digits.len().saturating_sub(6)..].iter().collect()
}

pub async fn setup(State(state): State<AppState>, headers: HeaderMap) -> Json<SetupResponse> {
    let service = &state.service;
    let mac = headers
        .get(DEVICE_ID)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty());

    let Some(mac) = mac else {
        service.log_event("Request received at /api/setup", "missing ID header").await;
        return Json(SetupResponse {
            status: 404,
            api_key: None,
            friendly_id: None,
            image_url: None,
            message: "ID header is required".to_string(),
        });
    };

    service.log_event("Request received at /api/setup", format!("ID: {}", mac)).await;
    Json(SetupResponse {
        status: 200,
        api_key: Some(String::new()),
        friendly_id: Some(friendly_id(mac)),
        image_url: Some(service.url_for(DUMMY_PATH)),
        message: format!("Device {} registered", mac),
    })
}

pub async fn server_log(State(state): State<AppState>) -> Result<Response, ApiError> {
    let n = state.service.config().storage.log_tail_lines;
    let lines = state.service.server_log_tail(n).await?;
    Ok(([(header::CONTENT_TYPE, "text/plain; charset=utf-8")], lines.join("\n")).into_response())
}

pub async fn battery_history(
    State(state): State<AppState>,
    Query(params): Query<HistoryParams>,
) -> Result<Json<Vec<TelemetrySample>>, ApiError> {
    let today = state.service.now().format("%Y-%m-%d").to_string();
    let query = HistoryQuery::from_params(&params, &today);
    let records = state.service.telemetry_history().await?;
    Ok(Json(query.apply(records)))
}
