//! # Server Module
//!
//! HTTP surface of the e-paper server.
//!
//! This module handles:
//! - Routing of the device protocol (`/api/*`, `/image/*`)
//! - Operator endpoints (`/status`, `/server/*`, `/settings/*`)
//! - Plain or TLS serving with graceful shutdown

mod handlers;
mod settings_routes;
mod status;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use axum_server::tls_rustls::RustlsConfig;
use axum_server::Handle;
use serde_json::json;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use sysinfo::System;
use tracing::info;

use crate::config::resolve;
use crate::error::{Result, ServerError};
use crate::service::DisplayService;

/// State shared by all handlers
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<DisplayService>,
    system: Arc<Mutex<System>>,
}

impl AppState {
    pub fn new(service: Arc<DisplayService>) -> Self {
        let mut system = System::new();
        // First sample; usage is reported relative to the previous refresh.
        system.refresh_cpu_usage();
        Self {
            service,
            system: Arc::new(Mutex::new(system)),
        }
    }
}

/// Error body `{"status": "error", "message": ...}`
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }
}

impl From<ServerError> for ApiError {
    fn from(err: ServerError) -> Self {
        let status = match err {
            ServerError::Settings(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({ "status": "error", "message": self.message }));
        (self.status, body).into_response()
    }
}

/// All routes of the server
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/display", get(handlers::display))
        .route("/api/log", post(handlers::device_log))
        .route("/api/setup", get(handlers::setup))
        .route("/image/screen.bmp", get(handlers::screen))
        .route("/image/screen1.bmp", get(handlers::screen))
        .route("/image/original.bmp", get(handlers::original))
        .route("/image/original1.bmp", get(handlers::original))
        .route("/image/dummy.bmp", get(handlers::dummy))
        .route("/test/adapted_image.bmp", get(handlers::adapted_preview))
        .route("/server/log", get(handlers::server_log))
        .route("/server/battery", get(handlers::battery_history))
        .route("/status", get(status::status))
        .route("/settings", get(settings_routes::current))
        .route("/settings/refreshtime", post(settings_routes::refresh_time))
        .route("/settings/imagepath", post(settings_routes::image_path))
        .route("/settings/image_modification", post(settings_routes::image_modification))
        .route("/settings/battery", post(settings_routes::battery))
        .route("/settings/timezone", post(settings_routes::time_zone))
        .with_state(state)
}

/// Bind and serve until `shutdown` resolves, then drain connections for at
/// most `server.shutdown_grace_secs`.
///
/// # Errors
///
/// Returns error if the bind address is invalid, the TLS material cannot be
/// loaded or the listener fails.
pub async fn serve<F>(service: Arc<DisplayService>, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let server = service.config().server.clone();
    let addr: SocketAddr = format!("{}:{}", server.bind_address, server.port)
        .parse()
        .map_err(|e| ServerError::Config(format!("invalid bind address: {}", e)))?;

    let handle = Handle::new();
    let grace = Duration::from_secs(server.shutdown_grace_secs);
    tokio::spawn({
        let handle = handle.clone();
        async move {
            shutdown.await;
            info!("Shutting down HTTP server (grace {:?})", grace);
            handle.graceful_shutdown(Some(grace));
        }
    });

    let data_dir = service.data_dir().to_path_buf();
    let app = router(AppState::new(service)).into_make_service_with_connect_info::<SocketAddr>();

    if server.tls_enabled {
        let cert = resolve(&data_dir, &server.tls_cert);
        let key = resolve(&data_dir, &server.tls_key);
        let tls = RustlsConfig::from_pem_file(&cert, &key).await?;
        info!("Listening on https://{}", addr);
        axum_server::bind_rustls(addr, tls).handle(handle).serve(app).await?;
    } else {
        info!("Listening on http://{}", addr);
        axum_server::bind(addr).handle(handle).serve(app).await?;
    }

    info!("HTTP server stopped");
    Ok(())
}
