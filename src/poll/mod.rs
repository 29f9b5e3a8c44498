//! # Poll Module
//!
//! The display's poll protocol.
//!
//! A poll runs through five phases:
//!
//! ```text
//! INGEST -> SELECT_SLOT -> LOAD_SOURCE -> COMPOSE_OR_PASSTHROUGH -> RESPOND
//! ```
//!
//! 1. **INGEST**: telemetry headers update the device snapshot and journal
//! 2. **SELECT_SLOT**: flip the URL slot, draw a generation number
//! 3. **LOAD_SOURCE**: fetch the configured image, placeholder on failure
//! 4. **COMPOSE_OR_PASSTHROUGH**: add the status footer (blocking pool) or
//!    serve the source unchanged
//! 5. **RESPOND**: publish the artifacts, answer with the slot's URL

pub mod artifacts;
pub mod headers;
pub mod rotation;
pub mod source;

use axum::http::HeaderMap;
use bytes::Bytes;
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::Result;
use crate::render::{self, FooterStyle};
use crate::service::{DisplayService, FOOTER_TIME_FORMAT};
use crate::settings::Settings;
use crate::telemetry::{battery_state, wifi_quality, BatteryLevel, TelemetrySnapshot};
use artifacts::ImageArtifacts;

/// JSON answer to `/api/display`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DisplayResponse {
    pub status: u8,
    pub image_url: String,
    pub update_firmware: bool,
    pub firmware_url: String,
    pub refresh_rate: u32,
    pub reset_firmware: bool,
    pub special_function: String,
}

/// Render request handed to the blocking pool
struct FooterJob {
    source: Vec<u8>,
    wifi_percent: u8,
    battery: BatteryLevel,
    timestamp_text: String,
    style: FooterStyle,
}

impl FooterJob {
    fn new(service: &DisplayService, settings: &Settings, snapshot: &TelemetrySnapshot, source: Vec<u8>) -> Self {
        Self {
            source,
            wifi_percent: wifi_quality(snapshot.rssi),
            battery: battery_state(
                snapshot.battery_voltage,
                settings.battery_min_voltage,
                settings.battery_max_voltage,
            ),
            timestamp_text: service.now().format(FOOTER_TIME_FORMAT).to_string(),
            style: service.footer_style(settings),
        }
    }

    async fn run(self) -> Result<Vec<u8>> {
        tokio::task::spawn_blocking(move || {
            render::compose(
                &self.source,
                self.wifi_percent,
                self.battery,
                &self.timestamp_text,
                &self.style,
            )
        })
        .await?
    }
}

fn headers_for_log(headers: &HeaderMap) -> String {
    let map: serde_json::Map<String, serde_json::Value> = headers
        .iter()
        .map(|(name, value)| {
            let text = String::from_utf8_lossy(value.as_bytes()).into_owned();
            (name.as_str().to_string(), serde_json::Value::String(text))
        })
        .collect();
    serde_json::Value::Object(map).to_string()
}

/// Handle one `/api/display` poll.
///
/// Never fails: unusable telemetry is skipped and a missing or broken
/// source image is replaced by the placeholder.
pub async fn handle_poll(service: &DisplayService, headers: &HeaderMap, request_url: &str) -> DisplayResponse {
    service
        .log_event(
            "Request received at /api/display",
            format!("Headers: {}, URL: {}", headers_for_log(headers), request_url),
        )
        .await;

    // INGEST
    match headers::parse_telemetry(headers) {
        Ok(Some(reading)) => match service.ingest(reading).await {
            Ok(outcome) => debug!("Telemetry ingested: {:?} ({:?})", reading, outcome),
            Err(e) => warn!("Could not journal telemetry sample: {}", e),
        },
        Ok(None) => {}
        Err(e) => {
            warn!("Ignoring telemetry of poll: {}", e);
            service.log_event("telemetry", format!("ignored headers: {}", e)).await;
        }
    }

    // SELECT_SLOT
    let (slot, generation) = service.rotation().advance();
    let settings = service.settings().snapshot();

    // LOAD_SOURCE
    let original = match service.source().fetch(&settings.image_path).await {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!("Could not load source image '{}': {}", settings.image_path, e);
            service
                .log_event(
                    "image source",
                    format!("loading '{}' failed, serving placeholder: {}", settings.image_path, e),
                )
                .await;
            placeholder_or_empty(service)
        }
    };

    // COMPOSE_OR_PASSTHROUGH
    let (original, composed) = if settings.image_modification {
        let snapshot = service.device().snapshot();
        let job = FooterJob::new(service, &settings, &snapshot, original.clone());
        match job.run().await {
            Ok(composed) => (original, composed),
            Err(e) => {
                warn!("Could not compose footer image: {}", e);
                service
                    .log_event("image modification", format!("composition failed: {}", e))
                    .await;
                let placeholder = placeholder_or_empty(service);
                (placeholder.clone(), placeholder)
            }
        }
    } else {
        (original.clone(), original)
    };

    // RESPOND
    let published = service.artifacts().publish(ImageArtifacts {
        original: Some(Bytes::from(original)),
        composed: Some(Bytes::from(composed)),
        slot: Some(slot),
        generation,
    });
    if !published {
        debug!("Poll generation {} superseded by a newer poll", generation);
    }

    let response = DisplayResponse {
        status: 0,
        image_url: service.url_for(slot.screen_path()),
        update_firmware: false,
        firmware_url: service.url_for(&service.config().display.firmware_path),
        refresh_rate: settings.refresh_time,
        reset_firmware: false,
        special_function: String::new(),
    };

    service
        .log_event(
            "send json /api/display",
            format!("response: {}", serde_json::to_string(&response).unwrap_or_default()),
        )
        .await;
    response
}

fn placeholder_or_empty(service: &DisplayService) -> Vec<u8> {
    service.placeholder_bitmap().unwrap_or_else(|e| {
        warn!("Could not render placeholder: {}", e);
        Vec::new()
    })
}

/// Held composed artifact, or the placeholder before the first poll
pub fn screen_bitmap(service: &DisplayService) -> Result<Bytes> {
    match service.artifacts().current().composed {
        Some(bytes) => Ok(bytes),
        None => Ok(Bytes::from(service.placeholder_bitmap()?)),
    }
}

/// Held original artifact, or the placeholder before the first poll
pub fn original_bitmap(service: &DisplayService) -> Result<Bytes> {
    match service.artifacts().current().original {
        Some(bytes) => Ok(bytes),
        None => Ok(Bytes::from(service.placeholder_bitmap()?)),
    }
}

/// Compose the held original against the current device state without
/// touching the held artifacts.
pub async fn render_preview(service: &DisplayService) -> Result<Vec<u8>> {
    let source = match service.artifacts().current().original {
        Some(bytes) => bytes.to_vec(),
        None => service.placeholder_bitmap()?,
    };
    let settings = service.settings().snapshot();
    let snapshot = service.recovered_snapshot().await;
    FooterJob::new(service, &settings, &snapshot, source).run().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ServerError;
    use crate::poll::rotation::Slot;
    use crate::poll::source::MockImageSource;
    use crate::service::testing::service;
    use axum::http::{HeaderName, HeaderValue};
    use image::{ImageFormat, Luma, GrayImage};
    use std::io::Cursor;
    use std::sync::Arc;
    use tempfile::tempdir;

    fn source_bmp() -> Vec<u8> {
        let img = GrayImage::from_fn(320, 200, |x, _| if x < 160 { Luma([0]) } else { Luma([255]) });
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, ImageFormat::Bmp).unwrap();
        out.into_inner()
    }

    fn telemetry_headers(voltage: &str) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in [("refresh-rate", "900"), ("battery-voltage", voltage), ("rssi", "-67")] {
            map.insert(HeaderName::from_static(name), HeaderValue::from_str(value).unwrap());
        }
        map
    }

    fn serving(bytes: Vec<u8>) -> MockImageSource {
        let mut source = MockImageSource::new();
        source.expect_fetch().returning(move |_| Ok(bytes.clone()));
        source
    }

    #[tokio::test]
    async fn test_poll_response_shape() {
        let dir = tempdir().unwrap();
        let svc = service(dir.path(), Settings::default(), serving(source_bmp()));

        let response = handle_poll(&svc, &HeaderMap::new(), "/api/display").await;
        assert_eq!(response.status, 0);
        assert_eq!(response.image_url, "http://10.0.0.2:1184/image/screen.bmp");
        assert_eq!(response.firmware_url, "http://10.0.0.2:1184/fw/update");
        assert_eq!(response.refresh_rate, 900);
        assert!(!response.update_firmware);
        assert!(!response.reset_firmware);
        assert_eq!(response.special_function, "");
    }

    #[tokio::test]
    async fn test_consecutive_polls_alternate_urls() {
        let dir = tempdir().unwrap();
        let svc = service(dir.path(), Settings::default(), serving(source_bmp()));

        let first = handle_poll(&svc, &HeaderMap::new(), "/api/display").await;
        let second = handle_poll(&svc, &HeaderMap::new(), "/api/display").await;
        let third = handle_poll(&svc, &HeaderMap::new(), "/api/display").await;
        assert!(first.image_url.ends_with("/image/screen.bmp"));
        assert!(second.image_url.ends_with("/image/screen1.bmp"));
        assert_eq!(first.image_url, third.image_url);
        assert_eq!(svc.artifacts().current().slot, Some(Slot::Primary));
    }

    #[tokio::test]
    async fn test_poll_ingests_telemetry() {
        let dir = tempdir().unwrap();
        let svc = service(dir.path(), Settings::default(), serving(source_bmp()));

        handle_poll(&svc, &telemetry_headers("3.91"), "/api/display").await;
        let snapshot = svc.device().snapshot();
        assert_eq!(snapshot.battery_voltage, 3.91);
        assert_eq!(snapshot.rssi, -67);
        assert!(snapshot.has_contact());
        assert_eq!(svc.telemetry().resident().len(), 1);
    }

    #[tokio::test]
    async fn test_malformed_telemetry_still_answers() {
        let dir = tempdir().unwrap();
        let svc = service(dir.path(), Settings::default(), serving(source_bmp()));

        let response = handle_poll(&svc, &telemetry_headers("flat"), "/api/display").await;
        assert_eq!(response.status, 0);
        assert!(!svc.device().snapshot().has_contact());
        assert!(svc.telemetry().resident().is_empty());
    }

    #[tokio::test]
    async fn test_composed_artifact_has_mono_palette() {
        let dir = tempdir().unwrap();
        let svc = service(dir.path(), Settings::default(), serving(source_bmp()));

        handle_poll(&svc, &HeaderMap::new(), "/api/display").await;
        let held = svc.artifacts().current();
        let composed = held.composed.unwrap();
        assert_eq!(&composed[54..62], &[0, 0, 0, 0, 255, 255, 255, 0]);
        assert_eq!(held.original.unwrap().to_vec(), source_bmp());
    }

    #[tokio::test]
    async fn test_passthrough_without_modification() {
        let dir = tempdir().unwrap();
        let settings = Settings {
            image_modification: false,
            ..Settings::default()
        };
        let svc = service(dir.path(), settings, serving(b"raw source".to_vec()));

        handle_poll(&svc, &HeaderMap::new(), "/api/display").await;
        let held = svc.artifacts().current();
        assert_eq!(held.composed.unwrap(), Bytes::from_static(b"raw source"));
        assert_eq!(held.original.unwrap(), Bytes::from_static(b"raw source"));
    }

    #[tokio::test]
    async fn test_missing_source_serves_placeholder() {
        let dir = tempdir().unwrap();
        let mut source = MockImageSource::new();
        source
            .expect_fetch()
            .returning(|_| Err(ServerError::Bitmap("gone".to_string())));
        let svc = service(dir.path(), Settings::default(), source);

        let response = handle_poll(&svc, &HeaderMap::new(), "/api/display").await;
        assert_eq!(response.status, 0);

        let held = svc.artifacts().current();
        let original = image::load_from_memory(&held.original.unwrap()).unwrap();
        assert_eq!((original.width(), original.height()), (800, 480));
        let composed = held.composed.unwrap();
        assert_eq!(&composed[54..62], &[0, 0, 0, 0, 255, 255, 255, 0]);

        let logged = svc.server_log().resident();
        assert!(logged.iter().any(|entry| entry.context == "image source"));
    }

    #[tokio::test]
    async fn test_undecodable_source_falls_back_to_placeholder() {
        let dir = tempdir().unwrap();
        let svc = service(dir.path(), Settings::default(), serving(b"not an image".to_vec()));

        handle_poll(&svc, &HeaderMap::new(), "/api/display").await;
        let composed = svc.artifacts().current().composed.unwrap();
        let decoded = image::load_from_memory(&composed).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (800, 480));
    }

    #[tokio::test]
    async fn test_settings_read_on_every_poll() {
        let dir = tempdir().unwrap();
        let svc = service(dir.path(), Settings::default(), serving(source_bmp()));

        handle_poll(&svc, &HeaderMap::new(), "/api/display").await;
        svc.settings().set_refresh_time(120).unwrap();
        let response = handle_poll(&svc, &HeaderMap::new(), "/api/display").await;
        assert_eq!(response.refresh_rate, 120);
    }

    #[tokio::test]
    async fn test_placeholder_before_first_poll() {
        let dir = tempdir().unwrap();
        let svc = service(dir.path(), Settings::default(), MockImageSource::new());

        let screen = screen_bitmap(&svc).unwrap();
        let original = original_bitmap(&svc).unwrap();
        assert_eq!(&screen[0..2], b"BM");
        assert_eq!(&original[54..62], &[0, 0, 0, 0, 255, 255, 255, 0]);
    }

    #[tokio::test]
    async fn test_preview_leaves_artifacts_untouched() {
        let dir = tempdir().unwrap();
        let svc = service(dir.path(), Settings::default(), serving(source_bmp()));

        handle_poll(&svc, &HeaderMap::new(), "/api/display").await;
        let before = svc.artifacts().current();

        let preview = render_preview(&svc).await.unwrap();
        assert_eq!(&preview[54..62], &[0, 0, 0, 0, 255, 255, 255, 0]);
        assert_eq!(svc.artifacts().current(), before);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_polls_hold_latest_generation() {
        let dir = tempdir().unwrap();
        let svc = Arc::new(service(dir.path(), Settings::default(), serving(source_bmp())));

        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let svc = Arc::clone(&svc);
                tokio::spawn(async move { handle_poll(&svc, &HeaderMap::new(), "/api/display").await })
            })
            .collect();
        for task in tasks {
            let response = task.await.unwrap();
            assert_eq!(response.status, 0);
        }

        let held = svc.artifacts().current();
        assert_eq!(held.generation, 16);
        assert!(held.composed.is_some());
    }
}
