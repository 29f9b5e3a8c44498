//! # Display Service
//!
//! Single owner of all process-wide state: settings, device snapshot, the
//! three journals, held image artifacts and the slot rotation. HTTP
//! handlers only ever see this type behind an `Arc`.
//!
//! Lock order when more than one lock is held: device state, then the
//! telemetry journal.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use embedded_graphics::mono_font::MonoFont;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

use crate::config::{resolve, Config};
use crate::error::Result;
use crate::poll::artifacts::ArtifactStore;
use crate::poll::rotation::SlotRotation;
use crate::poll::source::{FileOrHttpSource, ImageSource};
use crate::render::{self, FooterStyle, FALLBACK_FONT};
use crate::settings::{Settings, SettingsStore};
use crate::telemetry::{
    AppendOutcome, DeviceLogEntry, DeviceState, Journal, LogEntry, LogRecord, LogStore,
    TelemetryReading, TelemetrySample, TelemetrySnapshot,
};

/// Name of the settings document inside the data directory
pub const SETTINGS_FILE: &str = "settings.toml";

/// Footer date format
pub const FOOTER_TIME_FORMAT: &str = "%d.%m.%Y %H:%M";

/// Placeholder date format
pub const PLACEHOLDER_TIME_FORMAT: &str = "%d.%m.%Y %H:%M:%S";

/// Shared application state
pub struct DisplayService {
    config: Config,
    data_dir: PathBuf,
    settings: SettingsStore,
    device: DeviceState,
    telemetry: Arc<Journal<TelemetrySample>>,
    server_log: Arc<Journal<LogEntry>>,
    device_log: Arc<Journal<DeviceLogEntry>>,
    artifacts: ArtifactStore,
    rotation: SlotRotation,
    source: Arc<dyn ImageSource>,
    base_url: String,
    footer_font: &'static MonoFont<'static>,
    started: Instant,
}

impl DisplayService {
    /// Open the service on `data_dir` with the file/HTTP image source.
    ///
    /// # Errors
    ///
    /// Returns error if the settings document cannot be loaded or created,
    /// or the HTTP client cannot be built.
    pub fn open(config: Config, data_dir: &Path, public_host: &str) -> Result<Self> {
        let settings = SettingsStore::open(data_dir.join(SETTINGS_FILE))?;
        let source = FileOrHttpSource::new(
            data_dir,
            Duration::from_secs(config.display.fetch_timeout_secs),
        )?;
        Ok(Self::with_source(config, data_dir, settings, public_host, Arc::new(source)))
    }

    /// Assemble the service from its parts.
    pub fn with_source(
        config: Config,
        data_dir: &Path,
        settings: SettingsStore,
        public_host: &str,
        source: Arc<dyn ImageSource>,
    ) -> Self {
        let storage = &config.storage;
        let open_store = |file: &Path| LogStore::new(resolve(data_dir, file), storage.write_retries);
        let capacity = storage.buffer_capacity;
        let telemetry = Arc::new(Journal::new(open_store(storage.telemetry_file.as_path()), capacity));
        let server_log = Arc::new(Journal::new(open_store(storage.server_log_file.as_path()), capacity));
        let device_log = Arc::new(Journal::new(open_store(storage.device_log_file.as_path()), capacity));

        let current = settings.snapshot();
        let device = DeviceState::new(TelemetrySnapshot {
            refresh_rate: current.refresh_time,
            battery_voltage: current.battery_max_voltage,
            rssi: -100,
            last_contact: 0,
        });

        let base_url = format!("{}://{}:{}", config.scheme(), public_host, config.server.port);

        let service = Self {
            config,
            data_dir: data_dir.to_path_buf(),
            settings,
            device,
            telemetry,
            server_log,
            device_log,
            artifacts: ArtifactStore::new(),
            rotation: SlotRotation::new(),
            source,
            base_url,
            footer_font: FALLBACK_FONT,
            started: Instant::now(),
        };
        service.with_footer_font()
    }

    fn with_footer_font(mut self) -> Self {
        let name = self.config.display.footer_font.clone();
        match render::font_by_name(&name) {
            Some(font) => self.footer_font = font,
            None => {
                warn!("Unknown footer font '{}', falling back to 6x10", name);
                self.server_log.append(LogEntry::new(
                    self.now().naive_local(),
                    "image modification",
                    format!("loading default font - unknown font '{}'", name),
                ));
            }
        }
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn settings(&self) -> &SettingsStore {
        &self.settings
    }

    pub fn device(&self) -> &DeviceState {
        &self.device
    }

    pub fn telemetry(&self) -> &Journal<TelemetrySample> {
        &self.telemetry
    }

    pub fn server_log(&self) -> &Journal<LogEntry> {
        &self.server_log
    }

    pub fn device_log(&self) -> &Journal<DeviceLogEntry> {
        &self.device_log
    }

    pub fn artifacts(&self) -> &ArtifactStore {
        &self.artifacts
    }

    pub fn rotation(&self) -> &SlotRotation {
        &self.rotation
    }

    pub fn source(&self) -> &dyn ImageSource {
        self.source.as_ref()
    }

    /// `scheme://host:port` the device reaches us at
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Absolute URL for a server path
    pub fn url_for(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub fn uptime(&self) -> Duration {
        self.started.elapsed()
    }

    /// Current wall-clock time in the configured time zone
    pub fn now(&self) -> DateTime<Tz> {
        Utc::now().with_timezone(&self.settings.snapshot().tz())
    }

    /// Footer style for the given settings snapshot
    pub fn footer_style(&self, settings: &Settings) -> FooterStyle {
        FooterStyle::new(settings.footer_background, self.footer_font)
    }

    /// "No image available" bitmap stamped with the current time
    pub fn placeholder_bitmap(&self) -> Result<Vec<u8>> {
        let stamp = self.now().format(PLACEHOLDER_TIME_FORMAT).to_string();
        render::placeholder(&stamp, self.footer_font)
    }

    /// Journal a server activity record.
    pub async fn log_event(&self, context: impl Into<String>, info: impl Into<String>) {
        let entry = LogEntry::new(self.now().naive_local(), context, info);
        if let Err(e) = on_blocking_pool(&self.server_log, move |journal| journal.append(entry)).await {
            warn!("Could not journal server log entry: {}", e);
        }
    }

    /// Journal one line of device-provided log text.
    pub async fn record_device_log(&self, message: impl Into<String>) -> Result<AppendOutcome> {
        let entry = DeviceLogEntry::new(self.now().naive_local(), message);
        on_blocking_pool(&self.device_log, move |journal| journal.append(entry)).await
    }

    /// Overwrite the device snapshot with a poll's reading, then journal the
    /// sample.
    ///
    /// The snapshot is replaced as a unit under the device write lock; the
    /// lock is released before the journal append so a slow disk never
    /// blocks status readers.
    pub async fn ingest(&self, reading: TelemetryReading) -> Result<AppendOutcome> {
        let now = self.now();
        self.device.record(reading, now.timestamp());
        let sample = TelemetrySample::new(now.naive_local(), reading.battery_voltage, reading.rssi);
        on_blocking_pool(&self.telemetry, move |journal| journal.append_sample(sample)).await
    }

    /// Disk history plus unflushed telemetry, oldest first.
    pub async fn telemetry_history(&self) -> Result<Vec<TelemetrySample>> {
        on_blocking_pool(&self.telemetry, |journal| journal.read_merged_sorted()).await?
    }

    /// Last `n` lines of the server log, unflushed entries included.
    pub async fn server_log_tail(&self, n: usize) -> Result<Vec<String>> {
        let mut lines = on_blocking_pool(&self.server_log, move |journal| journal.tail_lines(n)).await??;
        if lines.len() > n {
            lines.drain(..lines.len() - n);
        }
        Ok(lines)
    }

    /// Device snapshot, backfilled from history if no poll arrived yet.
    ///
    /// History is read without holding the device lock; a poll landing in
    /// between wins over the recovered values.
    pub async fn recovered_snapshot(&self) -> TelemetrySnapshot {
        let snapshot = self.device.snapshot();
        if snapshot.has_contact() {
            return snapshot;
        }

        let tz = self.settings.snapshot().tz();
        let latest = match self.telemetry_history().await {
            Ok(history) => history.last().map(|sample| {
                (
                    sample.battery_voltage,
                    sample.rssi,
                    local_to_epoch(&tz, &sample.timestamp),
                )
            }),
            Err(e) => {
                warn!("Could not read telemetry history for recovery: {}", e);
                None
            }
        };
        self.device.recover_with(|| latest)
    }

    /// Flush all journals. Called once on shutdown.
    pub async fn drain(&self) {
        let results = [
            ("telemetry", on_blocking_pool(&self.telemetry, |journal| journal.flush()).await),
            ("server log", on_blocking_pool(&self.server_log, |journal| journal.flush()).await),
            ("device log", on_blocking_pool(&self.device_log, |journal| journal.flush()).await),
        ];
        for (name, result) in results {
            match result.and_then(|flushed| flushed) {
                Ok(lines) => info!("Drained {} journal ({} lines)", name, lines),
                Err(e) => warn!("Failed to drain {} journal: {}", name, e),
            }
        }
    }
}

/// Run journal work that may touch the disk on the blocking pool.
async fn on_blocking_pool<R, T, F>(journal: &Arc<Journal<R>>, work: F) -> Result<T>
where
    R: LogRecord + Send + 'static,
    T: Send + 'static,
    F: FnOnce(&Journal<R>) -> T + Send + 'static,
{
    let journal = Arc::clone(journal);
    Ok(tokio::task::spawn_blocking(move || work(&journal)).await?)
}

/// Epoch seconds of a wall-clock time recorded in `tz`
pub fn local_to_epoch(tz: &Tz, local: &NaiveDateTime) -> i64 {
    tz.from_local_datetime(local)
        .earliest()
        .map(|dt| dt.timestamp())
        .unwrap_or_else(|| local.and_utc().timestamp())
}


#[cfg(test)]
mod tests {
    use super::testing::service;
    use super::*;
    use crate::poll::source::MockImageSource;
    use crate::telemetry::state::FALLBACK_LAST_CONTACT;
    use chrono::NaiveDate;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_base_url() {
        let dir = tempdir().unwrap();
        let svc = service(dir.path(), Settings::default(), MockImageSource::new());
        assert_eq!(svc.base_url(), "http://10.0.0.2:1184");
        assert_eq!(svc.url_for("/image/screen.bmp"), "http://10.0.0.2:1184/image/screen.bmp");
    }

    #[test]
    fn test_initial_snapshot_from_settings() {
        let dir = tempdir().unwrap();
        let settings = Settings {
            refresh_time: 300,
            battery_max_voltage: 4.2,
            ..Settings::default()
        };
        let svc = service(dir.path(), settings, MockImageSource::new());
        let snapshot = svc.device().snapshot();
        assert_eq!(snapshot.refresh_rate, 300);
        assert_eq!(snapshot.battery_voltage, 4.2);
        assert_eq!(snapshot.rssi, -100);
        assert_eq!(snapshot.last_contact, 0);
    }

    #[tokio::test]
    async fn test_ingest_updates_state_and_journal() {
        let dir = tempdir().unwrap();
        let svc = service(dir.path(), Settings::default(), MockImageSource::new());
        let reading = TelemetryReading { refresh_rate: 600, battery_voltage: 3.8, rssi: -70 };

        assert_eq!(svc.ingest(reading).await.unwrap(), AppendOutcome::Buffered);
        assert_eq!(svc.ingest(reading).await.unwrap(), AppendOutcome::Skipped);

        let snapshot = svc.device().snapshot();
        assert_eq!(snapshot.refresh_rate, 600);
        assert!(snapshot.has_contact());
        assert_eq!(svc.telemetry().resident().len(), 1);
    }

    #[tokio::test]
    async fn test_recovery_from_disk_history() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("db")).unwrap();
        fs::write(
            dir.path().join("db/clientData.txt"),
            "2024-01-01 10:00:00 -- bVolt: 3.9, rssi: -60\n\
             2024-01-01 11:00:00 -- bVolt: 3.7, rssi: -72\n",
        )
        .unwrap();
        let svc = service(dir.path(), Settings::default(), MockImageSource::new());

        let snapshot = svc.recovered_snapshot().await;
        let expected = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(11, 0, 0)
            .unwrap()
            .and_utc()
            .timestamp();
        assert_eq!(snapshot.battery_voltage, 3.7);
        assert_eq!(snapshot.rssi, -72);
        assert_eq!(snapshot.last_contact, expected);
    }

    #[tokio::test]
    async fn test_recovery_sentinel_without_history() {
        let dir = tempdir().unwrap();
        let svc = service(dir.path(), Settings::default(), MockImageSource::new());
        let snapshot = svc.recovered_snapshot().await;
        assert_eq!(snapshot.battery_voltage, 0.0);
        assert_eq!(snapshot.rssi, 0);
        assert_eq!(snapshot.last_contact, FALLBACK_LAST_CONTACT);
    }

    #[test]
    fn test_local_to_epoch_respects_zone() {
        let local = NaiveDate::from_ymd_opt(2024, 7, 1).unwrap().and_hms_opt(12, 0, 0).unwrap();
        let berlin: Tz = "Europe/Berlin".parse().unwrap();
        assert_eq!(local_to_epoch(&berlin, &local), local_to_epoch(&Tz::UTC, &local) - 2 * 3600);
    }

    #[test]
    fn test_unknown_font_falls_back_and_logs() {
        let dir = tempdir().unwrap();
        let mut config = Config::default();
        config.display.footer_font = "comic_sans".to_string();
        let svc = DisplayService::with_source(
            config,
            dir.path(),
            SettingsStore::in_memory(Settings::default()),
            "localhost",
            Arc::new(MockImageSource::new()),
        );
        let logged = svc.server_log().resident();
        assert_eq!(logged.len(), 1);
        assert_eq!(logged[0].context, "image modification");
    }

    #[tokio::test]
    async fn test_drain_persists_all_journals() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("db")).unwrap();
        fs::create_dir_all(dir.path().join("logs")).unwrap();
        let svc = service(dir.path(), Settings::default(), MockImageSource::new());

        svc.ingest(TelemetryReading { refresh_rate: 900, battery_voltage: 3.6, rssi: -80 })
            .await
            .unwrap();
        svc.log_event("ctx", "info").await;
        svc.record_device_log("boot").await.unwrap();
        svc.drain().await;

        assert_eq!(svc.telemetry().store().line_count().unwrap(), 1);
        assert_eq!(svc.server_log().store().line_count().unwrap(), 1);
        assert_eq!(svc.device_log().store().line_count().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_recovery_skips_undecodable_history_lines() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("db")).unwrap();
        let mut history = b"2024-01-01 10:00:00 -- bVolt: 3.9, rssi: -60\n".to_vec();
        history.extend_from_slice(b"2024-01-01 10:30:00 -- bVolt: \xff\xfe\n");
        history.extend_from_slice(b"2024-01-01 11:00:00 -- bVolt: 3.7, rssi: -72\n");
        fs::write(dir.path().join("db/clientData.txt"), history).unwrap();
        let svc = service(dir.path(), Settings::default(), MockImageSource::new());

        let snapshot = svc.recovered_snapshot().await;
        assert_eq!(snapshot.battery_voltage, 3.7);
        assert_eq!(snapshot.rssi, -72);
        assert_eq!(svc.telemetry_history().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_failing_flush_does_not_stall_runtime() {
        let dir = tempdir().unwrap();
        let mut config = Config::default();
        config.server.tls_enabled = false;
        config.storage.buffer_capacity = 2;
        config.storage.write_retries = 3;
        // Parent directory is never created, so every flush attempt fails.
        config.storage.telemetry_file = "missing/clientData.txt".into();
        let svc = DisplayService::with_source(
            config,
            dir.path(),
            SettingsStore::in_memory(Settings::default()),
            "localhost",
            Arc::new(MockImageSource::new()),
        );

        let first = TelemetryReading { refresh_rate: 900, battery_voltage: 3.9, rssi: -60 };
        let second = TelemetryReading { refresh_rate: 900, battery_voltage: 3.8, rssi: -61 };
        assert_eq!(svc.ingest(first).await.unwrap(), AppendOutcome::Buffered);

        // Retry backoff of the failing flush keeps the append busy for ~120 ms.
        let ticker = async {
            tokio::time::sleep(Duration::from_millis(5)).await;
            Instant::now()
        };
        let ingest = async {
            let outcome = svc.ingest(second).await.unwrap();
            (outcome, Instant::now())
        };
        let (ticked_at, (outcome, ingested_at)) = tokio::join!(ticker, ingest);

        assert_eq!(outcome, AppendOutcome::FlushFailed);
        assert!(ticked_at < ingested_at);
        assert_eq!(svc.device().snapshot().battery_voltage, 3.8);
        assert_eq!(svc.telemetry().resident().len(), 2);
    }
}
