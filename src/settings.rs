//! # Display Settings
//!
//! Small key-value settings document that operators change at runtime
//! through the `/settings/*` endpoints. Every update is written back to
//! `settings.toml` immediately; readers always take a fresh snapshot so
//! changes apply from the next poll on.

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};
use tracing::{info, warn};

use crate::error::{Result, ServerError};

/// Footer polarity of the composed image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FooterBackground {
    /// Black text on a white band, separated by a rule line
    White,
    /// White rounded panels on a black band
    Black,
}

/// Runtime-mutable display settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_image_path")]
    pub image_path: String,

    #[serde(default = "default_image_modification")]
    pub image_modification: bool,

    #[serde(default = "default_refresh_time")]
    pub refresh_time: u32,

    #[serde(default = "default_battery_max_voltage")]
    pub battery_max_voltage: f64,

    #[serde(default = "default_battery_min_voltage")]
    pub battery_min_voltage: f64,

    #[serde(default = "default_time_zone")]
    pub time_zone: String,

    #[serde(default = "default_footer_background")]
    pub footer_background: FooterBackground,
}

fn default_image_path() -> String { "images/screen.bmp".to_string() }
fn default_image_modification() -> bool { true }
fn default_refresh_time() -> u32 { 900 }
fn default_battery_max_voltage() -> f64 { 4.1 }
fn default_battery_min_voltage() -> f64 { 2.3 }
fn default_time_zone() -> String { "UTC".to_string() }
fn default_footer_background() -> FooterBackground { FooterBackground::Black }

impl Default for Settings {
    fn default() -> Self {
        Self {
            image_path: default_image_path(),
            image_modification: default_image_modification(),
            refresh_time: default_refresh_time(),
            battery_max_voltage: default_battery_max_voltage(),
            battery_min_voltage: default_battery_min_voltage(),
            time_zone: default_time_zone(),
            footer_background: default_footer_background(),
        }
    }
}

impl Settings {
    /// Parsed time zone, UTC when the stored name is unknown.
    pub fn tz(&self) -> Tz {
        self.time_zone.parse::<Tz>().unwrap_or_else(|_| {
            warn!("Unknown time zone '{}', using UTC", self.time_zone);
            Tz::UTC
        })
    }

    fn validate(&self) -> Result<()> {
        if self.image_path.trim().is_empty() {
            return Err(ServerError::Settings("image_path cannot be empty".to_string()));
        }
        if self.refresh_time == 0 {
            return Err(ServerError::Settings("refresh_time must be greater than 0".to_string()));
        }
        if !self.battery_min_voltage.is_finite()
            || !self.battery_max_voltage.is_finite()
            || self.battery_min_voltage >= self.battery_max_voltage
        {
            return Err(ServerError::Settings(
                "battery_min_voltage must be less than battery_max_voltage".to_string(),
            ));
        }
        if self.time_zone.parse::<Tz>().is_err() {
            return Err(ServerError::Settings(format!("unknown time zone '{}'", self.time_zone)));
        }
        Ok(())
    }
}

/// Lock-guarded settings document backed by a TOML file
#[derive(Debug)]
pub struct SettingsStore {
    path: PathBuf,
    current: RwLock<Settings>,
}

impl SettingsStore {
    /// Load settings from `path`, writing the defaults when the file is missing.
    ///
    /// # Errors
    ///
    /// Returns error if the file exists but cannot be read or parsed, or if
    /// the default document cannot be written.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let settings = if path.exists() {
            let contents = fs::read_to_string(&path)?;
            let settings: Settings = toml::from_str(&contents)?;
            settings.validate()?;
            settings
        } else {
            let settings = Settings::default();
            write_document(&path, &settings)?;
            warn!(
                "Settings file {} not found, created one with default values",
                path.display()
            );
            settings
        };

        Ok(Self {
            path,
            current: RwLock::new(settings),
        })
    }

    /// In-memory store that never touches the disk. Used by tests.
    pub fn in_memory(settings: Settings) -> Self {
        Self {
            path: PathBuf::new(),
            current: RwLock::new(settings),
        }
    }

    /// Copy of the current settings
    pub fn snapshot(&self) -> Settings {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Apply `change` to a copy of the settings, validate it, persist it and
    /// only then publish it.
    ///
    /// # Errors
    ///
    /// Returns error if the changed settings are invalid or cannot be written;
    /// the current settings stay untouched in that case.
    pub fn update<F>(&self, change: F) -> Result<Settings>
    where
        F: FnOnce(&mut Settings),
    {
        let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
        let mut next = guard.clone();
        change(&mut next);
        next.validate()?;
        if !self.path.as_os_str().is_empty() {
            write_document(&self.path, &next)?;
        }
        *guard = next.clone();
        Ok(next)
    }

    pub fn set_refresh_time(&self, refresh_time: u32) -> Result<Settings> {
        info!("[Config] setting refresh time to {}", refresh_time);
        self.update(|s| s.refresh_time = refresh_time)
    }

    pub fn set_image_path(&self, image_path: String) -> Result<Settings> {
        info!("[Config] setting image path to {}", image_path);
        self.update(|s| s.image_path = image_path)
    }

    pub fn set_image_modification(&self, enabled: bool) -> Result<Settings> {
        info!("[Config] setting image modification to {}", enabled);
        self.update(|s| s.image_modification = enabled)
    }

    /// Update one or both battery bounds in a single validated step.
    pub fn set_battery_bounds(&self, max: Option<f64>, min: Option<f64>) -> Result<Settings> {
        info!("[Config] setting battery voltage bounds to max={:?} min={:?}", max, min);
        self.update(|s| {
            if let Some(max) = max {
                s.battery_max_voltage = max;
            }
            if let Some(min) = min {
                s.battery_min_voltage = min;
            }
        })
    }

    pub fn set_time_zone(&self, time_zone: String) -> Result<Settings> {
        info!("[Config] setting time zone to {}", time_zone);
        self.update(|s| s.time_zone = time_zone)
    }
}

/// Write through a sibling temp file so a crash never leaves half a document.
fn write_document(path: &Path, settings: &Settings) -> Result<()> {
    let contents = toml::to_string_pretty(settings)?;
    let tmp = path.with_extension("toml.tmp");
    fs::write(&tmp, contents)?;
    fs::rename(&tmp, path)?;
    Ok(())
}
