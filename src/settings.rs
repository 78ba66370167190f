//! Operator settings read by the dispatch engine.
//!
//! Settings are a flat key/value document edited from the booth UI. The engine
//! re-reads them on every tick, so a printer change or a new stock photo takes
//! effect without restarting the queue.
//!
//! ```json
//! {
//!   "selectedPrinterName": "DNP_DS620",
//!   "stockPhotoPath": "/srv/booth/filler.jpg",
//!   "orphanWaitTime": 10,
//!   "restAfterPrints": 10,
//!   "restDuration": 5,
//!   "pollInterval": 10
//! }
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::rest::RestPolicy;

pub const SELECTED_PRINTER_NAME: &str = "selectedPrinterName";
pub const STOCK_PHOTO_PATH: &str = "stockPhotoPath";
pub const ORPHAN_WAIT_TIME: &str = "orphanWaitTime";
pub const REST_AFTER_PRINTS: &str = "restAfterPrints";
pub const REST_DURATION: &str = "restDuration";
pub const POLL_INTERVAL: &str = "pollInterval";

pub const DEFAULT_ORPHAN_WAIT_MINUTES: f64 = 10.0;
pub const DEFAULT_REST_AFTER_PRINTS: u32 = 10;
pub const DEFAULT_REST_DURATION_MINUTES: f64 = 5.0;
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 10;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Settings file is not a JSON object: {0}")]
    NotAnObject(PathBuf),
}

/// Key/value lookup behind the `getSetting(key, default)` contract.
pub trait SettingsSource: Send + Sync {
    fn get_value(&self, key: &str) -> Option<Value>;
}

/// Typed lookup with a fallback. Values of the wrong type fall back too.
pub fn get_setting<T: DeserializeOwned>(source: &dyn SettingsSource, key: &str, default: T) -> T {
    match source.get_value(key) {
        None | Some(Value::Null) => default,
        Some(value) => match serde_json::from_value(value) {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::warn!(key, error = %e, "Ignoring malformed setting");
                default
            }
        },
    }
}

/// Settings persisted as a JSON object on disk.
#[derive(Debug, Clone)]
pub struct JsonSettingsStore {
    path: PathBuf,
}

impl JsonSettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_settings(&self) -> Result<Map<String, Value>, SettingsError> {
        if !self.path.exists() {
            return Ok(Map::new());
        }
        let raw = std::fs::read_to_string(&self.path)?;
        match serde_json::from_str::<Value>(&raw)? {
            Value::Object(map) => Ok(map),
            _ => Err(SettingsError::NotAnObject(self.path.clone())),
        }
    }

    /// Store one key, keeping every other key as it was.
    pub fn save_setting(&self, key: &str, value: Value) -> Result<(), SettingsError> {
        let mut settings = match self.read_settings() {
            Ok(settings) => settings,
            Err(SettingsError::Io(e)) => return Err(SettingsError::Io(e)),
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "Overwriting unreadable settings file");
                Map::new()
            }
        };
        settings.insert(key.to_string(), value);
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, serde_json::to_string_pretty(&Value::Object(settings))?)?;
        tracing::info!(key, path = %self.path.display(), "Setting saved");
        Ok(())
    }
}

impl SettingsSource for JsonSettingsStore {
    fn get_value(&self, key: &str) -> Option<Value> {
        match self.read_settings() {
            Ok(mut settings) => settings.remove(key),
            Err(e) => {
                tracing::error!(path = %self.path.display(), error = %e, "Failed to read settings");
                None
            }
        }
    }
}

/// In-process settings, mostly for tests and embedding.
#[derive(Debug, Default)]
pub struct MemorySettings {
    values: RwLock<HashMap<String, Value>>,
}

impl MemorySettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, key: &str, value: impl Into<Value>) {
        let mut values = self.values.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        values.insert(key.to_string(), value.into());
    }

    pub fn remove(&self, key: &str) {
        let mut values = self.values.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        values.remove(key);
    }
}

impl SettingsSource for MemorySettings {
    fn get_value(&self, key: &str) -> Option<Value> {
        let values = self.values.read().unwrap_or_else(|poisoned| poisoned.into_inner());
        values.get(key).cloned()
    }
}

/// Counts and intervals may arrive as JSON floats (`10.0`); round them.
/// Negative or non-finite values fall back to `default`.
fn whole_number(source: &dyn SettingsSource, key: &str, default: u64) -> u64 {
    let value = get_setting(source, key, default as f64);
    if value.is_finite() && value >= 0.0 {
        value.round() as u64
    } else {
        tracing::warn!(key, value, "Ignoring out-of-range setting");
        default
    }
}

/// Snapshot of everything one dispatch tick needs.
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchSettings {
    pub printer_name: Option<String>,
    pub stock_photo_path: Option<PathBuf>,
    pub orphan_wait_minutes: f64,
    pub rest: RestPolicy,
    pub poll_interval: Duration,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            printer_name: None,
            stock_photo_path: None,
            orphan_wait_minutes: DEFAULT_ORPHAN_WAIT_MINUTES,
            rest: RestPolicy::from_minutes(DEFAULT_REST_AFTER_PRINTS, DEFAULT_REST_DURATION_MINUTES),
            poll_interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
        }
    }
}

impl DispatchSettings {
    pub fn load(source: &dyn SettingsSource) -> Self {
        let printer_name = get_setting::<Option<String>>(source, SELECTED_PRINTER_NAME, None)
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty());
        let stock_photo_path = get_setting::<Option<String>>(source, STOCK_PHOTO_PATH, None)
            .filter(|path| !path.trim().is_empty())
            .map(PathBuf::from);
        let orphan_wait_minutes =
            get_setting(source, ORPHAN_WAIT_TIME, DEFAULT_ORPHAN_WAIT_MINUTES).max(0.0);
        let rest_after = whole_number(source, REST_AFTER_PRINTS, DEFAULT_REST_AFTER_PRINTS.into())
            .min(u32::MAX.into()) as u32;
        let rest_minutes = get_setting(source, REST_DURATION, DEFAULT_REST_DURATION_MINUTES).max(0.0);
        let poll_secs = whole_number(source, POLL_INTERVAL, DEFAULT_POLL_INTERVAL_SECS).max(1);

        Self {
            printer_name,
            stock_photo_path,
            orphan_wait_minutes,
            rest: RestPolicy::from_minutes(rest_after, rest_minutes),
            poll_interval: Duration::from_secs(poll_secs),
        }
    }
}
