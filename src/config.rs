// src/config.rs - Daemon configuration file
//
// Deployment settings only. Operator-tunable values (printer, stock photo,
// orphan wait, rest policy) live in the settings store and are re-read every
// tick; see `settings.rs`.
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

use crate::dispatch::ReconcilePolicy;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub settings: SettingsConfig,
    #[serde(default)]
    pub print: PrintConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,
    /// Root that job file paths are relative to.
    #[serde(default = "default_projects_base_path")]
    pub projects_base_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            projects_base_path: default_projects_base_path(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SettingsConfig {
    #[serde(default = "default_settings_path")]
    pub path: PathBuf,
}

impl Default for SettingsConfig {
    fn default() -> Self {
        Self {
            path: default_settings_path(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PrintConfig {
    /// Where merged half-page sheets are written.
    #[serde(default = "default_merge_dir")]
    pub merge_dir: PathBuf,
    #[serde(default = "default_spool_command")]
    pub spool_command: String,
    #[serde(default = "default_list_command")]
    pub list_command: String,
    #[serde(default = "default_autostart")]
    pub autostart: bool,
    #[serde(default)]
    pub startup_reconcile: ReconcilePolicy,
}

impl Default for PrintConfig {
    fn default() -> Self {
        Self {
            merge_dir: default_merge_dir(),
            spool_command: default_spool_command(),
            list_command: default_list_command(),
            autostart: default_autostart(),
            startup_reconcile: ReconcilePolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self { bind: default_bind() }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl LoggingConfig {
    /// Parsed level; unknown names fall back to INFO.
    pub fn max_level(&self) -> tracing::Level {
        self.level.parse().unwrap_or(tracing::Level::INFO)
    }
}

fn default_database_path() -> PathBuf {
    PathBuf::from("photobooth.db")
}
fn default_projects_base_path() -> PathBuf {
    PathBuf::from("projects")
}
fn default_settings_path() -> PathBuf {
    PathBuf::from("settings.json")
}
fn default_merge_dir() -> PathBuf {
    PathBuf::from("temp_prints")
}
fn default_spool_command() -> String {
    "lp".to_string()
}
fn default_list_command() -> String {
    "lpstat".to_string()
}
fn default_autostart() -> bool {
    true
}
fn default_bind() -> String {
    "127.0.0.1:3000".to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}

pub fn load_config(path: &str) -> Result<Config, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(contents) => match toml::from_str(&contents) {
            Ok(config) => Ok(config),
            Err(e) => {
                tracing::error!("Failed to parse config TOML: {}", e);
                Err(ConfigError::Toml(e))
            }
        },
        Err(e) => {
            tracing::error!("Failed to read config file '{}': {}", path, e);
            Err(ConfigError::Io(e))
        }
    }
}
