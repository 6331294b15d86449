use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),
    #[error("Failed to serialize config: {0}")]
    SerializeError(#[from] toml::ser::Error),
    #[error("Invalid config value {field} = {value}: {reason}")]
    InvalidValue {
        field: &'static str,
        value: u64,
        reason: &'static str,
    },
}

pub const MAX_IMPORT_WINDOW_DAYS: u32 = 3650;
pub const MAX_STATE_TTL_MINUTES: u32 = 1440;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    pub google: GoogleConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GoogleConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    #[serde(default = "default_calendar_id")]
    pub calendar_id: String,
    /// Fixed label attached to exported events; not derived from the member's locale.
    #[serde(default = "default_time_zone")]
    pub time_zone: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SyncConfig {
    pub import_window_days: u32,
    pub state_ttl_minutes: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StorageConfig {
    pub database: PathBuf,
}

fn default_calendar_id() -> String {
    "primary".to_string()
}

fn default_time_zone() -> String {
    "America/New_York".to_string()
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            import_window_days: 30,
            state_ttl_minutes: 10,
        }
    }
}

fn bounded(field: &'static str, value: u32, max: u32) -> Result<u32, ConfigError> {
    if value == 0 {
        return Err(ConfigError::InvalidValue {
            field,
            value: u64::from(value),
            reason: "must be at least 1",
        });
    }
    if value > max {
        return Err(ConfigError::InvalidValue {
            field,
            value: u64::from(value),
            reason: "exceeds the allowed maximum",
        });
    }
    Ok(value)
}

impl SyncConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.import_window()?;
        self.state_ttl()?;
        Ok(())
    }

    /// Length of the import window, at most [`MAX_IMPORT_WINDOW_DAYS`].
    pub fn import_window(&self) -> Result<Duration, ConfigError> {
        let days = bounded("sync.import_window_days", self.import_window_days, MAX_IMPORT_WINDOW_DAYS)?;
        Ok(Duration::days(i64::from(days)))
    }

    pub fn state_ttl(&self) -> Result<Duration, ConfigError> {
        let minutes = bounded("sync.state_ttl_minutes", self.state_ttl_minutes, MAX_STATE_TTL_MINUTES)?;
        Ok(Duration::minutes(i64::from(minutes)))
    }
}

impl GoogleConfig {
    pub fn is_configured(&self) -> bool {
        !self.client_id.is_empty() && !self.client_secret.is_empty() && !self.redirect_uri.is_empty()
    }
}

impl Config {
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.sync.validate()?;
        Ok(config)
    }

    pub fn load_or_create() -> Result<Self, ConfigError> {
        let mut config = Self::load_or_create_at(&Self::config_path())?;
        config.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn load_or_create_at(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            Self::from_toml(&content)
        } else {
            let config = Self::default();
            config.save_to(path)?;
            Ok(config)
        }
    }

    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("famcal-sync")
    }

    pub fn config_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;

        Ok(())
    }

    /// Credentials from the environment take precedence over the file.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.is_empty());

        if let Some(v) = non_empty("GOOGLE_CLIENT_ID") {
            self.google.client_id = v;
        }
        if let Some(v) = non_empty("GOOGLE_CLIENT_SECRET") {
            self.google.client_secret = v;
        }
        if let Some(v) = non_empty("GOOGLE_REDIRECT_URI") {
            self.google.redirect_uri = v;
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            google: GoogleConfig {
                client_id: String::new(),
                client_secret: String::new(),
                redirect_uri: String::new(),
                calendar_id: default_calendar_id(),
                time_zone: default_time_zone(),
            },
            sync: SyncConfig::default(),
            storage: StorageConfig {
                database: Self::config_dir().join("famcal.db"),
            },
        }
    }
}
