//! Configuration management for qualityguard.
//!
//! Configuration is loaded with figment from defaults, an optional TOML file
//! and `QUALITYGUARD_` environment variables.

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "config.toml";

/// Default data directory name.
const DATA_DIR_NAME: &str = "qualityguard";

/// Default database file name.
const DATABASE_FILE_NAME: &str = "qualityguard.db";

/// Application configuration.
///
/// Configuration is loaded from (in order of precedence, highest first):
/// 1. Environment variables (prefixed with `QUALITYGUARD_`, nested with `__`)
/// 2. TOML config file at `~/.config/qualityguard/config.toml`
/// 3. Default values
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Measurement service endpoints.
    pub service: ServiceConfig,
    /// Local store configuration.
    pub storage: StorageConfig,
    /// Periodic refresh configuration.
    pub refresh: RefreshConfig,
    /// Alert feed configuration.
    pub alerts: AlertConfig,
    /// Dashboard query defaults.
    pub dashboard: DashboardConfig,
}

/// Measurement service configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Base URL of the HTTP API.
    pub base_url: String,
    /// URL of the push channel.
    pub push_url: String,
    /// Open the push channel after a successful health check.
    pub push_enabled: bool,
    /// Per-request timeout in milliseconds.
    pub request_timeout_ms: u64,
}

/// Local store configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Path to the database file.
    /// Defaults to `~/.local/share/qualityguard/qualityguard.db`
    pub database_path: Option<PathBuf>,
}

/// Refresh tick configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RefreshConfig {
    /// Run the refresh tick while watching.
    pub enabled: bool,
    /// Interval between ticks in milliseconds.
    pub interval_ms: u64,
}

/// Alert feed configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertConfig {
    /// Maximum number of alerts kept in the feed.
    pub capacity: usize,
    /// Predictions must be strictly above this confidence to raise an alert.
    pub prediction_confidence_threshold: f64,
    /// Ring the terminal bell for critical alerts.
    pub sound_enabled: bool,
    /// Permission to show desktop notifications.
    pub desktop_notifications: bool,
}

/// Defaults for the dashboard's historical query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DashboardConfig {
    /// Date range sent with historical queries (e.g. `30d`).
    pub date_range: String,
    /// Product type sent with historical queries.
    pub product_type: Option<String>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5000/api".to_string(),
            push_url: "ws://localhost:5000".to_string(),
            push_enabled: true,
            request_timeout_ms: 10_000,
        }
    }
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_ms: 5_000,
        }
    }
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            capacity: 20,
            prediction_confidence_threshold: 80.0,
            sound_enabled: true,
            desktop_notifications: false, // Opt-in only
        }
    }
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            date_range: "30d".to_string(),
            product_type: None,
        }
    }
}

impl Config {
    /// Load configuration from all sources.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load configuration with an optional custom config path.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading, parsing or validation fails.
    pub fn load_from(config_path: Option<PathBuf>) -> Result<Self> {
        let config_file = config_path.unwrap_or_else(Self::default_config_path);

        let figment = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&config_file))
            .merge(Env::prefixed("QUALITYGUARD_").split("__"));

        let config: Config = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Get the default configuration file path.
    #[must_use]
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join(DATA_DIR_NAME)
            .join(CONFIG_FILE_NAME)
    }

    /// Get the default data directory path.
    #[must_use]
    pub fn default_data_dir() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from(".local/share"))
            .join(DATA_DIR_NAME)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid.
    pub fn validate(&self) -> Result<()> {
        for (name, url) in [
            ("service.base_url", &self.service.base_url),
            ("service.push_url", &self.service.push_url),
        ] {
            if reqwest::Url::parse(url).is_err() {
                return Err(Error::ConfigValidation {
                    message: format!("{name} is not a valid URL: {url}"),
                });
            }
        }

        if self.service.request_timeout_ms == 0 {
            return Err(Error::ConfigValidation {
                message: "request_timeout_ms must be greater than 0".to_string(),
            });
        }

        if self.refresh.interval_ms == 0 {
            return Err(Error::ConfigValidation {
                message: "interval_ms must be greater than 0".to_string(),
            });
        }

        if self.alerts.capacity == 0 {
            return Err(Error::ConfigValidation {
                message: "alert capacity must be greater than 0".to_string(),
            });
        }

        let threshold = self.alerts.prediction_confidence_threshold;
        if !(0.0..=100.0).contains(&threshold) {
            return Err(Error::ConfigValidation {
                message: format!(
                    "prediction_confidence_threshold ({threshold}) must be between 0 and 100"
                ),
            });
        }

        Ok(())
    }

    /// Get the database path, resolving defaults if not set.
    #[must_use]
    pub fn database_path(&self) -> PathBuf {
        self.storage
            .database_path
            .clone()
            .unwrap_or_else(|| Self::default_data_dir().join(DATABASE_FILE_NAME))
    }

    /// Get the request timeout as a Duration.
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.service.request_timeout_ms)
    }

    /// Get the refresh interval as a Duration.
    #[must_use]
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh.interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert!(config.service.push_enabled);
        assert!(config.refresh.enabled);
        assert!(config.alerts.sound_enabled);
        assert!(!config.alerts.desktop_notifications);
        assert_eq!(config.dashboard.date_range, "30d");
    }

    #[test]
    fn test_default_service_config() {
        let service = ServiceConfig::default();

        assert_eq!(service.base_url, "http://localhost:5000/api");
        assert_eq!(service.push_url, "ws://localhost:5000");
        assert_eq!(service.request_timeout_ms, 10_000);
    }

    #[test]
    fn test_default_alert_config() {
        let alerts = AlertConfig::default();

        assert_eq!(alerts.capacity, 20);
        assert!((alerts.prediction_confidence_threshold - 80.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_validate_valid_config() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_validate_bad_url() {
        let mut config = Config::default();
        config.service.base_url = "not a url".to_string();

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("service.base_url"));
    }

    #[test]
    fn test_validate_zero_interval() {
        let mut config = Config::default();
        config.refresh.interval_ms = 0;

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("interval_ms"));
    }

    #[test]
    fn test_validate_zero_timeout() {
        let mut config = Config::default();
        config.service.request_timeout_ms = 0;

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("request_timeout_ms"));
    }

    #[test]
    fn test_validate_zero_capacity() {
        let mut config = Config::default();
        config.alerts.capacity = 0;

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_threshold_out_of_range() {
        let mut config = Config::default();
        config.alerts.prediction_confidence_threshold = 120.0;

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("prediction_confidence_threshold"));
    }

    #[test]
    fn test_database_path_default() {
        let path = Config::default().database_path();
        assert!(path.to_string_lossy().contains("qualityguard.db"));
    }

    #[test]
    fn test_database_path_custom() {
        let mut config = Config::default();
        config.storage.database_path = Some(PathBuf::from("/custom/path/qg.sqlite"));

        assert_eq!(
            config.database_path(),
            PathBuf::from("/custom/path/qg.sqlite")
        );
    }

    #[test]
    fn test_durations() {
        let config = Config::default();
        assert_eq!(config.refresh_interval(), Duration::from_secs(5));
        assert_eq!(config.request_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn test_default_config_path() {
        let path = Config::default_config_path();
        assert!(path.to_string_lossy().contains("qualityguard"));
        assert!(path.to_string_lossy().contains("config.toml"));
    }

    #[test]
    fn test_load_nonexistent_config() {
        let config = Config::load_from(Some(PathBuf::from("/nonexistent/config.toml"))).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_load_from_toml_file() {
        let path = std::env::temp_dir().join(format!(
            "qualityguard_config_test_{}.toml",
            std::process::id()
        ));
        std::fs::write(
            &path,
            "[refresh]\ninterval_ms = 2500\n\n[dashboard]\nproduct_type = \"Motor Diesel HD 2.8L\"\n",
        )
        .unwrap();

        let config = Config::load_from(Some(path.clone())).unwrap();
        assert_eq!(config.refresh.interval_ms, 2500);
        assert_eq!(
            config.dashboard.product_type.as_deref(),
            Some("Motor Diesel HD 2.8L")
        );
        assert_eq!(config.alerts, AlertConfig::default());

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_alert_config_deserialize() {
        let json = r#"{"capacity": 50, "desktop_notifications": true}"#;
        let alerts: AlertConfig = serde_json::from_str(json).unwrap();
        assert_eq!(alerts.capacity, 50);
        assert!(alerts.desktop_notifications);
        assert!(alerts.sound_enabled);
    }
}
