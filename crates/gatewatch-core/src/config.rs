//! Configuration management for Gatewatch
//!
//! Values are layered: built-in defaults, then an optional TOML file, then
//! `GATEWATCH__SECTION__KEY` environment variables.

use std::path::{Path, PathBuf};

use chrono::FixedOffset;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::models::{Granularity, ServiceType};

/// Main configuration struct
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Alert threshold and cooldown
    pub alerting: AlertingConfig,

    /// Top-N ranking
    pub ranking: RankingConfig,

    /// Evaluation loop
    pub monitor: MonitorConfig,

    /// Where raw readings come from
    pub source: SourceConfig,

    /// Where alerts go
    pub notifier: NotifierConfig,

    /// Read-only API server
    pub server: ServerConfig,

    /// Logging configuration
    pub logging: LoggingConfig,

    /// Metrics exporter
    pub metrics: MetricsConfig,
}

impl Config {
    /// Load configuration from `path`, or from the platform config directory
    /// when no path is given (that file is optional).
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();

        builder = match path {
            Some(path) => builder.add_source(config::File::from(path).required(true)),
            None => match default_config_path() {
                Some(path) => builder.add_source(config::File::from(path).required(false)),
                None => builder,
            },
        };

        let config: Config = builder
            .add_source(
                config::Environment::with_prefix("GATEWATCH")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("monitor.services"),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Reject values the engine cannot work with
    pub fn validate(&self) -> Result<()> {
        let threshold = self.alerting.threshold_pct;
        if !threshold.is_finite() || threshold < 0.0 {
            return Err(Error::config(format!(
                "alerting.threshold_pct must be a non-negative number, got {threshold}"
            )));
        }
        let cooldown = self.alerting.cooldown_seconds;
        if cooldown == 0 || cooldown > MAX_COOLDOWN_SECONDS {
            return Err(Error::config(format!(
                "alerting.cooldown_seconds must be between 1 and {MAX_COOLDOWN_SECONDS}, got {cooldown}"
            )));
        }
        if self.ranking.top_n == 0 {
            return Err(Error::config("ranking.top_n must be positive"));
        }
        if self.ranking.open_marker.is_empty() {
            return Err(Error::config("ranking.open_marker must not be empty"));
        }
        if self.monitor.interval_seconds == 0 {
            return Err(Error::config("monitor.interval_seconds must be positive"));
        }
        if self.monitor.upstream_timeout_seconds == 0 {
            return Err(Error::config("monitor.upstream_timeout_seconds must be positive"));
        }
        if self.monitor.services.is_empty() {
            return Err(Error::config("monitor.services must list at least one service"));
        }
        self.monitor.utc_offset()?;
        self.source.validate()?;
        self.notifier.validate()?;
        Ok(())
    }
}

/// Longest accepted cooldown: one year
pub const MAX_COOLDOWN_SECONDS: u64 = 365 * 24 * 3600;

/// Platform-specific location of the optional config file
pub fn default_config_path() -> Option<PathBuf> {
    ProjectDirs::from("io", "gatewatch", "gatewatch").map(|dirs| dirs.config_dir().join("config.toml"))
}

/// Alerting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertingConfig {
    /// Error percentage a project must strictly exceed to alert
    pub threshold_pct: f64,
    /// Minimum seconds between two alert deliveries
    pub cooldown_seconds: u64,
}

impl Default for AlertingConfig {
    fn default() -> Self {
        Self {
            threshold_pct: 5.0,
            cooldown_seconds: 3600,
        }
    }
}

/// Ranking configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RankingConfig {
    /// Number of projects to keep
    pub top_n: usize,
    /// Substring identifying successful-open reading types
    pub open_marker: String,
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            top_n: 20,
            open_marker: crate::engine::DEFAULT_OPEN_MARKER.to_string(),
        }
    }
}

/// Monitor loop configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Seconds between evaluation cycles
    pub interval_seconds: u64,
    /// Deadline for each metrics source / notifier call
    pub upstream_timeout_seconds: u64,
    /// Scopes evaluated each cycle, one alert gate each
    pub services: Vec<ServiceType>,
    /// Bucket width used for alerting
    pub granularity: Granularity,
    /// Offset of the reporting timezone from UTC, in hours
    pub utc_offset_hours: i32,
}

impl MonitorConfig {
    /// Reporting timezone
    pub fn utc_offset(&self) -> Result<FixedOffset> {
        FixedOffset::east_opt(self.utc_offset_hours * 3600).ok_or_else(|| {
            Error::config(format!(
                "monitor.utc_offset_hours out of range: {}",
                self.utc_offset_hours
            ))
        })
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval_seconds: 60,
            upstream_timeout_seconds: 15,
            services: ServiceType::ALL.to_vec(),
            granularity: Granularity::Day,
            // America/Mexico_City
            utc_offset_hours: -6,
        }
    }
}

/// Kind of metrics source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// JSON over HTTP from a warehouse gateway
    Http,
    /// JSON files on disk, one per service
    File,
}

/// Metrics source configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Which adapter to use
    pub kind: SourceKind,
    /// Endpoint for the HTTP source
    pub url: Option<String>,
    /// Bearer token for the HTTP source
    pub api_key: Option<String>,
    /// Directory for the file source
    pub path: PathBuf,
}

impl SourceConfig {
    fn validate(&self) -> Result<()> {
        if self.kind == SourceKind::Http && self.url.as_deref().map_or(true, str::is_empty) {
            return Err(Error::config("source.url is required for the http source"));
        }
        Ok(())
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            kind: SourceKind::File,
            url: None,
            api_key: None,
            path: PathBuf::from("data"),
        }
    }
}

/// Kind of alert channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotifierKind {
    /// Telegram bot
    Telegram,
    /// Generic JSON webhook
    Webhook,
    /// Log only
    Log,
}

/// Notifier configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifierConfig {
    /// Which channel to deliver through
    pub kind: NotifierKind,
    /// Telegram bot token
    pub bot_token: Option<String>,
    /// Telegram chat id
    pub chat_id: Option<String>,
    /// Telegram API base URL
    pub api_base: String,
    /// Target of the webhook channel
    pub webhook_url: Option<String>,
}

impl NotifierConfig {
    fn validate(&self) -> Result<()> {
        let missing = |value: &Option<String>| value.as_deref().map_or(true, str::is_empty);
        match self.kind {
            NotifierKind::Telegram if missing(&self.bot_token) || missing(&self.chat_id) => Err(
                Error::config("notifier.bot_token and notifier.chat_id are required for telegram"),
            ),
            NotifierKind::Webhook if missing(&self.webhook_url) => Err(Error::config(
                "notifier.webhook_url is required for the webhook channel",
            )),
            _ => Ok(()),
        }
    }
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            kind: NotifierKind::Log,
            bot_token: None,
            chat_id: None,
            api_base: "https://api.telegram.org".to_string(),
            webhook_url: None,
        }
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,
    /// HTTP API port
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable
    #[default]
    Pretty,
    /// One JSON object per line
    Json,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level
    pub level: String,
    /// Log format (json or pretty)
    pub format: LogFormat,
    /// Base path for daily-rotated log files
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
            file: None,
        }
    }
}

/// Metrics exporter configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Listen address for the Prometheus scrape endpoint
    pub prometheus_addr: Option<String>,
}
