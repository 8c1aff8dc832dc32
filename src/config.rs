use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use validator::{Validate, ValidationError};

/// Environment variable that overrides the configuration file location
pub const CONFIG_ENV_VAR: &str = "SOF_STATS_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "configs/config.toml";
pub const DEFAULT_VERSION_PATH: &str = "version";

/// Service settings, read from a sectioned TOML file.
///
/// Every field has a default so a partial file is valid. `version` is not
/// part of the file; it comes from the version file.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct Settings {
    #[validate(nested)]
    pub app: AppSettings,
    #[validate(nested)]
    pub network: NetworkSettings,
    #[validate(nested)]
    pub logger: LoggerSettings,
    #[validate(nested)]
    pub stackoverflow: StackOverflowSettings,
    #[serde(skip_deserializing)]
    pub version: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct AppSettings {
    pub service_name: String,
    pub host: String,
    #[validate(range(min = 1))]
    pub port: u16,
    pub env_mode: EnvMode,
    /// Seconds between the shutdown signal and closing the listener
    pub stop_delay: u64,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            service_name: "sof_stats".to_string(),
            host: "0.0.0.0".to_string(),
            port: 7006,
            env_mode: EnvMode::Test,
            stop_delay: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
#[validate(schema(function = "validate_pool_limits"))]
pub struct NetworkSettings {
    /// Admission gate capacity and hard cap on outbound connections
    #[validate(range(min = 1))]
    pub max_requests: usize,
    #[validate(range(min = 1))]
    pub max_alive_requests: usize,
    /// Keep-alive expiry, seconds
    pub keep_alive: u64,
    /// Upstream request timeout, seconds
    #[validate(range(min = 1))]
    pub timeout: u64,
}

impl Default for NetworkSettings {
    fn default() -> Self {
        Self {
            max_requests: 1000,
            max_alive_requests: 1000,
            keep_alive: 15,
            timeout: 10,
        }
    }
}

impl NetworkSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }

    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.keep_alive)
    }
}

fn validate_pool_limits(network: &NetworkSettings) -> Result<(), ValidationError> {
    if network.max_alive_requests > network.max_requests {
        return Err(ValidationError::new("pool_limits")
            .with_message("max_alive_requests must not exceed max_requests".into()));
    }
    Ok(())
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct LoggerSettings {
    pub log_console: bool,
    /// Falls back to `trace` in TEST mode and `debug` otherwise
    pub log_level: Option<String>,
    pub log_dir: PathBuf,
    #[validate(length(min = 1))]
    pub log_file: String,
    pub rotation: LogRotation,
    /// Number of rotated log files kept on disk
    #[validate(range(min = 1))]
    pub retention: usize,
}

impl Default for LoggerSettings {
    fn default() -> Self {
        Self {
            log_console: true,
            log_level: None,
            log_dir: PathBuf::from("logs"),
            log_file: "sof_stats.log".to_string(),
            rotation: LogRotation::Daily,
            retention: 5,
        }
    }
}

impl LoggerSettings {
    pub fn effective_level(&self, env_mode: EnvMode) -> &str {
        match (&self.log_level, env_mode) {
            (Some(level), _) => level,
            (None, EnvMode::Test) => "trace",
            (None, _) => "debug",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogRotation {
    Minutely,
    Hourly,
    Daily,
    Never,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct StackOverflowSettings {
    #[validate(url, custom(function = "validate_http_scheme"))]
    pub url: String,
    #[validate(range(min = 1, max = 100))]
    pub pagesize: u32,
    #[validate(custom(function = "validate_order"))]
    pub order: String,
    #[validate(length(min = 1))]
    pub sort: String,
    #[validate(length(min = 1))]
    pub site: String,
    /// Query parameter that carries the tag
    #[validate(length(min = 1))]
    pub tag_param: String,
    /// Treat a tag with zero matching questions as a failed call
    pub empty_result_is_error: bool,
}

impl Default for StackOverflowSettings {
    fn default() -> Self {
        Self {
            url: "https://api.stackexchange.com/2.3/search".to_string(),
            pagesize: 100,
            order: "desc".to_string(),
            sort: "creation".to_string(),
            site: "stackoverflow".to_string(),
            tag_param: "tagged".to_string(),
            empty_result_is_error: false,
        }
    }
}

fn validate_http_scheme(url: &str) -> Result<(), ValidationError> {
    let scheme = url.split_once("://").map(|(scheme, _)| scheme.to_ascii_lowercase());
    match scheme.as_deref() {
        Some("http") | Some("https") => Ok(()),
        _ => Err(ValidationError::new("url").with_message("url must be http or https".into())),
    }
}

fn validate_order(order: &str) -> Result<(), ValidationError> {
    match order {
        "asc" | "desc" => Ok(()),
        _ => Err(ValidationError::new("order").with_message("order must be asc or desc".into())),
    }
}

/// Deployment environment. `/config` is only served in [`EnvMode::Test`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum EnvMode {
    Test,
    Dev,
    Prod,
}

impl EnvMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnvMode::Test => "TEST",
            EnvMode::Dev => "DEV",
            EnvMode::Prod => "PROD",
        }
    }
}

impl FromStr for EnvMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "TEST" => Ok(EnvMode::Test),
            "DEV" => Ok(EnvMode::Dev),
            "PROD" => Ok(EnvMode::Prod),
            _ => Err(format!(
                "invalid env_mode '{}', expected one of TEST, DEV, PROD",
                s
            )),
        }
    }
}

impl TryFrom<String> for EnvMode {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<EnvMode> for String {
    fn from(mode: EnvMode) -> Self {
        mode.as_str().to_string()
    }
}

impl fmt::Display for EnvMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Settings {
    /// Load, attach the version and validate.
    pub fn load(config_path: &Path, version_path: &Path) -> Result<Self, ConfigError> {
        if !config_path.is_file() {
            return Err(ConfigError::NotFound(config_path.to_path_buf()));
        }

        let content = std::fs::read_to_string(config_path).map_err(|source| ConfigError::Io {
            path: config_path.to_path_buf(),
            source,
        })?;

        let mut settings = Self::from_toml_str(&content).map_err(|err| match err {
            ConfigError::Empty(_) => ConfigError::Empty(config_path.to_path_buf()),
            other => other,
        })?;
        settings.version = read_version(version_path)?;
        settings.validate()?;

        tracing::debug!(path = %config_path.display(), version = %settings.version, "Configuration loaded");
        Ok(settings)
    }

    /// Parse settings from TOML text. Does not validate.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let table: toml::Table = toml::from_str(content)?;
        if table.is_empty() {
            return Err(ConfigError::Empty(PathBuf::new()));
        }

        Ok(toml::Value::Table(table).try_into()?)
    }

    pub fn is_test_mode(&self) -> bool {
        self.app.env_mode == EnvMode::Test
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.app.host, self.app.port)
    }

    pub fn stop_delay(&self) -> Duration {
        Duration::from_secs(self.app.stop_delay)
    }
}

/// Command line flag wins, then `SOF_STATS_CONFIG`, then the default path.
pub fn resolve_config_path(cli_path: Option<PathBuf>) -> PathBuf {
    cli_path
        .or_else(|| std::env::var_os(CONFIG_ENV_VAR).map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

/// Reads the project version: the first line of the file, trimmed.
pub fn read_version(path: &Path) -> Result<String, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        ConfigError::Version(format!("cannot read version file {}: {}", path.display(), e))
    })?;

    let version = content.lines().next().unwrap_or_default().trim();
    if version.is_empty() {
        return Err(ConfigError::Version(format!(
            "version file {} has no version",
            path.display()
        )));
    }

    Ok(version.to_string())
}
