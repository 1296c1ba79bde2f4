//! Command-line and environment configuration
//!
//! Every setting can come from a flag or its environment variable (a `.env` file
//! is loaded by `main` before parsing). `Config::from_cli` validates the parsed
//! values into the settings the server is built from.

use chrono_tz::Tz;
use clap::Parser;
use directories::ProjectDirs;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::auth::{LoginCredentials, TokenSettings};
use crate::data::client::DEFAULT_BASE_URL;
use crate::data::{ApiConfig, CacheLevel};
use crate::refresh::RefreshConfig;

const SNAPSHOT_FILE: &str = "snapshot.json";

/// Error types for configuration validation
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required setting was absent or blank
    #[error("missing required setting: {0}")]
    Missing(&'static str),

    /// The timezone name is not in the tz database
    #[error("invalid timezone: '{0}'")]
    InvalidTimezone(String),
}

/// Venueboard - room signage views backed by the booking API
#[derive(Parser, Debug)]
#[command(name = "venueboard")]
#[command(about = "Serves cover and schedule views for venue room signage")]
#[command(version)]
pub struct Cli {
    /// OAuth client id
    #[arg(long, env = "AHWS_CLIENT_ID", hide_env_values = true)]
    pub client_id: Option<String>,

    /// OAuth client secret
    #[arg(long, env = "AHWS_CLIENT_SECRET", hide_env_values = true)]
    pub client_secret: Option<String>,

    /// Account username for the password grant
    #[arg(long, env = "AHWS_USERNAME", hide_env_values = true)]
    pub username: Option<String>,

    /// Account password for the password grant
    #[arg(long, env = "AHWS_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// API management subscription key
    #[arg(long, env = "AHWS_APIM_SUBSCRIPTION_KEY", hide_env_values = true)]
    pub subscription_key: Option<String>,

    /// Port to listen on
    #[arg(long, env = "PORT", default_value_t = 8080)]
    pub port: u16,

    /// Base URL of the booking API
    #[arg(long, env = "AHWS_BASE_URL", default_value = DEFAULT_BASE_URL)]
    pub base_url: String,

    /// Cache snapshot file [default: <cache dir>/snapshot.json]
    #[arg(long, env = "VENUEBOARD_SNAPSHOT", value_name = "PATH")]
    pub snapshot_path: Option<PathBuf>,

    /// Room group mapping file
    #[arg(long, env = "VENUEBOARD_MAPPING", value_name = "PATH", default_value = "mapping.json")]
    pub mapping_path: PathBuf,

    /// What to cache: nothing, tokens only, or tokens and responses
    #[arg(long, env = "VENUEBOARD_CACHE_LEVEL", value_enum, default_value_t = CacheLevel::All)]
    pub cache_level: CacheLevel,

    /// Timezone the venue's clock runs in
    #[arg(long, env = "VENUEBOARD_TIMEZONE", default_value = "EST")]
    pub timezone: String,

    /// Upper bound on how long an access token is cached
    #[arg(long, default_value_t = 900)]
    pub access_ttl_secs: u64,

    /// How long a refresh token is cached
    #[arg(long, default_value_t = 71)]
    pub refresh_ttl_hours: u64,

    /// Interval between expired-entry sweeps (0 disables)
    #[arg(long, default_value_t = 1200)]
    pub sweep_interval_secs: u64,

    /// Renew the access token in the background at this interval
    #[arg(long)]
    pub token_keepalive_secs: Option<u64>,

    /// Timeout for each upstream request
    #[arg(long, default_value_t = 30)]
    pub upstream_timeout_secs: u64,
}

/// Validated settings for one server run
#[derive(Debug, Clone)]
pub struct Config {
    pub login: LoginCredentials,
    pub api: ApiConfig,
    pub port: u16,
    pub snapshot_path: PathBuf,
    pub mapping_path: PathBuf,
    pub cache_level: CacheLevel,
    pub timezone: Tz,
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
    pub refresh: RefreshConfig,
    pub upstream_timeout: Duration,
}

fn required(value: &Option<String>, name: &'static str) -> Result<String, ConfigError> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or(ConfigError::Missing(name))
}

/// Default snapshot location under the platform cache directory
pub fn default_snapshot_path() -> PathBuf {
    ProjectDirs::from("", "", "venueboard")
        .map(|dirs| dirs.cache_dir().join(SNAPSHOT_FILE))
        .unwrap_or_else(|| PathBuf::from(SNAPSHOT_FILE))
}

impl Config {
    /// Validates parsed arguments; credentials other than the secret are required
    pub fn from_cli(cli: &Cli) -> Result<Self, ConfigError> {
        let login = LoginCredentials {
            client_id: required(&cli.client_id, "AHWS_CLIENT_ID")?,
            client_secret: cli.client_secret.clone().unwrap_or_default(),
            username: required(&cli.username, "AHWS_USERNAME")?,
            password: required(&cli.password, "AHWS_PASSWORD")?,
        };
        let subscription_key = required(&cli.subscription_key, "AHWS_APIM_SUBSCRIPTION_KEY")?;

        let timezone: Tz = cli
            .timezone
            .parse()
            .map_err(|_| ConfigError::InvalidTimezone(cli.timezone.clone()))?;

        Ok(Self {
            login,
            api: ApiConfig::new(cli.base_url.as_str(), subscription_key),
            port: cli.port,
            snapshot_path: cli.snapshot_path.clone().unwrap_or_else(default_snapshot_path),
            mapping_path: cli.mapping_path.clone(),
            cache_level: cli.cache_level,
            timezone,
            access_ttl: Duration::from_secs(cli.access_ttl_secs),
            refresh_ttl: Duration::from_secs(cli.refresh_ttl_hours * 60 * 60),
            refresh: RefreshConfig {
                sweep_interval: Some(Duration::from_secs(cli.sweep_interval_secs)),
                token_keepalive: cli.token_keepalive_secs.map(Duration::from_secs),
            },
            upstream_timeout: Duration::from_secs(cli.upstream_timeout_secs),
        })
    }

    /// Token manager settings derived from the credentials and cache level
    pub fn token_settings(&self) -> TokenSettings {
        TokenSettings {
            login: self.login.clone(),
            access_ttl: self.access_ttl,
            refresh_ttl: self.refresh_ttl,
            cache_tokens: self.cache_level.caches_tokens(),
        }
    }
}
