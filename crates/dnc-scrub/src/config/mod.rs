use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

use crate::workflows::phone::AreaCode;

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration for the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub scrub: ScrubConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            scrub: ScrubConfig::from_env()?,
        })
    }
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Tracing and metrics controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

/// Pipeline tuning for scrub jobs and registry ingestion.
#[derive(Debug, Clone, PartialEq)]
pub struct ScrubConfig {
    /// Blocking workers used for the normalization and scoring fan-out.
    pub worker_count: usize,
    /// Extra attempts granted to a record whose registry lookup fails.
    pub score_retries: u32,
    pub retry_backoff: Duration,
    pub recency_window_days: i64,
    /// Area codes the registry subscription covers; change lists outside it are rejected.
    pub subscribed_area_codes: Vec<AreaCode>,
}

impl Default for ScrubConfig {
    fn default() -> Self {
        Self {
            worker_count: 4,
            score_retries: 2,
            retry_backoff: Duration::from_millis(25),
            recency_window_days: 30,
            subscribed_area_codes: Vec::new(),
        }
    }
}

/// Upper bound on the recency window (ten years).
pub const MAX_RECENCY_WINDOW_DAYS: i64 = 3650;

impl ScrubConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let worker_count = env_number("APP_SCRUB_WORKERS", defaults.worker_count)?;
        if worker_count == 0 {
            return Err(ConfigError::InvalidNumber {
                key: "APP_SCRUB_WORKERS",
            });
        }

        let score_retries = env_number("APP_SCRUB_SCORE_RETRIES", defaults.score_retries)?;
        let backoff_ms = env_number(
            "APP_SCRUB_RETRY_BACKOFF_MS",
            defaults.retry_backoff.as_millis() as u64,
        )?;
        let recency_window_days =
            env_number("APP_SCRUB_RECENCY_WINDOW_DAYS", defaults.recency_window_days)?;
        if !(0..=MAX_RECENCY_WINDOW_DAYS).contains(&recency_window_days) {
            return Err(ConfigError::InvalidNumber {
                key: "APP_SCRUB_RECENCY_WINDOW_DAYS",
            });
        }

        let subscribed_area_codes = match env::var("APP_REGISTRY_AREA_CODES") {
            Ok(raw) => parse_area_codes(&raw)?,
            Err(_) => defaults.subscribed_area_codes,
        };

        Ok(Self {
            worker_count,
            score_retries,
            retry_backoff: Duration::from_millis(backoff_ms),
            recency_window_days,
            subscribed_area_codes,
        })
    }
}

fn env_number<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| ConfigError::InvalidNumber { key }),
        Err(_) => Ok(default),
    }
}

fn parse_area_codes(raw: &str) -> Result<Vec<AreaCode>, ConfigError> {
    raw.split(',')
        .map(str::trim)
        .filter(|code| !code.is_empty())
        .map(|code| {
            AreaCode::parse(code).map_err(|_| ConfigError::InvalidAreaCode(code.to_string()))
        })
        .collect()
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidNumber { key: &'static str },
    InvalidAreaCode(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidNumber { key } => {
                write!(f, "{key} must be a valid number within its allowed range")
            }
            ConfigError::InvalidAreaCode(code) => write!(
                f,
                "APP_REGISTRY_AREA_CODES contains invalid area code '{code}'"
            ),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            ConfigError::InvalidPort
            | ConfigError::InvalidNumber { .. }
            | ConfigError::InvalidAreaCode(_) => None,
        }
    }
}
