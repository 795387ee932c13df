//! Process configuration, read once from the environment at startup.
//!
//! DESIGN
//! ======
//! Required-ish settings (port, persistence URL, origins, mode) are parsed
//! strictly and fail startup when malformed. Numeric tunables go through
//! `env_parse`, which falls back to the compiled default on absence or parse
//! failure so a typo never takes the canvas down.

use std::path::PathBuf;
use std::time::Duration;

use crate::services::simplify::SimplifyConfig;
use crate::services::validate::ValidationLimits;
use crate::throttle::ThrottleConfig;

const DEFAULT_PORT: u16 = 3000;
const DEFAULT_STATIC_DIR: &str = "public";

const DEFAULT_MAX_SHAPES: usize = 1000;
const DEFAULT_SHAPE_TTL_SECS: u64 = 600;
const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 60;
const DEFAULT_MAX_HISTORY: usize = 10;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid PORT: {0}")]
    InvalidPort(String),
}

/// Deployment mode. Controls the CORS fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
}

impl Environment {
    #[must_use]
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "production" | "prod" => Self::Production,
            _ => Self::Development,
        }
    }

    #[must_use]
    pub fn is_production(self) -> bool {
        self == Self::Production
    }
}

/// Limits and tunables that govern the shared canvas itself.
#[derive(Debug, Clone, Copy)]
pub struct CanvasConfig {
    pub validation: ValidationLimits,
    pub simplify: SimplifyConfig,
    pub throttle: ThrottleConfig,
    /// Element count above which the sweep evicts oldest-first.
    pub max_shapes: usize,
    /// Age in milliseconds after which the sweep evicts an element.
    pub shape_ttl_ms: i64,
    /// Undo depth.
    pub max_history: usize,
}

impl CanvasConfig {
    #[must_use]
    pub fn from_env() -> Self {
        let ttl_secs = env_parse("SHAPE_TTL_SECS", DEFAULT_SHAPE_TTL_SECS);
        Self {
            validation: ValidationLimits::from_env(),
            simplify: SimplifyConfig::from_env(),
            throttle: ThrottleConfig::from_env(),
            max_shapes: env_parse("MAX_SHAPES", DEFAULT_MAX_SHAPES),
            shape_ttl_ms: i64::try_from(ttl_secs.saturating_mul(1000)).unwrap_or(i64::MAX),
            max_history: env_parse("MAX_HISTORY", DEFAULT_MAX_HISTORY),
        }
    }
}

impl Default for CanvasConfig {
    fn default() -> Self {
        #[allow(clippy::cast_possible_wrap)]
        let shape_ttl_ms = (DEFAULT_SHAPE_TTL_SECS * 1000) as i64;
        Self {
            validation: ValidationLimits::default(),
            simplify: SimplifyConfig::default(),
            throttle: ThrottleConfig::default(),
            max_shapes: DEFAULT_MAX_SHAPES,
            shape_ttl_ms,
            max_history: DEFAULT_MAX_HISTORY,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    /// Postgres URL for best-effort persistence. `None` runs memory-only.
    pub database_url: Option<String>,
    /// Explicit CORS allow-list. Empty means "use the mode fallback".
    pub allowed_origins: Vec<String>,
    pub environment: Environment,
    pub static_dir: PathBuf,
    /// When set, privileged events require a session that presented it.
    pub admin_token: Option<String>,
    pub sweep_interval: Duration,
    pub canvas: CanvasConfig,
}

impl Config {
    /// Read configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns `InvalidPort` if `PORT` is set but not a valid port number.
    pub fn from_env() -> Result<Self, ConfigError> {
        let port = match std::env::var("PORT") {
            Ok(raw) => raw.trim().parse::<u16>().map_err(|_| ConfigError::InvalidPort(raw))?,
            Err(_) => DEFAULT_PORT,
        };

        Ok(Self {
            port,
            database_url: non_empty_var("DATABASE_URL"),
            allowed_origins: non_empty_var("ALLOWED_ORIGINS")
                .map(|raw| parse_origins(&raw))
                .unwrap_or_default(),
            environment: Environment::from_label(&std::env::var("APP_ENV").unwrap_or_default()),
            static_dir: non_empty_var("STATIC_DIR").map_or_else(|| PathBuf::from(DEFAULT_STATIC_DIR), PathBuf::from),
            admin_token: non_empty_var("ADMIN_TOKEN"),
            sweep_interval: Duration::from_secs(env_parse("SWEEP_INTERVAL_SECS", DEFAULT_SWEEP_INTERVAL_SECS)),
            canvas: CanvasConfig::from_env(),
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            database_url: None,
            allowed_origins: Vec::new(),
            environment: Environment::Development,
            static_dir: PathBuf::from(DEFAULT_STATIC_DIR),
            admin_token: None,
            sweep_interval: Duration::from_secs(DEFAULT_SWEEP_INTERVAL_SECS),
            canvas: CanvasConfig::default(),
        }
    }
}

/// Split a comma-separated origin list, dropping blanks.
#[must_use]
pub fn parse_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
        .collect()
}

fn non_empty_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

pub(crate) fn env_parse<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr + Copy,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
