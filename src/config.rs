//! Configuration types for lifeline.
//!
//! Config is resolved once at startup and validated before the server opens
//! any ports. Values come from three layers, each overriding the previous:
//!
//! 1. Built-in defaults
//! 2. An optional TOML file named by `LIFELINE_CONFIG`
//! 3. Environment variables (`PORT`, `APP_VERSION`, `APP_ENV`, ...)
//!
//! # Example
//! ```toml
//! port        = 8080
//! version     = "1.4.2"
//! environment = "production"
//! git_commit  = "9f1c2ab"
//!
//! shutdown_timeout_secs      = 30
//! readiness_check_timeout_ms = 2000
//! ```

use std::{
    net::{IpAddr, Ipv4Addr},
    path::Path,
    str::FromStr,
    time::Duration,
};

use anyhow::Context;
use serde::{Deserialize, Serialize};

/// Environment variable naming the optional TOML config file.
pub const CONFIG_PATH_ENV: &str = "LIFELINE_CONFIG";

/// Listening port when neither the file nor `PORT` sets one.
pub const DEFAULT_PORT: u16 = 8080;

/// Environment name that switches error redaction on.
const PRODUCTION: &str = "production";

/// A malformed environment override.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{key}={value:?} is not a valid {expected}")]
    InvalidValue {
        key: &'static str,
        value: String,
        expected: &'static str,
    },
}

/// Top-level service configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Interface to bind (default: `0.0.0.0`).
    pub host: IpAddr,

    /// Listening port (default: 8080).
    pub port: u16,

    /// Version string reported by every status endpoint (default: `1.0.0`).
    pub version: String,

    /// Deployment environment name (default: `development`).
    ///
    /// `production` hides internal error text from callers.
    pub environment: String,

    /// Build timestamp stamped in by CI, if any.
    pub build_time: Option<String>,

    /// Source revision the binary was built from, if known.
    pub git_commit: Option<String>,

    /// Upper bound on connection drain after a termination signal (default: 30).
    pub shutdown_timeout_secs: u64,

    /// Per-check bound for readiness sub-checks in milliseconds (default: 2000).
    pub readiness_check_timeout_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
            version: "1.0.0".into(),
            environment: "development".into(),
            build_time: None,
            git_commit: None,
            shutdown_timeout_secs: 30,
            readiness_check_timeout_ms: 2_000,
        }
    }
}

impl Config {
    /// Resolve the full layered config from the process environment.
    pub fn from_env() -> anyhow::Result<Self> {
        let file = std::env::var(CONFIG_PATH_ENV)
            .ok()
            .filter(|path| !path.is_empty());
        Self::resolve(file.as_deref().map(Path::new), |key| std::env::var(key).ok())
    }

    /// Layer an optional TOML file and `lookup` overrides over the defaults,
    /// then validate.
    pub fn resolve<F>(file: Option<&Path>, lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let base = match file {
            Some(path) => Self::load(path)
                .with_context(|| format!("Failed to load config from {}", path.display()))?,
            None => Self::default(),
        };
        let config = base.with_overrides(lookup)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML file. Missing fields take their defaults.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content =
            std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        let config: Self = toml::from_str(&content).context("parsing config TOML")?;
        Ok(config)
    }

    /// Apply environment-style overrides through `lookup`.
    ///
    /// Empty values are treated as unset.
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("HOST") {
            self.host = parse("HOST", &v, "IP address")?;
        }
        if let Some(v) = get("PORT") {
            self.port = parse("PORT", &v, "port number")?;
        }
        if let Some(v) = get("APP_VERSION") {
            self.version = v;
        }
        if let Some(v) = get("APP_ENV") {
            self.environment = v;
        }
        if let Some(v) = get("BUILD_TIME") {
            self.build_time = Some(v);
        }
        if let Some(v) = get("GIT_COMMIT") {
            self.git_commit = Some(v);
        }
        if let Some(v) = get("SHUTDOWN_TIMEOUT_SECS") {
            self.shutdown_timeout_secs = parse("SHUTDOWN_TIMEOUT_SECS", &v, "number of seconds")?;
        }
        if let Some(v) = get("READINESS_CHECK_TIMEOUT_MS") {
            self.readiness_check_timeout_ms =
                parse("READINESS_CHECK_TIMEOUT_MS", &v, "number of milliseconds")?;
        }
        Ok(self)
    }

    fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            !self.environment.trim().is_empty(),
            "environment name must not be empty"
        );
        anyhow::ensure!(
            self.shutdown_timeout_secs > 0,
            "shutdown_timeout_secs must be greater than zero"
        );
        anyhow::ensure!(
            self.readiness_check_timeout_ms > 0,
            "readiness_check_timeout_ms must be greater than zero"
        );
        Ok(())
    }

    /// True when running with the `production` environment name.
    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case(PRODUCTION)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }

    pub fn readiness_check_timeout(&self) -> Duration {
        Duration::from_millis(self.readiness_check_timeout_ms)
    }

    pub fn build_time(&self) -> &str {
        self.build_time.as_deref().unwrap_or("unknown")
    }

    pub fn git_commit(&self) -> &str {
        self.git_commit.as_deref().unwrap_or("unknown")
    }
}

fn parse<T: FromStr>(key: &'static str, value: &str, expected: &'static str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key,
        value: value.to_owned(),
        expected,
    })
}
