//! Configuration types.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;

use crate::error::ConfigError;

/// Database path that selects an in-memory store.
pub const MEMORY_DB: &str = ":memory:";

/// Server configuration, read from `WIZARD_*` environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    /// libSQL database file, or `:memory:`.
    pub db_path: String,
    pub bind: IpAddr,
    pub port: u16,
    /// Directory for daily-rolling log files. Logs go to stderr only when unset.
    pub log_dir: Option<PathBuf>,
    /// Allowed CORS origin (`*` for any). No CORS layer when unset.
    pub cors_origin: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            db_path: "./data/onboarding.db".to_string(),
            bind: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 8080,
            log_dir: None,
            cors_origin: None,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup. Blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let defaults = Self::default();

        let port = match get("WIZARD_PORT") {
            Some(raw) => raw.parse().map_err(|e| invalid("WIZARD_PORT", &raw, e))?,
            None => defaults.port,
        };
        let bind = match get("WIZARD_BIND") {
            Some(raw) => raw.parse().map_err(|e| invalid("WIZARD_BIND", &raw, e))?,
            None => defaults.bind,
        };

        Ok(Self {
            db_path: get("WIZARD_DB_PATH").unwrap_or(defaults.db_path),
            bind,
            port,
            log_dir: get("WIZARD_LOG_DIR").map(PathBuf::from),
            cors_origin: get("WIZARD_CORS_ORIGIN"),
        })
    }

    pub fn addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind, self.port)
    }

    pub fn is_memory_db(&self) -> bool {
        self.db_path == MEMORY_DB
    }
}

fn invalid(key: &str, raw: &str, err: impl std::fmt::Display) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("{raw:?}: {err}"),
    }
}
