//! Runtime configuration
//!
//! Defaults, overridden by `datalens.toml` in the working directory, then by
//! `DATALENS_*` environment variables (`DATALENS_HTTP_PORT=8080`).

use crate::domain::error::{AppError, Result};
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const CONFIG_FILE: &str = "datalens.toml";
pub const ENV_PREFIX: &str = "DATALENS_";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub http_host: String,
    pub http_port: u16,
    /// Upper bound for one read query
    pub query_timeout_secs: u64,
    /// Upper bound for one whole ingestion transaction
    pub bulk_load_timeout_secs: u64,
    /// Rows returned by trusted reads when the caller sets no limit
    pub default_read_limit: usize,
    pub max_connections: u32,
    /// `tracing` filter directive, e.g. `info` or `datalens_lib=debug`
    pub log_filter: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite://datalens.db?mode=rwc".to_string(),
            http_host: "127.0.0.1".to_string(),
            http_port: 3001,
            query_timeout_secs: 30,
            bulk_load_timeout_secs: 300,
            default_read_limit: 100,
            max_connections: 8,
            log_filter: "info".to_string(),
        }
    }
}

impl AppConfig {
    pub fn figment() -> Figment {
        Figment::from(Serialized::defaults(AppConfig::default()))
            .merge(Toml::file(CONFIG_FILE))
            .merge(Env::prefixed(ENV_PREFIX))
    }

    pub fn load() -> Result<Self> {
        Self::from_figment(Self::figment())
    }

    pub fn from_figment(figment: Figment) -> Result<Self> {
        let config: AppConfig = figment
            .extract()
            .map_err(|e| AppError::ValidationError(format!("Invalid configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.max_connections == 0 {
            return Err(AppError::ValidationError(
                "max_connections must be at least 1".to_string(),
            ));
        }
        if self.query_timeout_secs == 0 || self.bulk_load_timeout_secs == 0 {
            return Err(AppError::ValidationError(
                "Timeouts must be at least one second".to_string(),
            ));
        }
        if self.default_read_limit == 0 {
            return Err(AppError::ValidationError(
                "default_read_limit must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.query_timeout_secs)
    }

    pub fn bulk_load_timeout(&self) -> Duration {
        Duration::from_secs(self.bulk_load_timeout_secs)
    }
}
