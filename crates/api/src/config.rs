//! Process configuration read from the environment at startup.

use std::net::SocketAddr;

use thiserror::Error;

use expenseflow_infra::StoreConfig;
use expenseflow_observability::{LogFormat, ParseLogFormatError};

#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("invalid BIND_ADDR {0:?}")]
    BindAddr(String),

    #[error("invalid LOG_FORMAT: {0}")]
    LogFormat(#[from] ParseLogFormatError),

    #[error(transparent)]
    Store(#[from] expenseflow_infra::ConfigError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub log_format: LogFormat,
    pub store: StoreConfig,
}

impl AppConfig {
    pub const DEFAULT_BIND_ADDR: &'static str = "0.0.0.0:8080";

    pub fn from_env() -> Result<Self, AppConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, AppConfigError> {
        let raw_addr = lookup("BIND_ADDR").unwrap_or_else(|| Self::DEFAULT_BIND_ADDR.to_string());
        let bind_addr = raw_addr
            .trim()
            .parse()
            .map_err(|_| AppConfigError::BindAddr(raw_addr.clone()))?;

        let log_format = match lookup("LOG_FORMAT") {
            Some(v) => v.parse()?,
            None => LogFormat::default(),
        };

        Ok(Self {
            bind_addr,
            log_format,
            store: StoreConfig::from_lookup(&lookup)?,
        })
    }
}
