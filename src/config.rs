// ⚙️ Configuration - environment overrides on top of defaults
//
// Environment variables:
//   LEDGER_DB_PATH          SQLite file (default: group-ledger.db)
//   LEDGER_BIND_ADDR        server address (default: 0.0.0.0:3000)
//   LEDGER_LOG or RUST_LOG  tracing filter (default: info)
//   LEDGER_SPLIT_TOLERANCE  custom split tolerance (default: 0.01)

use anyhow::{anyhow, bail, Context, Result};
use rust_decimal::Decimal;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use tracing_subscriber::EnvFilter;

use crate::money::one_cent;

#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub database_path: PathBuf,
    pub bind_addr: SocketAddr,
    pub log_filter: String,
    pub split_tolerance: Decimal,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("group-ledger.db"),
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 3000)),
            log_filter: "info".to_string(),
            split_tolerance: one_cent(),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key/value source; unset keys keep their defaults
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(path) = lookup("LEDGER_DB_PATH") {
            if path.trim().is_empty() {
                bail!("LEDGER_DB_PATH is set but empty");
            }
            config.database_path = PathBuf::from(path);
        }

        if let Some(addr) = lookup("LEDGER_BIND_ADDR") {
            config.bind_addr = addr
                .parse()
                .with_context(|| format!("LEDGER_BIND_ADDR '{}' is not a socket address", addr))?;
        }

        if let Some(filter) = lookup("LEDGER_LOG").or_else(|| lookup("RUST_LOG")) {
            EnvFilter::try_new(&filter)
                .with_context(|| format!("log filter '{}' is not a valid directive", filter))?;
            config.log_filter = filter;
        }

        if let Some(tolerance) = lookup("LEDGER_SPLIT_TOLERANCE") {
            let value = Decimal::from_str(tolerance.trim()).with_context(|| {
                format!("LEDGER_SPLIT_TOLERANCE '{}' is not a decimal", tolerance)
            })?;
            if value.is_sign_negative() {
                bail!("LEDGER_SPLIT_TOLERANCE must not be negative, got {}", value);
            }
            config.split_tolerance = value;
        }

        Ok(config)
    }
}

/// Install the global fmt subscriber
pub fn init_tracing(config: &AppConfig) -> Result<()> {
    let filter = EnvFilter::try_new(&config.log_filter)
        .with_context(|| format!("invalid log filter '{}'", config.log_filter))?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .map_err(|e| anyhow!("failed to install tracing subscriber: {}", e))
}
