// ⚙️ Server configuration from environment variables
//
//   FINANCE_DB_PATH        database file            (default: finance.db)
//   FINANCE_BIND_ADDR      listen address           (default: 0.0.0.0:3000)
//   RUST_LOG               tracing filter           (default: finance_ledger=info,tower_http=info)
//   FINANCE_PAGE_SIZE      default list page size   (default: 20)
//   FINANCE_MAX_PAGE_SIZE  largest accepted limit   (default: 100)

use anyhow::{bail, Context, Result};
use std::path::PathBuf;

pub const DEFAULT_LOG_FILTER: &str = "finance_ledger=info,tower_http=info";

#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub db_path: PathBuf,
    pub bind_addr: String,
    pub log_filter: String,
    pub default_page_size: u32,
    pub max_page_size: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            db_path: PathBuf::from("finance.db"),
            bind_addr: "0.0.0.0:3000".to_string(),
            log_filter: DEFAULT_LOG_FILTER.to_string(),
            default_page_size: 20,
            max_page_size: 100,
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; unset keys keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = ServerConfig::default();

        if let Some(path) = lookup("FINANCE_DB_PATH") {
            config.db_path = PathBuf::from(path);
        }
        if let Some(addr) = lookup("FINANCE_BIND_ADDR") {
            config.bind_addr = addr;
        }
        if let Some(filter) = lookup("RUST_LOG") {
            config.log_filter = filter;
        }
        if let Some(raw) = lookup("FINANCE_PAGE_SIZE") {
            config.default_page_size = parse_page_size("FINANCE_PAGE_SIZE", &raw)?;
        }
        if let Some(raw) = lookup("FINANCE_MAX_PAGE_SIZE") {
            config.max_page_size = parse_page_size("FINANCE_MAX_PAGE_SIZE", &raw)?;
        }

        if config.default_page_size > config.max_page_size {
            bail!(
                "FINANCE_PAGE_SIZE ({}) exceeds FINANCE_MAX_PAGE_SIZE ({})",
                config.default_page_size,
                config.max_page_size
            );
        }

        Ok(config)
    }

    /// Resolve a requested page size: default when absent, clamped to 1..=max.
    pub fn page_limit(&self, requested: Option<u32>) -> u32 {
        requested
            .unwrap_or(self.default_page_size)
            .clamp(1, self.max_page_size)
    }
}

fn parse_page_size(key: &str, raw: &str) -> Result<u32> {
    let value: u32 = raw
        .trim()
        .parse()
        .with_context(|| format!("{} must be a positive integer, got '{}'", key, raw))?;
    if value == 0 {
        bail!("{} must be greater than zero", key);
    }
    Ok(value)
}
