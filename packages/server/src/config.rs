use anyhow::{bail, Context, Result};
use dotenvy::dotenv;
use outlived::config::{DEFAULT_METRICS_BASE_URL, DEFAULT_WIKI_BASE_URL};
use outlived::ScrapeConfig;
use std::env;
use std::str::FromStr;

/// Which queue drains scrape tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueMode {
    /// In-process pending lists polled on a timer
    Local,
    /// Leased tasks drained by a worker pool
    Managed,
}

impl FromStr for QueueMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(QueueMode::Local),
            "managed" => Ok(QueueMode::Managed),
            other => bail!("unknown queue mode {:?} (expected local or managed)", other),
        }
    }
}

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub queue: QueueMode,
    /// SQLite URL for tasks and figures; in-memory storage when unset
    pub database_url: Option<String>,
    pub wiki_url: String,
    pub metrics_url: String,
    pub requests_per_second: u32,
    /// Managed-queue workers in this process
    pub workers: usize,
    pub scan_cron: String,
    pub expire_cron: String,
    pub scan_on_start: bool,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from any key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        Ok(Self {
            queue: var("OUTLIVED_QUEUE")
                .map(|v| v.parse())
                .transpose()
                .context("OUTLIVED_QUEUE must be local or managed")?
                .unwrap_or(QueueMode::Local),
            database_url: var("DATABASE_URL"),
            wiki_url: var("OUTLIVED_WIKI_URL")
                .unwrap_or_else(|| DEFAULT_WIKI_BASE_URL.to_string()),
            metrics_url: var("OUTLIVED_METRICS_URL")
                .unwrap_or_else(|| DEFAULT_METRICS_BASE_URL.to_string()),
            requests_per_second: var("OUTLIVED_RPS")
                .unwrap_or_else(|| "10".to_string())
                .parse()
                .context("OUTLIVED_RPS must be a valid number")?,
            workers: var("OUTLIVED_WORKERS")
                .unwrap_or_else(|| "1".to_string())
                .parse()
                .context("OUTLIVED_WORKERS must be a valid number")?,
            scan_cron: var("OUTLIVED_SCAN_CRON").unwrap_or_else(|| "0 0 3 * * *".to_string()),
            expire_cron: var("OUTLIVED_EXPIRE_CRON")
                .unwrap_or_else(|| "0 0 4 * * *".to_string()),
            scan_on_start: var("OUTLIVED_SCAN_ON_START")
                .map(|v| parse_flag(&v))
                .transpose()
                .context("OUTLIVED_SCAN_ON_START must be true or false")?
                .unwrap_or(false),
        })
    }

    /// Pipeline settings derived from this configuration.
    pub fn scrape_config(&self) -> ScrapeConfig {
        ScrapeConfig::default()
            .with_wiki_base_url(self.wiki_url.clone())
            .with_metrics_base_url(self.metrics_url.clone())
            .with_rate_limit(self.requests_per_second, self.requests_per_second)
    }
}

fn parse_flag(value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => bail!("not a boolean: {:?}", other),
    }
}
