// src/models/config.rs

//! Application configuration structures.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// HTTP and crawling behavior settings
    #[serde(default)]
    pub crawler: CrawlerConfig,

    /// Notification delivery settings
    #[serde(default)]
    pub dispatch: DispatchConfig,

    /// Telegram Bot API settings
    #[serde(default)]
    pub telegram: TelegramConfig,

    /// Source-locale month name to month number mapping
    #[serde(default)]
    pub months: MonthTable,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Load configuration or return default if loading fails.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(&path).unwrap_or_else(|e| {
            log::warn!(
                "Config load failed from {:?}: {}. Using defaults.",
                path.as_ref(),
                e
            );
            Self::default()
        })
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        if self.crawler.base_url.trim().is_empty() {
            return Err(AppError::validation("crawler.base_url is empty"));
        }
        if self.crawler.user_agent.trim().is_empty() {
            return Err(AppError::validation("crawler.user_agent is empty"));
        }
        if self.crawler.timeout_secs == 0 {
            return Err(AppError::validation("crawler.timeout_secs must be > 0"));
        }
        if self.crawler.max_pages == 0 {
            return Err(AppError::validation("crawler.max_pages must be > 0"));
        }
        if self.dispatch.batch_size == 0 {
            return Err(AppError::validation("dispatch.batch_size must be > 0"));
        }
        if self.months.is_empty() {
            return Err(AppError::validation("No month names defined"));
        }
        Ok(())
    }
}

/// HTTP client and crawling behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlerConfig {
    /// Listing site origin, also used to resolve relative links
    #[serde(default = "defaults::base_url")]
    pub base_url: String,

    /// User-Agent header for HTTP requests
    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,

    /// Request timeout in seconds
    #[serde(default = "defaults::timeout")]
    pub timeout_secs: u64,

    /// Politeness delay between page fetches in milliseconds
    #[serde(default)]
    pub request_delay_ms: u64,

    /// Soft cap on accumulated postings per crawl run
    #[serde(default = "defaults::max_jobs")]
    pub max_jobs: usize,

    /// Hard cap on pages visited per crawl run
    #[serde(default = "defaults::max_pages")]
    pub max_pages: u32,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            base_url: defaults::base_url(),
            user_agent: defaults::user_agent(),
            timeout_secs: defaults::timeout(),
            request_delay_ms: 0,
            max_jobs: defaults::max_jobs(),
            max_pages: defaults::max_pages(),
        }
    }
}

/// Notification delivery settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Delay between messages within one subscriber's run, in milliseconds
    #[serde(default = "defaults::message_delay")]
    pub message_delay_ms: u64,

    /// Number of subscribers processed concurrently per batch
    #[serde(default = "defaults::batch_size")]
    pub batch_size: usize,

    /// Delay between subscriber batches, in milliseconds
    #[serde(default = "defaults::batch_delay")]
    pub batch_delay_ms: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            message_delay_ms: defaults::message_delay(),
            batch_size: defaults::batch_size(),
            batch_delay_ms: defaults::batch_delay(),
        }
    }
}

/// Telegram Bot API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    /// Bot token; may also come from the JOBFEED_BOT_TOKEN environment variable
    #[serde(default)]
    pub bot_token: String,

    /// Pause between polling rounds, in seconds
    #[serde(default = "defaults::poll_interval")]
    pub poll_interval_secs: u64,

    /// Long-poll timeout handed to getUpdates, in seconds
    #[serde(default = "defaults::poll_timeout")]
    pub poll_timeout_secs: u64,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            bot_token: String::new(),
            poll_interval_secs: defaults::poll_interval(),
            poll_timeout_secs: defaults::poll_timeout(),
        }
    }
}

/// Month name lookup table for date normalization.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MonthTable {
    map: HashMap<String, String>,
}

impl MonthTable {
    /// Look up the two-digit month number for a localized month name.
    pub fn lookup(&self, name: &str) -> Option<&str> {
        self.map.get(name).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }
}

impl Default for MonthTable {
    fn default() -> Self {
        let map = [
            ("იანვარი", "01"),
            ("თებერვალი", "02"),
            ("მარტი", "03"),
            ("აპრილი", "04"),
            ("მაისი", "05"),
            ("ივნისი", "06"),
            ("ივლისი", "07"),
            ("აგვისტო", "08"),
            ("სექტემბერი", "09"),
            ("ოქტომბერი", "10"),
            ("ნოემბერი", "11"),
            ("დეკემბერი", "12"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        Self { map }
    }
}

/// Default values for configuration fields.
mod defaults {
    pub fn base_url() -> String {
        "https://www.jobs.ge".to_string()
    }

    pub fn user_agent() -> String {
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36".to_string()
    }

    pub fn timeout() -> u64 {
        15
    }

    pub fn max_jobs() -> usize {
        300
    }

    pub fn max_pages() -> u32 {
        999
    }

    pub fn message_delay() -> u64 {
        500
    }

    pub fn batch_size() -> usize {
        10
    }

    pub fn batch_delay() -> u64 {
        2000
    }

    pub fn poll_interval() -> u64 {
        1
    }

    pub fn poll_timeout() -> u64 {
        30
    }
}
