//! Configuration loading and validation.
//!
//! The feed list and notification tuning live in a YAML file (by default
//! `./configs/feeds.yaml`). Deployment-specific values (the default webhook,
//! state path and logging) come from the command line or the environment,
//! see [`crate::cli::Cli`]. Both are merged into one [`AppConfig`] that is
//! validated once at startup; any problem there is fatal.
//!
//! # Example
//!
//! ```yaml
//! version: "1.0"
//! notification:
//!   max_articles_per_run: 10
//!   timeout_seconds: 30
//!   rate_limit_ms: 1000
//! feeds:
//!   - name: Rust Blog
//!     url: https://blog.rust-lang.org/feed.xml
//!     category: Tech
//!     enabled: true
//!     webhook_url: ${DISCORD_WEBHOOK_URL_TECH}
//! ```

use crate::cli::Cli;
use crate::error::ConfigError;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, instrument, warn};

const DEFAULT_MAX_ARTICLES_PER_RUN: i64 = 10;
const DEFAULT_TIMEOUT_SECONDS: i64 = 30;
const DEFAULT_RATE_LIMIT_MS: i64 = 1000;
const DEFAULT_MAX_RETRIES: i64 = 3;
const DEFAULT_RETRY_DELAY_SECONDS: i64 = 5;
const DEFAULT_MAX_ARTICLES_PER_FEED: i64 = 100;
const DEFAULT_CLEANUP_DAYS: i64 = 30;

/// `${VAR_NAME}` references inside config values.
static ENV_VAR_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}").expect("valid env var regex"));

/// One feed entry from the YAML file.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct FeedConfig {
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub enabled: bool,
    /// Dedicated webhook for this feed. `${VAR}` references are expanded.
    #[serde(default)]
    pub webhook_url: Option<String>,
}

impl FeedConfig {
    pub fn is_valid(&self) -> bool {
        !self.name.is_empty() && !self.url.is_empty()
    }
}

/// Notification tuning. Out-of-range values fall back to defaults in
/// [`FeedsFile::normalize`].
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct NotificationConfig {
    #[serde(default = "default_max_articles_per_run")]
    pub max_articles_per_run: i64,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: i64,
    #[serde(default = "default_rate_limit_ms")]
    pub rate_limit_ms: i64,
    #[serde(default = "default_max_retries")]
    pub max_retries: i64,
    #[serde(default = "default_retry_delay_seconds")]
    pub retry_delay_seconds: i64,
}

impl NotificationConfig {
    pub fn max_articles_per_run(&self) -> usize {
        self.max_articles_per_run as usize
    }

    /// Per-feed fetch timeout.
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds as u64)
    }

    /// Pause between two consecutive deliveries.
    pub fn rate_limit(&self) -> Duration {
        Duration::from_millis(self.rate_limit_ms as u64)
    }

    pub fn max_retries(&self) -> usize {
        self.max_retries as usize
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_seconds as u64)
    }
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            max_articles_per_run: DEFAULT_MAX_ARTICLES_PER_RUN,
            timeout_seconds: DEFAULT_TIMEOUT_SECONDS,
            rate_limit_ms: DEFAULT_RATE_LIMIT_MS,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay_seconds: DEFAULT_RETRY_DELAY_SECONDS,
        }
    }
}

/// Bounds applied to the state file when it is saved.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct RetentionConfig {
    /// Records kept per feed. `0` disables the bound.
    #[serde(default = "default_max_articles_per_feed")]
    pub max_articles_per_feed: i64,
    /// Records notified longer ago than this are dropped. `0` disables it.
    #[serde(default = "default_cleanup_days")]
    pub cleanup_days: i64,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            max_articles_per_feed: DEFAULT_MAX_ARTICLES_PER_FEED,
            cleanup_days: DEFAULT_CLEANUP_DAYS,
        }
    }
}

fn default_max_articles_per_run() -> i64 {
    DEFAULT_MAX_ARTICLES_PER_RUN
}

fn default_timeout_seconds() -> i64 {
    DEFAULT_TIMEOUT_SECONDS
}

fn default_rate_limit_ms() -> i64 {
    DEFAULT_RATE_LIMIT_MS
}

fn default_max_retries() -> i64 {
    DEFAULT_MAX_RETRIES
}

fn default_retry_delay_seconds() -> i64 {
    DEFAULT_RETRY_DELAY_SECONDS
}

fn default_max_articles_per_feed() -> i64 {
    DEFAULT_MAX_ARTICLES_PER_FEED
}

fn default_cleanup_days() -> i64 {
    DEFAULT_CLEANUP_DAYS
}

/// The YAML feed file.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct FeedsFile {
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub notification: NotificationConfig,
    #[serde(default)]
    pub retention: RetentionConfig,
    #[serde(default)]
    pub feeds: Vec<FeedConfig>,
}

impl FeedsFile {
    /// Parse a YAML document, normalize tuning values and expand webhook
    /// environment references.
    pub fn from_yaml(path: &str, yaml: &str) -> Result<Self, ConfigError> {
        let mut file: FeedsFile =
            serde_yaml::from_str(yaml).map_err(|source| ConfigError::Parse {
                path: path.to_string(),
                source,
            })?;
        file.normalize();
        for feed in &mut file.feeds {
            if let Some(hook) = feed.webhook_url.take() {
                let expanded = expand_env_vars(&hook);
                let unset = unexpanded_env_refs(&expanded);
                if !unset.is_empty() {
                    warn!(
                        feed = %feed.name,
                        variables = ?unset,
                        "Webhook URL references unset environment variables; deliveries for this feed will fail"
                    );
                }
                feed.webhook_url = (!expanded.is_empty()).then_some(expanded);
            }
        }
        Ok(file)
    }

    /// Replace out-of-range tuning values with their defaults.
    pub fn normalize(&mut self) {
        let n = &mut self.notification;
        if n.max_articles_per_run <= 0 {
            n.max_articles_per_run = DEFAULT_MAX_ARTICLES_PER_RUN;
        }
        if n.timeout_seconds <= 0 {
            n.timeout_seconds = DEFAULT_TIMEOUT_SECONDS;
        }
        if n.rate_limit_ms < 0 {
            n.rate_limit_ms = DEFAULT_RATE_LIMIT_MS;
        }
        if n.max_retries <= 0 {
            n.max_retries = DEFAULT_MAX_RETRIES;
        }
        if n.retry_delay_seconds < 0 {
            n.retry_delay_seconds = DEFAULT_RETRY_DELAY_SECONDS;
        }
        let r = &mut self.retention;
        r.max_articles_per_feed = r.max_articles_per_feed.max(0);
        r.cleanup_days = r.cleanup_days.max(0);
    }

    /// Feeds with `enabled: true`, in file order.
    pub fn enabled_feeds(&self) -> Vec<FeedConfig> {
        self.feeds.iter().filter(|f| f.enabled).cloned().collect()
    }
}

/// Fully resolved runtime configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub feeds: FeedsFile,
    /// Webhook used for every feed without its own `webhook_url`.
    pub webhook_url: String,
    pub state_file_path: PathBuf,
}

impl AppConfig {
    /// Load the feed file named on the command line and merge it with the
    /// remaining CLI/environment values.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if the file cannot be read or parsed, or if
    /// the merged configuration fails [`AppConfig::validate`].
    #[instrument(level = "info", skip_all, fields(path = %cli.config))]
    pub async fn load(cli: &Cli) -> Result<Self, ConfigError> {
        let yaml = tokio::fs::read_to_string(&cli.config)
            .await
            .map_err(|source| ConfigError::Read {
                path: cli.config.clone(),
                source,
            })?;
        let feeds = FeedsFile::from_yaml(&cli.config, &yaml)?;
        debug!(feeds = feeds.feeds.len(), "Parsed feed file");

        let config = AppConfig {
            feeds,
            webhook_url: cli.webhook_url.clone().unwrap_or_default(),
            state_file_path: Path::new(&cli.state_file).to_path_buf(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Check the invariants every run relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.webhook_url.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "DISCORD_WEBHOOK_URL is required".to_string(),
            ));
        }
        if self.feeds.feeds.is_empty() {
            return Err(ConfigError::Invalid(
                "at least one feed is required".to_string(),
            ));
        }
        if self.feeds.enabled_feeds().is_empty() {
            return Err(ConfigError::Invalid(
                "at least one enabled feed is required".to_string(),
            ));
        }
        for (i, feed) in self.feeds.feeds.iter().enumerate() {
            if !feed.is_valid() {
                return Err(ConfigError::Invalid(format!(
                    "feed {} ({}) is invalid",
                    i, feed.name
                )));
            }
            match url::Url::parse(&feed.url) {
                Ok(u) if matches!(u.scheme(), "http" | "https") => {}
                _ => {
                    return Err(ConfigError::Invalid(format!(
                        "feed {} ({}) has an invalid url: {}",
                        i, feed.name, feed.url
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Expand `${VAR_NAME}` references from the process environment.
///
/// References to unset or empty variables are left as written, so a missing
/// secret shows up verbatim in error messages instead of silently becoming
/// an empty URL.
pub fn expand_env_vars(s: &str) -> String {
    if s.is_empty() {
        return String::new();
    }
    ENV_VAR_PATTERN
        .replace_all(s, |caps: &Captures| match std::env::var(&caps[1]) {
            Ok(value) if !value.is_empty() => value,
            _ => caps[0].to_string(),
        })
        .into_owned()
}

/// Names of the `${VAR_NAME}` references still present in `s`.
pub fn unexpanded_env_refs(s: &str) -> Vec<String> {
    ENV_VAR_PATTERN
        .captures_iter(s)
        .map(|caps| caps[1].to_string())
        .collect()
}
