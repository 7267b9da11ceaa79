//! Error types for each layer of the notifier.
//!
//! Configuration and state errors are fatal and bubble up to `main`. Fetch
//! and delivery errors are contained at the granularity of one feed or one
//! article by the pipeline and only ever logged.

use thiserror::Error;

/// Errors raised while loading or validating configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The config file is not valid YAML for the expected schema.
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },

    /// The configuration parsed but is not usable.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Errors raised by the notification state store.
#[derive(Error, Debug)]
pub enum StateError {
    #[error("failed to read state file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse state file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to serialize state: {0}")]
    Serialize(#[source] serde_json::Error),

    #[error("failed to write state file {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Errors raised while fetching a single feed.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("failed to create HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP error: {0}")]
    Status(reqwest::StatusCode),

    #[error("feed too large: {size} bytes (max {max} bytes)")]
    TooLarge { size: u64, max: u64 },

    #[error("failed to parse feed: {0}")]
    Parse(String),

    #[error("timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("fetch cancelled")]
    Cancelled,
}

/// Errors raised while delivering a message to a webhook.
#[derive(Error, Debug)]
pub enum DeliveryError {
    #[error("failed to create HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("webhook returned error: status={status}, body={body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("failed after {attempts} attempts: {last}")]
    RetriesExhausted {
        attempts: usize,
        #[source]
        last: Box<DeliveryError>,
    },

    #[error("delivery cancelled")]
    Cancelled,
}

/// Errors that end a notification cycle early.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    State(#[from] StateError),

    /// The run was cancelled; the state was persisted before returning.
    #[error("run cancelled after {notified} notification(s)")]
    Cancelled { notified: usize },
}
