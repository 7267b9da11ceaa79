//! Feed retrieval and normalization.
//!
//! Fetching is split in two layers:
//!
//! 1. **Source**: a [`FeedSource`] turns one feed URL into raw [`FeedItem`]s.
//!    [`http::HttpFeedSource`] does this over HTTP with `feed-rs`, which
//!    understands RSS 0.9x/1.0/2.0, Atom and JSON Feed.
//! 2. **Fetcher**: [`fetcher::Fetcher`] runs the source for every enabled feed
//!    concurrently, applies the per-feed timeout and cancellation, and
//!    normalizes the items into [`crate::models::Article`]s.
//!
//! A failing feed never fails the batch: its error is logged and its
//! articles are simply missing from the run.

pub mod fetcher;
pub mod http;

use crate::error::FetchError;
use chrono::{DateTime, Utc};
use std::time::Duration;

pub use fetcher::Fetcher;
pub use http::HttpFeedSource;

/// One raw entry as the feed published it. Any field may be missing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeedItem {
    pub id: Option<String>,
    pub link: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub content: Option<String>,
    pub author: Option<String>,
    pub published: Option<DateTime<Utc>>,
    pub updated: Option<DateTime<Utc>>,
    pub image_url: Option<String>,
}

/// Capability to download and parse one feed.
pub trait FeedSource {
    /// Fetch `url` and return its entries, giving up after `timeout`.
    async fn parse(&self, url: &str, timeout: Duration) -> Result<Vec<FeedItem>, FetchError>;
}
