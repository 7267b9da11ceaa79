//! HTTP feed source backed by `reqwest` and `feed-rs`.

use super::{FeedItem, FeedSource};
use crate::error::FetchError;
use feed_rs::model::Entry;
use feed_rs::parser;
use reqwest::{Client, Response};
use std::time::Duration;
use tracing::{debug, instrument};

/// Connect timeout in seconds.
const CONNECT_TIMEOUT_SECS: u64 = 10;

/// Maximum number of redirects to follow.
const MAX_REDIRECTS: usize = 5;

/// Largest feed body accepted, in bytes.
pub const MAX_FEED_SIZE: u64 = 10 * 1024 * 1024;

const USER_AGENT: &str = concat!("rss_discord_notifier/", env!("CARGO_PKG_VERSION"));

/// Fetches feeds over HTTP(S).
///
/// One client is shared by every feed so connections to the same host are
/// reused across a run.
#[derive(Debug, Clone)]
pub struct HttpFeedSource {
    client: Client,
}

impl HttpFeedSource {
    pub fn new() -> Result<Self, FetchError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .user_agent(USER_AGENT)
            .build()
            .map_err(FetchError::Client)?;
        Ok(Self { client })
    }
}

impl FeedSource for HttpFeedSource {
    #[instrument(level = "debug", skip(self))]
    async fn parse(&self, url: &str, timeout: Duration) -> Result<Vec<FeedItem>, FetchError> {
        let mut response = self.client.get(url).timeout(timeout).send().await?;

        if !response.status().is_success() {
            return Err(FetchError::Status(response.status()));
        }

        if let Some(size) = response.content_length() {
            if size > MAX_FEED_SIZE {
                return Err(FetchError::TooLarge {
                    size,
                    max: MAX_FEED_SIZE,
                });
            }
        }

        let bytes = read_body_limited(&mut response, MAX_FEED_SIZE).await?;
        let items = parse_feed(&bytes)?;
        debug!(bytes = bytes.len(), items = items.len(), "Parsed feed");
        Ok(items)
    }
}

/// Read the response body chunk by chunk, giving up as soon as more than
/// `max` bytes have arrived.
async fn read_body_limited(response: &mut Response, max: u64) -> Result<Vec<u8>, FetchError> {
    let mut body = Vec::new();
    let mut received = 0u64;
    while let Some(chunk) = response.chunk().await? {
        received += chunk.len() as u64;
        if received > max {
            return Err(FetchError::TooLarge {
                size: received,
                max,
            });
        }
        body.extend_from_slice(&chunk);
    }
    Ok(body)
}

/// Parse a feed document into raw items.
///
/// Entries without a native identifier (an RSS item with no `<guid>`) come
/// back with `id: None` rather than an id synthesized by the parser, so the
/// item link is used as the identity downstream.
pub fn parse_feed(bytes: &[u8]) -> Result<Vec<FeedItem>, FetchError> {
    let feed = parser::Builder::new()
        .id_generator(|_, _, _| String::new())
        .build()
        .parse(bytes)
        .map_err(|e| FetchError::Parse(e.to_string()))?;
    Ok(feed.entries.into_iter().map(entry_to_item).collect())
}

fn entry_to_item(entry: Entry) -> FeedItem {
    let link = entry
        .links
        .iter()
        .find(|l| matches!(l.rel.as_deref(), None | Some("alternate")))
        .or_else(|| entry.links.first())
        .map(|l| l.href.clone());

    let image_url = entry
        .media
        .iter()
        .flat_map(|m| m.thumbnails.iter())
        .map(|t| t.image.uri.clone())
        .next()
        .or_else(|| {
            entry
                .media
                .iter()
                .flat_map(|m| m.content.iter())
                .find(|c| {
                    c.content_type
                        .as_ref()
                        .is_some_and(|ct| ct.to_string().starts_with("image/"))
                })
                .and_then(|c| c.url.as_ref().map(|u| u.to_string()))
        });

    FeedItem {
        id: Some(entry.id).filter(|id| !id.is_empty()),
        link,
        title: entry.title.map(|t| t.content),
        description: entry.summary.map(|t| t.content),
        content: entry.content.and_then(|c| c.body),
        author: entry.authors.first().map(|a| a.name.clone()),
        published: entry.published,
        updated: entry.updated,
        image_url,
    }
}
