//! Concurrent fetching of every enabled feed.

use super::{FeedItem, FeedSource};
use crate::config::FeedConfig;
use crate::error::FetchError;
use crate::models::Article;
use crate::utils::strip_html;
use chrono::Utc;
use futures::stream::{self, StreamExt};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Fetches feeds through a [`FeedSource`] and turns their items into
/// [`Article`]s.
#[derive(Debug)]
pub struct Fetcher<S> {
    source: S,
    timeout: Duration,
}

impl<S: FeedSource> Fetcher<S> {
    /// # Arguments
    ///
    /// * `source` - Where raw feed items come from
    /// * `timeout` - Upper bound for fetching any single feed
    pub fn new(source: S, timeout: Duration) -> Self {
        Self { source, timeout }
    }

    /// Fetch all feeds concurrently and return the union of their articles.
    ///
    /// Every feed runs as its own future; results meet at a single collection
    /// point once all of them have finished. A feed that fails, times out or
    /// is cancelled is logged and contributes nothing. The order of the
    /// returned articles across feeds is unspecified.
    #[instrument(level = "info", skip_all, fields(feed_count = feeds.len()))]
    pub async fn fetch_all(&self, feeds: &[FeedConfig], cancel: &CancellationToken) -> Vec<Article> {
        if feeds.is_empty() {
            return Vec::new();
        }

        info!("Fetching feeds");
        let t0 = Instant::now();

        let results: Vec<(&FeedConfig, Result<Vec<Article>, FetchError>)> = stream::iter(feeds)
            .map(|feed| async move { (feed, self.fetch(feed, cancel).await) })
            .buffer_unordered(feeds.len())
            .collect()
            .await;

        let mut articles = Vec::new();
        let mut failed = 0usize;
        for (feed, result) in results {
            match result {
                Ok(mut fetched) => {
                    debug!(feed = %feed.name, count = fetched.len(), "Fetched feed");
                    articles.append(&mut fetched);
                }
                Err(e) => {
                    failed += 1;
                    warn!(feed = %feed.name, url = %feed.url, error = %e, "Feed fetch failed; skipping feed");
                }
            }
        }

        info!(
            total_feeds = feeds.len(),
            success = feeds.len() - failed,
            failed,
            total_articles = articles.len(),
            elapsed_ms = t0.elapsed().as_millis() as u64,
            "Finished fetching feeds"
        );
        articles
    }

    /// Fetch a single feed, bounded by the per-feed timeout and `cancel`.
    ///
    /// Items that are still missing an id, title or url after fallbacks are
    /// dropped.
    pub async fn fetch(
        &self,
        feed: &FeedConfig,
        cancel: &CancellationToken,
    ) -> Result<Vec<Article>, FetchError> {
        debug!(feed = %feed.name, url = %feed.url, "Fetching feed");
        let parse = tokio::time::timeout(self.timeout, self.source.parse(&feed.url, self.timeout));

        let items = tokio::select! {
            _ = cancel.cancelled() => return Err(FetchError::Cancelled),
            res = parse => match res {
                Ok(items) => items?,
                Err(_) => return Err(FetchError::Timeout(self.timeout)),
            },
        };

        let total = items.len();
        let articles: Vec<Article> = items
            .into_iter()
            .map(|item| to_article(item, feed))
            .filter(Article::is_valid)
            .collect();
        if articles.len() < total {
            debug!(feed = %feed.name, dropped = total - articles.len(), "Dropped incomplete items");
        }
        Ok(articles)
    }
}

/// Normalize one raw item into an [`Article`] for `feed`.
///
/// Fallbacks: id ← link, url ← id, description ← content, content ←
/// description, published ← updated ← now, updated ← published.
pub fn to_article(item: FeedItem, feed: &FeedConfig) -> Article {
    let non_empty = |s: Option<String>| s.filter(|v| !v.trim().is_empty());

    let link = non_empty(item.link);
    let id = non_empty(item.id).or_else(|| link.clone()).unwrap_or_default();
    let url = link.unwrap_or_else(|| id.clone());

    let raw_description = non_empty(item.description);
    let raw_content = non_empty(item.content);
    let description = raw_description
        .as_deref()
        .or(raw_content.as_deref())
        .map(strip_html)
        .unwrap_or_default();
    let content = raw_content
        .as_deref()
        .or(raw_description.as_deref())
        .map(strip_html)
        .unwrap_or_default();

    let published_at = item.published.or(item.updated).unwrap_or_else(Utc::now);
    let updated_at = item.updated.unwrap_or(published_at);

    Article {
        id,
        title: non_empty(item.title).map(|t| t.trim().to_string()).unwrap_or_default(),
        url,
        description,
        content,
        author: item.author.unwrap_or_default(),
        published_at,
        updated_at,
        feed_name: feed.name.clone(),
        feed_url: feed.url.clone(),
        category: feed.category.clone(),
        webhook_url: feed.webhook_url.clone(),
        image_url: non_empty(item.image_url),
    }
}
