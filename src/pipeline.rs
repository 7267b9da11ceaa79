//! One notification cycle: fetch, filter, order, deliver, record.
//!
//! The cycle is the only owner of the [`StateStore`] while it runs. Fetching
//! is concurrent across feeds; delivery is strictly sequential with a pause
//! of `rate_limit_ms` between consecutive articles.

use crate::config::AppConfig;
use crate::discord::{Notifier, Transport};
use crate::error::{DeliveryError, PipelineError};
use crate::feed::{FeedSource, Fetcher};
use crate::models::Article;
use crate::state::StateStore;
use itertools::Itertools;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

/// Articles delivered on a run that starts from an empty state.
pub const FIRST_RUN_MAX_ARTICLES: usize = 5;

/// Outcome of one cycle.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    pub feeds_checked: usize,
    /// Valid articles fetched across all feeds.
    pub total_articles: usize,
    /// Articles that were not yet in the state.
    pub new_articles: usize,
    pub notified: usize,
    pub failed: usize,
    pub cancelled: bool,
    pub duration: Duration,
}

/// Keep the articles that are valid and not yet notified, in input order.
pub fn filter_new_articles(articles: Vec<Article>, store: &StateStore) -> Vec<Article> {
    articles
        .into_iter()
        .filter(|a| {
            if !a.is_valid() {
                warn!(id = %a.id, title = %a.title, feed = %a.feed_name, "Skipping invalid article");
                return false;
            }
            !store.is_notified(&a.feed_url, &a.id)
        })
        .collect()
}

/// The `n` most recently published articles, newest first.
pub fn most_recent(articles: Vec<Article>, n: usize) -> Vec<Article> {
    articles
        .into_iter()
        .sorted_by(|a, b| b.published_at.cmp(&a.published_at))
        .take(n)
        .collect()
}

/// Oldest first. Stable, so equal timestamps keep their relative order.
pub fn sort_chronologically(articles: &mut [Article]) {
    articles.sort_by_key(|a| a.published_at);
}

/// Apply the first-run and per-run caps, then order for delivery.
pub fn select_for_delivery(
    mut articles: Vec<Article>,
    first_run: bool,
    max_per_run: usize,
) -> Vec<Article> {
    if first_run && articles.len() > FIRST_RUN_MAX_ARTICLES {
        info!(
            found = articles.len(),
            limit = FIRST_RUN_MAX_ARTICLES,
            "First run detected; limiting articles"
        );
        articles = most_recent(articles, FIRST_RUN_MAX_ARTICLES);
    }
    if articles.len() > max_per_run {
        warn!(
            found = articles.len(),
            limit = max_per_run,
            "Too many new articles; limiting this run"
        );
        articles = most_recent(articles, max_per_run);
    }
    sort_chronologically(&mut articles);
    articles
}

/// Run one full cycle against `store`.
///
/// Per-feed and per-article failures are logged and counted in the summary.
/// Statistics are updated and the state is saved even when the run is
/// cancelled part way.
///
/// # Errors
///
/// [`PipelineError::State`] if the state cannot be saved, and
/// [`PipelineError::Cancelled`] (after saving) if `cancel` fired.
#[instrument(level = "info", skip_all, fields(state = %store.path().display()))]
pub async fn run_cycle<S, T>(
    config: &AppConfig,
    store: &mut StateStore,
    fetcher: &Fetcher<S>,
    notifier: &Notifier<T>,
    cancel: &CancellationToken,
) -> Result<RunSummary, PipelineError>
where
    S: FeedSource,
    T: Transport,
{
    let t0 = Instant::now();
    let first_run = store.is_first_run();
    let feeds = config.feeds.enabled_feeds();
    info!(feeds = feeds.len(), first_run, "Starting notification cycle");

    let mut summary = RunSummary {
        feeds_checked: feeds.len(),
        ..RunSummary::default()
    };

    let fetched = fetcher.fetch_all(&feeds, cancel).await;
    summary.total_articles = fetched.len();

    let new_articles = filter_new_articles(fetched, store);
    summary.new_articles = new_articles.len();
    info!(
        total = summary.total_articles,
        new = summary.new_articles,
        "Filtered new articles"
    );

    let selected = select_for_delivery(
        new_articles,
        first_run,
        config.feeds.notification.max_articles_per_run(),
    );
    let rate_limit = config.feeds.notification.rate_limit();

    summary.cancelled = cancel.is_cancelled();
    for (i, article) in selected.iter().enumerate() {
        if summary.cancelled {
            break;
        }
        if i > 0 && !rate_limit.is_zero() {
            tokio::select! {
                _ = cancel.cancelled() => {
                    summary.cancelled = true;
                    break;
                }
                _ = tokio::time::sleep(rate_limit) => {}
            }
        }

        let endpoint = article
            .webhook_url
            .as_deref()
            .filter(|u| !u.is_empty())
            .unwrap_or(config.webhook_url.as_str());

        match notifier.send_article(article, endpoint).await {
            Ok(()) => {
                store.mark_notified(article);
                summary.notified += 1;
            }
            Err(DeliveryError::Cancelled) => summary.cancelled = true,
            Err(e) => {
                summary.failed += 1;
                error!(title = %article.title, feed = %article.feed_name, error = %e, "Failed to notify article");
            }
        }
    }

    summary.duration = t0.elapsed();
    store.update_statistics(summary.feeds_checked, summary.duration);
    store.save().await?;

    info!(
        feeds_checked = summary.feeds_checked,
        total_articles = summary.total_articles,
        new_articles = summary.new_articles,
        notified = summary.notified,
        failed = summary.failed,
        cancelled = summary.cancelled,
        duration_ms = summary.duration.as_millis() as u64,
        "Notification cycle finished"
    );

    if summary.cancelled {
        return Err(PipelineError::Cancelled {
            notified: summary.notified,
        });
    }
    Ok(summary)
}
