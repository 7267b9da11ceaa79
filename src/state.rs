//! Durable record of which articles have already been announced.
//!
//! The [`StateStore`] owns the [`State`] document for the duration of a run.
//! Lookups and updates happen in memory; the file is only touched by
//! [`StateStore::load`] at startup and [`StateStore::save`] at the end.
//!
//! # Retention
//!
//! Two bounds are applied together on every save (never on lookup):
//!
//! - **Age**: records notified more than `cleanup_days` ago are dropped.
//! - **Count**: each feed keeps at most `max_articles_per_feed` records, the
//!   most recently notified ones.

use crate::models::{Article, State};
use crate::error::StateError;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tracing::{debug, info, instrument};

/// Records kept per feed unless configured otherwise.
pub const DEFAULT_MAX_ARTICLES_PER_FEED: usize = 100;

/// Age in days after which records are dropped unless configured otherwise.
pub const DEFAULT_CLEANUP_DAYS: i64 = 30;

/// Owner of the persisted notification state.
#[derive(Debug)]
pub struct StateStore {
    path: PathBuf,
    state: State,
    max_articles_per_feed: usize,
    cleanup_days: i64,
}

impl StateStore {
    /// Create a store for `path` holding an empty state. Call
    /// [`StateStore::load`] to read what is on disk.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            state: State::new(),
            max_articles_per_feed: DEFAULT_MAX_ARTICLES_PER_FEED,
            cleanup_days: DEFAULT_CLEANUP_DAYS,
        }
    }

    /// Override the retention bounds. `0` disables the respective bound.
    pub fn with_retention(mut self, max_articles_per_feed: usize, cleanup_days: i64) -> Self {
        self.max_articles_per_feed = max_articles_per_feed;
        self.cleanup_days = cleanup_days;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the state file.
    ///
    /// A missing file is not an error: the store starts from an empty state,
    /// which makes the run a first run.
    ///
    /// # Errors
    ///
    /// [`StateError::Read`] if the file exists but cannot be read, and
    /// [`StateError::Parse`] if its content is not a valid state document.
    #[instrument(level = "info", skip_all, fields(path = %self.path.display()))]
    pub async fn load(&mut self) -> Result<(), StateError> {
        let data = match fs::read(&self.path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("State file not found; starting with empty state");
                self.state = State::new();
                return Ok(());
            }
            Err(source) => {
                return Err(StateError::Read {
                    path: self.path.display().to_string(),
                    source,
                });
            }
        };

        self.state = serde_json::from_slice(&data).map_err(|source| StateError::Parse {
            path: self.path.display().to_string(),
            source,
        })?;

        info!(
            last_update = %self.state.last_update,
            feeds_count = self.state.feeds.len(),
            "Loaded state file"
        );
        Ok(())
    }

    /// Apply retention, stamp `last_update` and write the document.
    ///
    /// Parent directories are created as needed. The document is written to
    /// a sibling temporary file first and then renamed over the target, so a
    /// crash mid-write leaves the previous state intact.
    #[instrument(level = "info", skip_all, fields(path = %self.path.display()))]
    pub async fn save(&mut self) -> Result<(), StateError> {
        let now = Utc::now();
        self.cleanup(now);
        self.state.last_update = now;

        let data = serde_json::to_vec_pretty(&self.state).map_err(StateError::Serialize)?;
        let write_err = |source| StateError::Write {
            path: self.path.display().to_string(),
            source,
        };

        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).await.map_err(write_err)?;
        }

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        fs::write(&tmp, &data).await.map_err(write_err)?;
        fs::rename(&tmp, &self.path).await.map_err(write_err)?;

        info!(
            feeds_count = self.state.feeds.len(),
            total_articles = self.state.statistics.total_articles_notified,
            "Saved state file"
        );
        Ok(())
    }

    /// Whether `article_id` has already been announced for `feed_url`.
    ///
    /// Unknown feeds answer `false` without creating an entry.
    pub fn is_notified(&self, feed_url: &str, article_id: &str) -> bool {
        self.state
            .feeds
            .get(feed_url)
            .is_some_and(|fs| fs.is_article_notified(article_id))
    }

    /// Record a successful delivery of `article`.
    ///
    /// This always appends; check [`StateStore::is_notified`] first to avoid
    /// duplicate records.
    pub fn mark_notified(&mut self, article: &Article) {
        self.state
            .feed_state_mut(&article.feed_url)
            .add_notified_article(article, Utc::now());
        self.state.statistics.total_articles_notified += 1;
    }

    /// Add this run's counters to the cumulative statistics.
    pub fn update_statistics(&mut self, feeds_checked: usize, duration: Duration) {
        let stats = &mut self.state.statistics;
        stats.total_feeds_checked += feeds_checked as u64;
        stats.last_run_duration = duration.as_secs_f64();
    }

    /// Number of records currently held for `feed_url`.
    #[cfg(test)]
    pub fn notified_count(&self, feed_url: &str) -> usize {
        self.state
            .feeds
            .get(feed_url)
            .map_or(0, |fs| fs.notified_articles.len())
    }

    /// A store with no feed entries has never announced anything.
    pub fn is_first_run(&self) -> bool {
        self.state.feeds.is_empty()
    }

    pub fn state(&self) -> &State {
        &self.state
    }

    /// Apply both retention bounds as of `now`.
    pub fn cleanup(&mut self, now: DateTime<Utc>) {
        debug!(
            cleanup_days = self.cleanup_days,
            max_articles_per_feed = self.max_articles_per_feed,
            "Cleaning up state"
        );
        for (feed_url, feed_state) in self.state.feeds.iter_mut() {
            let before = feed_state.notified_articles.len();
            feed_state.cleanup_old_articles(self.cleanup_days, now);
            feed_state.limit_article_count(self.max_articles_per_feed);
            let after = feed_state.notified_articles.len();
            if before != after {
                debug!(%feed_url, before, after, "Trimmed feed history");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::tests::article;
    use crate::models::NotifiedArticle;
    use chrono::Duration as ChronoDuration;
    use tempfile::TempDir;

    const FEED: &str = "https://example.com/feed.xml";

    fn store_in(dir: &TempDir) -> StateStore {
        StateStore::new(dir.path().join("state.json"))
    }

    fn push_record(store: &mut StateStore, id: &str, notified_at: DateTime<Utc>) {
        store
            .state
            .feed_state_mut(FEED)
            .notified_articles
            .push(NotifiedArticle {
                id: id.to_string(),
                title: id.to_string(),
                url: format!("https://example.com/{id}"),
                published_at: notified_at,
                notified_at,
            });
    }

    #[tokio::test]
    async fn test_load_missing_file_is_first_run() {
        let dir = TempDir::new().unwrap();
        let mut store = store_in(&dir);
        store.load().await.unwrap();
        assert!(store.is_first_run());
        assert_eq!(store.state().version, "1.0");
    }

    #[tokio::test]
    async fn test_load_corrupt_file_is_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.json");
        tokio::fs::write(&path, b"{ not json").await.unwrap();

        let mut store = StateStore::new(&path);
        let err = store.load().await.unwrap_err();
        assert!(matches!(err, StateError::Parse { .. }));
    }

    #[test]
    fn test_mark_and_query() {
        let mut store = StateStore::new("unused.json");
        let a = article(FEED, "a", 1);

        assert!(!store.is_notified(FEED, "a"));
        store.mark_notified(&a);
        assert!(store.is_notified(FEED, "a"));
        assert!(!store.is_notified(FEED, "b"));
        assert!(!store.is_notified("https://other.example/feed", "a"));
        assert_eq!(store.state().statistics.total_articles_notified, 1);
        assert!(!store.is_first_run());
    }

    #[test]
    fn test_query_does_not_create_feed_entry() {
        let store = StateStore::new("unused.json");
        assert!(!store.is_notified(FEED, "a"));
        assert!(store.is_first_run());
    }

    #[test]
    fn test_marking_twice_appends_two_records() {
        let mut store = StateStore::new("unused.json");
        let a = article(FEED, "a", 1);
        store.mark_notified(&a);
        store.mark_notified(&a);
        assert_eq!(store.notified_count(FEED), 2);
        assert_eq!(store.state().statistics.total_articles_notified, 2);
    }

    #[test]
    fn test_update_statistics_accumulates() {
        let mut store = StateStore::new("unused.json");
        store.update_statistics(3, Duration::from_millis(1500));
        store.update_statistics(2, Duration::from_millis(250));
        let stats = &store.state().statistics;
        assert_eq!(stats.total_feeds_checked, 5);
        assert!((stats.last_run_duration - 0.25).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_save_then_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let mut store = store_in(&dir);
        let other = "https://other.example/atom";
        store.mark_notified(&article(FEED, "a", 1));
        store.mark_notified(&article(FEED, "b", 2));
        store.mark_notified(&article(other, "c", 3));
        store.save().await.unwrap();

        let mut reloaded = store_in(&dir);
        reloaded.load().await.unwrap();
        assert!(!reloaded.is_first_run());
        assert!(reloaded.is_notified(FEED, "a"));
        assert!(reloaded.is_notified(FEED, "b"));
        assert!(reloaded.is_notified(other, "c"));
        assert!(!reloaded.is_notified(other, "a"));
        assert_eq!(reloaded.state().statistics.total_articles_notified, 3);
    }

    #[tokio::test]
    async fn test_save_creates_directories() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested/deeper/state.json");
        let mut store = StateStore::new(&path);
        store.save().await.unwrap();
        assert!(path.exists());
        assert!(!dir.path().join("nested/deeper/state.json.tmp").exists());
    }

    #[tokio::test]
    async fn test_save_applies_age_retention() {
        let dir = TempDir::new().unwrap();
        let mut store = store_in(&dir).with_retention(100, 30);
        let now = Utc::now();
        push_record(&mut store, "old", now - ChronoDuration::days(40));
        push_record(&mut store, "recent", now - ChronoDuration::days(1));

        store.save().await.unwrap();

        let mut reloaded = store_in(&dir);
        reloaded.load().await.unwrap();
        assert!(!reloaded.is_notified(FEED, "old"));
        assert!(reloaded.is_notified(FEED, "recent"));
    }

    #[tokio::test]
    async fn test_save_applies_count_retention() {
        let dir = TempDir::new().unwrap();
        let mut store = store_in(&dir).with_retention(100, 30);
        let base = Utc::now() - ChronoDuration::hours(200);
        for i in 0..150 {
            push_record(&mut store, &format!("a{i}"), base + ChronoDuration::hours(i));
        }

        store.save().await.unwrap();

        assert_eq!(store.notified_count(FEED), 100);
        assert!(!store.is_notified(FEED, "a49"));
        assert!(store.is_notified(FEED, "a50"));
        assert!(store.is_notified(FEED, "a149"));
    }

    #[test]
    fn test_retention_is_not_applied_on_query() {
        let mut store = StateStore::new("unused.json").with_retention(100, 30);
        push_record(&mut store, "old", Utc::now() - ChronoDuration::days(40));
        assert!(store.is_notified(FEED, "old"));
    }
}
