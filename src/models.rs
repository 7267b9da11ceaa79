//! Data models for feed articles and the persisted notification state.
//!
//! This module defines the core data structures used throughout the application:
//! - [`Article`]: One normalized feed entry, produced fresh on every run
//! - [`State`]: The persisted de-duplication document
//! - [`FeedState`] / [`NotifiedArticle`]: Per-feed notification history
//! - [`Statistics`]: Cumulative run counters
//!
//! The state types serialize with snake_case keys and RFC 3339 timestamps so
//! the state file stays readable and diffable.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Version stamped into freshly created state documents.
pub const STATE_VERSION: &str = "1.0";

/// A single article taken from a feed.
///
/// Articles are ephemeral: the fetcher builds them on each run and the
/// pipeline drops them once they are delivered or skipped. Only the
/// identifying fields survive, as a [`NotifiedArticle`] in the state file.
#[derive(Debug, Clone, PartialEq)]
pub struct Article {
    /// Feed-native unique identifier, or the item link when the feed has none.
    pub id: String,
    pub title: String,
    pub url: String,
    /// Plain-text summary (HTML stripped).
    pub description: String,
    /// Plain-text body (HTML stripped).
    pub content: String,
    pub author: String,
    pub published_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Display name of the feed this article came from.
    pub feed_name: String,
    /// URL of the feed this article came from. Keys the state document.
    pub feed_url: String,
    pub category: String,
    /// Dedicated webhook for this article's feed, if configured.
    pub webhook_url: Option<String>,
    /// Thumbnail image, if the feed supplied one.
    pub image_url: Option<String>,
}

impl Article {
    /// An article is usable only with a non-empty id, title and url.
    pub fn is_valid(&self) -> bool {
        !self.id.is_empty() && !self.title.is_empty() && !self.url.is_empty()
    }

    /// Shorten the description to at most `max_chars` characters.
    ///
    /// When truncation happens the last three characters of the budget are
    /// replaced with `...`. Budgets of three or fewer characters get a plain
    /// cut. Lengths are counted in `char`s so multi-byte text is never split.
    ///
    /// # Examples
    ///
    /// ```ignore
    /// article.description = "Hello, world!".into();
    /// assert_eq!(article.short_description(8), "Hello...");
    /// ```
    pub fn short_description(&self, max_chars: usize) -> String {
        if self.description.chars().count() <= max_chars {
            return self.description.clone();
        }
        if max_chars > 3 {
            let cut: String = self.description.chars().take(max_chars - 3).collect();
            format!("{cut}...")
        } else {
            self.description.chars().take(max_chars).collect()
        }
    }
}

/// The persisted de-duplication document.
///
/// One file holds the whole document. It is loaded at startup, mutated in
/// memory for the duration of the run and written back at the end.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct State {
    pub version: String,
    pub last_update: DateTime<Utc>,
    /// Feed URL → notification history for that feed.
    #[serde(default)]
    pub feeds: HashMap<String, FeedState>,
    #[serde(default)]
    pub statistics: Statistics,
}

impl State {
    pub fn new() -> Self {
        Self {
            version: STATE_VERSION.to_string(),
            last_update: Utc::now(),
            feeds: HashMap::new(),
            statistics: Statistics::default(),
        }
    }

    /// Get the history for `feed_url`, creating an empty one if missing.
    pub fn feed_state_mut(&mut self, feed_url: &str) -> &mut FeedState {
        self.feeds
            .entry(feed_url.to_string())
            .or_insert_with(FeedState::new)
    }
}

impl Default for State {
    fn default() -> Self {
        Self::new()
    }
}

/// Notification history for one feed URL.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FeedState {
    pub last_check: DateTime<Utc>,
    /// Append-only at write time. Not deduplicated: callers check
    /// [`FeedState::is_article_notified`] before appending.
    #[serde(default)]
    pub notified_articles: Vec<NotifiedArticle>,
}

impl FeedState {
    pub fn new() -> Self {
        Self {
            last_check: Utc::now(),
            notified_articles: Vec::new(),
        }
    }

    /// Linear membership test by article id.
    pub fn is_article_notified(&self, article_id: &str) -> bool {
        self.notified_articles.iter().any(|a| a.id == article_id)
    }

    /// Append a record for `article`, stamped `notified_at`.
    pub fn add_notified_article(&mut self, article: &Article, notified_at: DateTime<Utc>) {
        self.notified_articles.push(NotifiedArticle {
            id: article.id.clone(),
            title: article.title.clone(),
            url: article.url.clone(),
            published_at: article.published_at,
            notified_at,
        });
        self.last_check = notified_at;
    }

    /// Drop records whose `notified_at` is not after `now - days`.
    ///
    /// A non-positive `days` disables age eviction.
    pub fn cleanup_old_articles(&mut self, days: i64, now: DateTime<Utc>) {
        if days <= 0 {
            return;
        }
        let cutoff = now - Duration::days(days);
        self.notified_articles.retain(|a| a.notified_at > cutoff);
    }

    /// Keep only the `max_count` most recently notified records.
    ///
    /// Records are stably sorted by `notified_at` first, so the result does
    /// not depend on append order. A zero `max_count` disables the bound.
    pub fn limit_article_count(&mut self, max_count: usize) {
        if max_count == 0 || self.notified_articles.len() <= max_count {
            return;
        }
        self.notified_articles.sort_by_key(|a| a.notified_at);
        let excess = self.notified_articles.len() - max_count;
        self.notified_articles.drain(..excess);
    }
}

impl Default for FeedState {
    fn default() -> Self {
        Self::new()
    }
}

/// The persisted record of one delivered article.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NotifiedArticle {
    pub id: String,
    pub title: String,
    pub url: String,
    pub published_at: DateTime<Utc>,
    pub notified_at: DateTime<Utc>,
}

/// Cumulative counters across all runs.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Statistics {
    pub total_articles_notified: u64,
    pub total_feeds_checked: u64,
    /// Wall-clock duration of the last run, in seconds.
    pub last_run_duration: f64,
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::TimeZone;

    /// Build a valid article for `feed_url` published `day` days into 2025.
    pub(crate) fn article(feed_url: &str, id: &str, day: u32) -> Article {
        let published = Utc.with_ymd_and_hms(2025, 1, day, 12, 0, 0).unwrap();
        Article {
            id: id.to_string(),
            title: format!("Title {id}"),
            url: format!("https://example.com/{id}"),
            description: format!("Description of {id}"),
            content: String::new(),
            author: String::new(),
            published_at: published,
            updated_at: published,
            feed_name: "Example".to_string(),
            feed_url: feed_url.to_string(),
            category: "Tech".to_string(),
            webhook_url: None,
            image_url: None,
        }
    }

    fn notified(id: &str, notified_at: DateTime<Utc>) -> NotifiedArticle {
        NotifiedArticle {
            id: id.to_string(),
            title: id.to_string(),
            url: format!("https://example.com/{id}"),
            published_at: notified_at,
            notified_at,
        }
    }

    #[test]
    fn test_is_valid_requires_id_title_and_url() {
        let a = article("https://f", "a", 1);
        assert!(a.is_valid());

        let mut no_id = a.clone();
        no_id.id.clear();
        assert!(!no_id.is_valid());

        let mut no_title = a.clone();
        no_title.title.clear();
        assert!(!no_title.is_valid());

        let mut no_url = a;
        no_url.url.clear();
        assert!(!no_url.is_valid());
    }

    #[test]
    fn test_short_description_untouched_when_within_budget() {
        let mut a = article("https://f", "a", 1);
        a.description = "short".to_string();
        assert_eq!(a.short_description(300), "short");
        assert_eq!(a.short_description(5), "short");
    }

    #[test]
    fn test_short_description_adds_ellipsis() {
        let mut a = article("https://f", "a", 1);
        a.description = "Hello, world!".to_string();
        assert_eq!(a.short_description(8), "Hello...");
        assert_eq!(a.short_description(8).chars().count(), 8);
    }

    #[test]
    fn test_short_description_tiny_budget_is_plain_cut() {
        let mut a = article("https://f", "a", 1);
        a.description = "abcdef".to_string();
        assert_eq!(a.short_description(3), "abc");
    }

    #[test]
    fn test_short_description_multibyte() {
        let mut a = article("https://f", "a", 1);
        a.description = "日本語のテキストです".to_string();
        assert_eq!(a.short_description(6), "日本語...");
    }

    #[test]
    fn test_feed_state_membership_and_duplicates() {
        let mut fs = FeedState::new();
        let a = article("https://f", "a", 1);
        assert!(!fs.is_article_notified("a"));

        fs.add_notified_article(&a, Utc::now());
        fs.add_notified_article(&a, Utc::now());
        assert!(fs.is_article_notified("a"));
        assert_eq!(fs.notified_articles.len(), 2);
    }

    #[test]
    fn test_cleanup_old_articles() {
        let now = Utc::now();
        let mut fs = FeedState::new();
        fs.notified_articles.push(notified("old", now - Duration::days(40)));
        fs.notified_articles.push(notified("fresh", now - Duration::days(1)));

        fs.cleanup_old_articles(30, now);

        assert!(!fs.is_article_notified("old"));
        assert!(fs.is_article_notified("fresh"));
    }

    #[test]
    fn test_cleanup_disabled_for_non_positive_days() {
        let now = Utc::now();
        let mut fs = FeedState::new();
        fs.notified_articles.push(notified("ancient", now - Duration::days(4000)));
        fs.cleanup_old_articles(0, now);
        assert_eq!(fs.notified_articles.len(), 1);
    }

    #[test]
    fn test_limit_article_count_keeps_latest_even_when_shuffled() {
        let base = Utc::now() - Duration::days(5);
        let mut fs = FeedState::new();
        // Append in a scrambled order: 0, 149, 1, 148, ...
        let mut order = Vec::new();
        let (mut lo, mut hi) = (0i64, 149i64);
        while lo <= hi {
            order.push(lo);
            if lo != hi {
                order.push(hi);
            }
            lo += 1;
            hi -= 1;
        }
        for i in order {
            fs.notified_articles
                .push(notified(&format!("a{i}"), base + Duration::minutes(i)));
        }

        fs.limit_article_count(100);

        assert_eq!(fs.notified_articles.len(), 100);
        for i in 0..50 {
            assert!(!fs.is_article_notified(&format!("a{i}")));
        }
        for i in 50..150 {
            assert!(fs.is_article_notified(&format!("a{i}")));
        }
    }

    #[test]
    fn test_state_serialization_uses_snake_case() {
        let mut state = State::new();
        let a = article("https://f", "a", 1);
        state.feed_state_mut("https://f").add_notified_article(&a, Utc::now());

        let json = serde_json::to_string(&state).unwrap();
        assert!(json.contains("\"last_update\""));
        assert!(json.contains("\"notified_articles\""));
        assert!(json.contains("\"total_articles_notified\""));
        assert!(json.contains("\"published_at\""));
    }

    #[test]
    fn test_state_deserializes_minimal_document() {
        let json = r#"{
            "version": "1.0",
            "last_update": "2025-01-01T00:00:00Z"
        }"#;
        let state: State = serde_json::from_str(json).unwrap();
        assert!(state.feeds.is_empty());
        assert_eq!(state.statistics.total_articles_notified, 0);
    }
}
