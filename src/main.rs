//! # RSS Discord Notifier
//!
//! A batch job that polls a configured set of RSS/Atom feeds, works out which
//! articles have not been announced yet, and posts each of them as an embed
//! to a Discord webhook. A JSON state file remembers what was already sent,
//! so repeated runs (cron, CI schedules) never announce the same article twice.
//!
//! ## Usage
//!
//! ```sh
//! DISCORD_WEBHOOK_URL=https://discord.com/api/webhooks/... \
//!     rss_discord_notifier -c ./configs/feeds.yaml -s ./state/state.json
//! ```
//!
//! ## Architecture
//!
//! Each invocation runs exactly one cycle:
//! 1. **Fetching**: Download and parse every enabled feed concurrently
//! 2. **Filtering**: Drop invalid and already-notified articles, apply caps
//! 3. **Delivery**: Post the remainder oldest first, rate limited, with retries
//! 4. **Persistence**: Record successes, prune old records, save the state
//!
//! Ctrl-C cancels the cycle; whatever was delivered so far is still saved.

use clap::Parser;
use std::error::Error;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

mod cli;
mod config;
mod discord;
mod error;
mod feed;
mod logging;
mod models;
mod pipeline;
mod state;
mod utils;

use cli::Cli;
use config::AppConfig;
use discord::{HttpTransport, Notifier};
use feed::{Fetcher, HttpFeedSource};
use state::StateStore;

#[tokio::main]
#[instrument]
async fn main() -> Result<(), Box<dyn Error>> {
    let args = Cli::parse();
    logging::init(args.log_level, args.log_format);

    let start_time = std::time::Instant::now();
    info!(version = env!("CARGO_PKG_VERSION"), "rss_discord_notifier starting up");

    let config = AppConfig::load(&args).await.inspect_err(|e| {
        error!(error = %e, "Failed to load configuration");
    })?;
    info!(
        feeds = config.feeds.feeds.len(),
        enabled = config.feeds.enabled_feeds().len(),
        state_file = %config.state_file_path.display(),
        "Configuration loaded"
    );

    let retention = &config.feeds.retention;
    let mut store = StateStore::new(&config.state_file_path).with_retention(
        retention.max_articles_per_feed as usize,
        retention.cleanup_days,
    );
    store.load().await.inspect_err(|e| {
        error!(error = %e, "Failed to load state");
    })?;

    // --- Cancellation ---
    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received; stopping after the current step");
            on_signal.cancel();
        }
    });

    let notification = &config.feeds.notification;
    let fetcher = Fetcher::new(HttpFeedSource::new()?, notification.fetch_timeout());
    let notifier = Notifier::new(HttpTransport::new()?, cancel.clone())
        .with_retry(notification.max_retries(), notification.retry_delay());

    match pipeline::run_cycle(&config, &mut store, &fetcher, &notifier, &cancel).await {
        Ok(summary) => {
            info!(
                notified = summary.notified,
                failed = summary.failed,
                total_notified = store.state().statistics.total_articles_notified,
                elapsed_ms = start_time.elapsed().as_millis() as u64,
                "rss_discord_notifier finished"
            );
            Ok(())
        }
        Err(e) => {
            error!(error = %e, elapsed_ms = start_time.elapsed().as_millis() as u64, "Run did not complete");
            Err(e.into())
        }
    }
}
