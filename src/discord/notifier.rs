//! Article delivery with bounded retries.
//!
//! # Retry Strategy
//!
//! - At most `max_retries` attempts in total (3 by default)
//! - A fixed `retry_delay` between attempts (5 seconds by default)
//! - Any transport error or non-2xx response counts as a failed attempt
//! - Cancellation aborts at once, without using up the remaining attempts

use super::message::WebhookMessage;
use super::transport::Transport;
use crate::error::DeliveryError;
use crate::models::Article;
use std::fmt;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

pub const DEFAULT_MAX_RETRIES: usize = 3;
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Renders articles and sends them through a [`Transport`], retrying
/// failed attempts.
pub struct Notifier<T> {
    transport: T,
    max_retries: usize,
    retry_delay: Duration,
    cancel: CancellationToken,
}

impl<T> fmt::Debug for Notifier<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Notifier")
            .field("max_retries", &self.max_retries)
            .field("retry_delay", &self.retry_delay)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}

impl<T: Transport> Notifier<T> {
    /// Create a notifier with the default retry policy.
    ///
    /// # Arguments
    ///
    /// * `transport` - Performs the actual POST
    /// * `cancel` - Aborts in-flight attempts and retry waits when cancelled
    pub fn new(transport: T, cancel: CancellationToken) -> Self {
        Self {
            transport,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay: DEFAULT_RETRY_DELAY,
            cancel,
        }
    }

    /// Override the retry policy. A `max_retries` of zero is treated as one.
    pub fn with_retry(mut self, max_retries: usize, retry_delay: Duration) -> Self {
        self.max_retries = max_retries.max(1);
        self.retry_delay = retry_delay;
        self
    }

    #[cfg(test)]
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Announce one article on `webhook_url`.
    ///
    /// # Errors
    ///
    /// [`DeliveryError::RetriesExhausted`] once every attempt has failed, or
    /// [`DeliveryError::Cancelled`] if the run was cancelled first.
    #[instrument(level = "info", skip_all, fields(title = %article.title, feed = %article.feed_name))]
    pub async fn send_article(&self, article: &Article, webhook_url: &str) -> Result<(), DeliveryError> {
        let message = WebhookMessage::for_article(article);
        self.send_with_retry(webhook_url, &message).await?;
        info!(category = %article.category, "Notified article");
        Ok(())
    }

    async fn send_with_retry(&self, url: &str, message: &WebhookMessage) -> Result<(), DeliveryError> {
        let total_t0 = Instant::now();
        let mut attempt = 0usize;

        loop {
            if self.cancel.is_cancelled() {
                return Err(DeliveryError::Cancelled);
            }

            let attempt_t0 = Instant::now();
            let result = tokio::select! {
                _ = self.cancel.cancelled() => return Err(DeliveryError::Cancelled),
                res = self.transport.post(url, message) => res,
            };

            let e = match result {
                Ok(()) => return Ok(()),
                Err(e) => e,
            };

            attempt += 1;
            if attempt >= self.max_retries {
                error!(
                    attempt,
                    max = self.max_retries,
                    elapsed_ms_total = total_t0.elapsed().as_millis() as u64,
                    error = %e,
                    "Webhook delivery exhausted retries"
                );
                return Err(DeliveryError::RetriesExhausted {
                    attempts: attempt,
                    last: Box::new(e),
                });
            }

            warn!(
                attempt,
                max = self.max_retries,
                elapsed_ms_attempt = attempt_t0.elapsed().as_millis() as u64,
                delay = ?self.retry_delay,
                error = %e,
                "Webhook delivery failed; retrying"
            );

            tokio::select! {
                _ = self.cancel.cancelled() => return Err(DeliveryError::Cancelled),
                _ = tokio::time::sleep(self.retry_delay) => {}
            }
            debug!(attempt = attempt + 1, "Retrying webhook delivery");
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::models::tests::article;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Records every POST and answers from a script; once the script runs
    /// out every call succeeds.
    #[derive(Default)]
    pub(crate) struct ScriptedTransport {
        pub(crate) sent: Mutex<Vec<(String, WebhookMessage)>>,
        pub(crate) script: Mutex<VecDeque<bool>>,
        pub(crate) fail_titles: Vec<String>,
    }

    impl ScriptedTransport {
        pub(crate) fn failing_times(n: usize) -> Self {
            Self {
                script: Mutex::new(std::iter::repeat_n(false, n).collect()),
                ..Self::default()
            }
        }

        pub(crate) fn sent_titles(&self) -> Vec<String> {
            self.sent
                .lock()
                .unwrap()
                .iter()
                .map(|(_, m)| m.embeds[0].title.clone())
                .collect()
        }

        pub(crate) fn attempts(&self) -> usize {
            self.sent.lock().unwrap().len()
        }
    }

    impl Transport for ScriptedTransport {
        async fn post(&self, url: &str, message: &WebhookMessage) -> Result<(), DeliveryError> {
            self.sent
                .lock()
                .unwrap()
                .push((url.to_string(), message.clone()));
            let title = message.embeds.first().map(|e| e.title.as_str()).unwrap_or("");
            let scripted_ok = self.script.lock().unwrap().pop_front().unwrap_or(true);
            if scripted_ok && !self.fail_titles.iter().any(|t| t == title) {
                Ok(())
            } else {
                Err(DeliveryError::Status {
                    status: reqwest::StatusCode::INTERNAL_SERVER_ERROR,
                    body: "scripted failure".to_string(),
                })
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_article_succeeds_first_try() {
        let notifier = Notifier::new(ScriptedTransport::default(), CancellationToken::new());
        let a = article("https://f", "a", 1);
        notifier.send_article(&a, "https://hook").await.unwrap();
        assert_eq!(notifier.transport.attempts(), 1);
        let sent = notifier.transport.sent.lock().unwrap();
        assert_eq!(sent[0].0, "https://hook");
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_article_retries_then_succeeds() {
        let notifier = Notifier::new(ScriptedTransport::failing_times(2), CancellationToken::new());
        let a = article("https://f", "a", 1);
        let t0 = tokio::time::Instant::now();

        notifier.send_article(&a, "https://hook").await.unwrap();

        assert_eq!(notifier.transport.attempts(), 3);
        assert!(t0.elapsed() >= DEFAULT_RETRY_DELAY * 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_article_exhausts_retries() {
        let notifier = Notifier::new(ScriptedTransport::failing_times(10), CancellationToken::new())
            .with_retry(3, Duration::from_secs(1));
        let a = article("https://f", "a", 1);

        let err = notifier.send_article(&a, "https://hook").await.unwrap_err();

        assert!(matches!(err, DeliveryError::RetriesExhausted { attempts: 3, .. }));
        assert_eq!(notifier.transport.attempts(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_during_retry_delay_aborts() {
        let cancel = CancellationToken::new();
        let notifier = Notifier::new(ScriptedTransport::failing_times(10), cancel.clone())
            .with_retry(5, Duration::from_secs(60));
        let a = article("https://f", "a", 1);

        let canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            cancel.cancel();
        });

        let err = notifier.send_article(&a, "https://hook").await.unwrap_err();
        canceller.await.unwrap();

        assert!(matches!(err, DeliveryError::Cancelled));
        assert_eq!(notifier.transport.attempts(), 1);
    }

    #[tokio::test]
    async fn test_already_cancelled_sends_nothing() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let notifier = Notifier::new(ScriptedTransport::default(), cancel);
        let a = article("https://f", "a", 1);

        let err = notifier.send_article(&a, "https://hook").await.unwrap_err();
        assert!(matches!(err, DeliveryError::Cancelled));
        assert_eq!(notifier.transport.attempts(), 0);
    }
}
