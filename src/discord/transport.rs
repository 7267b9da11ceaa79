//! Raw webhook POST.

use super::message::WebhookMessage;
use crate::error::DeliveryError;
use crate::utils::truncate_for_log;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, instrument};

/// Client-wide timeout for one webhook request.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Longest response body kept in an error, in characters.
const ERROR_BODY_MAX: usize = 500;

/// Something that can POST a webhook message.
pub trait Transport {
    /// Send `message` to `url` once. Any non-2xx response is an error.
    async fn post(&self, url: &str, message: &WebhookMessage) -> Result<(), DeliveryError>;
}

/// [`Transport`] over HTTP(S) with `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new() -> Result<Self, DeliveryError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(DeliveryError::Client)?;
        Ok(Self { client })
    }
}

impl Transport for HttpTransport {
    #[instrument(level = "debug", skip_all)]
    async fn post(&self, url: &str, message: &WebhookMessage) -> Result<(), DeliveryError> {
        let response = self.client.post(url).json(message).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DeliveryError::Status {
                status,
                body: truncate_for_log(&body, ERROR_BODY_MAX),
            });
        }
        debug!(status = status.as_u16(), "Webhook accepted message");
        Ok(())
    }
}
