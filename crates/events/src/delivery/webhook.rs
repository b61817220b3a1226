//! Webhook push delivery with exponential-backoff retry.
//!
//! [`WebhookDispatcher`] POSTs a JSON body describing the notification to a
//! push gateway. Failed attempts are retried up to three times with
//! exponential backoff (1 s, 2 s, 4 s).

use std::time::Duration;

use async_trait::async_trait;
use rendezvous_core::types::DbId;

use crate::bus::MeetupEvent;
use crate::dispatcher::{DispatchError, PushDispatcher};

/// Retry delays in seconds (exponential backoff: 1s, 2s, 4s).
const RETRY_DELAYS_SECS: [u64; 3] = [1, 2, 4];

/// HTTP request timeout for a single delivery attempt.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Delivers notifications to an external push gateway.
pub struct WebhookDispatcher {
    client: reqwest::Client,
    url: String,
}

impl WebhookDispatcher {
    /// Create a dispatcher posting to `url` with a pre-configured HTTP client.
    pub fn new(url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("Failed to build reqwest HTTP client");
        Self {
            client,
            url: url.into(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Build the request body for one recipient.
    pub fn body(user_id: DbId, event: &MeetupEvent) -> serde_json::Value {
        serde_json::json!({
            "user_id": user_id,
            "event_type": event.event_type,
            "offer_id": event.offer_id,
            "match_id": event.match_id,
            "payload": event.payload,
            "timestamp": event.timestamp,
        })
    }

    /// Execute a single POST request and check the response status.
    async fn try_send(&self, body: &serde_json::Value) -> Result<(), DispatchError> {
        let response = self.client.post(&self.url).json(body).send().await?;
        if !response.status().is_success() {
            return Err(DispatchError::HttpStatus(response.status().as_u16()));
        }
        Ok(())
    }
}

#[async_trait]
impl PushDispatcher for WebhookDispatcher {
    async fn dispatch(&self, user_id: DbId, event: &MeetupEvent) -> Result<(), DispatchError> {
        let body = Self::body(user_id, event);
        let mut last_err: Option<DispatchError> = None;

        for (attempt, delay_secs) in RETRY_DELAYS_SECS.iter().enumerate() {
            match self.try_send(&body).await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    tracing::warn!(
                        attempt = attempt + 1,
                        user_id,
                        event_type = %event.event_type,
                        error = %e,
                        "Push delivery attempt failed, retrying"
                    );
                    last_err = Some(e);
                    tokio::time::sleep(Duration::from_secs(*delay_secs)).await;
                }
            }
        }

        // Final attempt after the last backoff.
        match self.try_send(&body).await {
            Ok(()) => Ok(()),
            Err(e) => {
                tracing::error!(user_id, error = %e, "Push delivery failed after all retries");
                Err(last_err.unwrap_or(e))
            }
        }
    }
}
