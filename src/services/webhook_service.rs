//! Outbound webhook that hands player messages to the bot.

use std::time::Duration;

use rand::{Rng, rng};
use reqwest::{Client, StatusCode};
use serde::Serialize;
use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{config::WebhookConfig, dto::message::MessageView};

/// Header carrying the shared secret, both outbound and on the AI callback.
pub const WEBHOOK_SECRET_HEADER: &str = "x-webhook-secret";
const EVENT_MESSAGE_CREATED: &str = "message.created";

/// Reasons a delivery attempt failed.
#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("webhook request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("webhook answered with status {0}")]
    Status(StatusCode),
}

impl WebhookError {
    fn is_retryable(&self) -> bool {
        match self {
            WebhookError::Transport(_) => true,
            WebhookError::Status(status) => status.is_server_error(),
        }
    }
}

#[derive(Debug, Serialize)]
struct WebhookPayload<'a> {
    event: &'static str,
    message: &'a MessageView,
    session_id: Uuid,
}

/// Fire-and-forget notifier with bounded retries.
#[derive(Clone)]
pub struct WebhookNotifier {
    client: Client,
    config: WebhookConfig,
}

impl WebhookNotifier {
    pub fn new(config: WebhookConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.config.url.is_some()
    }

    /// Shared secret expected on inbound AI messages, if configured.
    pub fn secret(&self) -> Option<&str> {
        self.config.secret.as_deref()
    }

    /// Deliver `message` in the background. Failures are logged and never surface to the caller.
    pub fn notify(&self, message: MessageView) {
        if !self.is_enabled() {
            debug!(message_id = %message.id, "webhook disabled; skipping notification");
            return;
        }

        let notifier = self.clone();
        tokio::spawn(async move {
            if let Err(err) = notifier.deliver(&message).await {
                warn!(
                    message_id = %message.id,
                    session_id = %message.session_id,
                    error = %err,
                    "webhook delivery abandoned"
                );
            }
        });
    }

    /// Deliver `message`, retrying transport errors and 5xx answers with exponential backoff.
    pub async fn deliver(&self, message: &MessageView) -> Result<(), WebhookError> {
        let Some(url) = self.config.url.as_deref() else {
            return Ok(());
        };

        let payload = WebhookPayload {
            event: EVENT_MESSAGE_CREATED,
            message,
            session_id: message.session_id,
        };
        let attempts = self.config.max_attempts.max(1);
        let mut backoff = self.config.initial_backoff;

        let mut attempt = 1;
        loop {
            match self.send_once(url, &payload).await {
                Ok(()) => {
                    info!(message_id = %message.id, attempt, "webhook delivered");
                    return Ok(());
                }
                Err(err) if err.is_retryable() && attempt < attempts => {
                    warn!(
                        message_id = %message.id,
                        attempt,
                        error = %err,
                        "webhook attempt failed; retrying"
                    );
                    sleep(with_jitter(backoff)).await;
                    backoff *= 2;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn send_once(&self, url: &str, payload: &WebhookPayload<'_>) -> Result<(), WebhookError> {
        let mut request = self
            .client
            .post(url)
            .timeout(self.config.timeout)
            .json(payload);
        if let Some(secret) = self.secret() {
            request = request.header(WEBHOOK_SECRET_HEADER, secret);
        }

        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(WebhookError::Status(status))
        }
    }
}

/// Add up to a quarter of `delay` so simultaneous retries spread out.
fn with_jitter(delay: Duration) -> Duration {
    let spread = (delay.as_millis() / 4) as u64;
    if spread == 0 {
        return delay;
    }
    delay + Duration::from_millis(rng().random_range(0..=spread))
}
