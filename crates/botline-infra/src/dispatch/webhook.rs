//! WebhookDispatcher -- delivers aggregated batches as JSON over HTTP.
//!
//! Each batch becomes one `POST` to the configured URL. Any non-2xx status
//! or transport error is a dispatch failure, which the message buffer
//! retries. Without a URL, batches are only logged.

use std::time::Duration;

use botline_core::dispatch::Dispatcher;
use botline_types::config::DispatchConfig;
use botline_types::error::SessionError;
use botline_types::message::{InboundMessage, join_payloads};
use botline_types::tenant::{SenderId, TenantId};
use serde::Serialize;

/// Body posted for every batch.
#[derive(Debug, Serialize)]
pub struct BatchPayload<'a> {
    pub tenant_id: &'a TenantId,
    pub sender_id: &'a SenderId,
    /// Payloads joined with newlines, for handlers that want one utterance.
    pub text: String,
    pub messages: &'a [InboundMessage],
}

#[derive(Debug, thiserror::Error)]
pub enum WebhookSetupError {
    #[error("invalid dispatch url '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("failed to build http client: {0}")]
    Client(#[from] reqwest::Error),
}

/// HTTP dispatcher for the downstream business handler.
pub struct WebhookDispatcher {
    client: reqwest::Client,
    url: Option<reqwest::Url>,
}

impl WebhookDispatcher {
    /// Build from the dispatch section of the gateway config.
    pub fn from_config(config: &DispatchConfig) -> Result<Self, WebhookSetupError> {
        let url = config
            .url
            .as_deref()
            .map(|raw| {
                reqwest::Url::parse(raw).map_err(|e| WebhookSetupError::InvalidUrl {
                    url: raw.to_string(),
                    reason: e.to_string(),
                })
            })
            .transpose()?;
        Self::new(url, config.request_timeout())
    }

    pub fn new(url: Option<reqwest::Url>, timeout: Duration) -> Result<Self, WebhookSetupError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, url })
    }

    pub fn url(&self) -> Option<&reqwest::Url> {
        self.url.as_ref()
    }
}

impl std::fmt::Debug for WebhookDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookDispatcher")
            .field("url", &self.url.as_ref().map(|u| u.as_str()))
            .finish_non_exhaustive()
    }
}

impl Dispatcher for WebhookDispatcher {
    async fn dispatch(
        &self,
        tenant_id: &TenantId,
        sender_id: &SenderId,
        batch: &[InboundMessage],
    ) -> Result<(), SessionError> {
        let payload = BatchPayload {
            tenant_id,
            sender_id,
            text: join_payloads(batch),
            messages: batch,
        };

        let Some(url) = &self.url else {
            tracing::info!(
                tenant_id = %tenant_id,
                sender_id = %sender_id,
                messages = batch.len(),
                text = %payload.text,
                "no dispatch url configured, batch logged only"
            );
            return Ok(());
        };

        let response = self
            .client
            .post(url.clone())
            .json(&payload)
            .send()
            .await
            .map_err(|e| SessionError::DispatchFailed {
                reason: format!("request failed: {e}"),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SessionError::DispatchFailed {
                reason: format!("HTTP {status}: {body}"),
            });
        }
        Ok(())
    }
}
