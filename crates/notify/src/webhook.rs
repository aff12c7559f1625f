//! Chat webhook notifier.
//!
//! Delivers `{"to", "type": "text", "content"}` as JSON with a single POST
//! to `{base_url}/webhook/msg`. Any response counts as delivered; the status
//! code is reported and a non-2xx code is only logged.

use std::time::Duration;

use relay_core::{NotificationRequest, RelayConfig};

use crate::traits::{DeliveryReport, Notifier, NotifyError};

/// Path appended to the configured base URL.
pub const WEBHOOK_PATH: &str = "/webhook/msg";

#[derive(Debug)]
pub struct WebhookNotifier {
    /// Full endpoint URL.
    endpoint: String,
    timeout: Duration,
    /// Shared HTTP client (connection pooling).
    client: reqwest::Client,
}

impl WebhookNotifier {
    /// Create a new webhook notifier. `timeout` bounds each whole request.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, NotifyError> {
        let base_url = base_url.trim();
        if base_url.is_empty() {
            return Err(NotifyError::Config("webhook base URL is empty".to_string()));
        }

        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            endpoint: format!("{}{}", base_url.trim_end_matches('/'), WEBHOOK_PATH),
            timeout,
            client,
        })
    }

    pub fn from_config(config: &RelayConfig) -> Result<Self, NotifyError> {
        Self::new(&config.webhook_url, config.request_timeout())
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

#[async_trait::async_trait]
impl Notifier for WebhookNotifier {
    async fn send(&self, request: &NotificationRequest) -> Result<DeliveryReport, NotifyError> {
        let body = serde_json::to_vec(request)?;

        let response = self
            .client
            .post(&self.endpoint)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await?;
        let status = response.status();

        if status.is_success() {
            tracing::debug!(url = %self.endpoint, %status, "webhook notification delivered");
        } else {
            tracing::warn!(url = %self.endpoint, %status, "webhook returned non-2xx status");
        }

        Ok(DeliveryReport {
            status: status.as_u16(),
        })
    }

    fn channel_name(&self) -> &str {
        "webhook"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TIMEOUT: Duration = Duration::from_secs(5);

    #[test]
    fn endpoint_appends_webhook_path() {
        let notifier = WebhookNotifier::new("http://127.0.0.1:3001", TIMEOUT).unwrap();
        assert_eq!(notifier.endpoint(), "http://127.0.0.1:3001/webhook/msg");
    }

    #[test]
    fn endpoint_tolerates_trailing_slash() {
        let notifier = WebhookNotifier::new("http://wx.local/", TIMEOUT).unwrap();
        assert_eq!(notifier.endpoint(), "http://wx.local/webhook/msg");
    }

    #[test]
    fn base_url_is_used_verbatim() {
        let notifier = WebhookNotifier::new(" http://${WX_HOST}:3001 ", TIMEOUT).unwrap();
        assert_eq!(notifier.endpoint(), "http://${WX_HOST}:3001/webhook/msg");
    }

    #[test]
    fn empty_base_url_is_rejected() {
        assert!(matches!(
            WebhookNotifier::new("  ", TIMEOUT),
            Err(NotifyError::Config(_))
        ));
    }

    #[test]
    fn channel_name_is_webhook() {
        let notifier = WebhookNotifier::new("http://wx.local", TIMEOUT).unwrap();
        assert_eq!(notifier.channel_name(), "webhook");
        assert_eq!(notifier.timeout(), TIMEOUT);
    }
}
