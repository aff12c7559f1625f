//! Notifier trait definition and shared error types.

use relay_core::NotificationRequest;

/// Errors that can occur during notification delivery.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("failed to serialize notification: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// What came back from a single delivery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryReport {
    /// HTTP status code, recorded but never branched on.
    pub status: u16,
}

/// Outbound sink for rendered notifications.
///
/// One call is one delivery attempt: implementations never retry.
#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver a notification through this channel.
    async fn send(&self, request: &NotificationRequest) -> Result<DeliveryReport, NotifyError>;

    /// Test connectivity with a sample notification.
    async fn test(&self, recipient: &str) -> Result<DeliveryReport, NotifyError> {
        let request = NotificationRequest::text(recipient, "[TEST] msg-relay test notification");
        self.send(&request).await
    }

    /// Human-readable name for this channel (e.g., "webhook").
    fn channel_name(&self) -> &str;
}
