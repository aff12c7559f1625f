//! Runs the per-message pipeline.
//!
//! Received → classified → decoded → formatted → sent, with a dropped
//! terminal state reachable from the first three stages. Every outcome is
//! terminal: nothing is retried and nothing propagates to the broker loop.
//! A failed delivery still counts as handled.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;

use relay_core::{format_record, MessageKind, NotificationRequest, RawMessage, RelayConfig};
use relay_queue::{decode, Classifier, DropReason, MessageHandler, PipelineError};

use crate::traits::Notifier;

/// A message that made it through classification, decoding and formatting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prepared {
    pub kind: MessageKind,
    pub request: NotificationRequest,
}

/// Terminal state of one dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Sent { kind: MessageKind, status: u16 },
    DeliveryFailed { kind: MessageKind, error: String },
    Dropped { reason: DropReason, error: String },
}

impl Outcome {
    /// Whether the message reached the send stage, successful or not.
    pub fn is_handled(&self) -> bool {
        !matches!(self, Outcome::Dropped { .. })
    }
}

/// Result of dispatching a single message.
#[derive(Debug)]
pub struct DispatchResult {
    pub topic: String,
    pub outcome: Outcome,
    pub duration_ms: u64,
}

pub struct Dispatcher {
    classifier: Classifier,
    notifier: Arc<dyn Notifier>,
    recipient: String,
}

impl Dispatcher {
    pub fn new(
        classifier: Classifier,
        notifier: Arc<dyn Notifier>,
        recipient: impl Into<String>,
    ) -> Self {
        Self {
            classifier,
            notifier,
            recipient: recipient.into(),
        }
    }

    pub fn from_config(config: &RelayConfig, notifier: Arc<dyn Notifier>) -> Self {
        Self::new(
            Classifier::from_bindings(&config.bindings()),
            notifier,
            config.recipient.clone(),
        )
    }

    /// Classify, decode and format without touching the network.
    pub fn prepare(&self, message: &RawMessage) -> Result<Prepared, PipelineError> {
        let kind = self.classifier.classify(&message.topic, &message.payload)?;
        let record = decode(kind, &message.payload)?;
        let content = format_record(&record);
        Ok(Prepared {
            kind,
            request: NotificationRequest::text(&self.recipient, content),
        })
    }

    /// Run the full pipeline for one message. Never fails.
    pub async fn dispatch(&self, message: &RawMessage) -> DispatchResult {
        let start = Instant::now();
        tracing::info!(topic = %message.topic, "message received");
        tracing::debug!(payload = %String::from_utf8_lossy(&message.payload), "message payload");

        let outcome = match self.prepare(message) {
            Err(e) => {
                let reason = e.reason();
                tracing::warn!(reason = %reason, error = %e, "message dropped");
                Outcome::Dropped {
                    reason,
                    error: e.to_string(),
                }
            }
            Ok(prepared) => self.deliver(prepared).await,
        };

        DispatchResult {
            topic: message.topic.clone(),
            outcome,
            duration_ms: millis(start.elapsed()),
        }
    }

    async fn deliver(&self, prepared: Prepared) -> Outcome {
        let Prepared { kind, request } = prepared;
        match self.notifier.send(&request).await {
            Ok(report) => {
                tracing::info!(
                    kind = %kind,
                    channel = self.notifier.channel_name(),
                    status = report.status,
                    "notification sent"
                );
                Outcome::Sent {
                    kind,
                    status: report.status,
                }
            }
            Err(e) => {
                tracing::warn!(
                    kind = %kind,
                    channel = self.notifier.channel_name(),
                    error = %e,
                    "notification delivery failed"
                );
                Outcome::DeliveryFailed {
                    kind,
                    error: e.to_string(),
                }
            }
        }
    }
}

fn millis(elapsed: Duration) -> u64 {
    u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
}

#[async_trait]
impl MessageHandler for Dispatcher {
    async fn handle(&self, message: RawMessage) {
        let result = self.dispatch(&message).await;
        tracing::debug!(
            topic = %result.topic,
            handled = result.outcome.is_handled(),
            duration_ms = result.duration_ms,
            "message finished"
        );
    }
}
