//! Notification side of the relay.
//!
//! This crate provides:
//! - `Notifier` trait for the outbound sink
//! - Webhook notifier posting `{to, type, content}` to `{base}/webhook/msg`
//! - Dispatcher running classify → decode → format → send per message

pub mod dispatcher;
pub mod traits;
pub mod webhook;

pub use dispatcher::{DispatchResult, Dispatcher, Outcome, Prepared};
pub use traits::{DeliveryReport, Notifier, NotifyError};
pub use webhook::WebhookNotifier;
