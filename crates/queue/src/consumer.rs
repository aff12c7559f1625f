//! Seam between the broker adapter and the message pipeline.

use async_trait::async_trait;
use relay_core::RawMessage;

/// Receives every message the broker delivers.
///
/// Implementations must tolerate concurrent calls: the adapter hands each
/// message to its own task. Errors are the handler's business; nothing is
/// reported back to the broker.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, message: RawMessage);
}
