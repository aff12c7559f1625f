//! Queue error types.

use std::fmt;

use relay_core::MessageKind;
use thiserror::Error;

/// Why a single message was dropped before reaching the sink.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("malformed payload: {0}")]
    Malformed(#[source] serde_json::Error),

    #[error("payload has no usable `type` discriminator")]
    MissingDiscriminator,

    #[error("unknown message type {0:?}")]
    UnknownType(String),

    #[error("failed to decode {kind} payload: {source}")]
    Decode {
        kind: MessageKind,
        #[source]
        source: serde_json::Error,
    },
}

impl PipelineError {
    pub fn reason(&self) -> DropReason {
        match self {
            PipelineError::Malformed(_) | PipelineError::MissingDiscriminator => {
                DropReason::ClassifyError
            }
            PipelineError::UnknownType(_) => DropReason::UnknownType,
            PipelineError::Decode { .. } => DropReason::DecodeError,
        }
    }
}

/// Terminal drop states of the per-message pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    ClassifyError,
    DecodeError,
    UnknownType,
}

impl DropReason {
    pub fn as_str(self) -> &'static str {
        match self {
            DropReason::ClassifyError => "classify-error",
            DropReason::DecodeError => "decode-error",
            DropReason::UnknownType => "unknown-type",
        }
    }
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Broker transport failures.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("invalid broker address: {0}")]
    BrokerAddress(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("subscribe error: {0}")]
    Subscribe(#[from] rumqttc::ClientError),

    #[error("connection error: {0}")]
    Connection(#[from] rumqttc::ConnectionError),
}
