pub mod classify;
pub mod consumer;
pub mod error;
pub mod mqtt;
pub mod parser;

pub use classify::{Classifier, Route};
pub use consumer::MessageHandler;
pub use error::{DropReason, PipelineError, QueueError};
pub use mqtt::{random_client_id, MqttSettings, MqttSubscriber};
pub use parser::{decode, decode_call, decode_sms, Decoder};
