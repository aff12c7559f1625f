pub mod config;
pub mod error;
pub mod format;
pub mod message;

pub use config::{RelayConfig, TopicBinding};
pub use error::*;
pub use format::{format_call, format_record, format_sms};
pub use message::*;
