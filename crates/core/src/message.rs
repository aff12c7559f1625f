use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};

/// A message as delivered by the broker, before any interpretation.
#[derive(Debug, Clone)]
pub struct RawMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

impl RawMessage {
    pub fn new(topic: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
        }
    }
}

/// Semantic type of a payload. The lowercase name doubles as the
/// discriminator value carried in the envelope's `type` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Sms,
    Call,
}

impl MessageKind {
    pub const ALL: [MessageKind; 2] = [MessageKind::Sms, MessageKind::Call];

    pub fn tag(self) -> &'static str {
        match self {
            MessageKind::Sms => "sms",
            MessageKind::Call => "call",
        }
    }

    /// Exact, case-sensitive lookup of a discriminator value.
    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.tag() == tag)
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for MessageKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_tag(s).ok_or_else(|| format!("unknown message kind '{s}', expected 'sms' or 'call'"))
    }
}

/// An SMS forwarded from a phone. Either `sms_code` or `sms_msg` carries the
/// meaningful content; a non-empty code wins when rendering.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SmsRecord {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub sender: String,
    #[serde(default)]
    pub sms_code: Option<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub phone_number: String,
    #[serde(default)]
    pub sms_msg: Option<String>,
}

/// An incoming call notification.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallRecord {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub incoming_phone_number: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub phone_number_location: String,
}

/// A decoded payload of any supported kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Record {
    Sms(SmsRecord),
    Call(CallRecord),
}

impl Record {
    pub fn kind(&self) -> MessageKind {
        match self {
            Record::Sms(_) => MessageKind::Sms,
            Record::Call(_) => MessageKind::Call,
        }
    }
}

/// Body POSTed to the chat webhook.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationRequest {
    /// Recipient identifier (chat nickname).
    pub to: String,
    /// Always `"text"`.
    #[serde(rename = "type")]
    pub kind: String,
    pub content: String,
}

impl NotificationRequest {
    pub fn text(recipient: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            to: recipient.into(),
            kind: "text".to_string(),
            content: content.into(),
        }
    }
}

/// JSON `null` decodes to the zero value, same as a missing field.
fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer).map(Option::unwrap_or_default)
}
