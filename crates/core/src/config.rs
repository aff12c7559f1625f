use std::collections::HashSet;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::RelayError;
use crate::message::MessageKind;

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

// ── Top-level config ──────────────────────────────────────────

/// Relay configuration, read once at startup and immutable afterwards.
///
/// Field names follow the deployed `config.yaml` layout (`topicSms`,
/// `wxAPI`, `recipientWxNickname`, ...).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayConfig {
    /// Broker address, e.g. `tcp://127.0.0.1:1883`.
    pub broker: String,

    /// Topic carrying discriminated SMS messages.
    #[serde(default)]
    pub topic_sms: Option<String>,

    /// Topic carrying discriminated call messages.
    #[serde(default)]
    pub topic_call: Option<String>,

    /// Extra topic bindings. A binding without `kind` reads the `type`
    /// discriminator; one with `kind` is a fixed-shape topic.
    #[serde(default)]
    pub topics: Vec<TopicBinding>,

    /// Webhook base URL; `/webhook/msg` is appended on delivery.
    #[serde(rename = "wxAPI")]
    pub webhook_url: String,

    /// Chat recipient identifier.
    #[serde(rename = "recipientWxNickname")]
    pub recipient: String,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    #[serde(default = "default_keep_alive_secs")]
    pub keep_alive_secs: u64,

    /// MQTT subscription QoS (0, 1 or 2).
    #[serde(default = "default_qos")]
    pub qos: u8,

    /// Largest MQTT packet accepted from or sent to the broker.
    #[serde(default = "default_max_packet_bytes")]
    pub max_packet_bytes: usize,

    /// Log to this file (truncated at startup) instead of stdout.
    #[serde(default)]
    pub log_file: Option<PathBuf>,
}

/// Binds one broker topic to a decoding route.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicBinding {
    pub topic: String,
    #[serde(default)]
    pub kind: Option<MessageKind>,
}

impl TopicBinding {
    pub fn discriminated(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            kind: None,
        }
    }

    pub fn fixed(topic: impl Into<String>, kind: MessageKind) -> Self {
        Self {
            topic: topic.into(),
            kind: Some(kind),
        }
    }
}

fn default_request_timeout_secs() -> u64 {
    5
}

fn default_keep_alive_secs() -> u64 {
    30
}

fn default_qos() -> u8 {
    1
}

fn default_max_packet_bytes() -> usize {
    1024 * 1024
}

// ── Loading & Validation ────────────────────────────────────────────

impl RelayConfig {
    /// Parse config from a YAML string, apply env overrides and validate.
    pub fn from_yaml(yaml: &str) -> Result<Self, RelayError> {
        let mut config: Self = serde_yaml::from_str(yaml)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Load config from a file path.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, RelayError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&content)
    }

    /// Every subscribed topic with its route, legacy keys first.
    pub fn bindings(&self) -> Vec<TopicBinding> {
        let legacy = [&self.topic_sms, &self.topic_call]
            .into_iter()
            .flatten()
            .filter(|t| !t.is_empty())
            .map(|t| TopicBinding::discriminated(t.as_str()));

        legacy.chain(self.topics.iter().cloned()).collect()
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.keep_alive_secs)
    }

    // ── Environment variable overrides ──────────────────────────────

    /// Apply environment variable overrides.
    ///
    /// - `RELAY_BROKER` → `broker`
    /// - `RELAY_TOPIC_SMS` → `topicSms`
    /// - `RELAY_TOPIC_CALL` → `topicCall`
    /// - `RELAY_WEBHOOK_URL` → `wxAPI`
    /// - `RELAY_RECIPIENT` → `recipientWxNickname`
    /// - `RELAY_REQUEST_TIMEOUT_SECS` → `requestTimeoutSecs`
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(env_opt);
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("RELAY_BROKER") {
            self.broker = v;
        }
        if let Some(v) = lookup("RELAY_TOPIC_SMS") {
            self.topic_sms = Some(v);
        }
        if let Some(v) = lookup("RELAY_TOPIC_CALL") {
            self.topic_call = Some(v);
        }
        if let Some(v) = lookup("RELAY_WEBHOOK_URL") {
            self.webhook_url = v;
        }
        if let Some(v) = lookup("RELAY_RECIPIENT") {
            self.recipient = v;
        }
        if let Some(v) = lookup("RELAY_REQUEST_TIMEOUT_SECS") {
            if let Ok(secs) = v.parse::<u64>() {
                self.request_timeout_secs = secs;
            }
        }
    }

    /// Validate required fields and topic bindings.
    pub fn validate(&self) -> Result<(), RelayError> {
        if self.broker.trim().is_empty() {
            return Err(RelayError::Config("broker must not be empty".into()));
        }
        if self.webhook_url.trim().is_empty() {
            return Err(RelayError::Config("wxAPI must not be empty".into()));
        }
        if self.recipient.trim().is_empty() {
            return Err(RelayError::Config(
                "recipientWxNickname must not be empty".into(),
            ));
        }
        if self.qos > 2 {
            return Err(RelayError::Config(format!(
                "invalid qos {}, expected 0, 1 or 2",
                self.qos
            )));
        }
        if self.max_packet_bytes == 0 {
            return Err(RelayError::Config(
                "maxPacketBytes must be greater than zero".into(),
            ));
        }
        if self.request_timeout_secs == 0 {
            return Err(RelayError::Config(
                "requestTimeoutSecs must be greater than zero".into(),
            ));
        }

        let bindings = self.bindings();
        if bindings.is_empty() {
            return Err(RelayError::Config("no topics configured".into()));
        }
        let mut seen = HashSet::new();
        for binding in &bindings {
            if binding.topic.is_empty() {
                return Err(RelayError::Config("topic name must not be empty".into()));
            }
            if !seen.insert(binding.topic.as_str()) {
                return Err(RelayError::Config(format!(
                    "topic '{}' is configured more than once",
                    binding.topic
                )));
            }
        }
        Ok(())
    }

    /// Print a summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded:");
        tracing::info!("  broker:    {}", self.broker);
        for binding in self.bindings() {
            match binding.kind {
                Some(kind) => tracing::info!("  topic:     {} (fixed {})", binding.topic, kind),
                None => tracing::info!("  topic:     {} (by type)", binding.topic),
            }
        }
        tracing::info!("  webhook:   {}", redact_url(&self.webhook_url));
        tracing::info!("  recipient: {}", mask(&self.recipient));
        tracing::info!(
            "  limits:    request={}s keep_alive={}s qos={} max_packet={}B",
            self.request_timeout_secs,
            self.keep_alive_secs,
            self.qos,
            self.max_packet_bytes
        );
    }
}

/// Keep only `scheme://host[:port]`; userinfo, path and query are dropped.
fn redact_url(url: &str) -> String {
    let url = url.trim();
    let (scheme, rest) = match url.split_once("://") {
        Some((scheme, rest)) => (Some(scheme), rest),
        None => (None, url),
    };
    let authority = rest.split(['/', '?', '#']).next().unwrap_or_default();
    let host = authority.rsplit_once('@').map_or(authority, |(_, host)| host);
    match scheme {
        Some(scheme) => format!("{scheme}://{host}"),
        None => host.to_string(),
    }
}

fn mask(value: &str) -> String {
    match value.chars().next() {
        Some(first) => format!("{first}***"),
        None => String::new(),
    }
}
