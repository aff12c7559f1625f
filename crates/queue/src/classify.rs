//! Pick a decoder for an incoming message.
//!
//! A [`Classifier`] holds a topic → [`Route`] table. A route either reads the
//! `type` discriminator embedded in the payload or binds the topic to one
//! fixed message shape. Topics may be MQTT filters (`+`, `#`); exact names
//! are looked up first, then filters in insertion order. Unbound topics fall
//! back to discriminator dispatch.

use std::collections::HashMap;

use serde::Deserialize;

use relay_core::{MessageKind, TopicBinding};

use crate::error::PipelineError;
use crate::parser::parse_object;

/// How a topic's payloads are classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Read the payload's `type` field.
    Discriminated,
    /// Every payload on the topic has this shape.
    Fixed(MessageKind),
}

impl From<&TopicBinding> for Route {
    fn from(binding: &TopicBinding) -> Self {
        binding.kind.map_or(Route::Discriminated, Route::Fixed)
    }
}

/// Minimal view of a payload used only to read the discriminator.
#[derive(Deserialize)]
struct Envelope {
    #[serde(rename = "type", default)]
    kind: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct Classifier {
    exact: HashMap<String, Route>,
    filters: Vec<(String, Route)>,
}

impl Classifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_bindings(bindings: &[TopicBinding]) -> Self {
        let mut classifier = Self::new();
        for binding in bindings {
            classifier.bind(binding.topic.clone(), Route::from(binding));
        }
        classifier
    }

    /// Bind a topic (or MQTT filter) to a route, replacing any earlier one.
    pub fn bind(&mut self, topic: impl Into<String>, route: Route) {
        let topic = topic.into();
        if is_filter(&topic) {
            self.filters.retain(|(f, _)| *f != topic);
            self.filters.push((topic, route));
        } else {
            self.exact.insert(topic, route);
        }
    }

    pub fn route_for(&self, topic: &str) -> Route {
        if let Some(route) = self.exact.get(topic) {
            return *route;
        }
        self.filters
            .iter()
            .find(|(filter, _)| topic_matches(filter, topic))
            .map(|(_, route)| *route)
            .unwrap_or(Route::Discriminated)
    }

    /// Determine the message kind. Pure: the same input always yields the
    /// same answer.
    pub fn classify(&self, topic: &str, payload: &[u8]) -> Result<MessageKind, PipelineError> {
        match self.route_for(topic) {
            Route::Fixed(kind) => Ok(kind),
            Route::Discriminated => {
                let tag = read_discriminator(payload)?;
                MessageKind::from_tag(&tag).ok_or(PipelineError::UnknownType(tag))
            }
        }
    }
}

/// Extract the raw `type` value from a JSON object payload.
pub fn read_discriminator(payload: &[u8]) -> Result<String, PipelineError> {
    let value = parse_object(payload).map_err(PipelineError::Malformed)?;
    let envelope: Envelope = serde_json::from_value(value).map_err(PipelineError::Malformed)?;
    envelope
        .kind
        .filter(|tag| !tag.is_empty())
        .ok_or(PipelineError::MissingDiscriminator)
}

fn is_filter(topic: &str) -> bool {
    topic.split('/').any(|level| level == "+" || level == "#")
}

/// MQTT topic filter matching: `+` matches one level, a trailing `#`
/// matches the remaining levels (including none).
pub fn topic_matches(filter: &str, topic: &str) -> bool {
    let mut filter_levels = filter.split('/');
    let mut topic_levels = topic.split('/');

    loop {
        match (filter_levels.next(), topic_levels.next()) {
            (Some("#"), _) => return true,
            (Some("+"), Some(_)) => {}
            (Some(f), Some(t)) if f == t => {}
            (None, None) => return true,
            _ => return false,
        }
    }
}
