//! Event builders with sensible defaults.

use std::collections::BTreeMap;

use bytes::Bytes;
use steadfast_core::{CorrelationId, Event};

/// Builder for test events.
#[derive(Debug, Clone)]
pub struct EventBuilder {
    payload: Bytes,
    correlation_id: Option<CorrelationId>,
    attributes: BTreeMap<String, String>,
}

impl EventBuilder {
    /// Starts a builder with a JSON payload and a generated correlation id.
    pub fn new() -> Self {
        Self {
            payload: Bytes::from_static(br#"{"order":"test"}"#),
            correlation_id: None,
            attributes: BTreeMap::new(),
        }
    }

    /// Sets the payload.
    #[must_use]
    pub fn payload(mut self, payload: impl Into<Bytes>) -> Self {
        self.payload = payload.into();
        self
    }

    /// Sets the correlation id.
    #[must_use]
    pub fn correlation_id(mut self, correlation_id: impl Into<CorrelationId>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    /// Adds an attribute.
    #[must_use]
    pub fn attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    /// Builds the event.
    pub fn build(self) -> Event {
        let mut event = Event::new(self.payload);
        if let Some(correlation_id) = self.correlation_id {
            event = event.with_correlation_id(correlation_id);
        }
        self.attributes
            .into_iter()
            .fold(event, |event, (name, value)| event.with_attribute(name, value))
    }
}

impl Default for EventBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// `count` events with correlation ids `"{prefix}-0"`, `"{prefix}-1"`, ...
pub fn event_batch(prefix: &str, count: usize) -> Vec<Event> {
    (0..count)
        .map(|index| {
            EventBuilder::new()
                .correlation_id(format!("{prefix}-{index}"))
                .payload(format!(r#"{{"index":{index}}}"#))
                .build()
        })
        .collect()
}
