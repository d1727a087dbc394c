//! Domain models routed through steadfast.
//!
//! An [`Event`] is the unit a router delivers. While an asynchronous router
//! waits to retry it, the event sits in an object store as a [`QueuedEvent`]
//! under a [`QueueKey`] derived from the router name and the event identity.

use std::{borrow::Cow, collections::BTreeMap, fmt};

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier of a single event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(pub Uuid);

impl EventId {
    /// Generates a fresh random identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for EventId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

/// Identifier linking an event to the conversation it belongs to.
///
/// Preserved across every retry and through route rewrites, so downstream
/// systems and the dead-letter destination see the id the caller submitted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(String);

impl CorrelationId {
    /// Wraps an existing correlation id.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Generates a random correlation id for events submitted without one.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Borrows the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CorrelationId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for CorrelationId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// A message handed to a router.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    id: EventId,
    correlation_id: CorrelationId,
    payload: Bytes,
    #[serde(default)]
    attributes: BTreeMap<String, String>,
    created_at: DateTime<Utc>,
}

impl Event {
    /// Creates an event with a fresh id and a generated correlation id.
    pub fn new(payload: impl Into<Bytes>) -> Self {
        Self {
            id: EventId::new(),
            correlation_id: CorrelationId::generate(),
            payload: payload.into(),
            attributes: BTreeMap::new(),
            created_at: Utc::now(),
        }
    }

    /// Replaces the correlation id.
    #[must_use]
    pub fn with_correlation_id(mut self, correlation_id: impl Into<CorrelationId>) -> Self {
        self.correlation_id = correlation_id.into();
        self
    }

    /// Sets a single attribute, overwriting any previous value.
    #[must_use]
    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    /// Returns a copy of this event carrying `payload` instead.
    #[must_use]
    pub fn with_payload(&self, payload: impl Into<Bytes>) -> Self {
        Self { payload: payload.into(), ..self.clone() }
    }

    /// Returns `next` re-stamped with this event's id and correlation id.
    ///
    /// Routes may answer with an arbitrary event. Whatever they return is the
    /// same logical message, so retries and dead-lettering keep the identity
    /// the caller submitted.
    #[must_use]
    pub fn rewritten(&self, next: Event) -> Event {
        Event {
            id: self.id,
            correlation_id: self.correlation_id.clone(),
            created_at: self.created_at,
            ..next
        }
    }

    /// Event id.
    pub fn id(&self) -> EventId {
        self.id
    }

    /// Correlation id.
    pub fn correlation_id(&self) -> &CorrelationId {
        &self.correlation_id
    }

    /// Raw payload bytes.
    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Payload decoded as UTF-8, replacing invalid sequences.
    pub fn payload_text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.payload)
    }

    /// All attributes in name order.
    pub fn attributes(&self) -> &BTreeMap<String, String> {
        &self.attributes
    }

    /// Looks up one attribute.
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    /// When the event was first created.
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

/// Key under which an asynchronous router persists a pending event.
///
/// Formatted as `{router}:{correlation_id}:{event_id}`. Every submission of
/// the same event maps to the same entry. Recovery does not interpret keys:
/// a router resumes every entry it finds in its store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QueueKey(String);

impl QueueKey {
    /// Builds the key a router named `router_name` uses for `event`.
    pub fn for_event(router_name: &str, event: &Event) -> Self {
        Self(format!("{router_name}:{}:{}", event.correlation_id(), event.id()))
    }

    /// Wraps a key loaded back from a store.
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Borrows the raw key.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for QueueKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A pending event as persisted by the asynchronous strategy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuedEvent {
    /// Event to hand the route on the next attempt.
    pub event: Event,
    /// Attempts already made that did not succeed.
    pub failed_attempts: u32,
    /// When the entry was first written.
    pub enqueued_at: DateTime<Utc>,
}

impl QueuedEvent {
    /// A fresh entry with no failed attempts.
    pub fn new(event: Event, enqueued_at: DateTime<Utc>) -> Self {
        Self { event, failed_attempts: 0, enqueued_at }
    }

    /// Records one more failed attempt, keeping `event` for the next try.
    #[must_use]
    pub fn record_failure(self, event: Event) -> Self {
        Self { event, failed_attempts: self.failed_attempts.saturating_add(1), ..self }
    }

    /// One-based number of the attempt this entry is waiting for.
    pub fn next_attempt(&self) -> u32 {
        self.failed_attempts.saturating_add(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_key_combines_router_correlation_and_event_id() {
        let event = Event::new("payload").with_correlation_id("order-42");
        let key = QueueKey::for_event("billing", &event);

        assert_eq!(key.as_str(), format!("billing:order-42:{}", event.id()));
    }

    #[test]
    fn queue_key_is_stable_for_the_same_event() {
        let event = Event::new("payload");

        assert_eq!(QueueKey::for_event("r", &event), QueueKey::for_event("r", &event.clone()));
    }

    #[test]
    fn rewritten_keeps_identity_but_takes_new_content() {
        let original = Event::new("request").with_correlation_id("corr-1");
        let reply = Event::new("response").with_attribute("status", "ok");

        let rewritten = original.rewritten(reply);

        assert_eq!(rewritten.id(), original.id());
        assert_eq!(rewritten.correlation_id().as_str(), "corr-1");
        assert_eq!(rewritten.payload_text(), "response");
        assert_eq!(rewritten.attribute("status"), Some("ok"));
    }

    #[test]
    fn record_failure_counts_and_replaces_event() {
        let event = Event::new("first");
        let entry = QueuedEvent::new(event.clone(), Utc::now());
        assert_eq!(entry.next_attempt(), 1);

        let entry = entry.record_failure(event.with_payload("second"));

        assert_eq!(entry.failed_attempts, 1);
        assert_eq!(entry.next_attempt(), 2);
        assert_eq!(entry.event.payload_text(), "second");
        assert_eq!(entry.event.id(), event.id());
    }

    #[test]
    fn queued_event_survives_json_encoding() {
        let entry = QueuedEvent::new(
            Event::new(vec![0_u8, 159, 146, 150]).with_attribute("k", "v"),
            Utc::now(),
        )
        .record_failure(Event::new("x"));

        let json = serde_json::to_string(&entry).expect("encode");
        let decoded: QueuedEvent = serde_json::from_str(&json).expect("decode");

        assert_eq!(decoded, entry);
    }
}
