//! Dead-letter forwarding for events that exhausted their retries.

use std::sync::Arc;

use steadfast_core::Event;
use tracing::{error, info};

use crate::{outcome::FailureCause, route::DeadLetterDestination};

/// What happened to an abandoned event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// The dead-letter destination accepted the event.
    Forwarded,
    /// The destination refused or failed; the event is lost.
    DeliveryFailed,
    /// No destination is configured; the event is lost.
    Dropped,
}

/// Hands abandoned events to the configured dead-letter destination.
///
/// Forwarding never fails the caller. Each abandoned event is offered to the
/// destination exactly once and delivery problems are only logged.
#[derive(Debug, Clone, Default)]
pub struct DeadLetterForwarder {
    destination: Option<Arc<dyn DeadLetterDestination>>,
}

impl DeadLetterForwarder {
    /// Creates a forwarder, optionally without destination.
    pub fn new(destination: Option<Arc<dyn DeadLetterDestination>>) -> Self {
        Self { destination }
    }

    /// Returns true if a destination is configured.
    pub fn is_configured(&self) -> bool {
        self.destination.is_some()
    }

    /// Offers `event` to the destination once.
    pub async fn forward(&self, event: Event, cause: &FailureCause) -> Disposition {
        let event_id = event.id();
        let correlation_id = event.correlation_id().clone();

        let Some(destination) = &self.destination else {
            error!(
                %event_id,
                %correlation_id,
                cause = %cause,
                "retries exhausted and no dead-letter destination configured, dropping event"
            );
            return Disposition::Dropped;
        };

        match destination.deliver(event).await {
            Ok(()) => {
                info!(%event_id, %correlation_id, cause = %cause, "event forwarded to dead letter");
                Disposition::Forwarded
            },
            Err(delivery_error) => {
                error!(
                    %event_id,
                    %correlation_id,
                    cause = %cause,
                    error = %delivery_error,
                    "dead-letter destination rejected event"
                );
                Disposition::DeliveryFailed
            },
        }
    }
}
