//! Saga error types.

use domain::DomainError;
use event_bus::BusError;
use thiserror::Error;

/// Errors raised while reacting to events.
#[derive(Debug, Error)]
pub enum SagaError {
    /// A transient failure while handling an event. The message is left
    /// unacknowledged so the bus hands it out again.
    #[error("Event processing failed: {0}")]
    EventProcessing(String),

    /// The payload could not be read as its declared event type.
    #[error("Cannot decode {event_type} from {topic}: {reason}")]
    Decode {
        topic: String,
        event_type: String,
        reason: String,
    },

    #[error("Bus error: {0}")]
    Bus(#[from] BusError),

    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),
}

impl SagaError {
    /// True when the message should stay unacknowledged.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SagaError::EventProcessing(_))
    }
}

/// Convenience type alias for saga results.
pub type Result<T> = std::result::Result<T, SagaError>;
