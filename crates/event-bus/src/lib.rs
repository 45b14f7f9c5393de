//! Event bus for choreographed services.
//!
//! Topics are append-only logs split into partitions by message key. Each
//! service reads a topic through a named consumer group: instances of one
//! service share the partitions, while every group keeps its own offsets and
//! so sees the whole stream. Delivery is at-least-once with explicit
//! acknowledgment, and producers publish best-effort through
//! [`BestEffortPublisher`].

pub mod bus;
pub mod error;
mod group;
pub mod memory;
pub mod message;
pub mod partition;
pub mod publisher;

pub use bus::{BusConfig, Delivery, EventBus, PublishReceipt, Subscription};
pub use error::{BusError, Result};
pub use group::AckOutcome;
pub use memory::InMemoryEventBus;
pub use message::{BusEvent, Message, MessageId, Offset, OutboundMessage, OutboundMessageBuilder};
pub use partition::partition_for;
pub use publisher::{BestEffortPublisher, CompletionCallback, PublishOutcome, log_outcome};
