//! Saga choreography for order fulfillment.
//!
//! No coordinator drives the process. Each participant reads the topics it
//! cares about through its own consumer group and acts on local state:
//!
//! 1. `OrderCreated`: inventory reserves each line item
//! 2. `PaymentSuccess`: the order moves from PENDING to CONFIRMED
//! 3. `OrderStatusChanged`: inventory releases on CANCELLED, deducts on
//!    DELIVERED
//! 4. every event: notification stores a message for the order's owner
//!
//! A failing item does not stop its siblings. It is recorded in the
//! [`DeadLetterLog`] and the message is still acknowledged. Only transient
//! failures ([`SagaError::EventProcessing`]) leave a message for redelivery.

pub mod choreography;
pub mod consumer;
pub mod dead_letter;
pub mod error;
pub mod handlers;
pub mod outcome;
pub mod reactors;
pub mod reconciliation;

pub use choreography::{
    Choreography, INVENTORY_GROUP, NOTIFICATION_GROUP, ORDER_GROUP, Participants,
};
pub use consumer::{ConsumerConfig, ConsumerWorker, EventHandler, Processed};
pub use dead_letter::{DeadLetter, DeadLetterKind, DeadLetterLog, RetryReport};
pub use error::{Result, SagaError};
pub use handlers::{InventoryHandler, NotificationHandler, OrderHandler};
pub use outcome::{BatchReport, ItemOutcome, ItemReport};
pub use reactors::{
    InventoryReactor, NotificationReactor, OrderReactor, PaymentReaction, ReservationPolicy,
    SkipReason,
};
pub use reconciliation::ReconciliationSweep;
