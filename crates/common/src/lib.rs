//! Identifiers and value types shared by every fulfillment service.
//!
//! Services own their state independently and only exchange these types
//! through events, so they live in a crate with no service dependencies.

pub mod money;
pub mod types;

pub use money::Money;
pub use types::{NotificationId, OrderId, PaymentId, ProductId, UserId};
