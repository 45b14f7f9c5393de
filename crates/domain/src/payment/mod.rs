//! Payment attempts for orders.
//!
//! Payment references orders by id but does not own them. It reads what it
//! needs through [`OrderDirectory`] and reports outcomes only as events.

mod model;
mod repository;
mod service;

pub use model::{Payment, PaymentMethod, PaymentResult, PaymentStatus};
pub use repository::{InMemoryPaymentRepository, PaymentRepository};
pub use service::{OrderDirectory, OrderSummary, PaymentService};

use common::{Money, OrderId, PaymentId, UserId};
use thiserror::Error;

use crate::order::{OrderError, OrderStatus};

#[derive(Debug, Error)]
pub enum PaymentError {
    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),

    #[error("Payment not found: {0}")]
    NotFound(PaymentId),

    #[error("User {user_id} may not pay for order {order_id}")]
    Forbidden { order_id: OrderId, user_id: UserId },

    /// Only PENDING orders accept payment.
    #[error("Order {order_id} is {status} and cannot be paid")]
    OrderNotPayable {
        order_id: OrderId,
        status: OrderStatus,
    },

    #[error("Invalid payment amount {0}")]
    InvalidAmount(Money),

    /// The order already has a successful payment.
    #[error("Order {0} is already paid")]
    AlreadyPaid(OrderId),

    /// The attempt has already been settled.
    #[error("Payment {payment_id} is already {status}")]
    AlreadySettled {
        payment_id: PaymentId,
        status: PaymentStatus,
    },

    #[error("Order lookup failed: {0}")]
    Order(#[from] OrderError),
}
