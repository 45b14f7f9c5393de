//! Order records and their lifecycle.

mod model;
mod number;
mod repository;
mod service;
mod status;

pub use model::{LineItem, Order, ShippingInfo};
pub use number::generate_order_number;
pub use repository::{InMemoryOrderRepository, OrderRepository};
pub use service::OrderService;
pub use status::OrderStatus;

use common::{Money, OrderId, ProductId, UserId};
use thiserror::Error;

/// Errors that can occur during order operations.
#[derive(Debug, Error)]
pub enum OrderError {
    /// The requested status is not reachable from the current one.
    #[error("Illegal transition for order {order_id}: {from} -> {to}")]
    IllegalTransition {
        order_id: OrderId,
        from: OrderStatus,
        to: OrderStatus,
    },

    /// The order belongs to another user.
    #[error("User {user_id} may not act on order {order_id}")]
    Forbidden { order_id: OrderId, user_id: UserId },

    #[error("Order not found: {0}")]
    NotFound(OrderId),

    #[error("Order has no items")]
    NoItems,

    #[error("Invalid quantity {quantity} for product {product_id} (must be greater than 0)")]
    InvalidQuantity { product_id: ProductId, quantity: u32 },

    #[error("Invalid price {price} for product {product_id} (must be greater than 0)")]
    InvalidPrice { product_id: ProductId, price: Money },

    /// Line subtotals or the order total do not fit in `Money`.
    #[error("Order amount is out of range")]
    AmountOverflow,

    #[error("Order number already in use: {0}")]
    DuplicateOrderNumber(String),

    /// Another writer updated the order first.
    #[error("Concurrency conflict for order {order_id}: expected version {expected}, found {actual}")]
    ConcurrencyConflict {
        order_id: OrderId,
        expected: u64,
        actual: u64,
    },
}
