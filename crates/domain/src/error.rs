//! Domain error types.

use thiserror::Error;

use crate::checkout::CheckoutError;
use crate::inventory::InventoryError;
use crate::notification::NotificationError;
use crate::order::OrderError;
use crate::payment::PaymentError;

/// Any error a domain operation can raise.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Inventory error: {0}")]
    Inventory(#[from] InventoryError),

    #[error("Order error: {0}")]
    Order(#[from] OrderError),

    #[error("Payment error: {0}")]
    Payment(#[from] PaymentError),

    #[error("Checkout error: {0}")]
    Checkout(#[from] CheckoutError),

    #[error("Notification error: {0}")]
    Notification(#[from] NotificationError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for domain operations.
pub type Result<T> = std::result::Result<T, DomainError>;
