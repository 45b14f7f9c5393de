//! Inventory ledger: per-product stock counters and the reservation journal.

mod ledger;
mod memory;
mod postgres;
mod record;

pub use ledger::{
    InventoryLedger, JournalAction, Reservation, ReservationOutcome, ReservationState,
};
pub use memory::InMemoryInventoryLedger;
pub use postgres::PostgresInventoryLedger;
pub use record::{DEFAULT_LOW_STOCK_THRESHOLD, InventoryRecord};

use common::ProductId;
use thiserror::Error;

/// Errors raised by inventory operations.
#[derive(Debug, Error)]
pub enum InventoryError {
    /// Not enough unreserved stock to satisfy the request.
    #[error("Insufficient stock for {product_id}: available {available}, requested {requested}")]
    InsufficientStock {
        product_id: ProductId,
        available: u32,
        requested: u32,
    },

    /// A release or deduction asked for more than is reserved.
    #[error("Invalid reservation for {product_id}: reserved {reserved}, requested {requested}")]
    InvalidReservation {
        product_id: ProductId,
        reserved: u32,
        requested: u32,
    },

    #[error("Inventory not found for product {0}")]
    NotFound(ProductId),

    #[error("Inventory already exists for product {0}")]
    AlreadyExists(ProductId),

    #[error("Inventory for product {0} is inactive")]
    Inactive(ProductId),

    /// Quantities must be positive and fit the counters.
    #[error("Invalid quantity {quantity} for product {product_id}")]
    InvalidQuantity { product_id: ProductId, quantity: i64 },

    /// A stored row violates the ledger invariants.
    #[error("Corrupt inventory row for product {product_id}: {reason}")]
    Corrupt {
        product_id: ProductId,
        reason: String,
    },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// Result type for inventory operations.
pub type Result<T> = std::result::Result<T, InventoryError>;
