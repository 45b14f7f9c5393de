use chrono::{DateTime, Utc};
use common::ProductId;
use serde::{Deserialize, Serialize};

use super::{InventoryError, Result};

/// Threshold used when a row is created without one.
pub const DEFAULT_LOW_STOCK_THRESHOLD: u32 = 10;

/// Stock counters for one product.
///
/// `available` is always `quantity - reserved`. The counters are private and
/// only change through the ledger operations below, each of which validates
/// before touching anything, so a failed operation leaves the row as it was.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryRecord {
    product_id: ProductId,
    quantity: u32,
    reserved: u32,
    available: u32,
    low_stock_threshold: u32,
    active: bool,
    version: i64,
    updated_at: DateTime<Utc>,
}

impl InventoryRecord {
    /// A fresh row from a first stock-in. Nothing is reserved yet.
    pub fn new(product_id: ProductId, quantity: u32, low_stock_threshold: u32) -> Self {
        Self {
            product_id,
            quantity,
            reserved: 0,
            available: quantity,
            low_stock_threshold,
            active: true,
            version: 1,
            updated_at: Utc::now(),
        }
    }

    /// Rebuilds a row from storage, rejecting counters that break the
    /// invariants.
    pub fn restore(
        product_id: ProductId,
        quantity: u32,
        reserved: u32,
        low_stock_threshold: u32,
        active: bool,
        version: i64,
        updated_at: DateTime<Utc>,
    ) -> Result<Self> {
        if reserved > quantity {
            return Err(InventoryError::Corrupt {
                product_id,
                reason: format!("reserved {reserved} exceeds quantity {quantity}"),
            });
        }
        Ok(Self {
            product_id,
            quantity,
            reserved,
            available: quantity - reserved,
            low_stock_threshold,
            active,
            version,
            updated_at,
        })
    }

    pub fn product_id(&self) -> &ProductId {
        &self.product_id
    }

    pub fn quantity(&self) -> u32 {
        self.quantity
    }

    pub fn reserved(&self) -> u32 {
        self.reserved
    }

    pub fn available(&self) -> u32 {
        self.available
    }

    pub fn low_stock_threshold(&self) -> u32 {
        self.low_stock_threshold
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn version(&self) -> i64 {
        self.version
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn can_fulfil(&self, quantity: u32) -> bool {
        self.available >= quantity
    }

    pub fn is_low_stock(&self) -> bool {
        self.available <= self.low_stock_threshold
    }

    pub fn reserve(&mut self, quantity: u32) -> Result<()> {
        self.require_positive(quantity)?;
        if !self.active {
            return Err(InventoryError::Inactive(self.product_id.clone()));
        }
        if self.available < quantity {
            return Err(self.insufficient(quantity));
        }
        self.reserved += quantity;
        self.touch();
        Ok(())
    }

    pub fn release(&mut self, quantity: u32) -> Result<()> {
        self.require_positive(quantity)?;
        if self.reserved < quantity {
            return Err(self.invalid_reservation(quantity));
        }
        self.reserved -= quantity;
        self.touch();
        Ok(())
    }

    /// Ships reserved stock: it leaves both the reservation and the
    /// physical count.
    pub fn deduct(&mut self, quantity: u32) -> Result<()> {
        self.require_positive(quantity)?;
        if self.reserved < quantity {
            return Err(self.invalid_reservation(quantity));
        }
        if self.quantity < quantity {
            return Err(InventoryError::InsufficientStock {
                product_id: self.product_id.clone(),
                available: self.quantity,
                requested: quantity,
            });
        }
        self.reserved -= quantity;
        self.quantity -= quantity;
        self.touch();
        Ok(())
    }

    /// Operator stock-in (positive delta) or write-off (negative delta).
    ///
    /// A write-off can only remove unreserved stock.
    pub fn adjust(&mut self, delta: i64) -> Result<()> {
        if delta == 0 {
            return Err(self.invalid_quantity(delta));
        }
        let magnitude = u32::try_from(delta.unsigned_abs()).map_err(|_| self.invalid_quantity(delta))?;

        if delta > 0 {
            self.quantity = self
                .quantity
                .checked_add(magnitude)
                .ok_or_else(|| self.invalid_quantity(delta))?;
        } else {
            if self.available < magnitude {
                return Err(self.insufficient(magnitude));
            }
            self.quantity -= magnitude;
        }
        self.touch();
        Ok(())
    }

    pub fn deactivate(&mut self) {
        if self.active {
            self.active = false;
            self.touch();
        }
    }

    fn touch(&mut self) {
        self.available = self.quantity - self.reserved;
        self.version += 1;
        self.updated_at = Utc::now();
    }

    fn require_positive(&self, quantity: u32) -> Result<()> {
        if quantity == 0 {
            return Err(self.invalid_quantity(0));
        }
        Ok(())
    }

    fn insufficient(&self, requested: u32) -> InventoryError {
        InventoryError::InsufficientStock {
            product_id: self.product_id.clone(),
            available: self.available,
            requested,
        }
    }

    fn invalid_reservation(&self, requested: u32) -> InventoryError {
        InventoryError::InvalidReservation {
            product_id: self.product_id.clone(),
            reserved: self.reserved,
            requested,
        }
    }

    fn invalid_quantity(&self, quantity: i64) -> InventoryError {
        InventoryError::InvalidQuantity {
            product_id: self.product_id.clone(),
            quantity,
        }
    }
}
