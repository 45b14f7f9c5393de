use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{OrderId, ProductId};
use serde::{Deserialize, Serialize};

use super::{InventoryError, InventoryRecord, Result};

/// Where an order's claim on a product currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReservationState {
    Reserved,
    Released,
    Deducted,
}

impl ReservationState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReservationState::Reserved => "RESERVED",
            ReservationState::Released => "RELEASED",
            ReservationState::Deducted => "DEDUCTED",
        }
    }
}

impl std::str::FromStr for ReservationState {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "RESERVED" => Ok(ReservationState::Reserved),
            "RELEASED" => Ok(ReservationState::Released),
            "DEDUCTED" => Ok(ReservationState::Deducted),
            other => Err(format!("unknown reservation state {other}")),
        }
    }
}

/// Journal entry recording what one order holds of one product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reservation {
    pub order_id: OrderId,
    pub product_id: ProductId,
    pub quantity: u32,
    pub state: ReservationState,
    pub updated_at: DateTime<Utc>,
}

/// Result of an order-scoped ledger call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReservationOutcome {
    /// The counters changed; carries the updated row.
    Applied(InventoryRecord),
    /// The journal already shows this order past the requested step, so a
    /// redelivered event changes nothing.
    AlreadyApplied(ReservationState),
    /// Release or deduction for an order that never reserved this product.
    NotReserved,
}

impl ReservationOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, ReservationOutcome::Applied(_))
    }
}

/// Order-scoped step applied through the reservation journal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JournalAction {
    Reserve,
    Release,
    Deduct,
}

impl JournalAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            JournalAction::Reserve => "reserve",
            JournalAction::Release => "release",
            JournalAction::Deduct => "deduct",
        }
    }
}

/// Applies `action` for `order_id` to a locked row and its journal entry.
///
/// Returns the outcome and, when something changed, the journal entry to
/// persist alongside the row. Shared by every ledger backend so they agree
/// on idempotence rules.
pub(crate) fn apply_journal(
    record: &mut InventoryRecord,
    entry: Option<&Reservation>,
    order_id: OrderId,
    action: JournalAction,
    quantity: u32,
) -> Result<(ReservationOutcome, Option<Reservation>)> {
    // A zero-quantity entry would also break the journal's CHECK constraint.
    if quantity == 0 {
        return Err(InventoryError::InvalidQuantity {
            product_id: record.product_id().clone(),
            quantity: 0,
        });
    }

    let next_state = match (action, entry) {
        (JournalAction::Reserve, Some(existing)) => {
            return Ok((ReservationOutcome::AlreadyApplied(existing.state), None));
        }
        (JournalAction::Reserve, None) => {
            record.reserve(quantity)?;
            ReservationState::Reserved
        }
        (JournalAction::Release, None) => {
            // Cancellation seen before the reservation: leave a tombstone so
            // the late reserve becomes a no-op.
            let tombstone = Reservation {
                order_id,
                product_id: record.product_id().clone(),
                quantity,
                state: ReservationState::Released,
                updated_at: Utc::now(),
            };
            return Ok((ReservationOutcome::NotReserved, Some(tombstone)));
        }
        (JournalAction::Deduct, None) => return Ok((ReservationOutcome::NotReserved, None)),
        (_, Some(existing)) if existing.state != ReservationState::Reserved => {
            return Ok((ReservationOutcome::AlreadyApplied(existing.state), None));
        }
        (_, Some(existing)) if existing.quantity != quantity => {
            return Err(InventoryError::InvalidReservation {
                product_id: record.product_id().clone(),
                reserved: existing.quantity,
                requested: quantity,
            });
        }
        (JournalAction::Release, Some(_)) => {
            record.release(quantity)?;
            ReservationState::Released
        }
        (JournalAction::Deduct, Some(_)) => {
            record.deduct(quantity)?;
            ReservationState::Deducted
        }
    };

    let reservation = Reservation {
        order_id,
        product_id: record.product_id().clone(),
        quantity,
        state: next_state,
        updated_at: Utc::now(),
    };
    Ok((ReservationOutcome::Applied(record.clone()), Some(reservation)))
}

/// Records the outcome of a ledger operation as a metric.
pub(crate) fn observe<T>(operation: &'static str, result: &Result<T>) {
    let outcome = match result {
        Ok(_) => "ok",
        Err(InventoryError::InsufficientStock { .. }) => "insufficient_stock",
        Err(InventoryError::InvalidReservation { .. }) => "invalid_reservation",
        Err(_) => "error",
    };
    metrics::counter!("inventory_operations_total", "operation" => operation, "outcome" => outcome)
        .increment(1);
}

/// Per-product stock ledger.
///
/// Every mutation is a single-row operation serialized per product, so
/// concurrent calls for the same product never interleave. Operations on
/// different products run independently.
#[async_trait]
pub trait InventoryLedger: Send + Sync {
    /// Creates the row for a product on its first stock-in.
    async fn create(
        &self,
        product_id: ProductId,
        quantity: u32,
        low_stock_threshold: u32,
    ) -> Result<InventoryRecord>;

    async fn get(&self, product_id: &ProductId) -> Result<Option<InventoryRecord>>;

    async fn reserve(&self, product_id: &ProductId, quantity: u32) -> Result<InventoryRecord>;

    async fn release(&self, product_id: &ProductId, quantity: u32) -> Result<InventoryRecord>;

    async fn deduct(&self, product_id: &ProductId, quantity: u32) -> Result<InventoryRecord>;

    async fn adjust(&self, product_id: &ProductId, delta: i64) -> Result<InventoryRecord>;

    /// True when `available >= quantity`; false for unknown products.
    async fn check_availability(&self, product_id: &ProductId, quantity: u32) -> Result<bool>;

    async fn deactivate(&self, product_id: &ProductId) -> Result<InventoryRecord>;

    /// Active rows at or below their low-stock threshold.
    async fn low_stock(&self) -> Result<Vec<InventoryRecord>>;

    /// Reserves stock for an order, at most once per (order, product).
    async fn reserve_for_order(
        &self,
        order_id: OrderId,
        product_id: &ProductId,
        quantity: u32,
    ) -> Result<ReservationOutcome>;

    /// Releases an order's reservation, at most once.
    async fn release_for_order(
        &self,
        order_id: OrderId,
        product_id: &ProductId,
        quantity: u32,
    ) -> Result<ReservationOutcome>;

    /// Ships an order's reservation, at most once.
    async fn deduct_for_order(
        &self,
        order_id: OrderId,
        product_id: &ProductId,
        quantity: u32,
    ) -> Result<ReservationOutcome>;

    async fn reservations_for_order(&self, order_id: OrderId) -> Result<Vec<Reservation>>;
}

#[async_trait]
impl<L: InventoryLedger + ?Sized> InventoryLedger for Arc<L> {
    async fn create(
        &self,
        product_id: ProductId,
        quantity: u32,
        low_stock_threshold: u32,
    ) -> Result<InventoryRecord> {
        (**self).create(product_id, quantity, low_stock_threshold).await
    }

    async fn get(&self, product_id: &ProductId) -> Result<Option<InventoryRecord>> {
        (**self).get(product_id).await
    }

    async fn reserve(&self, product_id: &ProductId, quantity: u32) -> Result<InventoryRecord> {
        (**self).reserve(product_id, quantity).await
    }

    async fn release(&self, product_id: &ProductId, quantity: u32) -> Result<InventoryRecord> {
        (**self).release(product_id, quantity).await
    }

    async fn deduct(&self, product_id: &ProductId, quantity: u32) -> Result<InventoryRecord> {
        (**self).deduct(product_id, quantity).await
    }

    async fn adjust(&self, product_id: &ProductId, delta: i64) -> Result<InventoryRecord> {
        (**self).adjust(product_id, delta).await
    }

    async fn check_availability(&self, product_id: &ProductId, quantity: u32) -> Result<bool> {
        (**self).check_availability(product_id, quantity).await
    }

    async fn deactivate(&self, product_id: &ProductId) -> Result<InventoryRecord> {
        (**self).deactivate(product_id).await
    }

    async fn low_stock(&self) -> Result<Vec<InventoryRecord>> {
        (**self).low_stock().await
    }

    async fn reserve_for_order(
        &self,
        order_id: OrderId,
        product_id: &ProductId,
        quantity: u32,
    ) -> Result<ReservationOutcome> {
        (**self).reserve_for_order(order_id, product_id, quantity).await
    }

    async fn release_for_order(
        &self,
        order_id: OrderId,
        product_id: &ProductId,
        quantity: u32,
    ) -> Result<ReservationOutcome> {
        (**self).release_for_order(order_id, product_id, quantity).await
    }

    async fn deduct_for_order(
        &self,
        order_id: OrderId,
        product_id: &ProductId,
        quantity: u32,
    ) -> Result<ReservationOutcome> {
        (**self).deduct_for_order(order_id, product_id, quantity).await
    }

    async fn reservations_for_order(&self, order_id: OrderId) -> Result<Vec<Reservation>> {
        (**self).reservations_for_order(order_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row() -> InventoryRecord {
        InventoryRecord::new(ProductId::new("SKU-1"), 10, 2)
    }

    #[test]
    fn reserve_is_recorded_once() {
        let order = OrderId::new();
        let mut record = row();

        let (outcome, entry) =
            apply_journal(&mut record, None, order, JournalAction::Reserve, 3).unwrap();
        assert!(outcome.is_applied());
        let entry = entry.unwrap();
        assert_eq!(entry.state, ReservationState::Reserved);

        let (outcome, write) =
            apply_journal(&mut record, Some(&entry), order, JournalAction::Reserve, 3).unwrap();
        assert_eq!(
            outcome,
            ReservationOutcome::AlreadyApplied(ReservationState::Reserved)
        );
        assert!(write.is_none());
        assert_eq!(record.reserved(), 3);
    }

    #[test]
    fn second_release_does_not_double_credit() {
        let order = OrderId::new();
        let mut record = row();
        // Another order holds stock on the same product.
        record.reserve(5).unwrap();

        let (_, entry) =
            apply_journal(&mut record, None, order, JournalAction::Reserve, 2).unwrap();
        let (_, released) = apply_journal(
            &mut record,
            entry.as_ref(),
            order,
            JournalAction::Release,
            2,
        )
        .unwrap();
        assert_eq!(record.reserved(), 5);

        let (outcome, write) = apply_journal(
            &mut record,
            released.as_ref(),
            order,
            JournalAction::Release,
            2,
        )
        .unwrap();
        assert_eq!(
            outcome,
            ReservationOutcome::AlreadyApplied(ReservationState::Released)
        );
        assert!(write.is_none());
        assert_eq!(record.reserved(), 5);
    }

    #[test]
    fn release_without_reservation_leaves_counters_alone() {
        let mut record = row();
        record.reserve(4).unwrap();

        let order = OrderId::new();
        let (outcome, write) =
            apply_journal(&mut record, None, order, JournalAction::Release, 4).unwrap();
        assert_eq!(outcome, ReservationOutcome::NotReserved);
        assert_eq!(record.reserved(), 4);

        let tombstone = write.unwrap();
        assert_eq!(tombstone.state, ReservationState::Released);

        let (late_reserve, write) = apply_journal(
            &mut record,
            Some(&tombstone),
            order,
            JournalAction::Reserve,
            4,
        )
        .unwrap();
        assert_eq!(
            late_reserve,
            ReservationOutcome::AlreadyApplied(ReservationState::Released)
        );
        assert!(write.is_none());
        assert_eq!(record.reserved(), 4);
    }

    #[test]
    fn zero_quantity_is_refused_before_any_journal_write() {
        let mut record = row();
        for action in [JournalAction::Reserve, JournalAction::Release, JournalAction::Deduct] {
            let err = apply_journal(&mut record, None, OrderId::new(), action, 0).unwrap_err();
            assert!(matches!(err, InventoryError::InvalidQuantity { quantity: 0, .. }));
        }
        assert_eq!(record.reserved(), 0);
    }

    #[test]
    fn mismatched_quantity_is_an_invalid_reservation() {
        let order = OrderId::new();
        let mut record = row();
        let (_, entry) =
            apply_journal(&mut record, None, order, JournalAction::Reserve, 2).unwrap();

        let err = apply_journal(&mut record, entry.as_ref(), order, JournalAction::Deduct, 3)
            .unwrap_err();
        assert!(matches!(err, InventoryError::InvalidReservation { .. }));
    }

    #[test]
    fn deducted_reservation_cannot_be_released() {
        let order = OrderId::new();
        let mut record = row();
        let (_, entry) =
            apply_journal(&mut record, None, order, JournalAction::Reserve, 2).unwrap();
        let (_, deducted) =
            apply_journal(&mut record, entry.as_ref(), order, JournalAction::Deduct, 2).unwrap();
        assert_eq!(record.quantity(), 8);

        let (outcome, _) = apply_journal(
            &mut record,
            deducted.as_ref(),
            order,
            JournalAction::Release,
            2,
        )
        .unwrap();
        assert_eq!(
            outcome,
            ReservationOutcome::AlreadyApplied(ReservationState::Deducted)
        );
        assert_eq!((record.quantity(), record.reserved()), (8, 0));
    }
}
