//! Reactors decide what each participant does with an incoming event.
//!
//! They work on local state only and never touch the bus, so they can be
//! driven directly in tests. The handlers in [`crate::handlers`] connect
//! them to consumer groups.

mod inventory;
mod notification;
mod order;

pub use inventory::{InventoryReactor, ReservationPolicy};
pub use notification::NotificationReactor;
pub use order::{OrderReactor, PaymentReaction, SkipReason};

use common::ProductId;
use domain::LineItem;
use domain::inventory::InventoryError;

/// Line items folded by product, in first-seen order.
///
/// The reservation journal holds one entry per order and product, so an
/// order listing a product twice is handled as one combined quantity. A
/// combined quantity that does not fit a `u32` is an `InvalidQuantity`.
pub(crate) fn merge_items(
    items: &[LineItem],
) -> Vec<(ProductId, std::result::Result<u32, InventoryError>)> {
    let mut merged: Vec<(ProductId, u64)> = Vec::with_capacity(items.len());
    for item in items {
        let quantity = u64::from(item.quantity);
        match merged.iter_mut().find(|(id, _)| *id == item.product_id) {
            Some((_, total)) => *total += quantity,
            None => merged.push((item.product_id.clone(), quantity)),
        }
    }
    merged
        .into_iter()
        .map(|(product_id, total)| {
            let quantity =
                u32::try_from(total).map_err(|_| InventoryError::InvalidQuantity {
                    product_id: product_id.clone(),
                    quantity: i64::try_from(total).unwrap_or(i64::MAX),
                });
            (product_id, quantity)
        })
        .collect()
}
