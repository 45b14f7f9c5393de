//! Per-item results of applying one event to the inventory ledger.

use common::{OrderId, ProductId};
use domain::inventory::{JournalAction, ReservationOutcome};
use serde::Serialize;

/// What happened to one line item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "reason", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ItemOutcome {
    /// The counters changed.
    Applied,
    /// A previous delivery already did this.
    AlreadyApplied,
    /// Nothing was reserved for this order and product, so there was
    /// nothing to release or deduct.
    NotReserved,
    /// The ledger refused the step.
    Failed(String),
}

impl ItemOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemOutcome::Applied => "applied",
            ItemOutcome::AlreadyApplied => "already_applied",
            ItemOutcome::NotReserved => "not_reserved",
            ItemOutcome::Failed(_) => "failed",
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, ItemOutcome::Failed(_))
    }
}

impl From<&ReservationOutcome> for ItemOutcome {
    fn from(outcome: &ReservationOutcome) -> Self {
        match outcome {
            ReservationOutcome::Applied(_) => ItemOutcome::Applied,
            ReservationOutcome::AlreadyApplied(_) => ItemOutcome::AlreadyApplied,
            ReservationOutcome::NotReserved => ItemOutcome::NotReserved,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemReport {
    pub product_id: ProductId,
    pub quantity: u32,
    pub outcome: ItemOutcome,
}

/// Outcome of one ledger action across every item of an order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchReport {
    pub order_id: OrderId,
    pub order_number: String,
    pub action: JournalAction,
    pub items: Vec<ItemReport>,
    /// Set when an all-or-nothing reservation gave back what it had taken.
    pub rolled_back: bool,
}

impl BatchReport {
    pub fn new(order_id: OrderId, order_number: impl Into<String>, action: JournalAction) -> Self {
        Self {
            order_id,
            order_number: order_number.into(),
            action,
            items: Vec::new(),
            rolled_back: false,
        }
    }

    pub fn push(&mut self, product_id: ProductId, quantity: u32, outcome: ItemOutcome) {
        metrics::counter!(
            "saga_items_total",
            "action" => self.action.as_str(),
            "outcome" => outcome.as_str()
        )
        .increment(1);
        self.items.push(ItemReport {
            product_id,
            quantity,
            outcome,
        });
    }

    pub fn failures(&self) -> impl Iterator<Item = &ItemReport> {
        self.items.iter().filter(|i| i.outcome.is_failed())
    }

    pub fn has_failures(&self) -> bool {
        self.failures().next().is_some()
    }

    pub fn count(&self, outcome: &ItemOutcome) -> usize {
        self.items
            .iter()
            .filter(|i| std::mem::discriminant(&i.outcome) == std::mem::discriminant(outcome))
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failures_are_counted_by_kind() {
        let mut report = BatchReport::new(OrderId::new(), "ORD-1", JournalAction::Reserve);
        report.push(ProductId::from("A"), 1, ItemOutcome::Applied);
        report.push(
            ProductId::from("B"),
            2,
            ItemOutcome::Failed("insufficient".into()),
        );
        report.push(ProductId::from("C"), 3, ItemOutcome::AlreadyApplied);

        assert!(report.has_failures());
        assert_eq!(report.failures().count(), 1);
        assert_eq!(report.count(&ItemOutcome::Failed(String::new())), 1);
        assert_eq!(report.count(&ItemOutcome::Applied), 1);
    }
}
