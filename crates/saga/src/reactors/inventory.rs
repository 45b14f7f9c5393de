use common::{OrderId, ProductId};
use domain::inventory::{InventoryError, JournalAction};
use domain::{InventoryLedger, OrderCreated, OrderStatus, OrderStatusChanged};
use serde::{Deserialize, Serialize};

use super::merge_items;
use crate::outcome::{BatchReport, ItemOutcome};
use crate::{Result, SagaError};

/// What to do when only some items of an order can be reserved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReservationPolicy {
    /// Keep whatever could be reserved.
    #[default]
    BestEffort,
    /// Give back everything this order reserved as soon as one item fails.
    AllOrNothing,
}

impl ReservationPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReservationPolicy::BestEffort => "best_effort",
            ReservationPolicy::AllOrNothing => "all_or_nothing",
        }
    }
}

impl std::fmt::Display for ReservationPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ReservationPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "best_effort" => Ok(ReservationPolicy::BestEffort),
            "all_or_nothing" => Ok(ReservationPolicy::AllOrNothing),
            other => Err(format!("unknown reservation policy: {other}")),
        }
    }
}

/// Inventory's side of the choreography.
#[derive(Clone)]
pub struct InventoryReactor<L: InventoryLedger> {
    ledger: L,
    policy: ReservationPolicy,
}

impl<L: InventoryLedger> InventoryReactor<L> {
    pub fn new(ledger: L, policy: ReservationPolicy) -> Self {
        Self { ledger, policy }
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    pub fn policy(&self) -> ReservationPolicy {
        self.policy
    }

    /// Reserves every line item of a new order.
    #[tracing::instrument(skip(self, event), fields(order_number = %event.order_number))]
    pub async fn on_order_created(&self, event: &OrderCreated) -> Result<BatchReport> {
        let mut report =
            BatchReport::new(event.order_id, &event.order_number, JournalAction::Reserve);
        for (product_id, quantity) in merge_items(&event.items) {
            let (quantity, outcome) = self
                .apply_merged(JournalAction::Reserve, event.order_id, &product_id, quantity)
                .await?;
            report.push(product_id, quantity, outcome);
        }

        if self.policy == ReservationPolicy::AllOrNothing && report.has_failures() {
            self.roll_back(&mut report).await?;
        }

        tracing::info!(
            items = report.items.len(),
            failed = report.failures().count(),
            rolled_back = report.rolled_back,
            "reservation processed"
        );
        Ok(report)
    }

    /// Releases stock of a cancelled order and deducts stock of a delivered
    /// one. Other statuses do not concern inventory.
    #[tracing::instrument(
        skip(self, event),
        fields(order_number = %event.order_number, new_status = %event.new_status)
    )]
    pub async fn on_status_changed(
        &self,
        event: &OrderStatusChanged,
    ) -> Result<Option<BatchReport>> {
        let action = match event.new_status {
            OrderStatus::Cancelled => JournalAction::Release,
            OrderStatus::Delivered => JournalAction::Deduct,
            _ => {
                tracing::debug!("status change needs no inventory action");
                return Ok(None);
            }
        };
        if event.items.is_empty() {
            tracing::warn!(
                action = action.as_str(),
                "status change carries no items, nothing to apply"
            );
            return Ok(None);
        }

        let mut report = BatchReport::new(event.order_id, &event.order_number, action);
        for (product_id, quantity) in merge_items(&event.items) {
            let (quantity, outcome) = self
                .apply_merged(action, event.order_id, &product_id, quantity)
                .await?;
            report.push(product_id, quantity, outcome);
        }

        tracing::info!(
            action = action.as_str(),
            items = report.items.len(),
            failed = report.failures().count(),
            "inventory updated for status change"
        );
        Ok(Some(report))
    }

    /// Applies a merged quantity, or fails the item when merging refused it.
    async fn apply_merged(
        &self,
        action: JournalAction,
        order_id: OrderId,
        product_id: &ProductId,
        quantity: std::result::Result<u32, InventoryError>,
    ) -> Result<(u32, ItemOutcome)> {
        match quantity {
            Ok(quantity) => {
                let outcome = self.apply(action, order_id, product_id, quantity).await?;
                Ok((quantity, outcome))
            }
            Err(e) => {
                tracing::warn!(%product_id, action = action.as_str(), error = %e, "line items refused");
                Ok((0, ItemOutcome::Failed(e.to_string())))
            }
        }
    }

    /// Applies one journal step. Business refusals become a failed item;
    /// storage failures abort the event so it is redelivered.
    pub(crate) async fn apply(
        &self,
        action: JournalAction,
        order_id: OrderId,
        product_id: &ProductId,
        quantity: u32,
    ) -> Result<ItemOutcome> {
        let result = match action {
            JournalAction::Reserve => {
                self.ledger
                    .reserve_for_order(order_id, product_id, quantity)
                    .await
            }
            JournalAction::Release => {
                self.ledger
                    .release_for_order(order_id, product_id, quantity)
                    .await
            }
            JournalAction::Deduct => {
                self.ledger
                    .deduct_for_order(order_id, product_id, quantity)
                    .await
            }
        };

        match result {
            Ok(outcome) => {
                let item = ItemOutcome::from(&outcome);
                if item == ItemOutcome::NotReserved {
                    tracing::warn!(%product_id, action = action.as_str(), "no reservation held");
                }
                Ok(item)
            }
            Err(e @ (InventoryError::Database(_) | InventoryError::Migration(_))) => {
                Err(SagaError::EventProcessing(e.to_string()))
            }
            Err(e) => {
                tracing::warn!(%product_id, quantity, action = action.as_str(), error = %e, "ledger refused");
                Ok(ItemOutcome::Failed(e.to_string()))
            }
        }
    }

    async fn roll_back(&self, report: &mut BatchReport) -> Result<()> {
        let held: Vec<(ProductId, u32)> = report
            .items
            .iter()
            .filter(|i| matches!(i.outcome, ItemOutcome::Applied | ItemOutcome::AlreadyApplied))
            .map(|i| (i.product_id.clone(), i.quantity))
            .collect();

        for (product_id, quantity) in held {
            match self
                .ledger
                .release_for_order(report.order_id, &product_id, quantity)
                .await
            {
                Ok(_) => {}
                Err(e @ (InventoryError::Database(_) | InventoryError::Migration(_))) => {
                    return Err(SagaError::EventProcessing(e.to_string()));
                }
                Err(e) => {
                    tracing::error!(%product_id, error = %e, "rollback release failed");
                }
            }
        }
        report.rolled_back = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use common::{Money, UserId};
    use domain::{InMemoryInventoryLedger, LineItem};

    async fn ledger() -> InMemoryInventoryLedger {
        let ledger = InMemoryInventoryLedger::new();
        ledger.create(ProductId::from("A"), 10, 1).await.unwrap();
        ledger.create(ProductId::from("B"), 1, 1).await.unwrap();
        ledger
    }

    fn created(items: Vec<LineItem>) -> OrderCreated {
        OrderCreated {
            order_id: OrderId::new(),
            order_number: "ORD-20250101000000-1".to_string(),
            user_id: UserId::new(),
            total_amount: Money::checked_sum(items.iter().filter_map(LineItem::subtotal))
                .unwrap_or_default(),
            status: OrderStatus::Pending,
            shipping_address: String::new(),
            phone: String::new(),
            items,
            timestamp: Utc::now(),
        }
    }

    fn items() -> Vec<LineItem> {
        vec![
            LineItem::new("A", "a", Money::from_cents(100), 2),
            LineItem::new("B", "b", Money::from_cents(100), 5),
        ]
    }

    #[tokio::test]
    async fn best_effort_keeps_partial_reservation() {
        let reactor = InventoryReactor::new(ledger().await, ReservationPolicy::BestEffort);
        let report = reactor.on_order_created(&created(items())).await.unwrap();

        assert_eq!(report.count(&ItemOutcome::Applied), 1);
        assert_eq!(report.failures().count(), 1);
        assert!(!report.rolled_back);

        let a = reactor.ledger().get(&ProductId::from("A")).await.unwrap().unwrap();
        assert_eq!(a.reserved(), 2);
    }

    #[tokio::test]
    async fn all_or_nothing_gives_back_what_it_took() {
        let reactor = InventoryReactor::new(ledger().await, ReservationPolicy::AllOrNothing);
        let report = reactor.on_order_created(&created(items())).await.unwrap();

        assert!(report.rolled_back);
        let a = reactor.ledger().get(&ProductId::from("A")).await.unwrap().unwrap();
        assert_eq!(a.reserved(), 0);
        assert_eq!(a.available(), 10);
    }

    #[tokio::test]
    async fn oversized_combined_quantity_fails_the_item_without_touching_stock() {
        let reactor = InventoryReactor::new(ledger().await, ReservationPolicy::BestEffort);
        let event = created(vec![
            LineItem::new("A", "a", Money::from_cents(1), u32::MAX),
            LineItem::new("A", "a", Money::from_cents(1), 1),
        ]);
        let report = reactor.on_order_created(&event).await.unwrap();

        assert_eq!(report.failures().count(), 1);
        let a = reactor.ledger().get(&ProductId::from("A")).await.unwrap().unwrap();
        assert_eq!(a.reserved(), 0);
        assert!(reactor.ledger().reservations_for_order(event.order_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn other_statuses_and_empty_items_are_skipped() {
        let reactor = InventoryReactor::new(ledger().await, ReservationPolicy::BestEffort);
        let mut event = OrderStatusChanged {
            order_id: OrderId::new(),
            order_number: "ORD-20250101000000-2".to_string(),
            user_id: UserId::new(),
            old_status: OrderStatus::Confirmed,
            new_status: OrderStatus::Processing,
            items: items(),
            timestamp: Utc::now(),
        };
        assert!(reactor.on_status_changed(&event).await.unwrap().is_none());

        event.new_status = OrderStatus::Cancelled;
        event.items.clear();
        assert!(reactor.on_status_changed(&event).await.unwrap().is_none());
    }

    #[test]
    fn policy_parses_from_config_strings() {
        assert_eq!(
            "all_or_nothing".parse::<ReservationPolicy>().unwrap(),
            ReservationPolicy::AllOrNothing
        );
        assert_eq!(
            "Best-Effort".parse::<ReservationPolicy>().unwrap(),
            ReservationPolicy::BestEffort
        );
        assert!("sometimes".parse::<ReservationPolicy>().is_err());
    }
}
