//! Periodic repair of orders whose `OrderCreated` never reached inventory.
//!
//! Publishing is best-effort, so an order can be stored while its event is
//! lost. The sweep looks for open orders past a grace period that have line
//! items with no journal entry and publishes their `OrderCreated` again.
//! Reservation is idempotent per order and product, so a second copy of an
//! event that did arrive changes nothing.

use std::time::Duration;

use chrono::{DateTime, Utc};
use domain::inventory::ReservationState;
use domain::{DomainError, InventoryLedger, Order, OrderRepository, OrderService};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::Result;
use crate::dead_letter::DeadLetterLog;

pub struct ReconciliationSweep<R: OrderRepository, L: InventoryLedger> {
    orders: OrderService<R>,
    ledger: L,
    grace: chrono::Duration,
    dead_letters: Option<DeadLetterLog>,
}

impl<R: OrderRepository, L: InventoryLedger> ReconciliationSweep<R, L> {
    pub fn new(orders: OrderService<R>, ledger: L, grace: chrono::Duration) -> Self {
        Self {
            orders,
            ledger,
            grace,
            dead_letters: None,
        }
    }

    /// Orders with parked ledger steps are left to the dead-letter retry.
    pub fn with_dead_letters(mut self, dead_letters: DeadLetterLog) -> Self {
        self.dead_letters = Some(dead_letters);
        self
    }

    /// Runs one pass and returns how many orders were republished.
    #[tracing::instrument(skip(self))]
    pub async fn run_once(&self, now: DateTime<Utc>) -> Result<usize> {
        let candidates = self
            .orders
            .open_orders_older_than(now - self.grace)
            .await
            .map_err(DomainError::from)?;

        let mut republished = 0;
        for order in candidates {
            if self.needs_republish(&order).await? {
                tracing::info!(
                    order_id = %order.id(),
                    order_number = %order.order_number(),
                    status = %order.status(),
                    "reservation missing, republishing OrderCreated"
                );
                self.orders.republish_created(&order);
                republished += 1;
            }
        }

        metrics::counter!("saga_reconciled_orders_total").increment(republished as u64);
        Ok(republished)
    }

    async fn needs_republish(&self, order: &Order) -> Result<bool> {
        let journal = self
            .ledger
            .reservations_for_order(order.id())
            .await
            .map_err(DomainError::from)?;

        // Released entries mean the order was cancelled or rolled back;
        // reserving again would resurrect it.
        if journal
            .iter()
            .any(|entry| entry.state == ReservationState::Released)
        {
            return Ok(false);
        }
        let missing = order
            .items()
            .iter()
            .any(|item| !journal.iter().any(|entry| entry.product_id == item.product_id));
        if !missing {
            return Ok(false);
        }
        if let Some(dead_letters) = &self.dead_letters {
            if dead_letters.holds_order(order.id()).await {
                tracing::debug!(order_id = %order.id(), "order has parked ledger steps, skipping");
                return Ok(false);
            }
        }
        Ok(true)
    }
}

impl<R, L> ReconciliationSweep<R, L>
where
    R: OrderRepository + 'static,
    L: InventoryLedger + 'static,
{
    /// Runs a pass every `every` until `shutdown` turns true.
    pub fn spawn(self, every: Duration, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            // The first tick completes immediately; give consumers a head start.
            ticker.tick().await;
            loop {
                tokio::select! {
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                    _ = ticker.tick() => {
                        if let Err(e) = self.run_once(Utc::now()).await {
                            tracing::error!(error = %e, "reconciliation pass failed");
                        }
                    }
                }
            }
            tracing::info!("reconciliation stopped");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{Money, ProductId, UserId};
    use domain::{InMemoryInventoryLedger, InMemoryOrderRepository, LineItem, ShippingInfo};
    use event_bus::{BestEffortPublisher, InMemoryEventBus};

    async fn setup() -> (
        InMemoryEventBus,
        OrderService<InMemoryOrderRepository>,
        InMemoryInventoryLedger,
        BestEffortPublisher,
    ) {
        let bus = InMemoryEventBus::default();
        let publisher = BestEffortPublisher::spawn(bus.clone());
        let orders = OrderService::new(InMemoryOrderRepository::new(), publisher.clone());
        let ledger = InMemoryInventoryLedger::new();
        ledger.create(ProductId::from("A"), 10, 0).await.unwrap();
        (bus, orders, ledger, publisher)
    }

    async fn place_order(orders: &OrderService<InMemoryOrderRepository>) -> Order {
        orders
            .create_order(
                UserId::new(),
                vec![LineItem::new("A", "a", Money::from_cents(100), 2)],
                ShippingInfo::default(),
            )
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn republishes_orders_missing_a_reservation() {
        let (bus, orders, ledger, publisher) = setup().await;
        let order = place_order(&orders).await;
        let sweep = ReconciliationSweep::new(orders, ledger, chrono::Duration::seconds(60));

        // Still inside the grace period.
        assert_eq!(sweep.run_once(Utc::now()).await.unwrap(), 0);

        let later = Utc::now() + chrono::Duration::minutes(5);
        assert_eq!(sweep.run_once(later).await.unwrap(), 1);
        publisher.flush().await;

        let created = bus.messages(domain::ORDER_CREATED_TOPIC).await;
        assert_eq!(created.len(), 2);
        assert!(created.iter().all(|m| m.key == order.order_number()));
    }

    #[tokio::test]
    async fn reserved_and_released_orders_are_left_alone() {
        let (_bus, orders, ledger, _publisher) = setup().await;
        let reserved = place_order(&orders).await;
        let cancelled = place_order(&orders).await;
        ledger
            .reserve_for_order(reserved.id(), &ProductId::from("A"), 2)
            .await
            .unwrap();
        ledger
            .release_for_order(cancelled.id(), &ProductId::from("A"), 2)
            .await
            .unwrap();

        let sweep = ReconciliationSweep::new(orders, ledger, chrono::Duration::seconds(60));
        let later = Utc::now() + chrono::Duration::minutes(5);
        assert_eq!(sweep.run_once(later).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn bus_outage_is_repaired_on_the_next_pass() {
        let (bus, orders, ledger, publisher) = setup().await;
        bus.set_unavailable(true);
        let order = place_order(&orders).await;
        publisher.flush().await;
        assert!(bus.messages(domain::ORDER_CREATED_TOPIC).await.is_empty());

        bus.set_unavailable(false);
        let sweep = ReconciliationSweep::new(orders, ledger, chrono::Duration::zero());
        assert_eq!(sweep.run_once(Utc::now()).await.unwrap(), 1);
        publisher.flush().await;

        let created = bus.messages(domain::ORDER_CREATED_TOPIC).await;
        assert_eq!(created.len(), 1);
        assert_eq!(created[0].key, order.order_number());
    }
}
