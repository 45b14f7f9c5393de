//! Bus-facing handlers: decode, run the reactor, park failures.

use async_trait::async_trait;
use domain::{FulfillmentEvent, InventoryLedger, NotificationStore, OrderRepository};
use event_bus::Message;

use crate::choreography::{INVENTORY_GROUP, NOTIFICATION_GROUP, ORDER_GROUP};
use crate::consumer::EventHandler;
use crate::dead_letter::{DeadLetter, DeadLetterLog};
use crate::outcome::{BatchReport, ItemOutcome};
use crate::reactors::{InventoryReactor, NotificationReactor, OrderReactor, PaymentReaction};
use crate::Result;

/// Decodes a message, dead-lettering it when the payload is unreadable.
///
/// `None` means the message should be acknowledged without further work.
async fn decode(
    group: &str,
    message: &Message,
    dead_letters: &DeadLetterLog,
) -> Option<FulfillmentEvent> {
    match FulfillmentEvent::from_message(message) {
        Ok(Some(event)) => Some(event),
        Ok(None) => {
            tracing::debug!(event_type = %message.event_type, "unknown event type, skipping");
            None
        }
        Err(e) => {
            tracing::error!(
                event_type = %message.event_type,
                error = %e,
                "cannot decode payload"
            );
            dead_letters
                .record(DeadLetter::undecodable(group, message, e.to_string()))
                .await;
            None
        }
    }
}

pub struct InventoryHandler<L: InventoryLedger> {
    reactor: InventoryReactor<L>,
    dead_letters: DeadLetterLog,
}

impl<L: InventoryLedger> InventoryHandler<L> {
    pub fn new(reactor: InventoryReactor<L>, dead_letters: DeadLetterLog) -> Self {
        Self {
            reactor,
            dead_letters,
        }
    }

    async fn park_failures(&self, message: &Message, report: &BatchReport) {
        for failure in report.failures() {
            let reason = match &failure.outcome {
                ItemOutcome::Failed(reason) => reason.clone(),
                other => other.as_str().to_string(),
            };
            let entry = if report.rolled_back {
                DeadLetter::rolled_back(
                    INVENTORY_GROUP,
                    message,
                    report.order_id,
                    failure.product_id.clone(),
                    reason,
                )
            } else {
                DeadLetter::ledger_action(
                    INVENTORY_GROUP,
                    message,
                    report.order_id,
                    failure.product_id.clone(),
                    report.action,
                    failure.quantity,
                    reason,
                )
            };
            self.dead_letters.record(entry).await;
        }
    }
}

#[async_trait]
impl<L: InventoryLedger> EventHandler for InventoryHandler<L> {
    fn name(&self) -> &'static str {
        "inventory"
    }

    async fn handle(&self, message: &Message) -> Result<()> {
        let Some(event) = decode(INVENTORY_GROUP, message, &self.dead_letters).await else {
            return Ok(());
        };
        let report = match &event {
            FulfillmentEvent::OrderCreated(e) => Some(self.reactor.on_order_created(e).await?),
            FulfillmentEvent::OrderStatusChanged(e) => self.reactor.on_status_changed(e).await?,
            _ => None,
        };
        if let Some(report) = report {
            self.park_failures(message, &report).await;
        }
        Ok(())
    }
}

pub struct OrderHandler<R: OrderRepository> {
    reactor: OrderReactor<R>,
    dead_letters: DeadLetterLog,
}

impl<R: OrderRepository> OrderHandler<R> {
    pub fn new(reactor: OrderReactor<R>, dead_letters: DeadLetterLog) -> Self {
        Self {
            reactor,
            dead_letters,
        }
    }
}

#[async_trait]
impl<R: OrderRepository> EventHandler for OrderHandler<R> {
    fn name(&self) -> &'static str {
        "order"
    }

    async fn handle(&self, message: &Message) -> Result<()> {
        let Some(event) = decode(ORDER_GROUP, message, &self.dead_letters).await else {
            return Ok(());
        };
        match &event {
            FulfillmentEvent::PaymentSuccess(e) => {
                if let PaymentReaction::Skipped(reason) = self.reactor.on_payment_success(e).await? {
                    tracing::debug!(?reason, "payment success skipped");
                }
            }
            FulfillmentEvent::PaymentFailed(e) => self.reactor.on_payment_failed(e),
            _ => {}
        }
        Ok(())
    }
}

pub struct NotificationHandler<S: NotificationStore> {
    reactor: NotificationReactor<S>,
    dead_letters: DeadLetterLog,
}

impl<S: NotificationStore> NotificationHandler<S> {
    pub fn new(reactor: NotificationReactor<S>, dead_letters: DeadLetterLog) -> Self {
        Self {
            reactor,
            dead_letters,
        }
    }
}

#[async_trait]
impl<S: NotificationStore> EventHandler for NotificationHandler<S> {
    fn name(&self) -> &'static str {
        "notification"
    }

    async fn handle(&self, message: &Message) -> Result<()> {
        let Some(event) = decode(NOTIFICATION_GROUP, message, &self.dead_letters).await else {
            return Ok(());
        };
        // Losing a notification is acceptable; never hold up the partition.
        if let Err(e) = self.reactor.on_event(&event).await {
            tracing::error!(order_id = %event.order_id(), error = %e, "notification not stored");
        }
        Ok(())
    }
}
