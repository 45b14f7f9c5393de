use domain::{
    OrderError, OrderRepository, OrderService, OrderStatus, PaymentFailed, PaymentSuccess,
};

use crate::{Result, SagaError};

/// Why a payment event left the order untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    OrderNotFound,
    /// The payer is not the order's owner.
    OwnerMismatch,
    /// The order already moved on, for example a redelivered success.
    NotPending(OrderStatus),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentReaction {
    Confirmed,
    Skipped(SkipReason),
}

/// Order's side of the choreography: confirms paid orders.
#[derive(Clone)]
pub struct OrderReactor<R: OrderRepository> {
    orders: OrderService<R>,
}

impl<R: OrderRepository> OrderReactor<R> {
    pub fn new(orders: OrderService<R>) -> Self {
        Self { orders }
    }

    #[tracing::instrument(skip(self, event), fields(order_id = %event.order_id, payment_id = %event.payment_id))]
    pub async fn on_payment_success(&self, event: &PaymentSuccess) -> Result<PaymentReaction> {
        let Some(order) = self.orders.get_order(event.order_id).await.map_err(domain_error)? else {
            tracing::warn!("payment for unknown order");
            return Ok(PaymentReaction::Skipped(SkipReason::OrderNotFound));
        };

        if !order.is_owned_by(event.user_id) {
            tracing::warn!(
                payer = %event.user_id,
                owner = %order.user_id(),
                "payer does not own the order, ignoring"
            );
            return Ok(PaymentReaction::Skipped(SkipReason::OwnerMismatch));
        }
        if order.status() != OrderStatus::Pending {
            tracing::info!(status = %order.status(), "order not pending, nothing to confirm");
            return Ok(PaymentReaction::Skipped(SkipReason::NotPending(
                order.status(),
            )));
        }

        match self
            .orders
            .update_status(order.id(), OrderStatus::Confirmed)
            .await
        {
            Ok(_) => {
                tracing::info!(order_number = %order.order_number(), "order confirmed after payment");
                Ok(PaymentReaction::Confirmed)
            }
            // Cancelled between the read and the write.
            Err(OrderError::IllegalTransition { from, .. }) => {
                tracing::info!(status = %from, "order left PENDING before confirmation");
                Ok(PaymentReaction::Skipped(SkipReason::NotPending(from)))
            }
            Err(e @ OrderError::ConcurrencyConflict { .. }) => {
                Err(SagaError::EventProcessing(e.to_string()))
            }
            Err(e) => Err(domain_error(e)),
        }
    }

    /// Payment failures leave the order PENDING so the user can pay again.
    pub fn on_payment_failed(&self, event: &PaymentFailed) {
        tracing::info!(
            order_id = %event.order_id,
            payment_id = %event.payment_id,
            reason = %event.failure_reason,
            "payment failed, order stays pending"
        );
    }
}

fn domain_error(e: OrderError) -> SagaError {
    SagaError::Domain(e.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use common::{Money, PaymentId, UserId};
    use domain::{InMemoryOrderRepository, LineItem, Order, PaymentMethod, ShippingInfo};
    use event_bus::{BestEffortPublisher, InMemoryEventBus};

    async fn setup() -> (OrderReactor<InMemoryOrderRepository>, Order) {
        let publisher = BestEffortPublisher::spawn(InMemoryEventBus::default());
        let orders = OrderService::new(InMemoryOrderRepository::new(), publisher);
        let order = orders
            .create_order(
                UserId::new(),
                vec![LineItem::new("A", "a", Money::from_cents(500), 1)],
                ShippingInfo::default(),
            )
            .await
            .unwrap();
        (OrderReactor::new(orders), order)
    }

    fn success_for(order: &Order, user_id: UserId) -> PaymentSuccess {
        PaymentSuccess {
            payment_id: PaymentId::new(),
            order_id: order.id(),
            user_id,
            amount: order.total_amount(),
            payment_method: PaymentMethod::Online,
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn success_confirms_once() {
        let (reactor, order) = setup().await;
        let event = success_for(&order, order.user_id());

        assert_eq!(
            reactor.on_payment_success(&event).await.unwrap(),
            PaymentReaction::Confirmed
        );
        assert_eq!(
            reactor.on_payment_success(&event).await.unwrap(),
            PaymentReaction::Skipped(SkipReason::NotPending(OrderStatus::Confirmed))
        );
    }

    #[tokio::test]
    async fn foreign_payer_is_ignored() {
        let (reactor, order) = setup().await;
        let event = success_for(&order, UserId::new());

        assert_eq!(
            reactor.on_payment_success(&event).await.unwrap(),
            PaymentReaction::Skipped(SkipReason::OwnerMismatch)
        );
        let stored = reactor.orders.get_order(order.id()).await.unwrap().unwrap();
        assert_eq!(stored.status(), OrderStatus::Pending);
    }
}
