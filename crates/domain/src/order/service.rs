//! Order service: creation, status updates and cancellation.

use chrono::{DateTime, Utc};
use common::{OrderId, UserId};
use event_bus::BestEffortPublisher;

use super::{
    LineItem, Order, OrderError, OrderRepository, OrderStatus, ShippingInfo,
    generate_order_number,
};
use crate::events::{OrderCreated, OrderStatusChanged};

const ORDER_NUMBER_ATTEMPTS: usize = 5;

/// Owns order records and publishes their lifecycle events.
///
/// Persisting comes first and publishing second; a failed publish is logged
/// by the publisher and never undoes the stored change.
#[derive(Clone)]
pub struct OrderService<R: OrderRepository> {
    repository: R,
    publisher: BestEffortPublisher,
}

impl<R: OrderRepository> OrderService<R> {
    pub fn new(repository: R, publisher: BestEffortPublisher) -> Self {
        Self {
            repository,
            publisher,
        }
    }

    pub fn repository(&self) -> &R {
        &self.repository
    }

    /// Creates a PENDING order from line-item snapshots and emits
    /// `OrderCreated`.
    ///
    /// Items are trusted as priced by the caller; only positivity and range are checked.
    #[tracing::instrument(skip(self, items, shipping), fields(items = items.len()))]
    pub async fn create_order(
        &self,
        user_id: UserId,
        items: Vec<LineItem>,
        shipping: ShippingInfo,
    ) -> Result<Order, OrderError> {
        let mut attempt = 0;
        let order = loop {
            attempt += 1;
            let order = Order::new(
                user_id,
                generate_order_number(Utc::now()),
                items.clone(),
                shipping.clone(),
            )?;
            match self.repository.insert(&order).await {
                Ok(()) => break order,
                Err(OrderError::DuplicateOrderNumber(number))
                    if attempt < ORDER_NUMBER_ATTEMPTS =>
                {
                    tracing::debug!(%number, attempt, "order number taken, drawing another");
                }
                Err(e) => return Err(e),
            }
        };

        tracing::info!(
            order_id = %order.id(),
            order_number = %order.order_number(),
            total = %order.total_amount(),
            "order created"
        );
        metrics::counter!("orders_created_total").increment(1);

        self.publisher
            .publish_event(&OrderCreated::from_order(&order));
        Ok(order)
    }

    /// Moves an order to `new_status`.
    ///
    /// Asking for the current status returns the order unchanged and emits
    /// nothing.
    #[tracing::instrument(skip(self))]
    pub async fn update_status(
        &self,
        order_id: OrderId,
        new_status: OrderStatus,
    ) -> Result<Order, OrderError> {
        let order = self.load(order_id).await?;
        self.transition(order, new_status).await
    }

    /// Cancels an order on behalf of its owner.
    #[tracing::instrument(skip(self))]
    pub async fn cancel_order(
        &self,
        order_id: OrderId,
        requesting_user: UserId,
    ) -> Result<Order, OrderError> {
        let order = self.load(order_id).await?;
        if !order.is_owned_by(requesting_user) {
            return Err(OrderError::Forbidden {
                order_id,
                user_id: requesting_user,
            });
        }
        if order.status().is_terminal() {
            return Err(OrderError::IllegalTransition {
                order_id,
                from: order.status(),
                to: OrderStatus::Cancelled,
            });
        }
        self.transition(order, OrderStatus::Cancelled).await
    }

    pub async fn get_order(&self, order_id: OrderId) -> Result<Option<Order>, OrderError> {
        self.repository.get(order_id).await
    }

    /// Reads an order on behalf of a user, hiding other users' orders.
    pub async fn get_order_for_user(
        &self,
        order_id: OrderId,
        user_id: UserId,
    ) -> Result<Order, OrderError> {
        let order = self.load(order_id).await?;
        if !order.is_owned_by(user_id) {
            return Err(OrderError::Forbidden { order_id, user_id });
        }
        Ok(order)
    }

    pub async fn find_by_number(&self, order_number: &str) -> Result<Option<Order>, OrderError> {
        self.repository.find_by_number(order_number).await
    }

    pub async fn orders_for_user(&self, user_id: UserId) -> Result<Vec<Order>, OrderError> {
        self.repository.list_for_user(user_id).await
    }

    /// PENDING and CONFIRMED orders created before `cutoff`, oldest first.
    pub async fn open_orders_older_than(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Order>, OrderError> {
        self.repository
            .list_stale(&[OrderStatus::Pending, OrderStatus::Confirmed], cutoff)
            .await
    }

    /// Re-emits `OrderCreated` for an existing order.
    ///
    /// Used by reconciliation when the original event may never have reached
    /// the bus; consumers handle it idempotently.
    pub fn republish_created(&self, order: &Order) {
        self.publisher.publish_event(&OrderCreated::from_order(order));
    }

    async fn load(&self, order_id: OrderId) -> Result<Order, OrderError> {
        self.repository
            .get(order_id)
            .await?
            .ok_or(OrderError::NotFound(order_id))
    }

    /// The only place status changes are stored and announced.
    async fn transition(
        &self,
        mut order: Order,
        new_status: OrderStatus,
    ) -> Result<Order, OrderError> {
        let expected_version = order.version();
        let Some(old_status) = order.transition(new_status)? else {
            return Ok(order);
        };
        self.repository.update(&order, expected_version).await?;

        tracing::info!(
            order_id = %order.id(),
            order_number = %order.order_number(),
            from = %old_status,
            to = %new_status,
            "order status changed"
        );
        metrics::counter!("orders_status_changes_total", "to" => new_status.as_str())
            .increment(1);

        self.publisher
            .publish_event(&OrderStatusChanged::from_transition(&order, old_status));
        Ok(order)
    }
}
