use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{OrderId, UserId};
use tokio::sync::RwLock;

use super::{Order, OrderError, OrderStatus};

/// Storage for order records.
///
/// `update` is a compare-and-swap on the order version, so two writers that
/// loaded the same version cannot both succeed.
#[async_trait]
pub trait OrderRepository: Send + Sync {
    /// Stores a new order. Fails with `DuplicateOrderNumber` when the number
    /// is taken.
    async fn insert(&self, order: &Order) -> Result<(), OrderError>;

    /// Replaces an order whose stored version equals `expected_version`.
    async fn update(&self, order: &Order, expected_version: u64) -> Result<(), OrderError>;

    async fn get(&self, order_id: OrderId) -> Result<Option<Order>, OrderError>;

    async fn find_by_number(&self, order_number: &str) -> Result<Option<Order>, OrderError>;

    /// A user's orders, newest first.
    async fn list_for_user(&self, user_id: UserId) -> Result<Vec<Order>, OrderError>;

    /// Orders in any of `statuses` created before `cutoff`, oldest first.
    async fn list_stale(
        &self,
        statuses: &[OrderStatus],
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Order>, OrderError>;
}

#[derive(Default)]
struct OrderTable {
    by_id: HashMap<OrderId, Order>,
    by_number: HashMap<String, OrderId>,
}

/// In-memory order repository.
#[derive(Clone, Default)]
pub struct InMemoryOrderRepository {
    table: Arc<RwLock<OrderTable>>,
}

impl InMemoryOrderRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn count(&self) -> usize {
        self.table.read().await.by_id.len()
    }
}

#[async_trait]
impl OrderRepository for InMemoryOrderRepository {
    async fn insert(&self, order: &Order) -> Result<(), OrderError> {
        let mut table = self.table.write().await;
        if table.by_number.contains_key(order.order_number()) {
            return Err(OrderError::DuplicateOrderNumber(
                order.order_number().to_string(),
            ));
        }
        table
            .by_number
            .insert(order.order_number().to_string(), order.id());
        table.by_id.insert(order.id(), order.clone());
        Ok(())
    }

    async fn update(&self, order: &Order, expected_version: u64) -> Result<(), OrderError> {
        let mut table = self.table.write().await;
        let stored = table
            .by_id
            .get_mut(&order.id())
            .ok_or(OrderError::NotFound(order.id()))?;
        if stored.version() != expected_version {
            return Err(OrderError::ConcurrencyConflict {
                order_id: order.id(),
                expected: expected_version,
                actual: stored.version(),
            });
        }
        *stored = order.clone();
        Ok(())
    }

    async fn get(&self, order_id: OrderId) -> Result<Option<Order>, OrderError> {
        Ok(self.table.read().await.by_id.get(&order_id).cloned())
    }

    async fn find_by_number(&self, order_number: &str) -> Result<Option<Order>, OrderError> {
        let table = self.table.read().await;
        Ok(table
            .by_number
            .get(order_number)
            .and_then(|id| table.by_id.get(id))
            .cloned())
    }

    async fn list_for_user(&self, user_id: UserId) -> Result<Vec<Order>, OrderError> {
        let table = self.table.read().await;
        let mut orders: Vec<Order> = table
            .by_id
            .values()
            .filter(|o| o.is_owned_by(user_id))
            .cloned()
            .collect();
        orders.sort_by_key(|o| std::cmp::Reverse(o.created_at()));
        Ok(orders)
    }

    async fn list_stale(
        &self,
        statuses: &[OrderStatus],
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Order>, OrderError> {
        let table = self.table.read().await;
        let mut orders: Vec<Order> = table
            .by_id
            .values()
            .filter(|o| statuses.contains(&o.status()) && o.created_at() < cutoff)
            .cloned()
            .collect();
        orders.sort_by_key(|o| o.created_at());
        Ok(orders)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::order::{LineItem, ShippingInfo};
    use common::Money;

    fn order(number: &str) -> Order {
        Order::new(
            UserId::new(),
            number.to_string(),
            vec![LineItem::new("SKU-1", "Widget", Money::from_cents(100), 1)],
            ShippingInfo::default(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn order_numbers_are_unique() {
        let repo = InMemoryOrderRepository::new();
        repo.insert(&order("ORD-1")).await.unwrap();
        assert!(matches!(
            repo.insert(&order("ORD-1")).await,
            Err(OrderError::DuplicateOrderNumber(_))
        ));
        assert_eq!(repo.count().await, 1);
    }

    #[tokio::test]
    async fn stale_version_is_rejected() {
        let repo = InMemoryOrderRepository::new();
        let original = order("ORD-1");
        repo.insert(&original).await.unwrap();

        let mut first = original.clone();
        first.transition(OrderStatus::Confirmed).unwrap();
        repo.update(&first, original.version()).await.unwrap();

        let mut second = original.clone();
        second.transition(OrderStatus::Cancelled).unwrap();
        let err = repo.update(&second, original.version()).await.unwrap_err();
        assert!(matches!(
            err,
            OrderError::ConcurrencyConflict {
                expected: 1,
                actual: 2,
                ..
            }
        ));

        let stored = repo.get(original.id()).await.unwrap().unwrap();
        assert_eq!(stored.status(), OrderStatus::Confirmed);
    }

    #[tokio::test]
    async fn lookup_by_number() {
        let repo = InMemoryOrderRepository::new();
        let o = order("ORD-42");
        repo.insert(&o).await.unwrap();
        assert_eq!(
            repo.find_by_number("ORD-42").await.unwrap().map(|o| o.id()),
            Some(o.id())
        );
        assert!(repo.find_by_number("ORD-43").await.unwrap().is_none());
    }
}
