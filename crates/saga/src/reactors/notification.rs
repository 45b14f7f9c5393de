use domain::notification::compose;
use domain::{FulfillmentEvent, Notification, NotificationStore};

use crate::{Result, SagaError};

/// Notification's side of the choreography: one stored message per event.
#[derive(Clone)]
pub struct NotificationReactor<S: NotificationStore> {
    store: S,
}

impl<S: NotificationStore> NotificationReactor<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Stores the message for `event`; `None` when a redelivered or
    /// republished copy was already turned into a notification.
    pub async fn on_event(&self, event: &FulfillmentEvent) -> Result<Option<Notification>> {
        let notification = compose(event);
        let stored = self
            .store
            .save(notification.clone())
            .await
            .map_err(|e| SagaError::Domain(e.into()))?;
        if !stored {
            tracing::debug!(
                order_id = %event.order_id(),
                source = notification.source.as_deref().unwrap_or_default(),
                "duplicate event, notification already stored"
            );
            metrics::counter!("saga_duplicate_notifications_total").increment(1);
            return Ok(None);
        }
        tracing::info!(
            user_id = %notification.user_id,
            order_id = %event.order_id(),
            kind = notification.kind.as_str(),
            "notification stored"
        );
        Ok(Some(notification))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use common::{Money, OrderId, UserId};
    use domain::{InMemoryNotificationStore, OrderCreated, OrderStatus};

    fn created(user_id: UserId) -> FulfillmentEvent {
        FulfillmentEvent::OrderCreated(OrderCreated {
            order_id: OrderId::new(),
            order_number: "ORD-20250101000000-3".to_string(),
            user_id,
            total_amount: Money::from_cents(1000),
            status: OrderStatus::Pending,
            shipping_address: String::new(),
            phone: String::new(),
            items: Vec::new(),
            timestamp: Utc::now(),
        })
    }

    #[tokio::test]
    async fn redelivered_event_notifies_once() {
        let reactor = NotificationReactor::new(InMemoryNotificationStore::new());
        let user = UserId::new();
        let event = created(user);

        assert!(reactor.on_event(&event).await.unwrap().is_some());
        assert!(reactor.on_event(&event).await.unwrap().is_none());

        let inbox = reactor.store().list_for_user(user).await.unwrap();
        assert_eq!(inbox.len(), 1);
        assert_eq!(inbox[0].title, "Order placed");
    }
}
