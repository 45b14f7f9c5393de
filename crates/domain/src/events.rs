//! Wire contract between services.
//!
//! Every event carries enough denormalized data (order id and number, owner,
//! line items) for a consumer to act without calling back into the service
//! that produced it. Field names are camelCase on the wire.

use chrono::{DateTime, Utc};
use common::{Money, OrderId, PaymentId, UserId};
use event_bus::{BusError, BusEvent, Message};
use serde::{Deserialize, Serialize};

use crate::order::{LineItem, Order, OrderStatus};
use crate::payment::{Payment, PaymentMethod};

pub const ORDER_CREATED_TOPIC: &str = "order-created";
pub const ORDER_STATUS_CHANGED_TOPIC: &str = "order-status-changed";
pub const PAYMENT_SUCCESS_TOPIC: &str = "payment-success";
pub const PAYMENT_FAILED_TOPIC: &str = "payment-failed";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderCreated {
    pub order_id: OrderId,
    pub order_number: String,
    pub user_id: UserId,
    pub total_amount: Money,
    pub status: OrderStatus,
    pub shipping_address: String,
    pub phone: String,
    pub items: Vec<LineItem>,
    pub timestamp: DateTime<Utc>,
}

impl OrderCreated {
    pub fn from_order(order: &Order) -> Self {
        Self {
            order_id: order.id(),
            order_number: order.order_number().to_string(),
            user_id: order.user_id(),
            total_amount: order.total_amount(),
            status: order.status(),
            shipping_address: order.shipping().shipping_address.clone(),
            phone: order.shipping().phone.clone(),
            items: order.items().to_vec(),
            timestamp: Utc::now(),
        }
    }
}

impl BusEvent for OrderCreated {
    fn topic(&self) -> &'static str {
        ORDER_CREATED_TOPIC
    }

    fn key(&self) -> String {
        self.order_number.clone()
    }

    fn event_type(&self) -> &'static str {
        "OrderCreated"
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderStatusChanged {
    pub order_id: OrderId,
    pub order_number: String,
    pub user_id: UserId,
    pub old_status: OrderStatus,
    pub new_status: OrderStatus,
    #[serde(default)]
    pub items: Vec<LineItem>,
    pub timestamp: DateTime<Utc>,
}

impl OrderStatusChanged {
    /// Describes the transition `order` just made out of `old_status`.
    pub fn from_transition(order: &Order, old_status: OrderStatus) -> Self {
        Self {
            order_id: order.id(),
            order_number: order.order_number().to_string(),
            user_id: order.user_id(),
            old_status,
            new_status: order.status(),
            items: order.items().to_vec(),
            timestamp: Utc::now(),
        }
    }
}

impl BusEvent for OrderStatusChanged {
    fn topic(&self) -> &'static str {
        ORDER_STATUS_CHANGED_TOPIC
    }

    fn key(&self) -> String {
        self.order_number.clone()
    }

    fn event_type(&self) -> &'static str {
        "OrderStatusChanged"
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentSuccess {
    pub payment_id: PaymentId,
    pub order_id: OrderId,
    pub user_id: UserId,
    pub amount: Money,
    pub payment_method: PaymentMethod,
    pub timestamp: DateTime<Utc>,
}

impl PaymentSuccess {
    pub fn from_payment(payment: &Payment) -> Self {
        Self {
            payment_id: payment.id,
            order_id: payment.order_id,
            user_id: payment.user_id,
            amount: payment.amount,
            payment_method: payment.method,
            timestamp: Utc::now(),
        }
    }
}

impl BusEvent for PaymentSuccess {
    fn topic(&self) -> &'static str {
        PAYMENT_SUCCESS_TOPIC
    }

    fn key(&self) -> String {
        self.order_id.to_string()
    }

    fn event_type(&self) -> &'static str {
        "PaymentSuccess"
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentFailed {
    pub payment_id: PaymentId,
    pub order_id: OrderId,
    pub user_id: UserId,
    pub amount: Money,
    pub payment_method: PaymentMethod,
    pub failure_reason: String,
    pub timestamp: DateTime<Utc>,
}

impl PaymentFailed {
    pub fn from_payment(payment: &Payment) -> Self {
        Self {
            payment_id: payment.id,
            order_id: payment.order_id,
            user_id: payment.user_id,
            amount: payment.amount,
            payment_method: payment.method,
            failure_reason: payment
                .failure_reason
                .clone()
                .unwrap_or_else(|| "unknown".to_string()),
            timestamp: Utc::now(),
        }
    }
}

impl BusEvent for PaymentFailed {
    fn topic(&self) -> &'static str {
        PAYMENT_FAILED_TOPIC
    }

    fn key(&self) -> String {
        self.order_id.to_string()
    }

    fn event_type(&self) -> &'static str {
        "PaymentFailed"
    }
}

/// Any event of the wire contract, for consumers reading several topics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FulfillmentEvent {
    OrderCreated(OrderCreated),
    OrderStatusChanged(OrderStatusChanged),
    PaymentSuccess(PaymentSuccess),
    PaymentFailed(PaymentFailed),
}

impl FulfillmentEvent {
    /// Decodes a bus message by its event type.
    ///
    /// Returns `Ok(None)` for event types outside the contract so consumers
    /// can skip them.
    pub fn from_message(message: &Message) -> Result<Option<Self>, BusError> {
        let event = match message.event_type.as_str() {
            "OrderCreated" => Self::OrderCreated(message.decode()?),
            "OrderStatusChanged" => Self::OrderStatusChanged(message.decode()?),
            "PaymentSuccess" => Self::PaymentSuccess(message.decode()?),
            "PaymentFailed" => Self::PaymentFailed(message.decode()?),
            _ => return Ok(None),
        };
        Ok(Some(event))
    }

    pub fn order_id(&self) -> OrderId {
        match self {
            Self::OrderCreated(e) => e.order_id,
            Self::OrderStatusChanged(e) => e.order_id,
            Self::PaymentSuccess(e) => e.order_id,
            Self::PaymentFailed(e) => e.order_id,
        }
    }

    pub fn user_id(&self) -> UserId {
        match self {
            Self::OrderCreated(e) => e.user_id,
            Self::OrderStatusChanged(e) => e.user_id,
            Self::PaymentSuccess(e) => e.user_id,
            Self::PaymentFailed(e) => e.user_id,
        }
    }

    /// Identifies the business fact behind the event, stable across
    /// redelivery and republishing.
    ///
    /// An order reaches each status at most once, so the status change key
    /// needs only the order and the new status.
    pub fn source_key(&self) -> String {
        match self {
            Self::OrderCreated(e) => format!("order-created:{}", e.order_id),
            Self::OrderStatusChanged(e) => {
                format!("order-status-changed:{}:{}", e.order_id, e.new_status)
            }
            Self::PaymentSuccess(e) => format!("payment-success:{}", e.payment_id),
            Self::PaymentFailed(e) => format!("payment-failed:{}", e.payment_id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::ProductId;
    use event_bus::{Offset, OutboundMessage};

    fn status_changed() -> OrderStatusChanged {
        OrderStatusChanged {
            order_id: OrderId::new(),
            order_number: "ORD-20240101000000-7".to_string(),
            user_id: UserId::new(),
            old_status: OrderStatus::Shipped,
            new_status: OrderStatus::Cancelled,
            items: vec![LineItem::new("SKU-1", "Widget", Money::from_cents(1999), 2)],
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn wire_fields_are_camel_case() {
        let json = serde_json::to_value(status_changed()).unwrap();
        assert_eq!(json["oldStatus"], "SHIPPED");
        assert_eq!(json["newStatus"], "CANCELLED");
        assert_eq!(json["orderNumber"], "ORD-20240101000000-7");
        assert_eq!(json["items"][0]["productId"], "SKU-1");
        assert_eq!(json["items"][0]["price"], 1999);
    }

    #[test]
    fn order_events_are_keyed_by_order_number() {
        let event = status_changed();
        assert_eq!(event.topic(), ORDER_STATUS_CHANGED_TOPIC);
        assert_eq!(event.key(), event.order_number);
    }

    #[test]
    fn status_change_without_items_still_decodes() {
        let mut json = serde_json::to_value(status_changed()).unwrap();
        json.as_object_mut().unwrap().remove("items");
        let event: OrderStatusChanged = serde_json::from_value(json).unwrap();
        assert!(event.items.is_empty());
    }

    #[test]
    fn decodes_by_event_type() {
        let event = status_changed();
        let message = OutboundMessage::from_event(&event)
            .unwrap()
            .into_delivered(0, Offset::new(0));
        match FulfillmentEvent::from_message(&message).unwrap() {
            Some(FulfillmentEvent::OrderStatusChanged(decoded)) => {
                assert_eq!(decoded.items[0].product_id, ProductId::new("SKU-1"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn unknown_event_types_are_skipped() {
        let message = OutboundMessage::builder()
            .topic("other")
            .key("k")
            .event_type("SomethingElse")
            .payload_json(serde_json::json!({}))
            .build()
            .unwrap()
            .into_delivered(0, Offset::new(0));
        assert!(FulfillmentEvent::from_message(&message).unwrap().is_none());
    }
}
