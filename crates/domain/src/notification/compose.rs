use super::{Notification, NotificationKind};
use crate::events::{FulfillmentEvent, OrderCreated, OrderStatusChanged, PaymentFailed, PaymentSuccess};
use crate::order::OrderStatus;

/// Builds the message a user sees for a fulfillment event.
pub fn compose(event: &FulfillmentEvent) -> Notification {
    let notification = match event {
        FulfillmentEvent::OrderCreated(e) => order_created(e),
        FulfillmentEvent::OrderStatusChanged(e) => status_changed(e),
        FulfillmentEvent::PaymentSuccess(e) => payment_success(e),
        FulfillmentEvent::PaymentFailed(e) => payment_failed(e),
    };
    notification.with_source(event.source_key())
}

fn or_na(value: &str) -> &str {
    if value.trim().is_empty() { "N/A" } else { value }
}

fn order_created(e: &OrderCreated) -> Notification {
    Notification::new(
        e.user_id,
        NotificationKind::Info,
        "Order placed",
        format!(
            "Your order {} was created.\n\
             Total: {}\n\
             Items: {}\n\
             Shipping address: {}\n\
             Phone: {}\n\
             Status: {}",
            e.order_number,
            e.total_amount,
            e.items.len(),
            or_na(&e.shipping_address),
            or_na(&e.phone),
            e.status,
        ),
    )
}

fn status_changed(e: &OrderStatusChanged) -> Notification {
    let number = &e.order_number;
    let (kind, title, message) = match e.new_status {
        OrderStatus::Confirmed => (
            NotificationKind::Success,
            "Order confirmed",
            format!("Order {number} is confirmed and being prepared."),
        ),
        OrderStatus::Processing => (
            NotificationKind::Info,
            "Order processing",
            format!("Order {number} is being processed for shipment."),
        ),
        OrderStatus::Shipped => (
            NotificationKind::Info,
            "Order shipped",
            format!("Order {number} is on its way."),
        ),
        OrderStatus::Delivered => (
            NotificationKind::Success,
            "Order delivered",
            format!("Order {number} was delivered. Thank you for shopping with us."),
        ),
        OrderStatus::Cancelled => (
            NotificationKind::Warning,
            "Order cancelled",
            format!(
                "Order {number} was cancelled. Any payment made will be refunded within 3-5 business days."
            ),
        ),
        OrderStatus::Pending => (
            NotificationKind::Info,
            "Order status changed",
            format!(
                "Order {number} changed from {} to {}.",
                e.old_status, e.new_status
            ),
        ),
    };
    Notification::new(e.user_id, kind, title, message)
}

fn payment_success(e: &PaymentSuccess) -> Notification {
    Notification::new(
        e.user_id,
        NotificationKind::Success,
        "Payment received",
        format!(
            "Payment {} for order {} succeeded.\nAmount: {}\nMethod: {}",
            e.payment_id,
            e.order_id,
            e.amount,
            e.payment_method.as_str(),
        ),
    )
}

fn payment_failed(e: &PaymentFailed) -> Notification {
    Notification::new(
        e.user_id,
        NotificationKind::Error,
        "Payment failed",
        format!(
            "Payment {} for order {} did not go through.\nAmount: {}\nMethod: {}\nReason: {}\n\
             Please try again or contact support.",
            e.payment_id,
            e.order_id,
            e.amount,
            e.payment_method.as_str(),
            or_na(&e.failure_reason),
        ),
    )
}
