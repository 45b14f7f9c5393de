use std::sync::Arc;

use async_trait::async_trait;
use common::{Money, OrderId, PaymentId, UserId};
use event_bus::BestEffortPublisher;

use super::{Payment, PaymentError, PaymentMethod, PaymentRepository, PaymentResult, PaymentStatus};
use crate::events::{PaymentFailed, PaymentSuccess};
use crate::order::{OrderError, OrderRepository, OrderService, OrderStatus};

/// The slice of an order that payment needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderSummary {
    pub order_id: OrderId,
    pub user_id: UserId,
    pub order_number: String,
    pub status: OrderStatus,
    pub total_amount: Money,
}

/// Read-only view of orders for the payment service.
#[async_trait]
pub trait OrderDirectory: Send + Sync {
    async fn order_summary(&self, order_id: OrderId) -> Result<Option<OrderSummary>, OrderError>;
}

#[async_trait]
impl<R: OrderRepository> OrderDirectory for OrderService<R> {
    async fn order_summary(&self, order_id: OrderId) -> Result<Option<OrderSummary>, OrderError> {
        Ok(self.get_order(order_id).await?.map(|order| OrderSummary {
            order_id: order.id(),
            user_id: order.user_id(),
            order_number: order.order_number().to_string(),
            status: order.status(),
            total_amount: order.total_amount(),
        }))
    }
}

#[async_trait]
impl<D: OrderDirectory + ?Sized> OrderDirectory for Arc<D> {
    async fn order_summary(&self, order_id: OrderId) -> Result<Option<OrderSummary>, OrderError> {
        (**self).order_summary(order_id).await
    }
}

/// Issues payment attempts and reports their outcome on the bus.
#[derive(Clone)]
pub struct PaymentService<P: PaymentRepository, D: OrderDirectory> {
    payments: P,
    orders: D,
    publisher: BestEffortPublisher,
}

impl<P: PaymentRepository, D: OrderDirectory> PaymentService<P, D> {
    pub fn new(payments: P, orders: D, publisher: BestEffortPublisher) -> Self {
        Self {
            payments,
            orders,
            publisher,
        }
    }

    /// Opens a payment attempt for a PENDING order owned by `user_id`.
    ///
    /// Cash-on-delivery attempts settle as successful straight away.
    #[tracing::instrument(skip(self))]
    pub async fn initiate(
        &self,
        user_id: UserId,
        order_id: OrderId,
        method: PaymentMethod,
    ) -> Result<Payment, PaymentError> {
        let order = self
            .orders
            .order_summary(order_id)
            .await?
            .ok_or(PaymentError::OrderNotFound(order_id))?;

        if order.user_id != user_id {
            return Err(PaymentError::Forbidden { order_id, user_id });
        }
        if order.status != OrderStatus::Pending {
            return Err(PaymentError::OrderNotPayable {
                order_id,
                status: order.status,
            });
        }
        if !order.total_amount.is_positive() {
            return Err(PaymentError::InvalidAmount(order.total_amount));
        }
        if self.has_success(order_id).await? {
            return Err(PaymentError::AlreadyPaid(order_id));
        }

        let payment = Payment::new(order_id, user_id, order.total_amount, method);
        self.payments.insert(&payment).await?;

        tracing::info!(
            payment_id = %payment.id,
            order_number = %order.order_number,
            method = method.as_str(),
            amount = %payment.amount,
            "payment initiated"
        );
        metrics::counter!("payments_initiated_total", "method" => method.as_str()).increment(1);

        match method {
            PaymentMethod::Cod => {
                let reference = format!("COD-{}", order.order_number);
                self.settle(payment.id, PaymentResult::succeeded(reference))
                    .await
            }
            PaymentMethod::Online => Ok(payment),
        }
    }

    /// Applies the gateway's verdict to an open attempt and emits
    /// `PaymentSuccess` or `PaymentFailed`.
    #[tracing::instrument(skip(self, result), fields(success = result.success))]
    pub async fn settle(
        &self,
        payment_id: PaymentId,
        result: PaymentResult,
    ) -> Result<Payment, PaymentError> {
        let payment = self.payments.settle(payment_id, &result).await?;

        match payment.status {
            PaymentStatus::Success => {
                tracing::info!(order_id = %payment.order_id, "payment succeeded");
                self.publisher
                    .publish_event(&PaymentSuccess::from_payment(&payment));
            }
            _ => {
                tracing::warn!(
                    order_id = %payment.order_id,
                    reason = payment.failure_reason.as_deref().unwrap_or_default(),
                    "payment failed"
                );
                self.publisher
                    .publish_event(&PaymentFailed::from_payment(&payment));
            }
        }
        metrics::counter!("payments_settled_total", "status" => payment.status.as_str())
            .increment(1);
        Ok(payment)
    }

    pub async fn get(&self, payment_id: PaymentId) -> Result<Option<Payment>, PaymentError> {
        self.payments.get(payment_id).await
    }

    pub async fn payments_for_order(&self, order_id: OrderId) -> Result<Vec<Payment>, PaymentError> {
        self.payments.list_for_order(order_id).await
    }

    async fn has_success(&self, order_id: OrderId) -> Result<bool, PaymentError> {
        Ok(self
            .payments
            .list_for_order(order_id)
            .await?
            .iter()
            .any(|p| p.status == PaymentStatus::Success))
    }
}
