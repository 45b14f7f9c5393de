use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use common::{OrderId, PaymentId};
use tokio::sync::RwLock;

use super::{Payment, PaymentError, PaymentResult, PaymentStatus};

/// Storage for payment attempts.
#[async_trait]
pub trait PaymentRepository: Send + Sync {
    async fn insert(&self, payment: &Payment) -> Result<(), PaymentError>;

    async fn get(&self, payment_id: PaymentId) -> Result<Option<Payment>, PaymentError>;

    async fn list_for_order(&self, order_id: OrderId) -> Result<Vec<Payment>, PaymentError>;

    /// Records the gateway result for an open attempt.
    ///
    /// Must be atomic with respect to other attempts of the same order: a
    /// success is refused when another attempt already succeeded.
    async fn settle(
        &self,
        payment_id: PaymentId,
        result: &PaymentResult,
    ) -> Result<Payment, PaymentError>;
}

/// In-memory payment repository.
#[derive(Clone, Default)]
pub struct InMemoryPaymentRepository {
    payments: Arc<RwLock<HashMap<PaymentId, Payment>>>,
}

impl InMemoryPaymentRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PaymentRepository for InMemoryPaymentRepository {
    async fn insert(&self, payment: &Payment) -> Result<(), PaymentError> {
        self.payments
            .write()
            .await
            .insert(payment.id, payment.clone());
        Ok(())
    }

    async fn get(&self, payment_id: PaymentId) -> Result<Option<Payment>, PaymentError> {
        Ok(self.payments.read().await.get(&payment_id).cloned())
    }

    async fn list_for_order(&self, order_id: OrderId) -> Result<Vec<Payment>, PaymentError> {
        let payments = self.payments.read().await;
        let mut found: Vec<Payment> = payments
            .values()
            .filter(|p| p.order_id == order_id)
            .cloned()
            .collect();
        found.sort_by_key(|p| p.created_at);
        Ok(found)
    }

    async fn settle(
        &self,
        payment_id: PaymentId,
        result: &PaymentResult,
    ) -> Result<Payment, PaymentError> {
        let mut payments = self.payments.write().await;

        let (order_id, status) = payments
            .get(&payment_id)
            .map(|p| (p.order_id, p.status))
            .ok_or(PaymentError::NotFound(payment_id))?;
        if !status.is_open() {
            return Err(PaymentError::AlreadySettled { payment_id, status });
        }
        if result.success
            && payments
                .values()
                .any(|p| p.order_id == order_id && p.status == PaymentStatus::Success)
        {
            return Err(PaymentError::AlreadyPaid(order_id));
        }

        let payment = payments
            .get_mut(&payment_id)
            .ok_or(PaymentError::NotFound(payment_id))?;
        if result.success {
            payment.status = PaymentStatus::Success;
            payment.transaction_ref = result.transaction_ref.clone();
        } else {
            payment.status = PaymentStatus::Failed;
            payment.failure_reason = Some(
                result
                    .failure_reason
                    .clone()
                    .unwrap_or_else(|| "payment declined".to_string()),
            );
        }
        payment.updated_at = Utc::now();
        Ok(payment.clone())
    }
}
