use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use common::{OrderId, ProductId};
use tokio::sync::{Mutex, RwLock};

use super::ledger::{apply_journal, observe};
use super::{
    InventoryError, InventoryLedger, InventoryRecord, JournalAction, Reservation,
    ReservationOutcome, Result,
};

#[derive(Debug)]
struct Row {
    record: InventoryRecord,
    reservations: HashMap<OrderId, Reservation>,
}

type RowLock = Arc<Mutex<Row>>;

/// In-memory inventory ledger.
///
/// Each product row sits behind its own mutex, which plays the part of a
/// database row lock: operations on one product queue up, operations on
/// different products proceed in parallel.
#[derive(Clone, Default)]
pub struct InMemoryInventoryLedger {
    rows: Arc<RwLock<HashMap<ProductId, RowLock>>>,
}

impl InMemoryInventoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    async fn row(&self, product_id: &ProductId) -> Result<RowLock> {
        self.rows
            .read()
            .await
            .get(product_id)
            .cloned()
            .ok_or_else(|| InventoryError::NotFound(product_id.clone()))
    }

    async fn mutate(
        &self,
        operation: &'static str,
        product_id: &ProductId,
        op: impl FnOnce(&mut InventoryRecord) -> Result<()> + Send,
    ) -> Result<InventoryRecord> {
        let result = async {
            let row = self.row(product_id).await?;
            let mut row = row.lock().await;
            op(&mut row.record)?;
            Ok(row.record.clone())
        }
        .await;
        observe(operation, &result);
        result
    }

    async fn journal(
        &self,
        order_id: OrderId,
        product_id: &ProductId,
        action: JournalAction,
        quantity: u32,
    ) -> Result<ReservationOutcome> {
        let result = async {
            let row = self.row(product_id).await?;
            let mut row = row.lock().await;
            let Row {
                record,
                reservations,
            } = &mut *row;
            let (outcome, entry) =
                apply_journal(record, reservations.get(&order_id), order_id, action, quantity)?;
            if let Some(entry) = entry {
                reservations.insert(order_id, entry);
            }
            Ok(outcome)
        }
        .await;
        observe(action.as_str(), &result);
        result
    }
}

#[async_trait]
impl InventoryLedger for InMemoryInventoryLedger {
    #[tracing::instrument(skip(self))]
    async fn create(
        &self,
        product_id: ProductId,
        quantity: u32,
        low_stock_threshold: u32,
    ) -> Result<InventoryRecord> {
        let mut rows = self.rows.write().await;
        if rows.contains_key(&product_id) {
            return Err(InventoryError::AlreadyExists(product_id));
        }
        let record = InventoryRecord::new(product_id.clone(), quantity, low_stock_threshold);
        rows.insert(
            product_id,
            Arc::new(Mutex::new(Row {
                record: record.clone(),
                reservations: HashMap::new(),
            })),
        );
        tracing::info!(quantity, "inventory created");
        Ok(record)
    }

    async fn get(&self, product_id: &ProductId) -> Result<Option<InventoryRecord>> {
        let Some(row) = self.rows.read().await.get(product_id).cloned() else {
            return Ok(None);
        };
        let row = row.lock().await;
        Ok(Some(row.record.clone()))
    }

    #[tracing::instrument(skip(self))]
    async fn reserve(&self, product_id: &ProductId, quantity: u32) -> Result<InventoryRecord> {
        self.mutate("reserve", product_id, |r| r.reserve(quantity))
            .await
    }

    #[tracing::instrument(skip(self))]
    async fn release(&self, product_id: &ProductId, quantity: u32) -> Result<InventoryRecord> {
        self.mutate("release", product_id, |r| r.release(quantity))
            .await
    }

    #[tracing::instrument(skip(self))]
    async fn deduct(&self, product_id: &ProductId, quantity: u32) -> Result<InventoryRecord> {
        self.mutate("deduct", product_id, |r| r.deduct(quantity)).await
    }

    #[tracing::instrument(skip(self))]
    async fn adjust(&self, product_id: &ProductId, delta: i64) -> Result<InventoryRecord> {
        self.mutate("adjust", product_id, |r| r.adjust(delta)).await
    }

    async fn check_availability(&self, product_id: &ProductId, quantity: u32) -> Result<bool> {
        Ok(self
            .get(product_id)
            .await?
            .is_some_and(|r| r.can_fulfil(quantity)))
    }

    #[tracing::instrument(skip(self))]
    async fn deactivate(&self, product_id: &ProductId) -> Result<InventoryRecord> {
        self.mutate("deactivate", product_id, |r| {
            r.deactivate();
            Ok(())
        })
        .await
    }

    async fn low_stock(&self) -> Result<Vec<InventoryRecord>> {
        let rows: Vec<RowLock> = self.rows.read().await.values().cloned().collect();
        let mut low = Vec::new();
        for row in rows {
            let row = row.lock().await;
            if row.record.is_active() && row.record.is_low_stock() {
                low.push(row.record.clone());
            }
        }
        low.sort_by(|a, b| a.product_id().cmp(b.product_id()));
        Ok(low)
    }

    #[tracing::instrument(skip(self))]
    async fn reserve_for_order(
        &self,
        order_id: OrderId,
        product_id: &ProductId,
        quantity: u32,
    ) -> Result<ReservationOutcome> {
        self.journal(order_id, product_id, JournalAction::Reserve, quantity)
            .await
    }

    #[tracing::instrument(skip(self))]
    async fn release_for_order(
        &self,
        order_id: OrderId,
        product_id: &ProductId,
        quantity: u32,
    ) -> Result<ReservationOutcome> {
        self.journal(order_id, product_id, JournalAction::Release, quantity)
            .await
    }

    #[tracing::instrument(skip(self))]
    async fn deduct_for_order(
        &self,
        order_id: OrderId,
        product_id: &ProductId,
        quantity: u32,
    ) -> Result<ReservationOutcome> {
        self.journal(order_id, product_id, JournalAction::Deduct, quantity)
            .await
    }

    async fn reservations_for_order(&self, order_id: OrderId) -> Result<Vec<Reservation>> {
        let rows: Vec<RowLock> = self.rows.read().await.values().cloned().collect();
        let mut found = Vec::new();
        for row in rows {
            if let Some(reservation) = row.lock().await.reservations.get(&order_id) {
                found.push(reservation.clone());
            }
        }
        found.sort_by(|a, b| a.product_id.cmp(&b.product_id));
        Ok(found)
    }
}
