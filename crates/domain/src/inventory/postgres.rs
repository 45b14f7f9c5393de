use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{OrderId, ProductId};
use sqlx::{PgConnection, PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use super::ledger::{apply_journal, observe};
use super::{
    InventoryError, InventoryLedger, InventoryRecord, JournalAction, Reservation,
    ReservationOutcome, Result,
};

const SELECT_COLUMNS: &str = "product_id, quantity, reserved_quantity, low_stock_threshold, \
                              is_active, version, updated_at";

/// PostgreSQL-backed inventory ledger.
///
/// Each mutation runs in its own transaction and takes the product row with
/// `SELECT ... FOR UPDATE`, so concurrent operations on one product
/// serialize on the row lock. Table `CHECK` constraints repeat the counter
/// invariants as a last line.
#[derive(Clone)]
pub struct PostgresInventoryLedger {
    pool: PgPool,
}

impl PostgresInventoryLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    fn counter(row: &PgRow, column: &str, product_id: &ProductId) -> Result<u32> {
        let value: i64 = row.try_get(column)?;
        u32::try_from(value).map_err(|_| InventoryError::Corrupt {
            product_id: product_id.clone(),
            reason: format!("{column} out of range: {value}"),
        })
    }

    fn row_to_record(row: &PgRow) -> Result<InventoryRecord> {
        let product_id = ProductId::new(row.try_get::<String, _>("product_id")?);
        InventoryRecord::restore(
            product_id.clone(),
            Self::counter(row, "quantity", &product_id)?,
            Self::counter(row, "reserved_quantity", &product_id)?,
            Self::counter(row, "low_stock_threshold", &product_id)?,
            row.try_get("is_active")?,
            row.try_get("version")?,
            row.try_get::<DateTime<Utc>, _>("updated_at")?,
        )
    }

    fn row_to_reservation(row: &PgRow) -> Result<Reservation> {
        let product_id = ProductId::new(row.try_get::<String, _>("product_id")?);
        let state: String = row.try_get("state")?;
        let state = state.parse().map_err(|reason| InventoryError::Corrupt {
            product_id: product_id.clone(),
            reason,
        })?;
        Ok(Reservation {
            order_id: OrderId::from_uuid(row.try_get::<Uuid, _>("order_id")?),
            quantity: Self::counter(row, "quantity", &product_id)?,
            product_id,
            state,
            updated_at: row.try_get("updated_at")?,
        })
    }

    async fn lock_row(conn: &mut PgConnection, product_id: &ProductId) -> Result<InventoryRecord> {
        let row = sqlx::query(&format!(
            "SELECT {SELECT_COLUMNS} FROM inventory WHERE product_id = $1 FOR UPDATE"
        ))
        .bind(product_id.as_str())
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| InventoryError::NotFound(product_id.clone()))?;
        Self::row_to_record(&row)
    }

    async fn save_row(conn: &mut PgConnection, record: &InventoryRecord) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE inventory
            SET quantity = $2, reserved_quantity = $3, available_quantity = $4,
                is_active = $5, version = $6, updated_at = $7
            WHERE product_id = $1
            "#,
        )
        .bind(record.product_id().as_str())
        .bind(i64::from(record.quantity()))
        .bind(i64::from(record.reserved()))
        .bind(i64::from(record.available()))
        .bind(record.is_active())
        .bind(record.version())
        .bind(record.updated_at())
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    async fn find_reservation(
        conn: &mut PgConnection,
        order_id: OrderId,
        product_id: &ProductId,
    ) -> Result<Option<Reservation>> {
        let row = sqlx::query(
            r#"
            SELECT order_id, product_id, quantity, state, updated_at
            FROM inventory_reservations
            WHERE order_id = $1 AND product_id = $2
            "#,
        )
        .bind(order_id.as_uuid())
        .bind(product_id.as_str())
        .fetch_optional(&mut *conn)
        .await?;
        row.as_ref().map(Self::row_to_reservation).transpose()
    }

    async fn save_reservation(conn: &mut PgConnection, reservation: &Reservation) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO inventory_reservations (order_id, product_id, quantity, state, updated_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (order_id, product_id)
            DO UPDATE SET state = EXCLUDED.state, updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(reservation.order_id.as_uuid())
        .bind(reservation.product_id.as_str())
        .bind(i64::from(reservation.quantity))
        .bind(reservation.state.as_str())
        .bind(reservation.updated_at)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    async fn mutate(
        &self,
        operation: &'static str,
        product_id: &ProductId,
        op: impl FnOnce(&mut InventoryRecord) -> Result<()> + Send,
    ) -> Result<InventoryRecord> {
        let result = async {
            let mut tx = self.pool.begin().await?;
            let mut record = Self::lock_row(&mut tx, product_id).await?;
            op(&mut record)?;
            Self::save_row(&mut tx, &record).await?;
            tx.commit().await?;
            Ok(record)
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
            let mut tx = self.pool.begin().await?;
            let mut record = Self::lock_row(&mut tx, product_id).await?;
            let existing = Self::find_reservation(&mut tx, order_id, product_id).await?;
            let (outcome, entry) =
                apply_journal(&mut record, existing.as_ref(), order_id, action, quantity)?;
            if let Some(entry) = entry {
                Self::save_row(&mut tx, &record).await?;
                Self::save_reservation(&mut tx, &entry).await?;
            }
            tx.commit().await?;
            Ok(outcome)
        }
        .await;
        observe(action.as_str(), &result);
        result
    }
}

#[async_trait]
impl InventoryLedger for PostgresInventoryLedger {
    #[tracing::instrument(skip(self))]
    async fn create(
        &self,
        product_id: ProductId,
        quantity: u32,
        low_stock_threshold: u32,
    ) -> Result<InventoryRecord> {
        let record = InventoryRecord::new(product_id.clone(), quantity, low_stock_threshold);
        sqlx::query(
            r#"
            INSERT INTO inventory (product_id, quantity, reserved_quantity, available_quantity,
                                   low_stock_threshold, is_active, version, updated_at)
            VALUES ($1, $2, 0, $3, $4, TRUE, $5, $6)
            "#,
        )
        .bind(product_id.as_str())
        .bind(i64::from(record.quantity()))
        .bind(i64::from(record.available()))
        .bind(i64::from(record.low_stock_threshold()))
        .bind(record.version())
        .bind(record.updated_at())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e
                && db_err.is_unique_violation()
            {
                return InventoryError::AlreadyExists(product_id.clone());
            }
            InventoryError::Database(e)
        })?;
        tracing::info!(quantity, "inventory created");
        Ok(record)
    }

    async fn get(&self, product_id: &ProductId) -> Result<Option<InventoryRecord>> {
        let row = sqlx::query(&format!(
            "SELECT {SELECT_COLUMNS} FROM inventory WHERE product_id = $1"
        ))
        .bind(product_id.as_str())
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(Self::row_to_record).transpose()
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
        let rows = sqlx::query(&format!(
            "SELECT {SELECT_COLUMNS} FROM inventory \
             WHERE is_active AND available_quantity <= low_stock_threshold \
             ORDER BY product_id"
        ))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(Self::row_to_record).collect()
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
        let rows = sqlx::query(
            r#"
            SELECT order_id, product_id, quantity, state, updated_at
            FROM inventory_reservations
            WHERE order_id = $1
            ORDER BY product_id
            "#,
        )
        .bind(order_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(Self::row_to_reservation).collect()
    }
}
