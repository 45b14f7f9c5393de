//! PostgreSQL ledger integration tests
//!
//! These tests share one PostgreSQL container and run serially.
//! Run with:
//!
//! ```bash
//! cargo test -p domain --test postgres_ledger
//! ```

use std::sync::Arc;

use common::{OrderId, ProductId};
use domain::inventory::InventoryError;
use domain::{InventoryLedger, PostgresInventoryLedger, ReservationOutcome, ReservationState};
use serial_test::serial;
use sqlx::PgPool;
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

struct ContainerInfo {
    #[allow(dead_code)] // Container must stay alive for tests
    container: ContainerAsync<Postgres>,
    connection_string: String,
}

static CONTAINER: OnceCell<Arc<ContainerInfo>> = OnceCell::const_new();

async fn get_container_info() -> Arc<ContainerInfo> {
    CONTAINER
        .get_or_init(|| async {
            let container = Postgres::default().start().await.unwrap();

            let host = container.get_host().await.unwrap();
            let port = container.get_host_port_ipv4(5432).await.unwrap();

            let connection_string =
                format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

            let temp_pool = PgPool::connect(&connection_string).await.unwrap();
            sqlx::raw_sql(include_str!(
                "../../../migrations/001_create_inventory_tables.sql"
            ))
            .execute(&temp_pool)
            .await
            .unwrap();
            temp_pool.close().await;

            Arc::new(ContainerInfo {
                container,
                connection_string,
            })
        })
        .await
        .clone()
}

/// A ledger over a fresh pool with emptied tables.
async fn get_test_ledger() -> PostgresInventoryLedger {
    let info = get_container_info().await;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(10)
        .connect(&info.connection_string)
        .await
        .unwrap();

    sqlx::query("TRUNCATE TABLE inventory_reservations, inventory")
        .execute(&pool)
        .await
        .unwrap();

    PostgresInventoryLedger::new(pool)
}

fn sku(id: &str) -> ProductId {
    ProductId::from(id)
}

#[tokio::test]
#[serial]
async fn create_and_read_back() {
    let ledger = get_test_ledger().await;
    let created = ledger.create(sku("PG-1"), 20, 5).await.unwrap();
    assert_eq!(created.available(), 20);

    let fetched = ledger.get(&sku("PG-1")).await.unwrap().unwrap();
    assert_eq!(fetched.product_id(), created.product_id());
    assert_eq!(fetched.quantity(), 20);
    assert_eq!(fetched.low_stock_threshold(), 5);
    assert_eq!(fetched.version(), created.version());

    assert!(matches!(
        ledger.create(sku("PG-1"), 1, 1).await,
        Err(InventoryError::AlreadyExists(_))
    ));
}

#[tokio::test]
#[serial]
async fn reserve_release_deduct_keep_counters_consistent() {
    let ledger = get_test_ledger().await;
    ledger.create(sku("PG-2"), 10, 2).await.unwrap();

    let row = ledger.reserve(&sku("PG-2"), 4).await.unwrap();
    assert_eq!((row.quantity(), row.reserved(), row.available()), (10, 4, 6));

    let row = ledger.release(&sku("PG-2"), 1).await.unwrap();
    assert_eq!((row.quantity(), row.reserved(), row.available()), (10, 3, 7));

    let row = ledger.deduct(&sku("PG-2"), 3).await.unwrap();
    assert_eq!((row.quantity(), row.reserved(), row.available()), (7, 0, 7));

    assert!(matches!(
        ledger.release(&sku("PG-2"), 1).await,
        Err(InventoryError::InvalidReservation { .. })
    ));
    assert!(matches!(
        ledger.reserve(&sku("PG-2"), 8).await,
        Err(InventoryError::InsufficientStock { .. })
    ));
}

#[tokio::test]
#[serial]
async fn concurrent_reservations_never_oversell() {
    let ledger = Arc::new(get_test_ledger().await);
    ledger.create(sku("PG-3"), 5, 1).await.unwrap();

    let mut handles = Vec::new();
    for _ in 0..10 {
        let ledger = Arc::clone(&ledger);
        handles.push(tokio::spawn(async move {
            ledger.reserve(&sku("PG-3"), 1).await.is_ok()
        }));
    }
    let mut granted = 0;
    for handle in handles {
        if handle.await.unwrap() {
            granted += 1;
        }
    }

    assert_eq!(granted, 5);
    let row = ledger.get(&sku("PG-3")).await.unwrap().unwrap();
    assert_eq!(row.reserved(), 5);
    assert_eq!(row.available(), 0);
}

#[tokio::test]
#[serial]
async fn journal_makes_order_release_idempotent() {
    let ledger = get_test_ledger().await;
    ledger.create(sku("PG-4"), 10, 1).await.unwrap();
    let order_id = OrderId::new();

    let outcome = ledger
        .reserve_for_order(order_id, &sku("PG-4"), 3)
        .await
        .unwrap();
    assert!(outcome.is_applied());

    ledger
        .release_for_order(order_id, &sku("PG-4"), 3)
        .await
        .unwrap();
    let again = ledger
        .release_for_order(order_id, &sku("PG-4"), 3)
        .await
        .unwrap();
    assert_eq!(
        again,
        ReservationOutcome::AlreadyApplied(ReservationState::Released)
    );

    let row = ledger.get(&sku("PG-4")).await.unwrap().unwrap();
    assert_eq!(row.reserved(), 0);
    assert_eq!(row.available(), 10);

    let journal = ledger.reservations_for_order(order_id).await.unwrap();
    assert_eq!(journal.len(), 1);
    assert_eq!(journal[0].state, ReservationState::Released);
}

#[tokio::test]
#[serial]
async fn zero_quantity_release_is_refused_not_a_database_error() {
    let ledger = get_test_ledger().await;
    ledger.create(sku("PG-6"), 10, 1).await.unwrap();
    let order_id = OrderId::new();

    let err = ledger
        .release_for_order(order_id, &sku("PG-6"), 0)
        .await
        .unwrap_err();
    assert!(matches!(err, InventoryError::InvalidQuantity { quantity: 0, .. }));
    assert!(ledger.reservations_for_order(order_id).await.unwrap().is_empty());
}

#[tokio::test]
#[serial]
async fn low_stock_lists_active_rows_at_threshold() {
    let ledger = get_test_ledger().await;
    ledger.create(sku("PG-LOW"), 3, 5).await.unwrap();
    ledger.create(sku("PG-OK"), 50, 5).await.unwrap();
    ledger.create(sku("PG-OFF"), 1, 5).await.unwrap();
    ledger.deactivate(&sku("PG-OFF")).await.unwrap();

    let low = ledger.low_stock().await.unwrap();
    let ids: Vec<_> = low.iter().map(|r| r.product_id().as_str()).collect();
    assert_eq!(ids, vec!["PG-LOW"]);
}
