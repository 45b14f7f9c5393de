//! HTTP adapter for the fulfillment services.
//!
//! Exposes checkout, order, inventory, payment and notification operations
//! over REST, with structured logging (tracing) and Prometheus metrics.
//! Identity arrives in the `x-user-id` header and is passed explicitly into
//! every operation that acts for a user.

pub mod config;
pub mod error;
pub mod identity;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post, put};
use domain::{
    CheckoutService, InMemoryCatalog, InMemoryNotificationStore, InMemoryOrderRepository,
    InMemoryPaymentRepository, InventoryLedger, OrderService, PaymentService,
};
use event_bus::BestEffortPublisher;
use metrics_exporter_prometheus::PrometheusHandle;
use saga::{
    DeadLetterLog, InventoryReactor, NotificationReactor, OrderReactor, Participants,
    ReservationPolicy,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Inventory ledger chosen at startup (in-memory or Postgres).
pub type SharedLedger = Arc<dyn InventoryLedger>;
pub type Orders = OrderService<InMemoryOrderRepository>;
pub type Checkout = CheckoutService<InMemoryCatalog, SharedLedger, InMemoryOrderRepository>;
pub type Payments = PaymentService<InMemoryPaymentRepository, Orders>;

/// Shared application state accessible from all handlers.
#[derive(Clone)]
pub struct AppState {
    pub orders: Orders,
    pub inventory: SharedLedger,
    pub catalog: InMemoryCatalog,
    pub checkout: Checkout,
    pub payments: Payments,
    pub notifications: InMemoryNotificationStore,
    pub dead_letters: DeadLetterLog,
}

impl AppState {
    /// Builds every service over `ledger`, publishing through `publisher`.
    pub fn new(ledger: SharedLedger, publisher: BestEffortPublisher) -> Self {
        let orders = OrderService::new(InMemoryOrderRepository::new(), publisher.clone());
        let catalog = InMemoryCatalog::new();
        let checkout = CheckoutService::new(catalog.clone(), ledger.clone(), orders.clone());
        let payments = PaymentService::new(
            InMemoryPaymentRepository::default(),
            orders.clone(),
            publisher,
        );

        Self {
            orders,
            inventory: ledger,
            catalog,
            checkout,
            payments,
            notifications: InMemoryNotificationStore::new(),
            dead_letters: DeadLetterLog::new(),
        }
    }

    /// The event-driven side of the same services.
    pub fn participants(
        &self,
        policy: ReservationPolicy,
    ) -> Participants<SharedLedger, InMemoryOrderRepository, InMemoryNotificationStore> {
        Participants {
            inventory: InventoryReactor::new(self.inventory.clone(), policy),
            orders: OrderReactor::new(self.orders.clone()),
            notifications: NotificationReactor::new(self.notifications.clone()),
            dead_letters: self.dead_letters.clone(),
        }
    }
}

/// Creates the Axum application router with all routes and shared state.
pub fn create_app(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/orders", post(routes::orders::create).get(routes::orders::list))
        .route("/orders/{id}", get(routes::orders::get))
        .route("/orders/{id}/status", put(routes::orders::update_status))
        .route("/orders/{id}/cancel", post(routes::orders::cancel))
        .route("/catalog/{product_id}", put(routes::catalog::upsert))
        .route("/inventory", post(routes::inventory::create))
        .route("/inventory/low-stock", get(routes::inventory::low_stock))
        .route("/inventory/{product_id}", get(routes::inventory::get))
        .route("/inventory/{product_id}/adjust", post(routes::inventory::adjust))
        .route("/payments", post(routes::payments::initiate))
        .route("/payments/{id}", get(routes::payments::get))
        .route("/payments/{id}/result", post(routes::payments::settle))
        .route("/notifications", get(routes::notifications::list))
        .route("/notifications/{id}/read", post(routes::notifications::mark_read))
        .route("/dead-letters", get(routes::dead_letters::list))
        .route("/dead-letters/retry", post(routes::dead_letters::retry))
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}
