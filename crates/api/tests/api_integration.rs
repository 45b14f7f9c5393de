//! Integration tests for the HTTP adapter.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use api::{AppState, SharedLedger};
use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use common::UserId;
use domain::InMemoryInventoryLedger;
use event_bus::{BestEffortPublisher, InMemoryEventBus};
use metrics_exporter_prometheus::PrometheusHandle;
use saga::{ConsumerConfig, ConsumerWorker, ReservationPolicy};
use serde_json::{Value, json};
use tower::ServiceExt;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

fn get_metrics_handle() -> PrometheusHandle {
    METRICS_HANDLE
        .get_or_init(|| {
            metrics_exporter_prometheus::PrometheusBuilder::new()
                .install_recorder()
                .expect("failed to install Prometheus recorder")
        })
        .clone()
}

struct TestApp {
    app: Router,
    publisher: BestEffortPublisher,
    workers: Vec<ConsumerWorker<InMemoryEventBus>>,
}

impl TestApp {
    async fn new() -> Self {
        let bus = InMemoryEventBus::default();
        let publisher = BestEffortPublisher::spawn(bus.clone());
        let ledger: SharedLedger = Arc::new(InMemoryInventoryLedger::new());
        let state = Arc::new(AppState::new(ledger, publisher.clone()));
        let workers = state.participants(ReservationPolicy::BestEffort).workers(
            &bus,
            "api-test",
            &ConsumerConfig {
                poll_timeout: Duration::from_millis(10),
                ..ConsumerConfig::default()
            },
        );
        for worker in &workers {
            worker.join().await.unwrap();
        }
        let app = api::create_app(state, get_metrics_handle());
        Self {
            app,
            publisher,
            workers,
        }
    }

    async fn send(
        &self,
        method: &str,
        uri: &str,
        user: Option<UserId>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut request = Request::builder().method(method).uri(uri);
        if let Some(user) = user {
            request = request.header("x-user-id", user.to_string());
        }
        let body = match body {
            Some(json) => {
                request = request.header("content-type", "application/json");
                Body::from(serde_json::to_vec(&json).unwrap())
            }
            None => Body::empty(),
        };

        let response = self
            .app
            .clone()
            .oneshot(request.body(body).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, json)
    }

    /// Lets the consumers react to everything published so far.
    async fn settle(&self) {
        loop {
            self.publisher.flush().await;
            let mut handled = 0;
            for worker in &self.workers {
                handled += worker.poll_once().await.unwrap();
            }
            if handled == 0 {
                break;
            }
        }
    }

    async fn stock_product(&self, sku: &str, price_cents: i64, quantity: u32) {
        let (status, _) = self
            .send(
                "PUT",
                &format!("/catalog/{sku}"),
                None,
                Some(json!({ "name": format!("Product {sku}"), "price": price_cents })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = self
            .send(
                "POST",
                "/inventory",
                None,
                Some(json!({ "productId": sku, "quantity": quantity, "lowStockThreshold": 2 })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    async fn checkout(&self, user: UserId, sku: &str, quantity: u32) -> (StatusCode, Value) {
        self.send(
            "POST",
            "/orders",
            Some(user),
            Some(json!({
                "items": [{ "productId": sku, "quantity": quantity }],
                "shippingAddress": "1 Main St",
                "phone": "555-0100"
            })),
        )
        .await
    }
}

#[tokio::test]
async fn test_health_check() {
    let t = TestApp::new().await;
    let (status, json) = t.send("GET", "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let t = TestApp::new().await;
    let response = t
        .app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/metrics")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_missing_identity_is_unauthorized() {
    let t = TestApp::new().await;
    let (status, json) = t.send("GET", "/orders", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(json["error"].as_str().unwrap().contains("x-user-id"));
}

#[tokio::test]
async fn test_checkout_snapshots_catalog_price() {
    let t = TestApp::new().await;
    t.stock_product("SKU-1", 2500, 10).await;
    let user = UserId::new();

    let (status, order) = t.checkout(user, "SKU-1", 2).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(order["status"], "PENDING");
    assert_eq!(order["totalAmount"], 5000);
    assert_eq!(order["items"][0]["productName"], "Product SKU-1");

    t.settle().await;
    let (_, row) = t.send("GET", "/inventory/SKU-1", None, None).await;
    assert_eq!(row["reserved"], 2);
    assert_eq!(row["available"], 8);
}

#[tokio::test]
async fn test_checkout_rejections() {
    let t = TestApp::new().await;
    t.stock_product("SKU-1", 2500, 1).await;
    let user = UserId::new();

    let (status, _) = t.checkout(user, "SKU-1", 5).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = t.checkout(user, "SKU-404", 1).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = t
        .send(
            "POST",
            "/orders",
            Some(user),
            Some(json!({ "items": [], "shippingAddress": "x", "phone": "y" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_orders_are_private_to_their_owner() {
    let t = TestApp::new().await;
    t.stock_product("SKU-1", 1000, 10).await;
    let owner = UserId::new();
    let (_, order) = t.checkout(owner, "SKU-1", 1).await;
    let uri = format!("/orders/{}", order["id"].as_str().unwrap());

    let (status, _) = t.send("GET", &uri, Some(owner), None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = t.send("GET", &uri, Some(UserId::new()), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = t
        .send("POST", &format!("{uri}/cancel"), Some(UserId::new()), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = t.send("GET", "/orders/not-a-uuid", Some(owner), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_status_updates_follow_the_lifecycle() {
    let t = TestApp::new().await;
    t.stock_product("SKU-1", 1000, 10).await;
    let user = UserId::new();
    let (_, order) = t.checkout(user, "SKU-1", 1).await;
    let uri = format!("/orders/{}/status", order["id"].as_str().unwrap());

    let (status, _) = t
        .send("PUT", &uri, None, Some(json!({ "status": "SHIPPED" })))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, updated) = t
        .send("PUT", &uri, None, Some(json!({ "status": "CONFIRMED" })))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["status"], "CONFIRMED");
}

#[tokio::test]
async fn test_cash_on_delivery_confirms_and_notifies() {
    let t = TestApp::new().await;
    t.stock_product("SKU-1", 1000, 10).await;
    let user = UserId::new();
    let (_, order) = t.checkout(user, "SKU-1", 3).await;
    let order_id = order["id"].as_str().unwrap().to_string();

    let (status, payment) = t
        .send(
            "POST",
            "/payments",
            Some(user),
            Some(json!({ "orderId": order_id, "paymentMethod": "COD" })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(payment["status"], "SUCCESS");
    t.settle().await;

    let (_, order) = t
        .send("GET", &format!("/orders/{order_id}"), Some(user), None)
        .await;
    assert_eq!(order["status"], "CONFIRMED");

    let (status, _) = t
        .send(
            "POST",
            "/payments",
            Some(user),
            Some(json!({ "orderId": order_id, "paymentMethod": "COD" })),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, inbox) = t.send("GET", "/notifications", Some(user), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(inbox["unread"], 3);
    let first = inbox["notifications"][0]["id"].as_str().unwrap().to_string();

    let (status, _) = t
        .send(
            "POST",
            &format!("/notifications/{first}/read"),
            Some(UserId::new()),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, note) = t
        .send("POST", &format!("/notifications/{first}/read"), Some(user), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(note["read"], true);
}

#[tokio::test]
async fn test_gateway_failure_keeps_order_pending() {
    let t = TestApp::new().await;
    t.stock_product("SKU-1", 1000, 10).await;
    let user = UserId::new();
    let (_, order) = t.checkout(user, "SKU-1", 1).await;
    let order_id = order["id"].as_str().unwrap().to_string();

    let (_, payment) = t
        .send(
            "POST",
            "/payments",
            Some(user),
            Some(json!({ "orderId": order_id, "paymentMethod": "ONLINE" })),
        )
        .await;
    assert_eq!(payment["status"], "PENDING");
    let result_uri = format!("/payments/{}/result", payment["id"].as_str().unwrap());

    let (status, settled) = t
        .send(
            "POST",
            &result_uri,
            None,
            Some(json!({ "success": false, "failureReason": "card declined" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(settled["status"], "FAILED");

    let (status, _) = t
        .send("POST", &result_uri, None, Some(json!({ "success": true })))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    t.settle().await;
    let (_, order) = t
        .send("GET", &format!("/orders/{order_id}"), Some(user), None)
        .await;
    assert_eq!(order["status"], "PENDING");
}

#[tokio::test]
async fn test_inventory_operations() {
    let t = TestApp::new().await;
    t.stock_product("SKU-1", 1000, 3).await;

    let (status, _) = t.send("GET", "/inventory/SKU-404", None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = t
        .send(
            "POST",
            "/inventory",
            None,
            Some(json!({ "productId": "SKU-1", "quantity": 1 })),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, low) = t.send("GET", "/inventory/low-stock", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(low.as_array().unwrap().len(), 0);

    let (status, row) = t
        .send(
            "POST",
            "/inventory/SKU-1/adjust",
            None,
            Some(json!({ "delta": -2 })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(row["quantity"], 1);
    assert_eq!(row["lowStock"], true);

    let (_, low) = t.send("GET", "/inventory/low-stock", None, None).await;
    assert_eq!(low[0]["productId"], "SKU-1");
}

#[tokio::test]
async fn test_dead_letters_listing_and_retry() {
    let t = TestApp::new().await;
    t.stock_product("SKU-1", 1000, 5).await;
    let user = UserId::new();
    t.checkout(user, "SKU-1", 4).await;
    // Stock sold elsewhere before the reservation lands.
    t.send(
        "POST",
        "/inventory/SKU-1/adjust",
        None,
        Some(json!({ "delta": -3 })),
    )
    .await;
    t.settle().await;

    let (status, parked) = t.send("GET", "/dead-letters", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(parked[0]["kind"], "LEDGER_ACTION");
    assert_eq!(parked[0]["action"], "reserve");
    assert_eq!(parked[0]["quantity"], 4);

    t.send(
        "POST",
        "/inventory/SKU-1/adjust",
        None,
        Some(json!({ "delta": 10 })),
    )
    .await;
    let (status, report) = t.send("POST", "/dead-letters/retry", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["resolved"], 1);

    let (_, row) = t.send("GET", "/inventory/SKU-1", None, None).await;
    assert_eq!(row["reserved"], 4);
}
