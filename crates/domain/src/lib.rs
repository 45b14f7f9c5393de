//! Domain layer of the fulfillment core.
//!
//! - [`inventory`]: per-product stock ledger with an order reservation journal
//! - [`order`]: order records and the lifecycle state machine
//! - [`checkout`]: cart validation against catalog and stock
//! - [`payment`]: payment attempts and settlement
//! - [`notification`]: user messages derived from events
//! - [`events`]: the wire contract shared by every service

pub mod checkout;
pub mod error;
pub mod events;
pub mod inventory;
pub mod notification;
pub mod order;
pub mod payment;

pub use checkout::{
    Catalog, CatalogProduct, CheckoutError, CheckoutLine, CheckoutService, InMemoryCatalog,
};
pub use error::{DomainError, Result};
pub use events::{
    FulfillmentEvent, ORDER_CREATED_TOPIC, ORDER_STATUS_CHANGED_TOPIC, OrderCreated,
    OrderStatusChanged, PAYMENT_FAILED_TOPIC, PAYMENT_SUCCESS_TOPIC, PaymentFailed,
    PaymentSuccess,
};
pub use inventory::{
    InMemoryInventoryLedger, InventoryError, InventoryLedger, InventoryRecord,
    PostgresInventoryLedger, Reservation, ReservationOutcome, ReservationState,
};
pub use notification::{
    InMemoryNotificationStore, Notification, NotificationError, NotificationKind,
    NotificationStore,
};
pub use order::{
    InMemoryOrderRepository, LineItem, Order, OrderError, OrderRepository, OrderService,
    OrderStatus, ShippingInfo,
};
pub use payment::{
    InMemoryPaymentRepository, OrderDirectory, OrderSummary, Payment, PaymentError,
    PaymentMethod, PaymentRepository, PaymentResult, PaymentService, PaymentStatus,
};
