//! Wiring of participants to consumer groups.
//!
//! | Group | Topics |
//! |---|---|
//! | `inventory-service-group` | `order-created`, `order-status-changed` |
//! | `order-service-group` | `payment-success`, `payment-failed` |
//! | `notification-service-group` | all four |

use std::sync::Arc;

use domain::{
    InventoryLedger, NotificationStore, ORDER_CREATED_TOPIC, ORDER_STATUS_CHANGED_TOPIC,
    OrderRepository, PAYMENT_FAILED_TOPIC, PAYMENT_SUCCESS_TOPIC,
};
use event_bus::{EventBus, Subscription};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::consumer::{ConsumerConfig, ConsumerWorker};
use crate::dead_letter::DeadLetterLog;
use crate::handlers::{InventoryHandler, NotificationHandler, OrderHandler};
use crate::reactors::{InventoryReactor, NotificationReactor, OrderReactor};

pub const INVENTORY_GROUP: &str = "inventory-service-group";
pub const ORDER_GROUP: &str = "order-service-group";
pub const NOTIFICATION_GROUP: &str = "notification-service-group";

pub const INVENTORY_TOPICS: [&str; 2] = [ORDER_CREATED_TOPIC, ORDER_STATUS_CHANGED_TOPIC];
pub const ORDER_TOPICS: [&str; 2] = [PAYMENT_SUCCESS_TOPIC, PAYMENT_FAILED_TOPIC];
pub const NOTIFICATION_TOPICS: [&str; 4] = [
    ORDER_CREATED_TOPIC,
    ORDER_STATUS_CHANGED_TOPIC,
    PAYMENT_SUCCESS_TOPIC,
    PAYMENT_FAILED_TOPIC,
];

/// The three reacting services of one process, sharing a dead-letter log.
#[derive(Clone)]
pub struct Participants<L, R, S>
where
    L: InventoryLedger,
    R: OrderRepository,
    S: NotificationStore,
{
    pub inventory: InventoryReactor<L>,
    pub orders: OrderReactor<R>,
    pub notifications: NotificationReactor<S>,
    pub dead_letters: DeadLetterLog,
}

impl<L, R, S> Participants<L, R, S>
where
    L: InventoryLedger + Clone + 'static,
    R: OrderRepository + Clone + 'static,
    S: NotificationStore + Clone + 'static,
{
    /// One worker per group, all registered as `instance`.
    pub fn workers<B>(&self, bus: &B, instance: &str, config: &ConsumerConfig) -> Vec<ConsumerWorker<B>>
    where
        B: EventBus + Clone + 'static,
    {
        vec![
            ConsumerWorker::new(
                bus.clone(),
                Subscription::new(INVENTORY_GROUP, instance, INVENTORY_TOPICS),
                Arc::new(InventoryHandler::new(
                    self.inventory.clone(),
                    self.dead_letters.clone(),
                )),
                config.clone(),
            ),
            ConsumerWorker::new(
                bus.clone(),
                Subscription::new(ORDER_GROUP, instance, ORDER_TOPICS),
                Arc::new(OrderHandler::new(
                    self.orders.clone(),
                    self.dead_letters.clone(),
                )),
                config.clone(),
            ),
            ConsumerWorker::new(
                bus.clone(),
                Subscription::new(NOTIFICATION_GROUP, instance, NOTIFICATION_TOPICS),
                Arc::new(NotificationHandler::new(
                    self.notifications.clone(),
                    self.dead_letters.clone(),
                )),
                config.clone(),
            ),
        ]
    }
}

/// Running background tasks and the switch that stops them.
pub struct Choreography {
    shutdown: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
}

impl Choreography {
    pub fn start<B: EventBus + 'static>(workers: Vec<ConsumerWorker<B>>) -> Self {
        let (shutdown, _) = watch::channel(false);
        let handles = workers
            .into_iter()
            .map(|worker| worker.spawn(shutdown.subscribe()))
            .collect::<Vec<_>>();
        tracing::info!(workers = handles.len(), "choreography started");
        Self { shutdown, handles }
    }

    /// Receiver for extra tasks that should stop together with the workers.
    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }

    pub fn attach(&mut self, handle: JoinHandle<()>) {
        self.handles.push(handle);
    }

    /// Signals every task and waits for them to finish. Unacknowledged
    /// deliveries are handed out again after the bus timeout.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        for handle in self.handles {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "background task panicked");
            }
        }
        tracing::info!("choreography stopped");
    }
}
