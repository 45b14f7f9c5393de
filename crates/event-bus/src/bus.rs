use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::time::Duration;

use crate::{AckOutcome, Message, Offset, OutboundMessage, Result};

/// Where a published message landed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishReceipt {
    pub topic: String,
    pub partition: u32,
    pub offset: Offset,
}

/// A member's registration in a consumer group for a set of topics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    pub group: String,
    pub member: String,
    pub topics: Vec<String>,
}

impl Subscription {
    pub fn new(
        group: impl Into<String>,
        member: impl Into<String>,
        topics: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            group: group.into(),
            member: member.into(),
            topics: topics.into_iter().map(Into::into).collect(),
        }
    }
}

/// A message leased to one group member.
///
/// The lease lasts until the member acknowledges it or the bus redelivery
/// timeout elapses, whichever comes first.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub message: Message,
    pub group: String,
    pub member: String,
    /// 1 on first delivery, incremented on every redelivery.
    pub attempt: u32,
}

impl Delivery {
    pub fn is_redelivery(&self) -> bool {
        self.attempt > 1
    }
}

/// Static settings of a bus instance.
#[derive(Debug, Clone)]
pub struct BusConfig {
    /// Partition count for topics created on first use.
    pub partitions: u32,
    /// How long a delivery may stay unacknowledged before it is redelivered.
    pub redelivery_timeout: Duration,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            partitions: 3,
            redelivery_timeout: Duration::from_secs(30),
        }
    }
}

/// A durable, partitioned, replayable log with consumer groups.
///
/// Delivery is at-least-once: a consumer acknowledges each delivery after it
/// has handled it, and anything left unacknowledged is handed out again.
#[async_trait]
pub trait EventBus: Send + Sync {
    /// Appends a message to the partition chosen by its key.
    async fn publish(&self, message: OutboundMessage) -> Result<PublishReceipt>;

    /// Adds a member to a consumer group and triggers a rebalance.
    async fn join(&self, subscription: &Subscription) -> Result<()>;

    /// Removes a member; its unacknowledged deliveries become due at once.
    async fn leave(&self, subscription: &Subscription) -> Result<()>;

    /// Leases up to `max` messages from the member's partitions, waiting up
    /// to `wait` when nothing is ready.
    async fn poll(
        &self,
        subscription: &Subscription,
        max: usize,
        wait: Duration,
    ) -> Result<Vec<Delivery>>;

    /// Commits a delivery so it is not handed out again.
    async fn ack(&self, delivery: &Delivery) -> Result<AckOutcome>;
}

#[async_trait]
impl<B: EventBus + ?Sized> EventBus for Arc<B> {
    async fn publish(&self, message: OutboundMessage) -> Result<PublishReceipt> {
        (**self).publish(message).await
    }

    async fn join(&self, subscription: &Subscription) -> Result<()> {
        (**self).join(subscription).await
    }

    async fn leave(&self, subscription: &Subscription) -> Result<()> {
        (**self).leave(subscription).await
    }

    async fn poll(
        &self,
        subscription: &Subscription,
        max: usize,
        wait: Duration,
    ) -> Result<Vec<Delivery>> {
        (**self).poll(subscription, max, wait).await
    }

    async fn ack(&self, delivery: &Delivery) -> Result<AckOutcome> {
        (**self).ack(delivery).await
    }
}
