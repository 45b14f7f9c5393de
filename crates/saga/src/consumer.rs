//! Consumer workers: poll a group's partitions, hand each message to a
//! handler, acknowledge.
//!
//! ```text
//! join group
//! loop {
//!     poll (bounded wait, interrupted by shutdown)
//!     per partition, in parallel:
//!         per message, in order:
//!             handle -> ack        (handled, skipped, or dead-lettered)
//!             handle -> no ack     (EventProcessing: bus redelivers later)
//! }
//! leave group
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use event_bus::{AckOutcome, Delivery, EventBus, Message, Subscription};
use futures_util::future::join_all;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::Result;

/// Business logic run for every delivered message.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Name used in logs and metrics.
    fn name(&self) -> &'static str;

    /// Handles one message. Returning `Err(SagaError::EventProcessing)`
    /// leaves it unacknowledged; every other result is acknowledged.
    async fn handle(&self, message: &Message) -> Result<()>;
}

#[async_trait]
impl<H: EventHandler + ?Sized> EventHandler for Arc<H> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    async fn handle(&self, message: &Message) -> Result<()> {
        (**self).handle(message).await
    }
}

#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    /// Longest a single poll waits for new messages.
    pub poll_timeout: Duration,
    /// Most deliveries taken per poll.
    pub max_batch: usize,
    /// Pause after the bus itself fails.
    pub retry_delay: Duration,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            poll_timeout: Duration::from_millis(500),
            max_batch: 32,
            retry_delay: Duration::from_secs(1),
        }
    }
}

/// What became of one delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Processed {
    Acked(AckOutcome),
    /// Left for redelivery.
    Retained,
}

/// One member of a consumer group.
pub struct ConsumerWorker<B: EventBus> {
    bus: B,
    subscription: Subscription,
    handler: Arc<dyn EventHandler>,
    config: ConsumerConfig,
}

impl<B: EventBus + 'static> ConsumerWorker<B> {
    pub fn new(
        bus: B,
        subscription: Subscription,
        handler: Arc<dyn EventHandler>,
        config: ConsumerConfig,
    ) -> Self {
        Self {
            bus,
            subscription,
            handler,
            config,
        }
    }

    pub fn subscription(&self) -> &Subscription {
        &self.subscription
    }

    pub async fn join(&self) -> Result<()> {
        self.bus.join(&self.subscription).await?;
        tracing::info!(
            group = %self.subscription.group,
            member = %self.subscription.member,
            topics = ?self.subscription.topics,
            handler = self.handler.name(),
            "consumer joined"
        );
        Ok(())
    }

    /// Runs until `shutdown` turns true, then leaves the group.
    pub fn spawn(self, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move { self.run(shutdown).await })
    }

    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let group = self.subscription.group.clone();
        if let Err(e) = self.join().await {
            tracing::error!(%group, error = %e, "consumer failed to join");
            return;
        }

        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                polled = self.poll_once() => {
                    if let Err(e) = polled {
                        tracing::error!(%group, error = %e, "poll failed, backing off");
                        tokio::time::sleep(self.config.retry_delay).await;
                    }
                }
            }
        }

        if let Err(e) = self.bus.leave(&self.subscription).await {
            tracing::warn!(%group, error = %e, "leaving group failed");
        }
        tracing::info!(%group, member = %self.subscription.member, "consumer stopped");
    }

    /// Polls once and processes whatever arrived. Returns how many
    /// deliveries were handled.
    pub async fn poll_once(&self) -> Result<usize> {
        let deliveries = self
            .bus
            .poll(
                &self.subscription,
                self.config.max_batch,
                self.config.poll_timeout,
            )
            .await?;
        let count = deliveries.len();
        if count > 0 {
            self.process_batch(deliveries).await;
        }
        Ok(count)
    }

    /// Partitions run concurrently; messages of one partition run in order.
    async fn process_batch(&self, deliveries: Vec<Delivery>) {
        let mut lanes: BTreeMap<(String, u32), Vec<Delivery>> = BTreeMap::new();
        for delivery in deliveries {
            lanes
                .entry((delivery.message.topic.clone(), delivery.message.partition))
                .or_default()
                .push(delivery);
        }

        join_all(lanes.into_values().map(|lane| async move {
            for delivery in lane {
                if self.process(&delivery).await == Processed::Retained {
                    // Later messages of this partition wait for the retry.
                    break;
                }
            }
        }))
        .await;
    }

    #[tracing::instrument(
        skip(self, delivery),
        fields(
            group = %delivery.group,
            topic = %delivery.message.topic,
            partition = delivery.message.partition,
            offset = %delivery.message.offset,
            attempt = delivery.attempt,
        )
    )]
    pub async fn process(&self, delivery: &Delivery) -> Processed {
        let handler = self.handler.name();
        match self.handler.handle(&delivery.message).await {
            Ok(()) => {}
            Err(e) if e.is_retryable() => {
                tracing::warn!(handler, error = %e, "handling failed, leaving for redelivery");
                metrics::counter!("saga_events_total", "handler" => handler, "outcome" => "retained")
                    .increment(1);
                return Processed::Retained;
            }
            Err(e) => {
                tracing::error!(handler, error = %e, "handling failed, acknowledging anyway");
                metrics::counter!("saga_events_total", "handler" => handler, "outcome" => "error")
                    .increment(1);
            }
        }

        match self.bus.ack(delivery).await {
            Ok(outcome) => {
                if outcome == AckOutcome::Stale {
                    tracing::debug!("lease expired before ack");
                }
                metrics::counter!("saga_events_total", "handler" => handler, "outcome" => "acked")
                    .increment(1);
                Processed::Acked(outcome)
            }
            Err(e) => {
                tracing::error!(error = %e, "ack failed");
                Processed::Retained
            }
        }
    }
}
