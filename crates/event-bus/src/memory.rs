use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{Notify, RwLock};
use tokio::time::{Duration, Instant};

use crate::group::ConsumerGroup;
use crate::{
    AckOutcome, BusConfig, BusError, Delivery, EventBus, Message, Offset, OutboundMessage,
    PublishReceipt, Result, Subscription, partition_for,
};

#[derive(Default)]
struct BusState {
    /// topic -> partitions -> messages
    topics: HashMap<String, Vec<Vec<Message>>>,
    groups: HashMap<String, ConsumerGroup>,
}

impl BusState {
    fn topic_mut(&mut self, topic: &str, partitions: u32) -> &mut Vec<Vec<Message>> {
        self.topics
            .entry(topic.to_string())
            .or_insert_with(|| vec![Vec::new(); partitions.max(1) as usize])
    }
}

/// In-process event bus.
///
/// Provides the same delivery guarantees as a broker-backed bus within a
/// single process: partitioned topics, per-group offsets, leases with
/// redelivery. Used by tests and single-node deployments.
#[derive(Clone)]
pub struct InMemoryEventBus {
    state: Arc<RwLock<BusState>>,
    notify: Arc<Notify>,
    config: BusConfig,
    unavailable: Arc<AtomicBool>,
}

impl Default for InMemoryEventBus {
    fn default() -> Self {
        Self::new(BusConfig::default())
    }
}

impl InMemoryEventBus {
    pub fn new(config: BusConfig) -> Self {
        Self {
            state: Arc::new(RwLock::new(BusState::default())),
            notify: Arc::new(Notify::new()),
            config,
            unavailable: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn config(&self) -> &BusConfig {
        &self.config
    }

    /// Makes every subsequent publish fail, simulating an unreachable broker.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Returns every message of a topic, ordered by partition then offset.
    pub async fn messages(&self, topic: &str) -> Vec<Message> {
        let state = self.state.read().await;
        state
            .topics
            .get(topic)
            .map(|partitions| partitions.iter().flatten().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of messages on a topic that `group` has not committed yet.
    pub async fn lag(&self, topic: &str, group: &str) -> u64 {
        let state = self.state.read().await;
        let Some(partitions) = state.topics.get(topic) else {
            return 0;
        };
        partitions
            .iter()
            .enumerate()
            .map(|(p, messages)| {
                let committed = state
                    .groups
                    .get(group)
                    .map(|g| g.committed(topic, p as u32))
                    .unwrap_or_default();
                (messages.len() as u64).saturating_sub(committed.as_u64())
            })
            .sum()
    }

    async fn claim(
        &self,
        subscription: &Subscription,
        max: usize,
    ) -> Result<(Vec<Delivery>, Option<Instant>)> {
        let mut state = self.state.write().await;
        let now = Instant::now();

        for topic in &subscription.topics {
            state.topic_mut(topic, self.config.partitions);
        }

        let BusState { topics, groups } = &mut *state;
        let group = groups
            .get_mut(&subscription.group)
            .filter(|g| g.is_member(&subscription.member))
            .ok_or_else(|| BusError::NotAMember {
                group: subscription.group.clone(),
                member: subscription.member.clone(),
            })?;

        let mut deliveries = Vec::new();
        let mut next_deadline: Option<Instant> = None;

        for topic in &subscription.topics {
            let remaining = max.saturating_sub(deliveries.len());
            if remaining == 0 {
                break;
            }
            let log = topics.get(topic).map(Vec::as_slice).unwrap_or_default();
            let (claims, deadline) = group.claim(
                topic,
                &subscription.member,
                log,
                now,
                self.config.redelivery_timeout,
                remaining,
            );
            if let Some(deadline) = deadline {
                next_deadline = Some(next_deadline.map_or(deadline, |d| d.min(deadline)));
            }
            for claim in claims {
                let message = log[claim.partition as usize][claim.offset.as_u64() as usize].clone();
                deliveries.push(Delivery {
                    message,
                    group: subscription.group.clone(),
                    member: subscription.member.clone(),
                    attempt: claim.attempt,
                });
            }
        }

        Ok((deliveries, next_deadline))
    }
}

#[async_trait]
impl EventBus for InMemoryEventBus {
    async fn publish(&self, message: OutboundMessage) -> Result<PublishReceipt> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(BusError::PublishFailed {
                topic: message.topic,
                reason: "bus unavailable".to_string(),
            });
        }

        let topic = message.topic.clone();
        let receipt = {
            let mut state = self.state.write().await;
            let partitions = state.topic_mut(&topic, self.config.partitions);
            let partition = partition_for(&message.key, partitions.len() as u32);
            let log = &mut partitions[partition as usize];
            let offset = Offset::new(log.len() as u64);
            log.push(message.into_message(partition, offset, Utc::now()));
            PublishReceipt {
                topic,
                partition,
                offset,
            }
        };

        metrics::counter!("bus_messages_published_total", "topic" => receipt.topic.clone())
            .increment(1);
        self.notify.notify_waiters();
        Ok(receipt)
    }

    async fn join(&self, subscription: &Subscription) -> Result<()> {
        if subscription.topics.is_empty() {
            return Err(BusError::NoTopics(subscription.group.clone()));
        }
        let mut state = self.state.write().await;
        let joined = state
            .groups
            .entry(subscription.group.clone())
            .or_default()
            .join(&subscription.member);
        if joined {
            tracing::info!(
                group = %subscription.group,
                member = %subscription.member,
                "member joined consumer group"
            );
        }
        drop(state);
        self.notify.notify_waiters();
        Ok(())
    }

    async fn leave(&self, subscription: &Subscription) -> Result<()> {
        let mut state = self.state.write().await;
        if let Some(group) = state.groups.get_mut(&subscription.group)
            && group.leave(&subscription.member, Instant::now())
        {
            tracing::info!(
                group = %subscription.group,
                member = %subscription.member,
                remaining = group.members().count(),
                "member left consumer group"
            );
        }
        drop(state);
        self.notify.notify_waiters();
        Ok(())
    }

    async fn poll(
        &self,
        subscription: &Subscription,
        max: usize,
        wait: Duration,
    ) -> Result<Vec<Delivery>> {
        let until = Instant::now() + wait;

        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let (deliveries, next_deadline) = self.claim(subscription, max).await?;
            if !deliveries.is_empty() {
                for delivery in deliveries.iter().filter(|d| d.is_redelivery()) {
                    tracing::debug!(
                        topic = %delivery.message.topic,
                        partition = delivery.message.partition,
                        offset = %delivery.message.offset,
                        attempt = delivery.attempt,
                        "redelivering unacknowledged message"
                    );
                    metrics::counter!("bus_redeliveries_total", "group" => delivery.group.clone())
                        .increment(1);
                }
                return Ok(deliveries);
            }

            if Instant::now() >= until {
                return Ok(Vec::new());
            }
            let wake = next_deadline.map_or(until, |d| d.min(until));
            let _ = tokio::time::timeout_at(wake, notified).await;
        }
    }

    async fn ack(&self, delivery: &Delivery) -> Result<AckOutcome> {
        let mut state = self.state.write().await;
        let group = state
            .groups
            .get_mut(&delivery.group)
            .ok_or_else(|| BusError::NotAMember {
                group: delivery.group.clone(),
                member: delivery.member.clone(),
            })?;
        let outcome = group.ack(
            &delivery.message.topic,
            delivery.message.partition,
            delivery.message.offset,
        );
        drop(state);

        if outcome == AckOutcome::Committed {
            // A partition only ever has one lease, so committing frees the
            // next message for whoever owns the partition.
            self.notify.notify_waiters();
        } else {
            tracing::debug!(
                topic = %delivery.message.topic,
                offset = %delivery.message.offset,
                ?outcome,
                "ack did not advance the partition"
            );
        }
        Ok(outcome)
    }
}
