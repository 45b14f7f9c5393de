use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};

use crate::{BusEvent, EventBus, OutboundMessage, PublishReceipt};

/// Result of one best-effort publish, handed to the completion callback.
#[derive(Debug, Clone)]
pub struct PublishOutcome {
    pub topic: String,
    pub key: String,
    pub event_type: String,
    pub result: Result<PublishReceipt, String>,
}

/// Invoked once per published message after the bus has answered.
pub type CompletionCallback = Arc<dyn Fn(&PublishOutcome) + Send + Sync>;

enum Command {
    Publish(OutboundMessage),
    Flush(oneshot::Sender<()>),
}

/// Fire-and-forget producer front for an [`EventBus`].
///
/// `publish` never blocks and never fails the caller. Messages are handed to
/// a single background task which publishes them in submission order, so two
/// events for the same key cannot overtake each other. Failures are reported
/// to the completion callback and then dropped; nothing is retried.
#[derive(Clone)]
pub struct BestEffortPublisher {
    tx: mpsc::UnboundedSender<Command>,
}

impl BestEffortPublisher {
    /// Spawns the publishing task with the default logging callback.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn<B: EventBus + 'static>(bus: B) -> Self {
        Self::with_callback(bus, Arc::new(log_outcome))
    }

    pub fn with_callback<B: EventBus + 'static>(bus: B, on_complete: CompletionCallback) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<Command>();

        tokio::spawn(async move {
            while let Some(command) = rx.recv().await {
                match command {
                    Command::Publish(message) => {
                        let topic = message.topic.clone();
                        let key = message.key.clone();
                        let event_type = message.event_type.clone();
                        let result = bus.publish(message).await.map_err(|e| e.to_string());
                        on_complete(&PublishOutcome {
                            topic,
                            key,
                            event_type,
                            result,
                        });
                    }
                    Command::Flush(done) => {
                        let _ = done.send(());
                    }
                }
            }
        });

        Self { tx }
    }

    /// Queues a prepared message for publishing.
    pub fn publish(&self, message: OutboundMessage) {
        if self.tx.send(Command::Publish(message)).is_err() {
            tracing::error!("publisher task has stopped, dropping message");
            metrics::counter!("bus_publish_dropped_total").increment(1);
        }
    }

    /// Serializes and queues a domain event. Encoding failures are logged
    /// and the event is dropped, same as a failed publish.
    pub fn publish_event<E: BusEvent>(&self, event: &E) {
        match OutboundMessage::from_event(event) {
            Ok(message) => self.publish(message),
            Err(e) => {
                tracing::error!(
                    topic = event.topic(),
                    event_type = event.event_type(),
                    error = %e,
                    "failed to encode event, dropping"
                );
                metrics::counter!("bus_publish_dropped_total").increment(1);
            }
        }
    }

    /// Waits until every message queued before this call has been attempted.
    pub async fn flush(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.tx.send(Command::Flush(done_tx)).is_ok() {
            let _ = done_rx.await;
        }
    }
}

/// Default completion callback: logs where the message landed, or why it
/// did not.
pub fn log_outcome(outcome: &PublishOutcome) {
    match &outcome.result {
        Ok(receipt) => {
            tracing::info!(
                topic = %outcome.topic,
                key = %outcome.key,
                event_type = %outcome.event_type,
                partition = receipt.partition,
                offset = %receipt.offset,
                "event published"
            );
        }
        Err(reason) => {
            tracing::error!(
                topic = %outcome.topic,
                key = %outcome.key,
                event_type = %outcome.event_type,
                error = %reason,
                "event publish failed, not retrying"
            );
            metrics::counter!("bus_publish_failures_total", "topic" => outcome.topic.clone())
                .increment(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::{BusConfig, InMemoryEventBus};

    fn message(key: &str, n: u64) -> OutboundMessage {
        OutboundMessage::builder()
            .topic("orders")
            .key(key)
            .event_type("Test")
            .payload_json(serde_json::json!({ "n": n }))
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn publishes_in_submission_order() {
        let bus = InMemoryEventBus::new(BusConfig {
            partitions: 1,
            ..BusConfig::default()
        });
        let publisher = BestEffortPublisher::spawn(bus.clone());

        for n in 0..5 {
            publisher.publish(message("ORD-1", n));
        }
        publisher.flush().await;

        let seen: Vec<u64> = bus
            .messages("orders")
            .await
            .iter()
            .map(|m| m.payload["n"].as_u64().unwrap())
            .collect();
        assert_eq!(seen, vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn failures_reach_the_callback_and_are_dropped() {
        let bus = InMemoryEventBus::default();
        bus.set_unavailable(true);

        let outcomes = Arc::new(Mutex::new(Vec::new()));
        let sink = outcomes.clone();
        let publisher = BestEffortPublisher::with_callback(
            bus.clone(),
            Arc::new(move |o: &PublishOutcome| sink.lock().unwrap().push(o.clone())),
        );

        publisher.publish(message("ORD-1", 0));
        publisher.flush().await;

        let outcomes = outcomes.lock().unwrap();
        assert_eq!(outcomes.len(), 1);
        assert!(outcomes[0].result.is_err());
        drop(outcomes);
        assert!(bus.messages("orders").await.is_empty());
    }
}
