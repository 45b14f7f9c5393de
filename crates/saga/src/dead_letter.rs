//! Failed per-item actions and unreadable messages, kept for inspection and
//! retry.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use common::{OrderId, ProductId};
use domain::InventoryLedger;
use domain::inventory::JournalAction;
use event_bus::Message;
use serde::Serialize;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Why an entry was parked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeadLetterKind {
    /// The payload did not decode; it can only be inspected.
    Undecodable,
    /// An all-or-nothing reservation failed and was given back. Replaying a
    /// single item would break the policy, so it is kept for inspection.
    RolledBack { order_id: OrderId, product_id: ProductId },
    /// A ledger step for one item failed and can be replayed.
    LedgerAction {
        order_id: OrderId,
        product_id: ProductId,
        action: JournalAction,
        quantity: u32,
    },
}

#[derive(Debug, Clone)]
pub struct DeadLetter {
    pub id: Uuid,
    pub group: String,
    pub topic: String,
    pub partition: u32,
    pub offset: u64,
    pub event_type: String,
    pub kind: DeadLetterKind,
    pub error: String,
    pub payload: serde_json::Value,
    pub attempts: u32,
    pub recorded_at: DateTime<Utc>,
}

impl DeadLetter {
    pub fn undecodable(group: &str, message: &Message, error: impl Into<String>) -> Self {
        Self::from_message(group, message, DeadLetterKind::Undecodable, error.into())
    }

    pub fn rolled_back(
        group: &str,
        message: &Message,
        order_id: OrderId,
        product_id: ProductId,
        error: impl Into<String>,
    ) -> Self {
        Self::from_message(
            group,
            message,
            DeadLetterKind::RolledBack {
                order_id,
                product_id,
            },
            error.into(),
        )
    }

    pub fn ledger_action(
        group: &str,
        message: &Message,
        order_id: OrderId,
        product_id: ProductId,
        action: JournalAction,
        quantity: u32,
        error: impl Into<String>,
    ) -> Self {
        Self::from_message(
            group,
            message,
            DeadLetterKind::LedgerAction {
                order_id,
                product_id,
                action,
                quantity,
            },
            error.into(),
        )
    }

    fn from_message(group: &str, message: &Message, kind: DeadLetterKind, error: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            group: group.to_string(),
            topic: message.topic.clone(),
            partition: message.partition,
            offset: message.offset.as_u64(),
            event_type: message.event_type.clone(),
            kind,
            error,
            payload: message.payload.clone(),
            attempts: 1,
            recorded_at: Utc::now(),
        }
    }
}

/// Summary of a retry pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RetryReport {
    pub retried: usize,
    pub resolved: usize,
    pub still_failing: usize,
    pub skipped: usize,
}

/// Shared, append-only log of dead letters.
#[derive(Clone, Default)]
pub struct DeadLetterLog {
    entries: Arc<RwLock<Vec<DeadLetter>>>,
}

impl DeadLetterLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn record(&self, entry: DeadLetter) {
        tracing::warn!(
            group = %entry.group,
            topic = %entry.topic,
            partition = entry.partition,
            offset = entry.offset,
            error = %entry.error,
            "dead-lettered"
        );
        metrics::counter!("saga_dead_letters_total", "group" => entry.group.clone()).increment(1);
        self.entries.write().await.push(entry);
    }

    pub async fn entries(&self) -> Vec<DeadLetter> {
        self.entries.read().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// True when a ledger step of `order_id` is parked here.
    pub async fn holds_order(&self, order_id: OrderId) -> bool {
        self.entries.read().await.iter().any(|entry| match &entry.kind {
            DeadLetterKind::RolledBack { order_id: id, .. }
            | DeadLetterKind::LedgerAction { order_id: id, .. } => *id == order_id,
            DeadLetterKind::Undecodable => false,
        })
    }

    /// Removes and returns every entry.
    pub async fn drain(&self) -> Vec<DeadLetter> {
        std::mem::take(&mut *self.entries.write().await)
    }

    /// Replays every parked ledger action against `ledger`.
    ///
    /// Steps that now succeed, or that the journal shows as already done,
    /// leave the log. Failing steps stay with their attempt count bumped.
    /// Entries that cannot be replayed are left alone.
    #[tracing::instrument(skip_all)]
    pub async fn retry<L: InventoryLedger + ?Sized>(&self, ledger: &L) -> RetryReport {
        let pending = self.drain().await;
        let mut report = RetryReport::default();
        let mut keep = Vec::new();

        for mut entry in pending {
            let DeadLetterKind::LedgerAction {
                order_id,
                ref product_id,
                action,
                quantity,
            } = entry.kind
            else {
                report.skipped += 1;
                keep.push(entry);
                continue;
            };

            report.retried += 1;
            let result = match action {
                JournalAction::Reserve => {
                    ledger.reserve_for_order(order_id, product_id, quantity).await
                }
                JournalAction::Release => {
                    ledger.release_for_order(order_id, product_id, quantity).await
                }
                JournalAction::Deduct => {
                    ledger.deduct_for_order(order_id, product_id, quantity).await
                }
            };

            match result {
                Ok(outcome) => {
                    tracing::info!(
                        %order_id,
                        %product_id,
                        action = action.as_str(),
                        ?outcome,
                        "dead letter resolved"
                    );
                    report.resolved += 1;
                }
                Err(e) => {
                    entry.attempts += 1;
                    entry.error = e.to_string();
                    report.still_failing += 1;
                    keep.push(entry);
                }
            }
        }

        if !keep.is_empty() {
            // Entries recorded while the retry ran come after the kept ones.
            let mut entries = self.entries.write().await;
            keep.append(&mut entries);
            *entries = keep;
        }
        report
    }
}
