//! Inspection and replay of parked saga steps.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use chrono::{DateTime, Utc};
use domain::InventoryLedger;
use saga::{DeadLetter, DeadLetterKind, RetryReport};
use serde::Serialize;

use crate::AppState;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeadLetterResponse {
    pub id: String,
    pub group: String,
    pub topic: String,
    pub partition: u32,
    pub offset: u64,
    pub event_type: String,
    pub kind: &'static str,
    pub order_id: Option<String>,
    pub product_id: Option<String>,
    pub action: Option<&'static str>,
    pub quantity: Option<u32>,
    pub error: String,
    pub attempts: u32,
    pub recorded_at: DateTime<Utc>,
}

impl From<DeadLetter> for DeadLetterResponse {
    fn from(entry: DeadLetter) -> Self {
        let (kind, order_id, product_id, action, quantity) = match &entry.kind {
            DeadLetterKind::Undecodable => ("UNDECODABLE", None, None, None, None),
            DeadLetterKind::RolledBack {
                order_id,
                product_id,
            } => (
                "ROLLED_BACK",
                Some(order_id.to_string()),
                Some(product_id.to_string()),
                None,
                None,
            ),
            DeadLetterKind::LedgerAction {
                order_id,
                product_id,
                action,
                quantity,
            } => (
                "LEDGER_ACTION",
                Some(order_id.to_string()),
                Some(product_id.to_string()),
                Some(action.as_str()),
                Some(*quantity),
            ),
        };
        Self {
            id: entry.id.to_string(),
            group: entry.group,
            topic: entry.topic,
            partition: entry.partition,
            offset: entry.offset,
            event_type: entry.event_type,
            kind,
            order_id,
            product_id,
            action,
            quantity,
            error: entry.error,
            attempts: entry.attempts,
            recorded_at: entry.recorded_at,
        }
    }
}

/// GET /dead-letters
#[tracing::instrument(skip(state))]
pub async fn list(State(state): State<Arc<AppState>>) -> Json<Vec<DeadLetterResponse>> {
    let entries = state.dead_letters.entries().await;
    Json(entries.into_iter().map(DeadLetterResponse::from).collect())
}

/// POST /dead-letters/retry: replay parked ledger steps.
#[tracing::instrument(skip(state))]
pub async fn retry(State(state): State<Arc<AppState>>) -> Json<RetryReport> {
    let ledger: &dyn InventoryLedger = state.inventory.as_ref();
    Json(state.dead_letters.retry(ledger).await)
}
