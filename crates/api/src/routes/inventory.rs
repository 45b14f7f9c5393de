//! Inventory ledger endpoints for operators.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use common::ProductId;
use domain::{InventoryLedger, InventoryRecord};
use domain::inventory::DEFAULT_LOW_STOCK_THRESHOLD;
use serde::{Deserialize, Serialize};

use crate::AppState;
use crate::error::ApiError;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateInventoryRequest {
    pub product_id: ProductId,
    pub quantity: u32,
    #[serde(default)]
    pub low_stock_threshold: Option<u32>,
}

#[derive(Deserialize)]
pub struct AdjustRequest {
    pub delta: i64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryResponse {
    pub product_id: ProductId,
    pub quantity: u32,
    pub reserved: u32,
    pub available: u32,
    pub low_stock_threshold: u32,
    pub low_stock: bool,
    pub active: bool,
    pub version: i64,
    pub updated_at: DateTime<Utc>,
}

impl From<InventoryRecord> for InventoryResponse {
    fn from(record: InventoryRecord) -> Self {
        Self {
            product_id: record.product_id().clone(),
            quantity: record.quantity(),
            reserved: record.reserved(),
            available: record.available(),
            low_stock_threshold: record.low_stock_threshold(),
            low_stock: record.is_low_stock(),
            active: record.is_active(),
            version: record.version(),
            updated_at: record.updated_at(),
        }
    }
}

/// POST /inventory: start tracking a product.
#[tracing::instrument(skip(state, req), fields(product_id = %req.product_id))]
pub async fn create(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateInventoryRequest>,
) -> Result<(StatusCode, Json<InventoryResponse>), ApiError> {
    let record = state
        .inventory
        .create(
            req.product_id,
            req.quantity,
            req.low_stock_threshold.unwrap_or(DEFAULT_LOW_STOCK_THRESHOLD),
        )
        .await?;
    Ok((StatusCode::CREATED, Json(record.into())))
}

/// GET /inventory/{product_id}
#[tracing::instrument(skip(state))]
pub async fn get(
    State(state): State<Arc<AppState>>,
    Path(product_id): Path<String>,
) -> Result<Json<InventoryResponse>, ApiError> {
    let product_id = ProductId::new(product_id);
    let record = state
        .inventory
        .get(&product_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Inventory not found for product {product_id}")))?;
    Ok(Json(record.into()))
}

/// POST /inventory/{product_id}/adjust: restock or write off.
#[tracing::instrument(skip(state, req), fields(delta = req.delta))]
pub async fn adjust(
    State(state): State<Arc<AppState>>,
    Path(product_id): Path<String>,
    Json(req): Json<AdjustRequest>,
) -> Result<Json<InventoryResponse>, ApiError> {
    let record = state
        .inventory
        .adjust(&ProductId::new(product_id), req.delta)
        .await?;
    Ok(Json(record.into()))
}

/// GET /inventory/low-stock: active rows at or under their threshold.
#[tracing::instrument(skip(state))]
pub async fn low_stock(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<InventoryResponse>>, ApiError> {
    let rows = state.inventory.low_stock().await?;
    Ok(Json(rows.into_iter().map(InventoryResponse::from).collect()))
}
