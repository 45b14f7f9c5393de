//! Catalog maintenance, feeding checkout with names and prices.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use common::{Money, ProductId};
use domain::CatalogProduct;
use serde::Deserialize;

use crate::AppState;
use crate::error::ApiError;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpsertProductRequest {
    pub name: String,
    pub price: Money,
    #[serde(default)]
    pub discount_price: Option<Money>,
    #[serde(default = "active_by_default")]
    pub active: bool,
}

fn active_by_default() -> bool {
    true
}

/// PUT /catalog/{product_id}: create or replace a product.
#[tracing::instrument(skip(state, req))]
pub async fn upsert(
    State(state): State<Arc<AppState>>,
    Path(product_id): Path<String>,
    Json(req): Json<UpsertProductRequest>,
) -> Result<Json<CatalogProduct>, ApiError> {
    if req.name.trim().is_empty() {
        return Err(ApiError::BadRequest("Product name is required".to_string()));
    }
    if !req.price.is_positive() {
        return Err(ApiError::BadRequest(format!("Invalid price {}", req.price)));
    }

    let mut product = CatalogProduct::new(ProductId::new(product_id), req.name, req.price);
    if let Some(discount) = req.discount_price {
        product = product.with_discount(discount);
    }
    product.active = req.active;

    state.catalog.upsert(product.clone()).await;
    Ok(Json(product))
}
