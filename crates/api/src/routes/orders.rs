//! Checkout and order lifecycle endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use common::OrderId;
use domain::{CheckoutLine, Order, OrderStatus, ShippingInfo};
use serde::Deserialize;

use super::parse_id;
use crate::AppState;
use crate::error::ApiError;
use crate::identity::Identity;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutRequest {
    pub items: Vec<CheckoutLine>,
    #[serde(flatten)]
    pub shipping: ShippingInfo,
}

#[derive(Deserialize)]
pub struct StatusUpdateRequest {
    pub status: OrderStatus,
}

/// POST /orders: check out a cart for the caller.
#[tracing::instrument(skip(state, req))]
pub async fn create(
    State(state): State<Arc<AppState>>,
    Identity(user_id): Identity,
    Json(req): Json<CheckoutRequest>,
) -> Result<(StatusCode, Json<Order>), ApiError> {
    let order = state
        .checkout
        .checkout(user_id, req.items, req.shipping)
        .await?;
    Ok((StatusCode::CREATED, Json(order)))
}

/// GET /orders: the caller's orders, newest first.
#[tracing::instrument(skip(state))]
pub async fn list(
    State(state): State<Arc<AppState>>,
    Identity(user_id): Identity,
) -> Result<Json<Vec<Order>>, ApiError> {
    Ok(Json(state.orders.orders_for_user(user_id).await?))
}

/// GET /orders/{id}: one of the caller's orders.
#[tracing::instrument(skip(state))]
pub async fn get(
    State(state): State<Arc<AppState>>,
    Identity(user_id): Identity,
    Path(id): Path<String>,
) -> Result<Json<Order>, ApiError> {
    let order_id: OrderId = parse_id(&id, "order")?;
    Ok(Json(state.orders.get_order_for_user(order_id, user_id).await?))
}

/// PUT /orders/{id}/status: operator status change along the lifecycle.
#[tracing::instrument(skip(state, req), fields(status = %req.status))]
pub async fn update_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<StatusUpdateRequest>,
) -> Result<Json<Order>, ApiError> {
    let order_id: OrderId = parse_id(&id, "order")?;
    Ok(Json(state.orders.update_status(order_id, req.status).await?))
}

/// POST /orders/{id}/cancel: the owner cancels an order.
#[tracing::instrument(skip(state))]
pub async fn cancel(
    State(state): State<Arc<AppState>>,
    Identity(user_id): Identity,
    Path(id): Path<String>,
) -> Result<Json<Order>, ApiError> {
    let order_id: OrderId = parse_id(&id, "order")?;
    Ok(Json(state.orders.cancel_order(order_id, user_id).await?))
}
