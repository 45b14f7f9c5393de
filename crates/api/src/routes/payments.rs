//! Payment endpoints: the caller initiates, the gateway reports back.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use common::{OrderId, PaymentId};
use domain::{Payment, PaymentError, PaymentMethod, PaymentResult};
use serde::Deserialize;

use super::parse_id;
use crate::AppState;
use crate::error::ApiError;
use crate::identity::Identity;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitiatePaymentRequest {
    pub order_id: OrderId,
    #[serde(default)]
    pub payment_method: PaymentMethod,
}

/// POST /payments: start paying one of the caller's orders.
#[tracing::instrument(skip(state, req), fields(order_id = %req.order_id))]
pub async fn initiate(
    State(state): State<Arc<AppState>>,
    Identity(user_id): Identity,
    Json(req): Json<InitiatePaymentRequest>,
) -> Result<(StatusCode, Json<Payment>), ApiError> {
    let payment = state
        .payments
        .initiate(user_id, req.order_id, req.payment_method)
        .await?;
    Ok((StatusCode::CREATED, Json(payment)))
}

/// GET /payments/{id}: one of the caller's payment attempts.
#[tracing::instrument(skip(state))]
pub async fn get(
    State(state): State<Arc<AppState>>,
    Identity(user_id): Identity,
    Path(id): Path<String>,
) -> Result<Json<Payment>, ApiError> {
    let payment_id: PaymentId = parse_id(&id, "payment")?;
    let payment = state
        .payments
        .get(payment_id)
        .await?
        .ok_or(PaymentError::NotFound(payment_id))?;
    if payment.user_id != user_id {
        return Err(PaymentError::Forbidden {
            order_id: payment.order_id,
            user_id,
        }
        .into());
    }
    Ok(Json(payment))
}

/// POST /payments/{id}/result: the gateway's verdict on an attempt.
#[tracing::instrument(skip(state, result), fields(success = result.success))]
pub async fn settle(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(result): Json<PaymentResult>,
) -> Result<Json<Payment>, ApiError> {
    let payment_id: PaymentId = parse_id(&id, "payment")?;
    Ok(Json(state.payments.settle(payment_id, result).await?))
}
