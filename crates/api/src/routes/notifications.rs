//! The caller's notification inbox.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use common::NotificationId;
use domain::{Notification, NotificationStore};
use serde::Serialize;

use super::parse_id;
use crate::AppState;
use crate::error::ApiError;
use crate::identity::Identity;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InboxResponse {
    pub unread: usize,
    pub notifications: Vec<Notification>,
}

/// GET /notifications: newest first, with the unread count.
#[tracing::instrument(skip(state))]
pub async fn list(
    State(state): State<Arc<AppState>>,
    Identity(user_id): Identity,
) -> Result<Json<InboxResponse>, ApiError> {
    let notifications = state.notifications.list_for_user(user_id).await?;
    let unread = notifications.iter().filter(|n| !n.read).count();
    Ok(Json(InboxResponse {
        unread,
        notifications,
    }))
}

/// POST /notifications/{id}/read
#[tracing::instrument(skip(state))]
pub async fn mark_read(
    State(state): State<Arc<AppState>>,
    Identity(user_id): Identity,
    Path(id): Path<String>,
) -> Result<Json<Notification>, ApiError> {
    let notification_id: NotificationId = parse_id(&id, "notification")?;
    Ok(Json(
        state
            .notifications
            .mark_read(notification_id, user_id)
            .await?,
    ))
}
