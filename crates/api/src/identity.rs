//! Caller identity, as asserted by the upstream gateway.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use common::UserId;

use crate::error::ApiError;

pub const USER_ID_HEADER: &str = "x-user-id";

/// The user on whose behalf a request runs, read from `x-user-id`.
///
/// Authentication happens upstream; this only parses the id.
#[derive(Debug, Clone, Copy)]
pub struct Identity(pub UserId);

impl<S: Send + Sync> FromRequestParts<S> for Identity {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get(USER_ID_HEADER)
            .ok_or_else(|| ApiError::Unauthorized(format!("Missing {USER_ID_HEADER} header")))?
            .to_str()
            .map_err(|_| ApiError::Unauthorized(format!("Malformed {USER_ID_HEADER} header")))?;
        let user_id = raw
            .trim()
            .parse::<UserId>()
            .map_err(|e| ApiError::Unauthorized(format!("Invalid {USER_ID_HEADER}: {e}")))?;
        Ok(Identity(user_id))
    }
}
