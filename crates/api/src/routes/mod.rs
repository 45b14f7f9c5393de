//! Route handlers, one module per resource.

pub mod catalog;
pub mod dead_letters;
pub mod health;
pub mod inventory;
pub mod metrics;
pub mod notifications;
pub mod orders;
pub mod payments;

use std::str::FromStr;

use crate::error::ApiError;

/// Parses a path segment into an id type.
pub(crate) fn parse_id<T>(raw: &str, what: &str) -> Result<T, ApiError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.parse()
        .map_err(|e| ApiError::BadRequest(format!("Invalid {what} id: {e}")))
}
