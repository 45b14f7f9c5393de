//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use domain::{
    CheckoutError, DomainError, InventoryError, NotificationError, OrderError, PaymentError,
};

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Resource not found.
    NotFound(String),
    /// Bad request from the client.
    BadRequest(String),
    /// The caller's identity is missing or malformed.
    Unauthorized(String),
    /// Domain logic error.
    Domain(DomainError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            ApiError::Domain(err) => (domain_status(&err), err.to_string()),
        };
        if status.is_server_error() {
            tracing::error!(error = %message, "internal server error");
        }
        metrics::counter!("http_errors_total", "status" => status.as_u16().to_string()).increment(1);

        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}

fn domain_status(err: &DomainError) -> StatusCode {
    match err {
        DomainError::Inventory(e) => inventory_status(e),
        DomainError::Order(e) => order_status(e),
        DomainError::Payment(e) => payment_status(e),
        DomainError::Checkout(e) => checkout_status(e),
        DomainError::Notification(e) => notification_status(e),
        DomainError::Serialization(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn inventory_status(err: &InventoryError) -> StatusCode {
    match err {
        InventoryError::InsufficientStock { .. }
        | InventoryError::InvalidReservation { .. }
        | InventoryError::AlreadyExists(_)
        | InventoryError::Inactive(_) => StatusCode::CONFLICT,
        InventoryError::NotFound(_) => StatusCode::NOT_FOUND,
        InventoryError::InvalidQuantity { .. } => StatusCode::BAD_REQUEST,
        InventoryError::Corrupt { .. }
        | InventoryError::Database(_)
        | InventoryError::Migration(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn order_status(err: &OrderError) -> StatusCode {
    match err {
        OrderError::IllegalTransition { .. } | OrderError::ConcurrencyConflict { .. } => {
            StatusCode::CONFLICT
        }
        OrderError::Forbidden { .. } => StatusCode::FORBIDDEN,
        OrderError::NotFound(_) => StatusCode::NOT_FOUND,
        OrderError::NoItems
        | OrderError::InvalidQuantity { .. }
        | OrderError::InvalidPrice { .. }
        | OrderError::AmountOverflow => StatusCode::BAD_REQUEST,
        OrderError::DuplicateOrderNumber(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn payment_status(err: &PaymentError) -> StatusCode {
    match err {
        PaymentError::OrderNotFound(_) | PaymentError::NotFound(_) => StatusCode::NOT_FOUND,
        PaymentError::Forbidden { .. } => StatusCode::FORBIDDEN,
        PaymentError::OrderNotPayable { .. }
        | PaymentError::AlreadyPaid(_)
        | PaymentError::AlreadySettled { .. } => StatusCode::CONFLICT,
        PaymentError::InvalidAmount(_) => StatusCode::BAD_REQUEST,
        PaymentError::Order(e) => order_status(e),
    }
}

fn checkout_status(err: &CheckoutError) -> StatusCode {
    match err {
        CheckoutError::EmptyCart | CheckoutError::ProductInactive(_) => StatusCode::BAD_REQUEST,
        CheckoutError::ProductNotFound(_) => StatusCode::NOT_FOUND,
        CheckoutError::InsufficientStock { .. } => StatusCode::CONFLICT,
        CheckoutError::Inventory(e) => inventory_status(e),
        CheckoutError::Order(e) => order_status(e),
    }
}

fn notification_status(err: &NotificationError) -> StatusCode {
    match err {
        NotificationError::NotFound(_) => StatusCode::NOT_FOUND,
        NotificationError::Forbidden { .. } => StatusCode::FORBIDDEN,
    }
}

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        ApiError::Domain(err)
    }
}

macro_rules! from_domain {
    ($($err:ty),* $(,)?) => {
        $(
            impl From<$err> for ApiError {
                fn from(err: $err) -> Self {
                    ApiError::Domain(err.into())
                }
            }
        )*
    };
}

from_domain!(
    InventoryError,
    OrderError,
    PaymentError,
    CheckoutError,
    NotificationError,
);

#[cfg(test)]
mod tests {
    use super::*;
    use common::{Money, OrderId, ProductId, UserId};
    use domain::{OrderStatus, PaymentStatus};

    fn status_of(err: impl Into<ApiError>) -> StatusCode {
        err.into().into_response().status()
    }

    #[test]
    fn conflicts_map_to_409() {
        let order_id = OrderId::new();
        assert_eq!(
            status_of(InventoryError::InsufficientStock {
                product_id: ProductId::from("A"),
                available: 0,
                requested: 1,
            }),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(OrderError::IllegalTransition {
                order_id,
                from: OrderStatus::Pending,
                to: OrderStatus::Shipped,
            }),
            StatusCode::CONFLICT
        );
        assert_eq!(status_of(PaymentError::AlreadyPaid(order_id)), StatusCode::CONFLICT);
        assert_eq!(
            status_of(PaymentError::AlreadySettled {
                payment_id: common::PaymentId::new(),
                status: PaymentStatus::Success,
            }),
            StatusCode::CONFLICT
        );
    }

    #[test]
    fn ownership_and_lookup_failures() {
        let order_id = OrderId::new();
        let user_id = UserId::new();
        assert_eq!(
            status_of(OrderError::Forbidden { order_id, user_id }),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            status_of(PaymentError::Order(OrderError::NotFound(order_id))),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_of(CheckoutError::ProductNotFound(ProductId::from("X"))),
            StatusCode::NOT_FOUND
        );
    }

    #[test]
    fn validation_failures_are_400() {
        assert_eq!(status_of(CheckoutError::EmptyCart), StatusCode::BAD_REQUEST);
        assert_eq!(
            status_of(CheckoutError::Order(OrderError::AmountOverflow)),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(PaymentError::InvalidAmount(Money::from_cents(0))),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(ApiError::Unauthorized("missing x-user-id".into())),
            StatusCode::UNAUTHORIZED
        );
    }
}
