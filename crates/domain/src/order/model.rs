use chrono::{DateTime, Utc};
use common::{Money, OrderId, ProductId, UserId};
use serde::{Deserialize, Serialize};

use super::{OrderError, OrderStatus};

/// A line item as captured at checkout.
///
/// Name and price are copies taken when the order was created; later catalog
/// edits never reach them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineItem {
    pub product_id: ProductId,
    pub product_name: String,
    pub price: Money,
    pub quantity: u32,
}

impl LineItem {
    pub fn new(
        product_id: impl Into<ProductId>,
        product_name: impl Into<String>,
        price: Money,
        quantity: u32,
    ) -> Self {
        Self {
            product_id: product_id.into(),
            product_name: product_name.into(),
            price,
            quantity,
        }
    }

    /// `price × quantity`, `None` when it does not fit in `Money`.
    pub fn subtotal(&self) -> Option<Money> {
        self.price.checked_mul(self.quantity)
    }
}

/// Where and how to deliver an order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShippingInfo {
    pub shipping_address: String,
    pub phone: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// An order record.
///
/// `total_amount` is derived from the items and never set directly; status
/// only moves along the transition table in [`OrderStatus`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    id: OrderId,
    user_id: UserId,
    order_number: String,
    status: OrderStatus,
    items: Vec<LineItem>,
    total_amount: Money,
    shipping: ShippingInfo,
    version: u64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Order {
    /// Validates the snapshot and builds a PENDING order.
    pub(crate) fn new(
        user_id: UserId,
        order_number: String,
        items: Vec<LineItem>,
        shipping: ShippingInfo,
    ) -> Result<Self, OrderError> {
        if items.is_empty() {
            return Err(OrderError::NoItems);
        }

        let mut items = items;
        for item in &mut items {
            if !item.price.is_positive() {
                return Err(OrderError::InvalidPrice {
                    product_id: item.product_id.clone(),
                    price: item.price,
                });
            }
            if item.quantity == 0 {
                return Err(OrderError::InvalidQuantity {
                    product_id: item.product_id.clone(),
                    quantity: item.quantity,
                });
            }
            if item.product_name.trim().is_empty() {
                item.product_name = format!("Product {}", item.product_id);
            }
        }

        let total_amount = items
            .iter()
            .map(LineItem::subtotal)
            .try_fold(Money::zero(), |acc, line| acc.checked_add(line?))
            .ok_or(OrderError::AmountOverflow)?;

        let now = Utc::now();
        Ok(Self {
            id: OrderId::new(),
            user_id,
            order_number,
            status: OrderStatus::Pending,
            total_amount,
            items,
            shipping,
            version: 1,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn id(&self) -> OrderId {
        self.id
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn order_number(&self) -> &str {
        &self.order_number
    }

    pub fn status(&self) -> OrderStatus {
        self.status
    }

    pub fn items(&self) -> &[LineItem] {
        &self.items
    }

    pub fn total_amount(&self) -> Money {
        self.total_amount
    }

    pub fn shipping(&self) -> &ShippingInfo {
        &self.shipping
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn is_owned_by(&self, user_id: UserId) -> bool {
        self.user_id == user_id
    }

    /// Moves to `next`, returning the previous status, or `None` when the
    /// order is already there.
    pub(crate) fn transition(&mut self, next: OrderStatus) -> Result<Option<OrderStatus>, OrderError> {
        if self.status == next {
            return Ok(None);
        }
        if !self.status.can_transition_to(next) {
            return Err(OrderError::IllegalTransition {
                order_id: self.id,
                from: self.status,
                to: next,
            });
        }
        let previous = self.status;
        self.status = next;
        self.version += 1;
        self.updated_at = Utc::now();
        Ok(Some(previous))
    }
}
