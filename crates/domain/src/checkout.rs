//! Turns a cart into an order.
//!
//! Checkout validates every line synchronously against the catalog and the
//! inventory ledger, snapshots name and price, and hands the result to the
//! order service. Nothing is reserved here; reservation follows
//! asynchronously from `OrderCreated`.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use common::{Money, ProductId, UserId};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;

use crate::inventory::{InventoryError, InventoryLedger};
use crate::order::{LineItem, Order, OrderError, OrderRepository, OrderService, ShippingInfo};

#[derive(Debug, Error)]
pub enum CheckoutError {
    #[error("Cart is empty")]
    EmptyCart,

    #[error("Product not found: {0}")]
    ProductNotFound(ProductId),

    #[error("Product {0} is no longer sold")]
    ProductInactive(ProductId),

    #[error("Insufficient stock for {product_id}: requested {requested}")]
    InsufficientStock {
        product_id: ProductId,
        requested: u32,
    },

    #[error("Inventory error: {0}")]
    Inventory(#[from] InventoryError),

    #[error("Order error: {0}")]
    Order(#[from] OrderError),
}

/// A product as the catalog sells it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogProduct {
    pub product_id: ProductId,
    pub name: String,
    pub price: Money,
    #[serde(default)]
    pub discount_price: Option<Money>,
    pub active: bool,
}

impl CatalogProduct {
    pub fn new(product_id: impl Into<ProductId>, name: impl Into<String>, price: Money) -> Self {
        Self {
            product_id: product_id.into(),
            name: name.into(),
            price,
            discount_price: None,
            active: true,
        }
    }

    pub fn with_discount(mut self, discount_price: Money) -> Self {
        self.discount_price = Some(discount_price);
        self
    }

    /// The price charged: the discount price when one is set.
    pub fn effective_price(&self) -> Money {
        self.discount_price
            .filter(|p| p.is_positive())
            .unwrap_or(self.price)
    }
}

/// Read access to the product catalog.
#[async_trait]
pub trait Catalog: Send + Sync {
    async fn product(&self, product_id: &ProductId) -> Option<CatalogProduct>;
}

#[async_trait]
impl<C: Catalog + ?Sized> Catalog for Arc<C> {
    async fn product(&self, product_id: &ProductId) -> Option<CatalogProduct> {
        (**self).product(product_id).await
    }
}

#[derive(Clone, Default)]
pub struct InMemoryCatalog {
    products: Arc<RwLock<HashMap<ProductId, CatalogProduct>>>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn upsert(&self, product: CatalogProduct) {
        self.products
            .write()
            .await
            .insert(product.product_id.clone(), product);
    }
}

#[async_trait]
impl Catalog for InMemoryCatalog {
    async fn product(&self, product_id: &ProductId) -> Option<CatalogProduct> {
        self.products.read().await.get(product_id).cloned()
    }
}

/// One cart line submitted at checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutLine {
    pub product_id: ProductId,
    pub quantity: u32,
}

impl CheckoutLine {
    pub fn new(product_id: impl Into<ProductId>, quantity: u32) -> Self {
        Self {
            product_id: product_id.into(),
            quantity,
        }
    }
}

#[derive(Clone)]
pub struct CheckoutService<C, L, R>
where
    C: Catalog,
    L: InventoryLedger,
    R: OrderRepository,
{
    catalog: C,
    inventory: L,
    orders: OrderService<R>,
}

impl<C, L, R> CheckoutService<C, L, R>
where
    C: Catalog,
    L: InventoryLedger,
    R: OrderRepository,
{
    pub fn new(catalog: C, inventory: L, orders: OrderService<R>) -> Self {
        Self {
            catalog,
            inventory,
            orders,
        }
    }

    #[tracing::instrument(skip(self, lines, shipping), fields(lines = lines.len()))]
    pub async fn checkout(
        &self,
        user_id: UserId,
        lines: Vec<CheckoutLine>,
        shipping: ShippingInfo,
    ) -> Result<Order, CheckoutError> {
        if lines.is_empty() {
            return Err(CheckoutError::EmptyCart);
        }

        // Several lines may name the same product; stock is checked on the sum.
        let mut requested: HashMap<&ProductId, u32> = HashMap::new();
        for line in &lines {
            let total = requested.entry(&line.product_id).or_default();
            *total = total.checked_add(line.quantity).ok_or_else(|| {
                OrderError::InvalidQuantity {
                    product_id: line.product_id.clone(),
                    quantity: line.quantity,
                }
            })?;
        }

        let mut items = Vec::with_capacity(lines.len());
        for line in &lines {
            let product = self
                .catalog
                .product(&line.product_id)
                .await
                .ok_or_else(|| CheckoutError::ProductNotFound(line.product_id.clone()))?;
            if !product.active {
                return Err(CheckoutError::ProductInactive(line.product_id.clone()));
            }

            let wanted = requested
                .get(&line.product_id)
                .copied()
                .unwrap_or(line.quantity);
            if !self
                .inventory
                .check_availability(&line.product_id, wanted)
                .await?
            {
                tracing::info!(product_id = %line.product_id, wanted, "checkout rejected: not enough stock");
                return Err(CheckoutError::InsufficientStock {
                    product_id: line.product_id.clone(),
                    requested: wanted,
                });
            }

            items.push(LineItem::new(
                product.product_id.clone(),
                product.name.clone(),
                product.effective_price(),
                line.quantity,
            ));
        }

        Ok(self.orders.create_order(user_id, items, shipping).await?)
    }
}
