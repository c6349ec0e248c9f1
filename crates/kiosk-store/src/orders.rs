//! Order history.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use kiosk_types::UserId;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::StoreError;

/// Days between placing an order and its estimated delivery.
pub const ESTIMATED_DELIVERY_DAYS: i64 = 5;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    pub item_id: String,
    pub size: String,
    pub quantity: u32,
    /// Price of one unit in cents.
    pub unit_price: u64,
}

impl OrderItem {
    pub fn subtotal(&self) -> u64 {
        self.unit_price.saturating_mul(u64::from(self.quantity))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryInfo {
    pub name: String,
    pub address: String,
    pub city: String,
    pub postal_code: String,
    #[serde(default)]
    pub phone: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum PaymentMethod {
    Card { last4: String },
    CashOnDelivery,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Processing,
    Shipped,
    Delivered,
    Cancelled,
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OrderStatus::Processing => "processing",
            OrderStatus::Shipped => "shipped",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

impl FromStr for OrderStatus {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "processing" => Ok(OrderStatus::Processing),
            "shipped" => Ok(OrderStatus::Shipped),
            "delivered" => Ok(OrderStatus::Delivered),
            "cancelled" => Ok(OrderStatus::Cancelled),
            other => Err(StoreError::InvalidStatus(other.to_string())),
        }
    }
}

/// What the caller supplies to place an order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOrder {
    pub items: Vec<OrderItem>,
    pub delivery_info: DeliveryInfo,
    pub payment_method: PaymentMethod,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: String,
    pub user_id: UserId,
    pub items: Vec<OrderItem>,
    pub delivery_info: DeliveryInfo,
    pub payment_method: PaymentMethod,
    /// Sum of item subtotals, in cents.
    pub total_amount: u64,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    pub estimated_delivery_at: DateTime<Utc>,
}

impl Order {
    /// Build a `Processing` order with a fresh id, placed at `now`.
    pub fn place(user_id: UserId, order: NewOrder, now: DateTime<Utc>) -> Self {
        let total_amount = order
            .items
            .iter()
            .fold(0u64, |acc, item| acc.saturating_add(item.subtotal()));
        Self {
            id: Uuid::new_v4().to_string(),
            user_id,
            items: order.items,
            delivery_info: order.delivery_info,
            payment_method: order.payment_method,
            total_amount,
            status: OrderStatus::Processing,
            created_at: now,
            estimated_delivery_at: now + Duration::days(ESTIMATED_DELIVERY_DAYS),
        }
    }
}

/// A user's orders, newest first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderHistory {
    orders: Vec<Order>,
}

impl OrderHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new order at the front.
    pub fn record(&mut self, order: Order) {
        self.orders.insert(0, order);
    }

    pub fn get(&self, id: &str) -> Option<&Order> {
        self.orders.iter().find(|o| o.id == id)
    }

    /// Update an order's status. Returns false if no such order exists.
    pub fn set_status(&mut self, id: &str, status: OrderStatus) -> bool {
        match self.orders.iter_mut().find(|o| o.id == id) {
            Some(order) => {
                order.status = status;
                true
            }
            None => false,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Order> {
        self.orders.iter()
    }

    pub fn len(&self) -> usize {
        self.orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }
}
