//! Catalog records carrying prices derived from the dollar rate.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::{OrderId, ProductId, VariantId};

/// Order lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Created, not yet submitted for payment.
    Pending,
    /// Checkout started, waiting for the payment to clear.
    AwaitingPayment,
    /// Payment received.
    Paid,
    /// Handed to the carrier.
    Shipped,
    /// Received by the customer.
    Delivered,
    /// Cancelled by the customer or an operator.
    Cancelled,
}

impl OrderStatus {
    /// Statuses whose ARS total still follows the dollar rate.
    pub const REPRICEABLE: [OrderStatus; 2] = [OrderStatus::Pending, OrderStatus::AwaitingPayment];

    /// Check if the ARS total may still be recomputed.
    pub fn is_repriceable(&self) -> bool {
        Self::REPRICEABLE.contains(self)
    }

    /// Check if this is a final state (ARS total frozen).
    pub fn is_final(&self) -> bool {
        !self.is_repriceable()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::AwaitingPayment => "awaiting_payment",
            OrderStatus::Paid => "paid",
            OrderStatus::Shipped => "shipped",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(OrderStatus::Pending),
            "awaiting_payment" => Ok(OrderStatus::AwaitingPayment),
            "paid" => Ok(OrderStatus::Paid),
            "shipped" => Ok(OrderStatus::Shipped),
            "delivered" => Ok(OrderStatus::Delivered),
            "cancelled" => Ok(OrderStatus::Cancelled),
            other => Err(format!("unknown order status '{}'", other)),
        }
    }
}

/// A purchasable variant of a product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductVariant {
    pub id: VariantId,
    pub product_id: ProductId,
    pub sku: String,
    /// Authoritative price.
    pub price_usd: Decimal,
    /// Derived from `price_usd` and the effective rate at the last cascade.
    pub price_ars: Decimal,
    /// When `price_ars` was last recomputed.
    pub priced_at: Option<DateTime<Utc>>,
}

impl ProductVariant {
    pub fn new(product_id: ProductId, sku: impl Into<String>, price_usd: Decimal) -> Self {
        Self {
            id: VariantId::new(),
            product_id,
            sku: sku.into(),
            price_usd,
            price_ars: Decimal::ZERO,
            priced_at: None,
        }
    }
}

/// A customer order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub status: OrderStatus,
    /// Total in USD.
    pub total_amount: Decimal,
    /// Total in ARS, frozen once the order is final.
    pub total_amount_ars: Decimal,
    pub priced_at: Option<DateTime<Utc>>,
}

impl Order {
    pub fn new(status: OrderStatus, total_amount: Decimal, total_amount_ars: Decimal) -> Self {
        Self {
            id: OrderId::new(),
            status,
            total_amount,
            total_amount_ars,
            priced_at: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repriceable_statuses() {
        assert!(OrderStatus::Pending.is_repriceable());
        assert!(OrderStatus::AwaitingPayment.is_repriceable());
        assert!(OrderStatus::Paid.is_final());
        assert!(OrderStatus::Shipped.is_final());
        assert!(OrderStatus::Delivered.is_final());
        assert!(OrderStatus::Cancelled.is_final());
    }

    #[test]
    fn test_status_round_trips_through_str() {
        for status in [
            OrderStatus::Pending,
            OrderStatus::AwaitingPayment,
            OrderStatus::Paid,
            OrderStatus::Cancelled,
        ] {
            assert_eq!(status.as_str().parse::<OrderStatus>().unwrap(), status);
        }
        assert!("refunded".parse::<OrderStatus>().is_err());
    }
}
