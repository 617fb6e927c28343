//! Orders, order items, and the single-use pickup code.

use crate::ids::{OrderId, OrderItemId, ProductId, UserId};
use crate::money::{CommissionRate, Money};
use crate::status::{FulfillmentStatus, PaymentStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Monetary breakdown of an order.
///
/// `total == subtotal - discount + tax + shipping` holds for every order in
/// the ledger; it is checked at checkout and no event alters the totals
/// afterwards.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderTotals {
    /// Sum of line totals
    pub subtotal: Money,
    /// Coupon or promotional discount
    pub discount: Money,
    /// Tax
    pub tax: Money,
    /// Shipping fee
    pub shipping: Money,
    /// Amount charged
    pub total: Money,
}

impl OrderTotals {
    /// Builds totals, deriving `total` from the other components.
    /// Returns `None` if the total does not fit in [`Money`].
    #[must_use]
    pub fn compute(subtotal: Money, discount: Money, tax: Money, shipping: Money) -> Option<Self> {
        let total = subtotal
            .checked_sub(discount)?
            .checked_add(tax)?
            .checked_add(shipping)?;
        Some(Self {
            subtotal,
            discount,
            tax,
            shipping,
            total,
        })
    }

    /// Whether `total` matches its components
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        self.total == self.subtotal - self.discount + self.tax + self.shipping
    }
}

/// Opaque short code proving physical handover at an agent location.
///
/// Used for order pickup and for return drop-off. Unique among active codes.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PickupCode(String);

impl PickupCode {
    /// Wraps a generated code
    #[must_use]
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    /// The code as presented to the agent
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PickupCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One checkout.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    /// Identifier
    pub id: OrderId,
    /// Buyer
    pub customer_id: UserId,
    /// Pickup point responsible for the handover
    pub agent_id: UserId,
    /// Persisted order-level status (last authoritative transition)
    pub status: FulfillmentStatus,
    /// Set by the payment gateway callback
    pub payment_status: PaymentStatus,
    /// Money breakdown
    pub totals: OrderTotals,
    /// Active pickup code, if issued and not yet consumed
    pub pickup_code: Option<PickupCode>,
    /// When the pickup code was consumed
    pub pickup_code_consumed_at: Option<DateTime<Utc>>,
    /// Applied coupon
    pub coupon: Option<String>,
    /// Checkout time
    pub placed_at: DateTime<Utc>,
    /// Last mutation time
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Whether order amounts may no longer change
    #[must_use]
    pub const fn amounts_frozen(&self) -> bool {
        matches!(
            self.payment_status,
            PaymentStatus::Completed | PaymentStatus::Refunded
        )
    }

    /// Whether the order can still be cancelled as a whole
    #[must_use]
    pub const fn is_cancellable(&self) -> bool {
        matches!(
            self.status,
            FulfillmentStatus::Pending | FulfillmentStatus::Processing
        )
    }
}

/// One vendor's line within an order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    /// Identifier
    pub id: OrderItemId,
    /// Owning order
    pub order_id: OrderId,
    /// Catalog product
    pub product_id: ProductId,
    /// Vendor fulfilling and earning on this line
    pub vendor_id: UserId,
    /// Units bought
    pub quantity: u32,
    /// Price per unit at purchase time
    pub unit_price: Money,
    /// Per-vendor fulfillment status
    pub status: FulfillmentStatus,
    /// Vendor commission rate at checkout
    pub commission_rate: CommissionRate,
    /// `unit_price × quantity × commission_rate`, frozen at checkout
    pub commission_amount: Money,
    /// Checkout time
    pub created_at: DateTime<Utc>,
    /// When the item reached DELIVERED (starts the return window)
    pub delivered_at: Option<DateTime<Utc>>,
    /// Last mutation time
    pub updated_at: DateTime<Utc>,
}

impl OrderItem {
    /// `unit_price × quantity`
    #[must_use]
    pub const fn line_total(&self) -> Money {
        self.unit_price.times(self.quantity)
    }

    /// Whether the item still participates in order-level status
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status != FulfillmentStatus::Cancelled
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)] // Test code can use unwrap

    use super::*;

    #[test]
    fn totals_follow_formula() {
        let totals = OrderTotals::compute(
            Money::from_cents(10_000),
            Money::from_cents(1_500),
            Money::from_cents(800),
            Money::from_cents(500),
        )
        .unwrap();
        assert_eq!(totals.total, Money::from_cents(9_800));
        assert!(totals.is_consistent());

        let tampered = OrderTotals {
            total: Money::from_cents(1),
            ..totals
        };
        assert!(!tampered.is_consistent());

        let overflowing = OrderTotals::compute(
            Money::from_cents(i64::MAX - 10),
            Money::ZERO,
            Money::from_cents(8),
            Money::from_cents(5),
        );
        assert_eq!(overflowing, None);
    }

    #[test]
    fn line_total_multiplies_quantity() {
        let now = Utc::now();
        let item = OrderItem {
            id: OrderItemId::new(),
            order_id: OrderId::new(),
            product_id: ProductId::new(),
            vendor_id: UserId::new(),
            quantity: 3,
            unit_price: Money::from_cents(250),
            status: FulfillmentStatus::Pending,
            commission_rate: CommissionRate::from_percent(10),
            commission_amount: Money::from_cents(75),
            created_at: now,
            delivered_at: None,
            updated_at: now,
        };
        assert_eq!(item.line_total(), Money::from_cents(750));
        assert!(item.is_active());
    }
}
