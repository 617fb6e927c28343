//! Vendor settlement, recomputed from the ledger on every read.
//!
//! ```text
//! gross      = Σ line totals of DELIVERED items
//! commission = Σ frozen commission of the same items
//! refunded   = Σ APPROVED + COMPLETED refunds on the vendor's items
//! net        = gross - commission - refunded
//! paid_out   = Σ COMPLETED payouts
//! held       = Σ PENDING + PROCESSING payouts
//! available  = net - paid_out - held
//! ```
//!
//! Pending and processing payouts are provisional holds: a second request
//! sees a balance already reduced by the first.

use crate::ledger::Ledger;
use crate::returns::refunded_on_item;
use marketplace_core::{FulfillmentStatus, Money, OrderItemId, PayoutStatus, UserId};
use serde::{Deserialize, Serialize};

/// A vendor's balance and how it is composed
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VendorBalance {
    /// Vendor
    pub vendor_id: UserId,
    /// Line totals of delivered items
    pub gross: Money,
    /// Frozen commission of delivered items
    pub commission: Money,
    /// Approved and completed refunds
    pub refunded: Money,
    /// `gross - commission - refunded`
    pub net: Money,
    /// Completed payouts
    pub paid_out: Money,
    /// Pending and processing payouts
    pub held: Money,
    /// `net - paid_out - held`
    pub available: Money,
}

impl VendorBalance {
    /// Largest payout that may be requested now
    #[must_use]
    pub const fn withdrawable(&self) -> Money {
        self.available.clamp_non_negative()
    }
}

/// Computes a vendor's balance from the current ledger.
#[must_use]
pub fn vendor_balance(ledger: &Ledger, vendor: UserId) -> VendorBalance {
    let (gross, commission) = ledger
        .vendor_items(vendor)
        .filter(|item| item.status == FulfillmentStatus::Delivered)
        .fold((Money::ZERO, Money::ZERO), |(gross, commission), item| {
            (gross + item.line_total(), commission + item.commission_amount)
        });

    let refunded: Money = ledger
        .returns()
        .filter(|request| request.vendor_id == vendor && request.counts_as_refund())
        .map(|request| request.requested_amount)
        .sum();

    let (paid_out, held) =
        ledger
            .vendor_payouts(vendor)
            .fold((Money::ZERO, Money::ZERO), |(paid, held), payout| {
                match payout.status {
                    PayoutStatus::Completed => (paid + payout.amount, held),
                    PayoutStatus::Pending | PayoutStatus::Processing => {
                        (paid, held + payout.amount)
                    },
                    PayoutStatus::Failed => (paid, held),
                }
            });

    let net = gross - commission - refunded;
    VendorBalance {
        vendor_id: vendor,
        gross,
        commission,
        refunded,
        net,
        paid_out,
        held,
        available: net - paid_out - held,
    }
}

/// Net earnings contributed by one item: line total minus frozen commission
/// minus its refunds. Zero until the item is delivered.
#[must_use]
pub fn item_net_contribution(ledger: &Ledger, item: OrderItemId) -> Money {
    let Some(item) = ledger.item(item) else {
        return Money::ZERO;
    };
    if item.status != FulfillmentStatus::Delivered {
        return Money::ZERO;
    }
    item.line_total() - item.commission_amount - refunded_on_item(ledger, item.id)
}
