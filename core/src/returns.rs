//! Customer-initiated return/refund requests.

use crate::ids::{OrderId, OrderItemId, ReturnId, UserId};
use crate::money::Money;
use crate::order::PickupCode;
use crate::status::ReturnStatus;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Why the customer wants a refund
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ReturnReason {
    /// Arrived damaged
    Damaged,
    /// Does not work
    Defective,
    /// Not what was ordered
    WrongItem,
    /// Differs from the listing
    NotAsDescribed,
    /// Customer no longer wants it
    ChangedMind,
    /// Anything else; see the description
    Other,
}

impl ReturnReason {
    /// Every reason code
    pub const ALL: [Self; 6] = [
        Self::Damaged,
        Self::Defective,
        Self::WrongItem,
        Self::NotAsDescribed,
        Self::ChangedMind,
        Self::Other,
    ];

    /// Stable reason code
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Damaged => "damaged",
            Self::Defective => "defective",
            Self::WrongItem => "wrong_item",
            Self::NotAsDescribed => "not_as_described",
            Self::ChangedMind => "changed_mind",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for ReturnReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReturnReason {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|reason| reason.as_str() == s)
            .ok_or_else(|| format!("unknown return reason `{s}`"))
    }
}

/// Outcome chosen by the vendor or an admin
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReturnDecision {
    /// Grant the refund
    Approve,
    /// Deny it; a response text is mandatory
    Reject,
}

impl ReturnDecision {
    /// Status the request moves to
    #[must_use]
    pub const fn target_status(self) -> ReturnStatus {
        match self {
            Self::Approve => ReturnStatus::Approved,
            Self::Reject => ReturnStatus::Rejected,
        }
    }
}

/// A claim against one order item.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnRequest {
    /// Identifier
    pub id: ReturnId,
    /// Order containing the item
    pub order_id: OrderId,
    /// Claimed item
    pub order_item_id: OrderItemId,
    /// Requesting customer
    pub customer_id: UserId,
    /// Vendor owning the item
    pub vendor_id: UserId,
    /// Reason code
    pub reason: ReturnReason,
    /// Free text from the customer
    pub description: String,
    /// Refund asked for; never more than the line total
    pub requested_amount: Money,
    /// Current status
    pub status: ReturnStatus,
    /// Vendor/admin response
    pub vendor_response: Option<String>,
    /// Who decided
    pub decided_by: Option<UserId>,
    /// Creation time
    pub requested_at: DateTime<Utc>,
    /// Decision time
    pub decided_at: Option<DateTime<Utc>>,
    /// Refund settlement time
    pub completed_at: Option<DateTime<Utc>>,
    /// Drop-off code issued on approval
    pub dropoff_code: Option<PickupCode>,
    /// When an agent confirmed the physical return
    pub dropped_off_at: Option<DateTime<Utc>>,
}

impl ReturnRequest {
    /// Pending, or approved and not yet completed
    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.status.is_active()
    }

    /// Deducted from the vendor's earnings
    #[must_use]
    pub const fn counts_as_refund(&self) -> bool {
        self.status.is_refund()
    }

    /// Time from request to decision, once decided
    #[must_use]
    pub fn processing_time(&self) -> Option<Duration> {
        self.decided_at.map(|decided| decided - self.requested_at)
    }

    /// Age of the request at `now`
    #[must_use]
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now - self.requested_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[allow(clippy::unwrap_used)]
    fn reason_codes_parse() {
        for reason in ReturnReason::ALL {
            assert_eq!(reason.as_str().parse::<ReturnReason>().unwrap(), reason);
        }
        assert!("lost".parse::<ReturnReason>().is_err());
    }

    #[test]
    fn decision_targets() {
        assert_eq!(ReturnDecision::Approve.target_status(), ReturnStatus::Approved);
        assert_eq!(ReturnDecision::Reject.target_status(), ReturnStatus::Rejected);
    }
}
