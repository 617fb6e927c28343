//! Closed status enumerations and their allowed-transition tables.
//!
//! Each state machine lists its edges in one `EDGES` table. Everything that
//! asks "may X become Y?" goes through [`Transitions::can_transition_to`],
//! which makes the forward-only, no-skipping rule mechanically checkable.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A status type whose legal moves are an explicit edge table.
pub trait Transitions: Copy + Eq + fmt::Debug + 'static {
    /// Every allowed `(from, to)` edge
    const EDGES: &'static [(Self, Self)];

    /// Whether `self → next` is an edge of the table
    fn can_transition_to(self, next: Self) -> bool {
        Self::EDGES.iter().any(|&(from, to)| from == self && to == next)
    }

    /// A state with no outgoing edge
    fn is_terminal(self) -> bool {
        !Self::EDGES.iter().any(|&(from, _)| from == self)
    }
}

/// Fulfillment status, shared by orders and order items.
///
/// ```text
/// PENDING → PROCESSING → SHIPPED ──────────┐
///                      → READY_FOR_PICKUP ─┴→ DELIVERED
/// (any non-terminal) → CANCELLED
/// ```
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FulfillmentStatus {
    /// Placed, not yet accepted by the vendor
    Pending,
    /// Accepted and being prepared
    Processing,
    /// Handed to a carrier
    Shipped,
    /// Waiting at the agent's pickup point
    ReadyForPickup,
    /// Received by the customer
    Delivered,
    /// Cancelled before delivery
    Cancelled,
}

impl FulfillmentStatus {
    /// All states, in lifecycle order
    pub const ALL: [Self; 6] = [
        Self::Pending,
        Self::Processing,
        Self::Shipped,
        Self::ReadyForPickup,
        Self::Delivered,
        Self::Cancelled,
    ];

    /// Upper-case wire name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Processing => "PROCESSING",
            Self::Shipped => "SHIPPED",
            Self::ReadyForPickup => "READY_FOR_PICKUP",
            Self::Delivered => "DELIVERED",
            Self::Cancelled => "CANCELLED",
        }
    }

    /// Whether the customer should hear about reaching this state
    #[must_use]
    pub const fn is_customer_milestone(self) -> bool {
        matches!(
            self,
            Self::Shipped | Self::ReadyForPickup | Self::Delivered | Self::Cancelled
        )
    }

    /// Whether an agent (pickup point) may perform the move into this state
    #[must_use]
    pub const fn is_handover_step(self) -> bool {
        matches!(self, Self::ReadyForPickup | Self::Delivered)
    }
}

impl Transitions for FulfillmentStatus {
    const EDGES: &'static [(Self, Self)] = &[
        (Self::Pending, Self::Processing),
        (Self::Processing, Self::Shipped),
        (Self::Processing, Self::ReadyForPickup),
        (Self::Shipped, Self::Delivered),
        (Self::ReadyForPickup, Self::Delivered),
        (Self::Pending, Self::Cancelled),
        (Self::Processing, Self::Cancelled),
        (Self::Shipped, Self::Cancelled),
        (Self::ReadyForPickup, Self::Cancelled),
    ];
}

impl fmt::Display for FulfillmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payment status, set by the (external) payment gateway callback.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PaymentStatus {
    /// Awaiting the gateway
    Pending,
    /// Captured; order amounts are frozen from here on
    Completed,
    /// Declined; the customer may retry
    Failed,
    /// Returned to the customer by the gateway
    Refunded,
}

impl PaymentStatus {
    /// Upper-case wire name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
            Self::Refunded => "REFUNDED",
        }
    }
}

impl Transitions for PaymentStatus {
    const EDGES: &'static [(Self, Self)] = &[
        (Self::Pending, Self::Completed),
        (Self::Pending, Self::Failed),
        (Self::Failed, Self::Completed),
        (Self::Completed, Self::Refunded),
    ];
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Return/refund request status.
///
/// ```text
/// PENDING → APPROVED → COMPLETED
///         → REJECTED
/// ```
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReturnStatus {
    /// Awaiting a vendor/admin decision
    Pending,
    /// Granted; refund not yet settled with the customer
    Approved,
    /// Denied
    Rejected,
    /// Money has moved back to the customer
    Completed,
}

impl ReturnStatus {
    /// Upper-case wire name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Approved => "APPROVED",
            Self::Rejected => "REJECTED",
            Self::Completed => "COMPLETED",
        }
    }

    /// Pending or approved-but-not-completed
    #[must_use]
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Pending | Self::Approved)
    }

    /// Approved or completed; deducted from the vendor's earnings
    #[must_use]
    pub const fn is_refund(self) -> bool {
        matches!(self, Self::Approved | Self::Completed)
    }

    /// A decision has been taken
    #[must_use]
    pub const fn is_decided(self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl Transitions for ReturnStatus {
    const EDGES: &'static [(Self, Self)] = &[
        (Self::Pending, Self::Approved),
        (Self::Pending, Self::Rejected),
        (Self::Approved, Self::Completed),
    ];
}

impl fmt::Display for ReturnStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payout status.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PayoutStatus {
    /// Requested, awaiting admin review
    Pending,
    /// Under admin review / transfer initiated
    Processing,
    /// Money has moved to the vendor
    Completed,
    /// Rejected or transfer failed
    Failed,
}

impl PayoutStatus {
    /// Upper-case wire name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Processing => "PROCESSING",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
        }
    }

    /// Still counted as a provisional hold against the balance
    #[must_use]
    pub const fn is_hold(self) -> bool {
        matches!(self, Self::Pending | Self::Processing)
    }
}

impl Transitions for PayoutStatus {
    const EDGES: &'static [(Self, Self)] = &[
        (Self::Pending, Self::Processing),
        (Self::Pending, Self::Completed),
        (Self::Pending, Self::Failed),
        (Self::Processing, Self::Completed),
        (Self::Processing, Self::Failed),
    ];
}

impl fmt::Display for PayoutStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn rank(status: FulfillmentStatus) -> usize {
        match status {
            FulfillmentStatus::Pending => 0,
            FulfillmentStatus::Processing => 1,
            FulfillmentStatus::Shipped | FulfillmentStatus::ReadyForPickup => 2,
            FulfillmentStatus::Delivered => 3,
            FulfillmentStatus::Cancelled => 4,
        }
    }

    #[test]
    fn fulfillment_happy_paths() {
        use FulfillmentStatus::*;
        assert!(Pending.can_transition_to(Processing));
        assert!(Processing.can_transition_to(Shipped));
        assert!(Processing.can_transition_to(ReadyForPickup));
        assert!(Shipped.can_transition_to(Delivered));
        assert!(ReadyForPickup.can_transition_to(Delivered));
    }

    #[test]
    fn fulfillment_rejects_skips_and_backwards() {
        use FulfillmentStatus::*;
        assert!(!Pending.can_transition_to(Delivered));
        assert!(!Pending.can_transition_to(Shipped));
        assert!(!Shipped.can_transition_to(Processing));
        assert!(!Shipped.can_transition_to(ReadyForPickup));
        assert!(!Delivered.can_transition_to(Cancelled));
    }

    #[test]
    fn terminal_states() {
        assert!(FulfillmentStatus::Delivered.is_terminal());
        assert!(FulfillmentStatus::Cancelled.is_terminal());
        assert!(!FulfillmentStatus::Shipped.is_terminal());
        assert!(ReturnStatus::Completed.is_terminal());
        assert!(ReturnStatus::Rejected.is_terminal());
        assert!(PayoutStatus::Completed.is_terminal());
        assert!(PaymentStatus::Refunded.is_terminal());
        assert!(!PaymentStatus::Failed.is_terminal());
    }

    #[test]
    fn cancellation_reachable_from_every_non_terminal_state() {
        for status in FulfillmentStatus::ALL {
            if !status.is_terminal() {
                assert!(status.can_transition_to(FulfillmentStatus::Cancelled), "{status}");
            }
        }
    }

    #[test]
    fn return_cannot_be_decided_twice() {
        assert!(!ReturnStatus::Approved.can_transition_to(ReturnStatus::Approved));
        assert!(!ReturnStatus::Rejected.can_transition_to(ReturnStatus::Approved));
        assert!(!ReturnStatus::Completed.can_transition_to(ReturnStatus::Completed));
    }

    fn any_status() -> impl Strategy<Value = FulfillmentStatus> {
        prop::sample::select(FulfillmentStatus::ALL.to_vec())
    }

    proptest! {
        #[test]
        fn non_cancel_edges_advance_exactly_one_rank(from in any_status(), to in any_status()) {
            if from.can_transition_to(to) && to != FulfillmentStatus::Cancelled {
                prop_assert_eq!(rank(to), rank(from) + 1);
            }
        }

        #[test]
        fn moves_more_than_one_edge_forward_are_rejected(from in any_status(), to in any_status()) {
            if to != FulfillmentStatus::Cancelled && rank(to) > rank(from) + 1 {
                prop_assert!(!from.can_transition_to(to));
            }
        }
    }
}
