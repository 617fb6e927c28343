//! Error taxonomy for every ledger operation.
//!
//! Business rule violations are values, never panics. Each variant carries
//! enough structure (current vs. requested status, limit exceeded, existing
//! request id) for a caller to render a specific message.
//!
//! | class | retried automatically |
//! |---|---|
//! | [`ValidationError`] | never |
//! | [`PreconditionFailed`] | never |
//! | [`ConflictError`] | yes, after re-reading |
//! | `InsufficientBalance` | never |
//! | `Internal` | never; logged, detail hidden from `Display` |

use crate::actor::Actor;
use crate::event_store::EventStoreError;
use crate::ids::{OrderId, OrderItemId, PayoutId, ReturnId};
use crate::money::{CommissionRate, Money};
use crate::status::{FulfillmentStatus, PaymentStatus, PayoutStatus, ReturnStatus};
use chrono::{DateTime, Utc};
use std::fmt;
use thiserror::Error;

/// Malformed input.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Checkout without lines
    #[error("an order needs at least one item")]
    EmptyOrder,

    /// Line with quantity 0
    #[error("line {line} has zero quantity")]
    ZeroQuantity {
        /// Zero-based line index
        line: usize,
    },

    /// Line with a zero or negative unit price
    #[error("line {line} has non-positive unit price {price}")]
    NonPositivePrice {
        /// Zero-based line index
        line: usize,
        /// Offending price
        price: Money,
    },

    /// No commission rate snapshot for a line
    #[error("line {line} has no commission rate snapshot")]
    MissingCommission {
        /// Zero-based line index
        line: usize,
    },

    /// Commission rate above 100%
    #[error("line {line} has commission rate {rate} outside 0-100%")]
    CommissionOutOfRange {
        /// Zero-based line index
        line: usize,
        /// Offending rate
        rate: CommissionRate,
    },

    /// Negative discount, tax or shipping
    #[error("{field} must not be negative, got {amount}")]
    NegativeAmount {
        /// Field name
        field: &'static str,
        /// Offending amount
        amount: Money,
    },

    /// Discount larger than subtotal
    #[error("discount {discount} exceeds subtotal {subtotal}")]
    DiscountExceedsSubtotal {
        /// Requested discount
        discount: Money,
        /// Computed subtotal
        subtotal: Money,
    },

    /// Caller-supplied total differs from the computed one
    #[error("expected total {expected} but subtotal - discount + tax + shipping is {computed}")]
    TotalMismatch {
        /// Caller's figure
        expected: Money,
        /// Computed figure
        computed: Money,
    },

    /// `unit_price × quantity` does not fit in an amount
    #[error("line {line} total overflows the representable amount")]
    LineTotalOverflow {
        /// Zero-based line index
        line: usize,
    },

    /// Subtotal or order total does not fit in an amount
    #[error("order total overflows the representable amount")]
    TotalOverflow,

    /// Refund of zero or less
    #[error("refund amount must be positive, got {amount}")]
    NonPositiveRefund {
        /// Offending amount
        amount: Money,
    },

    /// Refund larger than what remains refundable on the line
    #[error("refund {requested} exceeds refundable amount {refundable} (line total {line_total})")]
    RefundExceedsLineTotal {
        /// Requested refund
        requested: Money,
        /// Line total minus refunds already granted
        refundable: Money,
        /// Unit price × quantity
        line_total: Money,
    },

    /// Rejection without a reason
    #[error("a rejection needs a reason")]
    MissingRejectionReason,

    /// Payout amount of zero or less
    #[error("payout amount must be positive, got {amount}")]
    NonPositivePayout {
        /// Offending amount
        amount: Money,
    },

    /// Payout below the platform threshold
    #[error("payout {requested} is below the minimum of {minimum}")]
    BelowMinimumPayout {
        /// Requested amount
        requested: Money,
        /// Configured minimum
        minimum: Money,
    },

    /// Pickup/drop-off code that does not match
    #[error("code does not match")]
    InvalidCode,

    /// Missing bank field
    #[error("bank details are incomplete")]
    IncompleteBankDetails,
}

/// The entity is not in a state that allows the operation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PreconditionFailed {
    /// Edge not in the fulfillment table
    #[error("item {item} cannot move from {current} to {requested}")]
    InvalidItemTransition {
        /// Item
        item: OrderItemId,
        /// Current status
        current: FulfillmentStatus,
        /// Requested status
        requested: FulfillmentStatus,
    },

    /// The order has been cancelled
    #[error("order {order} is cancelled")]
    OrderCancelled {
        /// Order
        order: OrderId,
    },

    /// Cancellation only while PENDING or PROCESSING
    #[error("order {order} is {current} and can no longer be cancelled")]
    OrderNotCancellable {
        /// Order
        order: OrderId,
        /// Current status
        current: FulfillmentStatus,
    },

    /// Cancelling would undo a delivery
    #[error("item {item} of order {order} is already delivered")]
    ItemAlreadyDelivered {
        /// Order
        order: OrderId,
        /// Delivered item
        item: OrderItemId,
    },

    /// Pickup codes exist only once fulfillment has started
    #[error("order {order} is {current}; no pickup code can be issued")]
    OrderNotAwaitingPickup {
        /// Order
        order: OrderId,
        /// Current status
        current: FulfillmentStatus,
    },

    /// Handover attempted while an item is not shipped or ready
    #[error("item {item} of order {order} is {current}, not ready for handover")]
    ItemsNotReady {
        /// Order
        order: OrderId,
        /// First item that is not ready
        item: OrderItemId,
        /// Its status
        current: FulfillmentStatus,
    },

    /// The pickup code was already used
    #[error("pickup code for order {order} was already used")]
    CodeAlreadyConsumed {
        /// Order
        order: OrderId,
    },

    /// Edge not in the payment table
    #[error("payment of order {order} cannot move from {current} to {requested}")]
    InvalidPaymentTransition {
        /// Order
        order: OrderId,
        /// Current payment status
        current: PaymentStatus,
        /// Requested payment status
        requested: PaymentStatus,
    },

    /// Returns are only possible on delivered items
    #[error("item {item} is {current}; only delivered items can be returned")]
    ItemNotDelivered {
        /// Item
        item: OrderItemId,
        /// Current status
        current: FulfillmentStatus,
    },

    /// Return requested after the policy window
    #[error("return window for item {item} closed at {closed_at}")]
    ReturnWindowClosed {
        /// Item
        item: OrderItemId,
        /// End of the window
        closed_at: DateTime<Utc>,
    },

    /// An active request already exists for the item
    #[error("item already has an active return request {existing}")]
    DuplicateReturn {
        /// The active request
        existing: ReturnId,
    },

    /// Decision attempted on a decided request
    #[error("return {request} was already decided: {current}")]
    AlreadyDecided {
        /// Request
        request: ReturnId,
        /// Status it was decided into
        current: ReturnStatus,
    },

    /// Completion or drop-off attempted before approval
    #[error("return {request} is {current}, not approved")]
    NotApproved {
        /// Request
        request: ReturnId,
        /// Current status
        current: ReturnStatus,
    },

    /// Completion attempted twice
    #[error("refund for return {request} is already completed")]
    AlreadyCompleted {
        /// Request
        request: ReturnId,
    },

    /// Drop-off confirmed twice
    #[error("drop-off for return {request} was already confirmed")]
    DropoffAlreadyConfirmed {
        /// Request
        request: ReturnId,
    },

    /// Edge not in the payout table
    #[error("payout {payout} cannot move from {current} to {requested}")]
    InvalidPayoutTransition {
        /// Payout
        payout: PayoutId,
        /// Current status
        current: PayoutStatus,
        /// Requested status
        requested: PayoutStatus,
    },
}

/// A concurrent mutation was detected. Re-read and retry.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConflictError {
    /// The entity no longer has the status the caller observed
    #[error("{entity} changed concurrently: observed {observed}, now {current}")]
    StaleState {
        /// Entity id
        entity: String,
        /// Status the caller based its decision on
        observed: &'static str,
        /// Status found at commit time
        current: &'static str,
    },

    /// The stream moved past the expected version
    #[error("stream {stream} was modified concurrently")]
    Concurrent {
        /// Stream name
        stream: String,
    },
}

/// Entity family named by [`MarketplaceError::NotFound`]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum EntityKind {
    /// Order
    Order,
    /// Order item
    OrderItem,
    /// Return request
    Return,
    /// Payout
    Payout,
    /// Notification
    Notification,
    /// Active pickup/drop-off code
    Code,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Order => "order",
            Self::OrderItem => "order item",
            Self::Return => "return request",
            Self::Payout => "payout",
            Self::Notification => "notification",
            Self::Code => "code",
        })
    }
}

/// Result error of every ledger operation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MarketplaceError {
    /// Malformed input
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// Wrong current state
    #[error("precondition failed: {0}")]
    PreconditionFailed(#[from] PreconditionFailed),

    /// Concurrent mutation
    #[error("conflict: {0}")]
    Conflict(#[from] ConflictError),

    /// Payout larger than the available balance
    #[error("insufficient balance: requested {requested}, available {available}")]
    InsufficientBalance {
        /// Requested payout
        requested: Money,
        /// Balance after holds
        available: Money,
    },

    /// Unknown id
    #[error("{entity} {id} not found")]
    NotFound {
        /// Entity family
        entity: EntityKind,
        /// Looked-up id
        id: String,
    },

    /// The actor may not perform the action
    #[error("{actor} may not {action}")]
    Forbidden {
        /// Caller
        actor: Actor,
        /// Attempted action
        action: &'static str,
    },

    /// No unique code found within the bounded attempts
    #[error("could not generate a unique code after {attempts} attempts")]
    PickupCodeExhausted {
        /// Attempts made
        attempts: u32,
    },

    /// Unexpected persistence failure. `detail` is for logs only.
    #[error("internal error; the operation was not applied")]
    Internal {
        /// Cause, never shown to the caller
        detail: String,
    },
}

impl MarketplaceError {
    /// Shorthand for [`MarketplaceError::NotFound`]
    pub fn not_found(entity: EntityKind, id: impl fmt::Display) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Shorthand for [`MarketplaceError::Forbidden`]
    #[must_use]
    pub const fn forbidden(actor: Actor, action: &'static str) -> Self {
        Self::Forbidden { actor, action }
    }

    /// Shorthand for [`MarketplaceError::Internal`]
    pub fn internal(detail: impl Into<String>) -> Self {
        Self::Internal {
            detail: detail.into(),
        }
    }

    /// Stable machine-readable code
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::PreconditionFailed(_) => "PRECONDITION_FAILED",
            Self::Conflict(_) => "CONFLICT",
            Self::InsufficientBalance { .. } => "INSUFFICIENT_BALANCE",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::Forbidden { .. } => "FORBIDDEN",
            Self::PickupCodeExhausted { .. } => "PICKUP_CODE_EXHAUSTED",
            Self::Internal { .. } => "INTERNAL_ERROR",
        }
    }

    /// Whether re-reading and retrying may succeed
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }
}

impl From<EventStoreError> for MarketplaceError {
    fn from(error: EventStoreError) -> Self {
        match error {
            EventStoreError::ConcurrencyConflict { stream_id, .. } => {
                Self::Conflict(ConflictError::Concurrent {
                    stream: stream_id.to_string(),
                })
            },
            other => Self::internal(other.to_string()),
        }
    }
}
