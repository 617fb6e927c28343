//! Domain events: the facts recorded for every accepted transition.
//!
//! A [`LedgerEvent`] is produced by a reducer, appended to its stream, then
//! applied to the in-memory ledger and broadcast to subscribers. Replaying
//! every stored event in append order rebuilds the ledger.
//!
//! Events are stored as `bincode` bytes tagged with a versioned type name
//! such as `"ItemStatusChanged.v1"`.

use crate::actor::Actor;
use crate::ids::{NotificationId, OrderId, OrderItemId, PayoutId, ReturnId, UserId};
use crate::money::Money;
use crate::order::{Order, OrderItem, PickupCode};
use crate::payout::Payout;
use crate::returns::{ReturnDecision, ReturnRequest};
use crate::status::{FulfillmentStatus, PaymentStatus, PayoutStatus};
use crate::stream::StreamId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Errors encoding or decoding stored events.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EventError {
    /// Encoding failed
    #[error("failed to serialize event: {0}")]
    SerializationError(String),

    /// Bytes did not decode
    #[error("failed to deserialize event: {0}")]
    DeserializationError(String),

    /// Decoded event does not match its stored type tag
    #[error("event type mismatch: stored {stored}, decoded {decoded}")]
    TypeMismatch {
        /// Tag recorded alongside the bytes
        stored: String,
        /// Tag of the decoded value
        decoded: &'static str,
    },
}

/// Every fact the ledger records.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerEvent {
    /// Checkout completed: an order and all its items
    OrderPlaced {
        /// The order as created
        order: Order,
        /// Its items, with frozen prices and commission
        items: Vec<OrderItem>,
    },

    /// Gateway callback moved the payment status
    PaymentStatusChanged {
        /// Order
        order_id: OrderId,
        /// Previous status
        from: PaymentStatus,
        /// New status
        to: PaymentStatus,
        /// Time of the change
        at: DateTime<Utc>,
    },

    /// One item advanced along the fulfillment table
    ItemStatusChanged {
        /// Order
        order_id: OrderId,
        /// Item
        item_id: OrderItemId,
        /// Vendor owning the item
        vendor_id: UserId,
        /// Customer of the order
        customer_id: UserId,
        /// Previous status
        from: FulfillmentStatus,
        /// New status
        to: FulfillmentStatus,
        /// Who performed the transition
        actor: Actor,
        /// Time of the change
        at: DateTime<Utc>,
    },

    /// Persisted order-level status changed
    OrderStatusChanged {
        /// Order
        order_id: OrderId,
        /// Previous status
        from: FulfillmentStatus,
        /// New status
        to: FulfillmentStatus,
        /// Time of the change
        at: DateTime<Utc>,
    },

    /// A pickup code was reserved for the order
    PickupCodeIssued {
        /// Order
        order_id: OrderId,
        /// Customer who will present the code
        customer_id: UserId,
        /// The code
        code: PickupCode,
        /// Time of issue
        at: DateTime<Utc>,
    },

    /// An agent consumed the pickup code
    PickupCodeConsumed {
        /// Order
        order_id: OrderId,
        /// The code, released from the active index
        code: PickupCode,
        /// Agent who confirmed the handover
        agent_id: UserId,
        /// Time of handover
        at: DateTime<Utc>,
    },

    /// A customer asked for a refund
    ReturnRequested {
        /// The request as created
        request: ReturnRequest,
    },

    /// The vendor or an admin decided a request
    ReturnDecided {
        /// Request
        request_id: ReturnId,
        /// Order containing the item
        order_id: OrderId,
        /// Claimed item
        order_item_id: OrderItemId,
        /// Requesting customer
        customer_id: UserId,
        /// Vendor owning the item
        vendor_id: UserId,
        /// Approve or reject
        decision: ReturnDecision,
        /// Response text
        response: Option<String>,
        /// Who decided
        decided_by: Actor,
        /// Drop-off code issued with an approval
        dropoff_code: Option<PickupCode>,
        /// Decision time
        at: DateTime<Utc>,
    },

    /// An agent received the returned goods
    ReturnDroppedOff {
        /// Request
        request_id: ReturnId,
        /// The drop-off code, released from the active index
        code: PickupCode,
        /// Agent who confirmed
        agent_id: UserId,
        /// Time of drop-off
        at: DateTime<Utc>,
    },

    /// Refund money reached the customer
    RefundCompleted {
        /// Request
        request_id: ReturnId,
        /// Refunded customer
        customer_id: UserId,
        /// Vendor whose balance carries the deduction
        vendor_id: UserId,
        /// Refunded amount
        amount: Money,
        /// Completion time
        at: DateTime<Utc>,
    },

    /// A vendor requested a payout
    PayoutRequested {
        /// The payout as created
        payout: Payout,
    },

    /// An admin moved a payout along its table
    PayoutStatusChanged {
        /// Payout
        payout_id: PayoutId,
        /// Vendor owning the payout
        vendor_id: UserId,
        /// Amount, for notifications and analytics
        amount: Money,
        /// Previous status
        from: PayoutStatus,
        /// New status
        to: PayoutStatus,
        /// Admin note
        note: Option<String>,
        /// Admin who acted
        decided_by: UserId,
        /// Time of the change
        at: DateTime<Utc>,
    },

    /// A user marked one of their notifications read
    NotificationRead {
        /// Notification
        notification_id: NotificationId,
        /// Its owner
        recipient: UserId,
        /// When it was marked
        at: DateTime<Utc>,
    },
}

impl LedgerEvent {
    /// Versioned type tag used in storage
    #[must_use]
    pub const fn event_type(&self) -> &'static str {
        match self {
            Self::OrderPlaced { .. } => "OrderPlaced.v1",
            Self::PaymentStatusChanged { .. } => "PaymentStatusChanged.v1",
            Self::ItemStatusChanged { .. } => "ItemStatusChanged.v1",
            Self::OrderStatusChanged { .. } => "OrderStatusChanged.v1",
            Self::PickupCodeIssued { .. } => "PickupCodeIssued.v1",
            Self::PickupCodeConsumed { .. } => "PickupCodeConsumed.v1",
            Self::ReturnRequested { .. } => "ReturnRequested.v1",
            Self::ReturnDecided { .. } => "ReturnDecided.v1",
            Self::ReturnDroppedOff { .. } => "ReturnDroppedOff.v1",
            Self::RefundCompleted { .. } => "RefundCompleted.v1",
            Self::PayoutRequested { .. } => "PayoutRequested.v1",
            Self::PayoutStatusChanged { .. } => "PayoutStatusChanged.v1",
            Self::NotificationRead { .. } => "NotificationRead.v1",
        }
    }

    /// Stream the event is appended to
    #[must_use]
    pub fn stream_id(&self) -> StreamId {
        match self {
            Self::OrderPlaced { order, .. } => StreamId::order(order.id),
            Self::PaymentStatusChanged { order_id, .. }
            | Self::ItemStatusChanged { order_id, .. }
            | Self::OrderStatusChanged { order_id, .. }
            | Self::PickupCodeIssued { order_id, .. }
            | Self::PickupCodeConsumed { order_id, .. } => StreamId::order(*order_id),
            Self::ReturnRequested { request } => StreamId::return_request(request.id),
            Self::ReturnDecided { request_id, .. }
            | Self::ReturnDroppedOff { request_id, .. }
            | Self::RefundCompleted { request_id, .. } => StreamId::return_request(*request_id),
            Self::PayoutRequested { payout } => StreamId::payouts(payout.vendor_id),
            Self::PayoutStatusChanged { vendor_id, .. } => StreamId::payouts(*vendor_id),
            Self::NotificationRead { recipient, .. } => StreamId::notifications(*recipient),
        }
    }

    /// When the fact happened
    #[must_use]
    pub fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            Self::OrderPlaced { order, .. } => order.placed_at,
            Self::ReturnRequested { request } => request.requested_at,
            Self::PayoutRequested { payout } => payout.requested_at,
            Self::PaymentStatusChanged { at, .. }
            | Self::ItemStatusChanged { at, .. }
            | Self::OrderStatusChanged { at, .. }
            | Self::PickupCodeIssued { at, .. }
            | Self::PickupCodeConsumed { at, .. }
            | Self::ReturnDecided { at, .. }
            | Self::ReturnDroppedOff { at, .. }
            | Self::RefundCompleted { at, .. }
            | Self::PayoutStatusChanged { at, .. }
            | Self::NotificationRead { at, .. } => *at,
        }
    }

    /// Encodes the event for storage, attaching optional metadata
    ///
    /// # Errors
    ///
    /// [`EventError::SerializationError`] if bincode rejects the value.
    pub fn to_serialized(
        &self,
        metadata: Option<serde_json::Value>,
    ) -> Result<SerializedEvent, EventError> {
        let data =
            bincode::serialize(self).map_err(|e| EventError::SerializationError(e.to_string()))?;
        Ok(SerializedEvent::new(
            self.event_type().to_string(),
            data,
            metadata,
        ))
    }

    /// Decodes a stored event and checks its type tag
    ///
    /// # Errors
    ///
    /// - [`EventError::DeserializationError`] for corrupt bytes
    /// - [`EventError::TypeMismatch`] if the tag disagrees with the payload
    pub fn from_serialized(stored: &SerializedEvent) -> Result<Self, EventError> {
        let event: Self = bincode::deserialize(&stored.data)
            .map_err(|e| EventError::DeserializationError(e.to_string()))?;
        if event.event_type() != stored.event_type {
            return Err(EventError::TypeMismatch {
                stored: stored.event_type.clone(),
                decoded: event.event_type(),
            });
        }
        Ok(event)
    }
}

/// Wire format between the ledger and an event store.
#[derive(Clone, Debug, PartialEq)]
pub struct SerializedEvent {
    /// Versioned type tag, e.g. `"ReturnDecided.v1"`
    pub event_type: String,
    /// bincode payload
    pub data: Vec<u8>,
    /// Optional JSON metadata (actor, correlation id)
    pub metadata: Option<serde_json::Value>,
}

impl SerializedEvent {
    /// Creates a serialized event
    #[must_use]
    pub const fn new(
        event_type: String,
        data: Vec<u8>,
        metadata: Option<serde_json::Value>,
    ) -> Self {
        Self {
            event_type,
            data,
            metadata,
        }
    }
}

impl fmt::Display for SerializedEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} bytes)", self.event_type, self.data.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor::Actor;

    fn item_shipped() -> LedgerEvent {
        LedgerEvent::ItemStatusChanged {
            order_id: OrderId::new(),
            item_id: OrderItemId::new(),
            vendor_id: UserId::new(),
            customer_id: UserId::new(),
            from: FulfillmentStatus::Processing,
            to: FulfillmentStatus::Shipped,
            actor: Actor::vendor(UserId::new()),
            at: Utc::now(),
        }
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn stored_event_decodes() {
        let event = item_shipped();
        let metadata = serde_json::json!({ "actor": "vendor" });
        let stored = event.to_serialized(Some(metadata.clone())).unwrap();
        assert_eq!(stored.event_type, "ItemStatusChanged.v1");
        assert_eq!(stored.metadata, Some(metadata));
        assert_eq!(LedgerEvent::from_serialized(&stored).unwrap(), event);
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn tag_mismatch_is_rejected() {
        let mut stored = item_shipped().to_serialized(None).unwrap();
        stored.event_type = "OrderPlaced.v1".to_string();
        assert!(matches!(
            LedgerEvent::from_serialized(&stored),
            Err(EventError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn corrupt_bytes_are_rejected() {
        let stored = SerializedEvent::new("OrderPlaced.v1".into(), vec![0xff; 3], None);
        assert!(LedgerEvent::from_serialized(&stored).is_err());
    }

    #[test]
    fn payout_events_share_the_vendor_stream() {
        let vendor = UserId::new();
        let event = LedgerEvent::PayoutStatusChanged {
            payout_id: PayoutId::new(),
            vendor_id: vendor,
            amount: Money::from_cents(3000),
            from: PayoutStatus::Pending,
            to: PayoutStatus::Completed,
            note: None,
            decided_by: UserId::new(),
            at: Utc::now(),
        };
        assert_eq!(event.stream_id(), StreamId::payouts(vendor));
    }
}
