//! Notification records created as side effects of ledger transitions.
//!
//! Delivery (push, email) is handled elsewhere; this crate only defines the
//! record and its dedupe key.

use crate::ids::{NotificationId, OrderId, PayoutId, ReturnId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Type tag shown by the UI
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NotificationKind {
    /// A vendor received a new order line
    NewOrder,
    /// An order item reached a customer-visible milestone
    OrderUpdate,
    /// A pickup code is ready for the customer
    PickupCode,
    /// A customer asked for a return
    ReturnRequested,
    /// A return was approved or rejected
    ReturnDecision,
    /// Refund money moved back to the customer
    RefundCompleted,
    /// A payout was completed or failed
    PayoutUpdate,
}

impl NotificationKind {
    /// Stable tag
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NewOrder => "new_order",
            Self::OrderUpdate => "order_update",
            Self::PickupCode => "pickup_code",
            Self::ReturnRequested => "return_requested",
            Self::ReturnDecision => "return_decision",
            Self::RefundCompleted => "refund_completed",
            Self::PayoutUpdate => "payout_update",
        }
    }
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Entity a notification links to
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RelatedEntity {
    /// An order
    Order(OrderId),
    /// A return request
    Return(ReturnId),
    /// A payout
    Payout(PayoutId),
}

/// `(entity, transition target state, recipient)`.
///
/// A transition that is retried maps to the same key and is not delivered
/// twice.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DedupeKey {
    /// Id of the entity that transitioned (item, order, return or payout)
    pub entity: Uuid,
    /// State the entity moved into
    pub target_state: String,
    /// Recipient
    pub recipient: UserId,
}

/// Namespace for notification ids derived from dedupe keys
const NOTIFICATION_NAMESPACE: Uuid = Uuid::from_u128(0x4b1f_0c52_9e7a_5d3e_8a61_2f0d_c4e9_b713);

impl DedupeKey {
    /// Id of the notification this key produces.
    ///
    /// A UUIDv5 over the key, so replaying the same transition yields the
    /// same id.
    #[must_use]
    pub fn notification_id(&self) -> NotificationId {
        NotificationId::from_uuid(Uuid::new_v5(
            &NOTIFICATION_NAMESPACE,
            self.to_string().as_bytes(),
        ))
    }
}

impl fmt::Display for DedupeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.entity, self.target_state, self.recipient)
    }
}

/// A stored notification.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    /// Identifier
    pub id: NotificationId,
    /// Target user
    pub recipient: UserId,
    /// Short title
    pub title: String,
    /// Body
    pub message: String,
    /// Type tag
    pub kind: NotificationKind,
    /// Linked entity
    pub related: RelatedEntity,
    /// Read flag; only the recipient changes it
    pub read: bool,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Idempotency key
    pub dedupe_key: DedupeKey,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(target_state: &str, recipient: UserId, entity: Uuid) -> DedupeKey {
        DedupeKey {
            entity,
            target_state: target_state.into(),
            recipient,
        }
    }

    #[test]
    fn notification_id_is_stable_per_key() {
        let recipient = UserId::new();
        let entity = Uuid::new_v4();
        let shipped = key("SHIPPED", recipient, entity);

        assert_eq!(shipped.notification_id(), shipped.clone().notification_id());
        assert_ne!(
            shipped.notification_id(),
            key("DELIVERED", recipient, entity).notification_id()
        );
        assert_ne!(
            shipped.notification_id(),
            key("SHIPPED", UserId::new(), entity).notification_id()
        );
    }
}
