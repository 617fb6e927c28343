//! Fan-out of ledger events into notification drafts.
//!
//! Pure: the same event always yields the same drafts with the same dedupe
//! keys. The inbox that stores them drops any draft whose key it has
//! already seen, which makes a replayed or retried transition harmless.

use marketplace_core::notification::{DedupeKey, NotificationKind, RelatedEntity};
use marketplace_core::returns::ReturnDecision;
use marketplace_core::{FulfillmentStatus, LedgerEvent, PayoutStatus, SmallVec, UserId};
use uuid::Uuid;

/// A notification before it gets an id and a timestamp
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NotificationDraft {
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
    /// `(entity, target state, recipient)`
    pub dedupe_key: DedupeKey,
}

impl NotificationDraft {
    fn new(
        recipient: UserId,
        kind: NotificationKind,
        related: RelatedEntity,
        entity: Uuid,
        target_state: &str,
        title: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            recipient,
            title: title.into(),
            message: message.into(),
            kind,
            related,
            dedupe_key: DedupeKey {
                entity,
                target_state: target_state.to_string(),
                recipient,
            },
        }
    }
}

/// Drafts produced by one event.
pub type Drafts = SmallVec<[NotificationDraft; 2]>;

/// Notifications owed for `event`, one per affected counterpart.
#[must_use]
pub fn drafts_for(event: &LedgerEvent) -> Drafts {
    let mut drafts = Drafts::new();
    match event {
        LedgerEvent::OrderPlaced { order, items } => {
            let mut vendors: Vec<UserId> = Vec::new();
            for item in items {
                if !vendors.contains(&item.vendor_id) {
                    vendors.push(item.vendor_id);
                }
            }
            for vendor in vendors {
                let lines = items.iter().filter(|i| i.vendor_id == vendor).count();
                drafts.push(NotificationDraft::new(
                    vendor,
                    NotificationKind::NewOrder,
                    RelatedEntity::Order(order.id),
                    *order.id.as_uuid(),
                    "PLACED",
                    "New order",
                    format!("Order {} includes {lines} of your item(s).", order.id),
                ));
            }
        },
        LedgerEvent::ItemStatusChanged {
            order_id,
            item_id,
            customer_id,
            to,
            ..
        } if to.is_customer_milestone() => {
            let message = match to {
                FulfillmentStatus::Shipped => "An item in your order has shipped.",
                FulfillmentStatus::ReadyForPickup => {
                    "An item in your order is ready for pickup."
                },
                FulfillmentStatus::Delivered => "An item in your order was delivered.",
                _ => "An item in your order was cancelled.",
            };
            drafts.push(NotificationDraft::new(
                *customer_id,
                NotificationKind::OrderUpdate,
                RelatedEntity::Order(*order_id),
                *item_id.as_uuid(),
                to.as_str(),
                "Order update",
                message,
            ));
        },
        LedgerEvent::PickupCodeIssued {
            order_id,
            customer_id,
            code,
            ..
        } => drafts.push(NotificationDraft::new(
            *customer_id,
            NotificationKind::PickupCode,
            RelatedEntity::Order(*order_id),
            *order_id.as_uuid(),
            "PICKUP_CODE_ISSUED",
            "Your pickup code",
            format!("Show code {code} at the pickup point to collect order {order_id}."),
        )),
        LedgerEvent::ReturnRequested { request } => drafts.push(NotificationDraft::new(
            request.vendor_id,
            NotificationKind::ReturnRequested,
            RelatedEntity::Return(request.id),
            *request.id.as_uuid(),
            request.status.as_str(),
            "Return requested",
            format!(
                "A customer asked for a {} refund ({}).",
                request.requested_amount, request.reason
            ),
        )),
        LedgerEvent::ReturnDecided {
            request_id,
            customer_id,
            decision,
            response,
            dropoff_code,
            ..
        } => {
            let message = match (decision, dropoff_code) {
                (ReturnDecision::Approve, Some(code)) => format!(
                    "Your return was approved. Drop the item off with code {code}."
                ),
                (ReturnDecision::Approve, None) => "Your return was approved.".to_string(),
                (ReturnDecision::Reject, _) => format!(
                    "Your return was rejected: {}",
                    response.as_deref().unwrap_or("no reason given")
                ),
            };
            drafts.push(NotificationDraft::new(
                *customer_id,
                NotificationKind::ReturnDecision,
                RelatedEntity::Return(*request_id),
                *request_id.as_uuid(),
                decision.target_status().as_str(),
                "Return decision",
                message,
            ));
        },
        LedgerEvent::RefundCompleted {
            request_id,
            customer_id,
            amount,
            ..
        } => drafts.push(NotificationDraft::new(
            *customer_id,
            NotificationKind::RefundCompleted,
            RelatedEntity::Return(*request_id),
            *request_id.as_uuid(),
            "COMPLETED",
            "Refund completed",
            format!("Your refund of {amount} has been issued."),
        )),
        LedgerEvent::PayoutStatusChanged {
            payout_id,
            vendor_id,
            amount,
            to,
            note,
            ..
        } if matches!(to, PayoutStatus::Completed | PayoutStatus::Failed) => {
            let mut message = if *to == PayoutStatus::Completed {
                format!("Your payout of {amount} was sent.")
            } else {
                format!("Your payout of {amount} failed.")
            };
            if let Some(note) = note {
                message.push(' ');
                message.push_str(note);
            }
            drafts.push(NotificationDraft::new(
                *vendor_id,
                NotificationKind::PayoutUpdate,
                RelatedEntity::Payout(*payout_id),
                *payout_id.as_uuid(),
                to.as_str(),
                "Payout update",
                message,
            ));
        },
        _ => {},
    }
    if !drafts.is_empty() {
        tracing::debug!(
            event = event.event_type(),
            drafts = drafts.len(),
            "notification drafts"
        );
    }
    drafts
}

#[cfg(test)]
mod tests {
    use super::*;
    use marketplace_core::{Actor, Money, OrderId, OrderItemId, PayoutId, Utc};

    fn item_moved(to: FulfillmentStatus) -> LedgerEvent {
        LedgerEvent::ItemStatusChanged {
            order_id: OrderId::new(),
            item_id: OrderItemId::new(),
            vendor_id: UserId::new(),
            customer_id: UserId::new(),
            from: FulfillmentStatus::Processing,
            to,
            actor: Actor::vendor(UserId::new()),
            at: Utc::now(),
        }
    }

    #[test]
    fn processing_is_not_a_milestone() {
        assert!(drafts_for(&item_moved(FulfillmentStatus::Processing)).is_empty());
    }

    #[test]
    fn shipping_notifies_the_customer_once() {
        let event = item_moved(FulfillmentStatus::Shipped);
        let drafts = drafts_for(&event);
        assert_eq!(drafts.len(), 1);
        let LedgerEvent::ItemStatusChanged {
            customer_id,
            item_id,
            ..
        } = event
        else {
            unreachable!()
        };
        assert_eq!(drafts[0].recipient, customer_id);
        assert_eq!(drafts[0].dedupe_key.entity, *item_id.as_uuid());
        assert_eq!(drafts[0].dedupe_key.target_state, "SHIPPED");
    }

    #[test]
    fn same_event_yields_same_key() {
        let event = item_moved(FulfillmentStatus::Delivered);
        assert_eq!(
            drafts_for(&event)[0].dedupe_key,
            drafts_for(&event)[0].dedupe_key
        );
    }

    #[test]
    fn payout_processing_is_silent() {
        let event = LedgerEvent::PayoutStatusChanged {
            payout_id: PayoutId::new(),
            vendor_id: UserId::new(),
            amount: Money::from_cents(2500),
            from: PayoutStatus::Pending,
            to: PayoutStatus::Processing,
            note: None,
            decided_by: UserId::new(),
            at: Utc::now(),
        };
        assert!(drafts_for(&event).is_empty());
    }

    #[test]
    fn failed_payout_carries_the_note() {
        let vendor = UserId::new();
        let event = LedgerEvent::PayoutStatusChanged {
            payout_id: PayoutId::new(),
            vendor_id: vendor,
            amount: Money::from_cents(2500),
            from: PayoutStatus::Processing,
            to: PayoutStatus::Failed,
            note: Some("Account closed.".into()),
            decided_by: UserId::new(),
            at: Utc::now(),
        };
        let drafts = drafts_for(&event);
        assert_eq!(drafts[0].recipient, vendor);
        assert_eq!(drafts[0].kind, NotificationKind::PayoutUpdate);
        assert!(drafts[0].message.ends_with("Account closed."));
    }
}
