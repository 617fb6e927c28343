//! Per-user notification inbox.
//!
//! Drafts are accepted at most once per [`DedupeKey`]; a retried or replayed
//! transition produces the same key and is dropped here. Notification ids
//! derive from the key, so an inbox rebuilt from the event log carries the
//! same ids, and replayed read marks land on the right rows.

use marketplace_core::notification::{DedupeKey, Notification};
use marketplace_core::{
    Actor, DateTime, EntityKind, MarketResult, MarketplaceError, NotificationId, UserId, Utc,
};
use marketplace_fulfillment::NotificationDraft;
use std::collections::{HashMap, HashSet};

/// Stored notifications, newest last per recipient.
#[derive(Debug, Default)]
pub struct NotificationInbox {
    by_recipient: HashMap<UserId, Vec<Notification>>,
    seen: HashSet<DedupeKey>,
}

impl NotificationInbox {
    /// Empty inbox
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `draft` unless its dedupe key was already delivered.
    ///
    /// Returns the stored notification, or `None` on a dedupe hit.
    pub fn deliver(
        &mut self,
        draft: NotificationDraft,
        created_at: DateTime<Utc>,
    ) -> Option<&Notification> {
        if !self.seen.insert(draft.dedupe_key.clone()) {
            tracing::debug!(key = %draft.dedupe_key, "duplicate notification dropped");
            return None;
        }
        let list = self.by_recipient.entry(draft.recipient).or_default();
        list.push(Notification {
            id: draft.dedupe_key.notification_id(),
            recipient: draft.recipient,
            title: draft.title,
            message: draft.message,
            kind: draft.kind,
            related: draft.related,
            read: false,
            created_at,
            dedupe_key: draft.dedupe_key,
        });
        list.last()
    }

    /// A user's notifications, newest first
    #[must_use]
    pub fn for_user(&self, user: UserId) -> Vec<Notification> {
        self.by_recipient
            .get(&user)
            .map(|list| list.iter().rev().cloned().collect())
            .unwrap_or_default()
    }

    /// Unread notifications of a user
    #[must_use]
    pub fn unread_count(&self, user: UserId) -> usize {
        self.by_recipient
            .get(&user)
            .map_or(0, |list| list.iter().filter(|n| !n.read).count())
    }

    /// The caller's own notification.
    ///
    /// # Errors
    ///
    /// - `NotFound` if no user has such a notification
    /// - `Forbidden` if it belongs to someone else
    pub fn find_own(&self, actor: Actor, id: NotificationId) -> MarketResult<&Notification> {
        if let Some(own) = self
            .by_recipient
            .get(&actor.user_id)
            .and_then(|list| list.iter().find(|n| n.id == id))
        {
            return Ok(own);
        }
        let foreign = self
            .by_recipient
            .values()
            .flatten()
            .any(|notification| notification.id == id);
        if foreign {
            Err(MarketplaceError::forbidden(actor, "read another user's notification"))
        } else {
            Err(MarketplaceError::not_found(EntityKind::Notification, id))
        }
    }

    /// Sets the read flag of `recipient`'s notification `id`.
    ///
    /// Returns whether the flag changed; unknown ids are ignored.
    pub fn set_read(&mut self, recipient: UserId, id: NotificationId) -> bool {
        match self
            .by_recipient
            .get_mut(&recipient)
            .and_then(|list| list.iter_mut().find(|n| n.id == id))
        {
            Some(notification) if !notification.read => {
                notification.read = true;
                true
            },
            _ => false,
        }
    }

    /// Number of stored notifications across all users
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_recipient.values().map(Vec::len).sum()
    }

    /// Whether nothing was delivered yet
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_recipient.is_empty()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used, clippy::unwrap_used)] // Test code can use unwrap/expect

    use super::*;
    use marketplace_core::notification::{NotificationKind, RelatedEntity};
    use marketplace_core::{OrderId, Role};

    fn draft(recipient: UserId, order: OrderId) -> NotificationDraft {
        NotificationDraft {
            recipient,
            title: "New order".into(),
            message: "You have 1 new item to prepare".into(),
            kind: NotificationKind::NewOrder,
            related: RelatedEntity::Order(order),
            dedupe_key: DedupeKey {
                entity: *order.as_uuid(),
                target_state: "PLACED".into(),
                recipient,
            },
        }
    }

    #[test]
    fn same_key_is_delivered_once() {
        let mut inbox = NotificationInbox::new();
        let vendor = UserId::new();
        let order = OrderId::new();

        assert!(inbox.deliver(draft(vendor, order), Utc::now()).is_some());
        assert!(inbox.deliver(draft(vendor, order), Utc::now()).is_none());
        assert_eq!(inbox.len(), 1);
        assert_eq!(inbox.unread_count(vendor), 1);
    }

    #[test]
    fn only_the_owner_marks_read() {
        let mut inbox = NotificationInbox::new();
        let vendor = UserId::new();
        let id = inbox
            .deliver(draft(vendor, OrderId::new()), Utc::now())
            .unwrap()
            .id;

        let stranger = Actor::new(UserId::new(), Role::Vendor);
        assert_eq!(inbox.find_own(stranger, id).unwrap_err().code(), "FORBIDDEN");

        let owner = Actor::vendor(vendor);
        assert!(!inbox.find_own(owner, id).unwrap().read);
        assert!(inbox.set_read(vendor, id));
        assert!(!inbox.set_read(vendor, id));
        assert!(inbox.find_own(owner, id).unwrap().read);
        assert_eq!(inbox.unread_count(vendor), 0);

        assert_eq!(
            inbox.find_own(owner, NotificationId::new()).unwrap_err().code(),
            "NOT_FOUND"
        );
    }

    #[test]
    fn ids_follow_the_dedupe_key() {
        let vendor = UserId::new();
        let order = OrderId::new();
        let mut first = NotificationInbox::new();
        let mut rebuilt = NotificationInbox::new();

        let id = first.deliver(draft(vendor, order), Utc::now()).unwrap().id;
        let again = rebuilt.deliver(draft(vendor, order), Utc::now()).unwrap().id;

        assert_eq!(id, again);
        assert_eq!(id, draft(vendor, order).dedupe_key.notification_id());
    }
}
