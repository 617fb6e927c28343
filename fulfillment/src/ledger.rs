//! The in-memory ledger: current state of every order, item, return and
//! payout, rebuilt by folding [`LedgerEvent`]s.
//!
//! `Ledger` is the only place entity state changes, and it only changes
//! through [`Apply::apply`]. Reducers read it; they never write it.

use marketplace_core::error::EntityKind;
use marketplace_core::order::{Order, OrderItem, PickupCode};
use marketplace_core::payout::Payout;
use marketplace_core::returns::ReturnRequest;
use marketplace_core::{
    Apply, FulfillmentStatus, LedgerEvent, MarketResult, MarketplaceError, OrderId, OrderItemId,
    PayoutId, PayoutStatus, ReturnId, ReturnStatus, StreamId, Transitions, UserId, Version,
};
use std::collections::HashMap;

/// What an active pickup/drop-off code is reserved for
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum CodeHolder {
    /// Order pickup
    Order(OrderId),
    /// Return drop-off
    Return(ReturnId),
}

/// Current ledger state.
#[derive(Clone, Debug, Default)]
pub struct Ledger {
    orders: HashMap<OrderId, Order>,
    items: HashMap<OrderItemId, OrderItem>,
    items_by_order: HashMap<OrderId, Vec<OrderItemId>>,
    returns: HashMap<ReturnId, ReturnRequest>,
    returns_by_item: HashMap<OrderItemId, Vec<ReturnId>>,
    payouts: HashMap<PayoutId, Payout>,
    payouts_by_vendor: HashMap<UserId, Vec<PayoutId>>,
    active_codes: HashMap<PickupCode, CodeHolder>,
    versions: HashMap<StreamId, Version>,
}

impl Ledger {
    /// Empty ledger
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Order by id
    #[must_use]
    pub fn order(&self, id: OrderId) -> Option<&Order> {
        self.orders.get(&id)
    }

    /// Order by id, or `NotFound`
    ///
    /// # Errors
    ///
    /// [`MarketplaceError::NotFound`] for an unknown id.
    pub fn require_order(&self, id: OrderId) -> MarketResult<&Order> {
        self.order(id)
            .ok_or_else(|| MarketplaceError::not_found(EntityKind::Order, id))
    }

    /// Every order
    pub fn orders(&self) -> impl Iterator<Item = &Order> {
        self.orders.values()
    }

    /// Item by id
    #[must_use]
    pub fn item(&self, id: OrderItemId) -> Option<&OrderItem> {
        self.items.get(&id)
    }

    /// Item by id, or `NotFound`
    ///
    /// # Errors
    ///
    /// [`MarketplaceError::NotFound`] for an unknown id.
    pub fn require_item(&self, id: OrderItemId) -> MarketResult<&OrderItem> {
        self.item(id)
            .ok_or_else(|| MarketplaceError::not_found(EntityKind::OrderItem, id))
    }

    /// Items of an order, in checkout order
    pub fn order_items(&self, order: OrderId) -> impl Iterator<Item = &OrderItem> {
        self.items_by_order
            .get(&order)
            .into_iter()
            .flatten()
            .filter_map(|id| self.items.get(id))
    }

    /// Every item
    pub fn items(&self) -> impl Iterator<Item = &OrderItem> {
        self.items.values()
    }

    /// Items sold by a vendor
    pub fn vendor_items(&self, vendor: UserId) -> impl Iterator<Item = &OrderItem> {
        self.items.values().filter(move |item| item.vendor_id == vendor)
    }

    /// Return request by id
    #[must_use]
    pub fn return_request(&self, id: ReturnId) -> Option<&ReturnRequest> {
        self.returns.get(&id)
    }

    /// Return request by id, or `NotFound`
    ///
    /// # Errors
    ///
    /// [`MarketplaceError::NotFound`] for an unknown id.
    pub fn require_return(&self, id: ReturnId) -> MarketResult<&ReturnRequest> {
        self.return_request(id)
            .ok_or_else(|| MarketplaceError::not_found(EntityKind::Return, id))
    }

    /// Every return request
    pub fn returns(&self) -> impl Iterator<Item = &ReturnRequest> {
        self.returns.values()
    }

    /// Return requests filed against an item, oldest first
    pub fn item_returns(&self, item: OrderItemId) -> impl Iterator<Item = &ReturnRequest> {
        self.returns_by_item
            .get(&item)
            .into_iter()
            .flatten()
            .filter_map(|id| self.returns.get(id))
    }

    /// The pending or approved-but-not-completed request on an item
    #[must_use]
    pub fn active_return(&self, item: OrderItemId) -> Option<&ReturnRequest> {
        self.item_returns(item).find(|request| request.is_active())
    }

    /// Payout by id
    #[must_use]
    pub fn payout(&self, id: PayoutId) -> Option<&Payout> {
        self.payouts.get(&id)
    }

    /// Payout by id, or `NotFound`
    ///
    /// # Errors
    ///
    /// [`MarketplaceError::NotFound`] for an unknown id.
    pub fn require_payout(&self, id: PayoutId) -> MarketResult<&Payout> {
        self.payout(id)
            .ok_or_else(|| MarketplaceError::not_found(EntityKind::Payout, id))
    }

    /// Every payout
    pub fn payouts(&self) -> impl Iterator<Item = &Payout> {
        self.payouts.values()
    }

    /// A vendor's payouts, oldest first
    pub fn vendor_payouts(&self, vendor: UserId) -> impl Iterator<Item = &Payout> {
        self.payouts_by_vendor
            .get(&vendor)
            .into_iter()
            .flatten()
            .filter_map(|id| self.payouts.get(id))
    }

    /// What an active code is reserved for
    #[must_use]
    pub fn code_holder(&self, code: &PickupCode) -> Option<CodeHolder> {
        self.active_codes.get(code).copied()
    }

    /// Number of codes currently reserved
    #[must_use]
    pub fn active_code_count(&self) -> usize {
        self.active_codes.len()
    }

    /// Current version of a stream; [`Version::INITIAL`] if never written
    #[must_use]
    pub fn version(&self, stream: &StreamId) -> Version {
        self.versions.get(stream).copied().unwrap_or(Version::INITIAL)
    }

    fn release_code(&mut self, code: &PickupCode) {
        self.active_codes.remove(code);
    }
}

impl Apply<LedgerEvent> for Ledger {
    #[allow(clippy::too_many_lines)]
    fn apply(&mut self, event: &LedgerEvent) {
        match event {
            LedgerEvent::OrderPlaced { order, items } => {
                let ids = items.iter().map(|item| item.id).collect();
                self.items_by_order.insert(order.id, ids);
                for item in items {
                    self.items.insert(item.id, item.clone());
                }
                self.orders.insert(order.id, order.clone());
            },
            LedgerEvent::PaymentStatusChanged { order_id, to, at, .. } => {
                if let Some(order) = self.orders.get_mut(order_id) {
                    order.payment_status = *to;
                    order.updated_at = *at;
                }
            },
            LedgerEvent::ItemStatusChanged { item_id, to, at, .. } => {
                if let Some(item) = self.items.get_mut(item_id) {
                    item.status = *to;
                    item.updated_at = *at;
                    if *to == FulfillmentStatus::Delivered {
                        item.delivered_at = Some(*at);
                    }
                }
            },
            LedgerEvent::OrderStatusChanged { order_id, to, at, .. } => {
                let mut released = None;
                if let Some(order) = self.orders.get_mut(order_id) {
                    order.status = *to;
                    order.updated_at = *at;
                    // A delivered or cancelled order can no longer be
                    // picked up, whichever path got it there.
                    if to.is_terminal() {
                        released = order.pickup_code.take();
                    }
                }
                if let Some(code) = released {
                    self.release_code(&code);
                }
            },
            LedgerEvent::PickupCodeIssued { order_id, code, at, .. } => {
                if let Some(order) = self.orders.get_mut(order_id) {
                    order.pickup_code = Some(code.clone());
                    order.updated_at = *at;
                }
                self.active_codes
                    .insert(code.clone(), CodeHolder::Order(*order_id));
            },
            LedgerEvent::PickupCodeConsumed { order_id, code, at, .. } => {
                if let Some(order) = self.orders.get_mut(order_id) {
                    order.pickup_code = None;
                    order.pickup_code_consumed_at = Some(*at);
                    order.updated_at = *at;
                }
                self.release_code(code);
            },
            LedgerEvent::ReturnRequested { request } => {
                self.returns_by_item
                    .entry(request.order_item_id)
                    .or_default()
                    .push(request.id);
                self.returns.insert(request.id, request.clone());
            },
            LedgerEvent::ReturnDecided {
                request_id,
                decision,
                response,
                decided_by,
                dropoff_code,
                at,
                ..
            } => {
                if let Some(request) = self.returns.get_mut(request_id) {
                    request.status = decision.target_status();
                    request.vendor_response.clone_from(response);
                    request.decided_by = Some(decided_by.user_id);
                    request.decided_at = Some(*at);
                    request.dropoff_code.clone_from(dropoff_code);
                }
                if let Some(code) = dropoff_code {
                    self.active_codes
                        .insert(code.clone(), CodeHolder::Return(*request_id));
                }
            },
            LedgerEvent::ReturnDroppedOff {
                request_id, code, at, ..
            } => {
                if let Some(request) = self.returns.get_mut(request_id) {
                    request.dropped_off_at = Some(*at);
                }
                self.release_code(code);
            },
            LedgerEvent::RefundCompleted { request_id, at, .. } => {
                let mut released = None;
                if let Some(request) = self.returns.get_mut(request_id) {
                    request.status = ReturnStatus::Completed;
                    request.completed_at = Some(*at);
                    if request.dropped_off_at.is_none() {
                        released.clone_from(&request.dropoff_code);
                    }
                }
                if let Some(code) = released {
                    self.release_code(&code);
                }
            },
            LedgerEvent::PayoutRequested { payout } => {
                self.payouts_by_vendor
                    .entry(payout.vendor_id)
                    .or_default()
                    .push(payout.id);
                self.payouts.insert(payout.id, payout.clone());
            },
            LedgerEvent::PayoutStatusChanged {
                payout_id,
                to,
                note,
                at,
                ..
            } => {
                if let Some(payout) = self.payouts.get_mut(payout_id) {
                    payout.status = *to;
                    if matches!(to, PayoutStatus::Completed | PayoutStatus::Failed) {
                        payout.decided_at = Some(*at);
                    }
                    if note.is_some() {
                        payout.note.clone_from(note);
                    }
                }
            },
            // Read marks belong to the notification inbox; only the stream
            // version moves here.
            LedgerEvent::NotificationRead { .. } => {},
        }

        let stream = event.stream_id();
        let next = self.version(&stream).next();
        self.versions.insert(stream, next);
    }
}
