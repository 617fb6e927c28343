//! Order state machine: checkout, payment callbacks, per-item fulfillment,
//! pickup codes and cancellation.
//!
//! Items move independently along the fulfillment table. The persisted order
//! status follows them: when every non-cancelled item shares a status the
//! order adopts it, and when every item is cancelled the order is cancelled.
//! A mixed order keeps its last persisted status; the `Mixed` label exists
//! only in [`DisplayStatus`], computed at read time.

use crate::environment::LedgerEnvironment;
use crate::ledger::Ledger;
use marketplace_core::order::{Order, OrderItem, OrderTotals, PickupCode};
use marketplace_core::{
    Actor, CommissionRate, ConflictError, Events, FulfillmentStatus, LedgerEvent, MarketResult,
    MarketplaceError, Money, OrderId, OrderItemId, PaymentStatus, PreconditionFailed, ProductId,
    Reducer, Role, Transitions, UserId, ValidationError, smallvec,
};
use serde::{Deserialize, Serialize};

/// One line of a checkout
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    /// Product
    pub product_id: ProductId,
    /// Vendor selling it
    pub vendor_id: UserId,
    /// Units
    pub quantity: u32,
    /// Current unit price
    pub unit_price: Money,
    /// Vendor's current commission rate; required
    pub commission_rate: Option<CommissionRate>,
}

/// Checkout input
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaceOrder {
    /// Id for the new order
    pub order_id: OrderId,
    /// Pickup point chosen by the customer
    pub agent_id: UserId,
    /// Lines, at least one
    pub lines: Vec<OrderLine>,
    /// Discount
    pub discount: Money,
    /// Tax
    pub tax: Money,
    /// Shipping
    pub shipping: Money,
    /// Coupon applied
    pub coupon: Option<String>,
    /// Total shown to the customer, if it should be cross-checked
    pub expected_total: Option<Money>,
}

/// Commands handled by [`OrderReducer`]
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OrderCommand {
    /// Create an order and its items
    PlaceOrder {
        /// Customer placing the order
        actor: Actor,
        /// Checkout input
        order: PlaceOrder,
    },
    /// Gateway callback
    RecordPaymentStatus {
        /// Order
        order_id: OrderId,
        /// Reported status
        status: PaymentStatus,
    },
    /// Move one item one edge forward (or to CANCELLED)
    AdvanceItemStatus {
        /// Item
        item_id: OrderItemId,
        /// Status the caller saw before deciding
        observed: FulfillmentStatus,
        /// Requested status
        to: FulfillmentStatus,
        /// Caller
        actor: Actor,
    },
    /// Reserve a pickup code, or keep the active one
    IssuePickupCode {
        /// Order
        order_id: OrderId,
        /// Caller
        actor: Actor,
    },
    /// Agent confirms handover with the customer's code
    VerifyAndConsumeCode {
        /// Order
        order_id: OrderId,
        /// Code presented
        code: String,
        /// Caller
        actor: Actor,
    },
    /// Cancel the whole order
    CancelOrder {
        /// Order
        order_id: OrderId,
        /// Caller
        actor: Actor,
    },
}

/// Order-level status as displayed
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DisplayStatus {
    /// All active items agree
    Uniform(FulfillmentStatus),
    /// Items are at different stages
    Mixed,
}

/// An order with its items and display status
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OrderView {
    /// The order
    pub order: Order,
    /// Its items, in checkout order
    pub items: Vec<OrderItem>,
    /// Read-time status
    pub display_status: DisplayStatus,
}

/// Builds the read view of an order.
///
/// # Errors
///
/// `NotFound` for an unknown order.
pub fn order_view(ledger: &Ledger, order_id: OrderId) -> MarketResult<OrderView> {
    let order = ledger.require_order(order_id)?.clone();
    let items: Vec<OrderItem> = ledger.order_items(order_id).cloned().collect();
    let display_status = adopted_status(items.iter().map(|item| item.status))
        .map_or(DisplayStatus::Mixed, DisplayStatus::Uniform);
    Ok(OrderView {
        order,
        items,
        display_status,
    })
}

/// Status an order adopts given its item statuses: the shared status of the
/// non-cancelled items, CANCELLED when all are cancelled, `None` when the
/// active items disagree.
#[must_use]
pub fn adopted_status<I>(statuses: I) -> Option<FulfillmentStatus>
where
    I: IntoIterator<Item = FulfillmentStatus>,
{
    let mut any = false;
    let mut shared: Option<FulfillmentStatus> = None;
    for status in statuses {
        any = true;
        if status == FulfillmentStatus::Cancelled {
            continue;
        }
        match shared {
            None => shared = Some(status),
            Some(existing) if existing != status => return None,
            Some(_) => {},
        }
    }
    match shared {
        Some(status) => Some(status),
        None if any => Some(FulfillmentStatus::Cancelled),
        None => None,
    }
}

/// Reducer for [`OrderCommand`]
#[derive(Clone, Copy, Debug, Default)]
pub struct OrderReducer;

impl OrderReducer {
    /// Creates the reducer
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn place_order(
        actor: Actor,
        input: PlaceOrder,
        env: &LedgerEnvironment,
    ) -> MarketResult<Events<LedgerEvent>> {
        if actor.role != Role::Customer {
            return Err(MarketplaceError::forbidden(actor, "place an order"));
        }
        if input.lines.is_empty() {
            return Err(ValidationError::EmptyOrder.into());
        }
        for (field, amount) in [
            ("discount", input.discount),
            ("tax", input.tax),
            ("shipping", input.shipping),
        ] {
            if amount.is_negative() {
                return Err(ValidationError::NegativeAmount { field, amount }.into());
            }
        }

        let now = env.clock.now();
        let mut items = Vec::with_capacity(input.lines.len());
        for (line, entry) in input.lines.iter().enumerate() {
            if entry.quantity == 0 {
                return Err(ValidationError::ZeroQuantity { line }.into());
            }
            if !entry.unit_price.is_positive() {
                return Err(ValidationError::NonPositivePrice {
                    line,
                    price: entry.unit_price,
                }
                .into());
            }
            let rate = entry
                .commission_rate
                .ok_or(ValidationError::MissingCommission { line })?;
            if !rate.is_valid() {
                return Err(ValidationError::CommissionOutOfRange { line, rate }.into());
            }
            let line_total = entry
                .unit_price
                .checked_times(entry.quantity)
                .ok_or(ValidationError::LineTotalOverflow { line })?;
            items.push(OrderItem {
                id: OrderItemId::new(),
                order_id: input.order_id,
                product_id: entry.product_id,
                vendor_id: entry.vendor_id,
                quantity: entry.quantity,
                unit_price: entry.unit_price,
                status: FulfillmentStatus::Pending,
                commission_rate: rate,
                commission_amount: rate.commission_on(line_total),
                created_at: now,
                delivered_at: None,
                updated_at: now,
            });
        }

        let subtotal = items
            .iter()
            .try_fold(Money::ZERO, |sum, item| sum.checked_add(item.line_total()))
            .ok_or(ValidationError::TotalOverflow)?;
        if input.discount > subtotal {
            return Err(ValidationError::DiscountExceedsSubtotal {
                discount: input.discount,
                subtotal,
            }
            .into());
        }
        let totals = OrderTotals::compute(subtotal, input.discount, input.tax, input.shipping)
            .ok_or(ValidationError::TotalOverflow)?;
        if let Some(expected) = input.expected_total {
            if expected != totals.total {
                return Err(ValidationError::TotalMismatch {
                    expected,
                    computed: totals.total,
                }
                .into());
            }
        }

        let order = Order {
            id: input.order_id,
            customer_id: actor.user_id,
            agent_id: input.agent_id,
            status: FulfillmentStatus::Pending,
            payment_status: PaymentStatus::Pending,
            totals,
            pickup_code: None,
            pickup_code_consumed_at: None,
            coupon: input.coupon,
            placed_at: now,
            updated_at: now,
        };
        Ok(smallvec![LedgerEvent::OrderPlaced { order, items }])
    }

    fn record_payment_status(
        state: &Ledger,
        order_id: OrderId,
        status: PaymentStatus,
        env: &LedgerEnvironment,
    ) -> MarketResult<Events<LedgerEvent>> {
        let order = state.require_order(order_id)?;
        if !order.payment_status.can_transition_to(status) {
            return Err(PreconditionFailed::InvalidPaymentTransition {
                order: order_id,
                current: order.payment_status,
                requested: status,
            }
            .into());
        }
        Ok(smallvec![LedgerEvent::PaymentStatusChanged {
            order_id,
            from: order.payment_status,
            to: status,
            at: env.clock.now(),
        }])
    }

    fn authorize_item_transition(
        actor: Actor,
        item: &OrderItem,
        order: &Order,
        to: FulfillmentStatus,
    ) -> MarketResult<()> {
        let allowed = match actor.role {
            Role::Admin => true,
            Role::Vendor => {
                actor.user_id == item.vendor_id && to != FulfillmentStatus::Delivered
            },
            Role::Agent => actor.user_id == order.agent_id && to.is_handover_step(),
            Role::Customer => false,
        };
        if allowed {
            Ok(())
        } else {
            Err(MarketplaceError::forbidden(actor, "advance item status"))
        }
    }

    fn advance_item_status(
        state: &Ledger,
        item_id: OrderItemId,
        observed: FulfillmentStatus,
        to: FulfillmentStatus,
        actor: Actor,
        env: &LedgerEnvironment,
    ) -> MarketResult<Events<LedgerEvent>> {
        let item = state.require_item(item_id)?;
        let order = state.require_order(item.order_id)?;
        Self::authorize_item_transition(actor, item, order, to)?;

        if item.status != observed {
            return Err(ConflictError::StaleState {
                entity: item_id.to_string(),
                observed: observed.as_str(),
                current: item.status.as_str(),
            }
            .into());
        }
        if order.status == FulfillmentStatus::Cancelled {
            return Err(PreconditionFailed::OrderCancelled { order: order.id }.into());
        }
        if !item.status.can_transition_to(to) {
            return Err(PreconditionFailed::InvalidItemTransition {
                item: item_id,
                current: item.status,
                requested: to,
            }
            .into());
        }

        let now = env.clock.now();
        let mut events: Events<LedgerEvent> = smallvec![LedgerEvent::ItemStatusChanged {
            order_id: order.id,
            item_id,
            vendor_id: item.vendor_id,
            customer_id: order.customer_id,
            from: item.status,
            to,
            actor,
            at: now,
        }];
        let projected = state.order_items(order.id).map(|other| {
            if other.id == item_id { to } else { other.status }
        });
        Self::follow_items(state, order, adopted_status(projected), env, &mut events)?;
        Ok(events)
    }

    /// Appends the order-level consequences of item changes: adopting a new
    /// status and, once the order is under way, issuing the pickup code.
    /// Items can outrun each other, so the order may skip straight from
    /// PENDING to a later stage.
    fn follow_items(
        state: &Ledger,
        order: &Order,
        adopted: Option<FulfillmentStatus>,
        env: &LedgerEnvironment,
        events: &mut Events<LedgerEvent>,
    ) -> MarketResult<()> {
        let Some(next) = adopted.filter(|next| *next != order.status) else {
            return Ok(());
        };
        let now = env.clock.now();
        events.push(LedgerEvent::OrderStatusChanged {
            order_id: order.id,
            from: order.status,
            to: next,
            at: now,
        });
        if matches!(
            next,
            FulfillmentStatus::Processing
                | FulfillmentStatus::Shipped
                | FulfillmentStatus::ReadyForPickup
        ) && order.pickup_code.is_none()
            && order.pickup_code_consumed_at.is_none()
        {
            events.push(LedgerEvent::PickupCodeIssued {
                order_id: order.id,
                customer_id: order.customer_id,
                code: env.allocate_code(state, &[])?,
                at: now,
            });
        }
        Ok(())
    }

    fn issue_pickup_code(
        state: &Ledger,
        order_id: OrderId,
        actor: Actor,
        env: &LedgerEnvironment,
    ) -> MarketResult<Events<LedgerEvent>> {
        let order = state.require_order(order_id)?;
        let allowed = actor.is_admin()
            || actor.is(Role::Agent, order.agent_id)
            || (actor.role == Role::Vendor
                && state
                    .order_items(order_id)
                    .any(|item| item.vendor_id == actor.user_id));
        if !allowed {
            return Err(MarketplaceError::forbidden(actor, "issue a pickup code"));
        }
        if order.status == FulfillmentStatus::Cancelled {
            return Err(PreconditionFailed::OrderCancelled { order: order_id }.into());
        }
        if order.pickup_code_consumed_at.is_some() {
            return Err(PreconditionFailed::CodeAlreadyConsumed { order: order_id }.into());
        }
        if matches!(
            order.status,
            FulfillmentStatus::Pending | FulfillmentStatus::Delivered
        ) {
            return Err(PreconditionFailed::OrderNotAwaitingPickup {
                order: order_id,
                current: order.status,
            }
            .into());
        }
        if order.pickup_code.is_some() {
            return Ok(Events::new());
        }
        Ok(smallvec![LedgerEvent::PickupCodeIssued {
            order_id,
            customer_id: order.customer_id,
            code: env.allocate_code(state, &[])?,
            at: env.clock.now(),
        }])
    }

    fn verify_and_consume_code(
        state: &Ledger,
        order_id: OrderId,
        code: &str,
        actor: Actor,
        env: &LedgerEnvironment,
    ) -> MarketResult<Events<LedgerEvent>> {
        let order = state.require_order(order_id)?;
        if !(actor.is_admin() || actor.is(Role::Agent, order.agent_id)) {
            return Err(MarketplaceError::forbidden(actor, "confirm a pickup"));
        }
        if order.status == FulfillmentStatus::Cancelled {
            return Err(PreconditionFailed::OrderCancelled { order: order_id }.into());
        }
        if order.pickup_code_consumed_at.is_some() {
            return Err(PreconditionFailed::CodeAlreadyConsumed { order: order_id }.into());
        }
        let Some(active) = order.pickup_code.as_ref() else {
            return Err(PreconditionFailed::OrderNotAwaitingPickup {
                order: order_id,
                current: order.status,
            }
            .into());
        };
        if active.as_str() != code.trim() {
            return Err(ValidationError::InvalidCode.into());
        }
        let active_items: Vec<&OrderItem> =
            state.order_items(order_id).filter(|item| item.is_active()).collect();
        if let Some(blocked) = active_items.iter().find(|item| {
            !matches!(
                item.status,
                FulfillmentStatus::Shipped | FulfillmentStatus::ReadyForPickup
            )
        }) {
            return Err(PreconditionFailed::ItemsNotReady {
                order: order_id,
                item: blocked.id,
                current: blocked.status,
            }
            .into());
        }

        let now = env.clock.now();
        let mut events: Events<LedgerEvent> = smallvec![LedgerEvent::PickupCodeConsumed {
            order_id,
            code: PickupCode::clone(active),
            agent_id: actor.user_id,
            at: now,
        }];
        events.extend(active_items.iter().map(|item| LedgerEvent::ItemStatusChanged {
            order_id,
            item_id: item.id,
            vendor_id: item.vendor_id,
            customer_id: order.customer_id,
            from: item.status,
            to: FulfillmentStatus::Delivered,
            actor,
            at: now,
        }));
        if order.status != FulfillmentStatus::Delivered {
            events.push(LedgerEvent::OrderStatusChanged {
                order_id,
                from: order.status,
                to: FulfillmentStatus::Delivered,
                at: now,
            });
        }
        Ok(events)
    }

    fn cancel_order(
        state: &Ledger,
        order_id: OrderId,
        actor: Actor,
        env: &LedgerEnvironment,
    ) -> MarketResult<Events<LedgerEvent>> {
        let order = state.require_order(order_id)?;
        if !(actor.is_admin() || actor.is(Role::Customer, order.customer_id)) {
            return Err(MarketplaceError::forbidden(actor, "cancel the order"));
        }
        if order.status == FulfillmentStatus::Cancelled {
            return Err(PreconditionFailed::OrderCancelled { order: order_id }.into());
        }
        if !order.is_cancellable() {
            return Err(PreconditionFailed::OrderNotCancellable {
                order: order_id,
                current: order.status,
            }
            .into());
        }
        if let Some(delivered) = state
            .order_items(order_id)
            .find(|item| item.status == FulfillmentStatus::Delivered)
        {
            return Err(PreconditionFailed::ItemAlreadyDelivered {
                order: order_id,
                item: delivered.id,
            }
            .into());
        }

        let now = env.clock.now();
        let mut events: Events<LedgerEvent> = state
            .order_items(order_id)
            .filter(|item| !item.status.is_terminal())
            .map(|item| LedgerEvent::ItemStatusChanged {
                order_id,
                item_id: item.id,
                vendor_id: item.vendor_id,
                customer_id: order.customer_id,
                from: item.status,
                to: FulfillmentStatus::Cancelled,
                actor,
                at: now,
            })
            .collect();
        events.push(LedgerEvent::OrderStatusChanged {
            order_id,
            from: order.status,
            to: FulfillmentStatus::Cancelled,
            at: now,
        });
        Ok(events)
    }
}

impl Reducer for OrderReducer {
    type State = Ledger;
    type Command = OrderCommand;
    type Event = LedgerEvent;
    type Environment = LedgerEnvironment;

    fn reduce(
        &self,
        state: &Ledger,
        command: OrderCommand,
        env: &LedgerEnvironment,
    ) -> MarketResult<Events<LedgerEvent>> {
        match command {
            OrderCommand::PlaceOrder { actor, order } => Self::place_order(actor, order, env),
            OrderCommand::RecordPaymentStatus { order_id, status } => {
                Self::record_payment_status(state, order_id, status, env)
            },
            OrderCommand::AdvanceItemStatus {
                item_id,
                observed,
                to,
                actor,
            } => Self::advance_item_status(state, item_id, observed, to, actor, env),
            OrderCommand::IssuePickupCode { order_id, actor } => {
                Self::issue_pickup_code(state, order_id, actor, env)
            },
            OrderCommand::VerifyAndConsumeCode {
                order_id,
                code,
                actor,
            } => Self::verify_and_consume_code(state, order_id, &code, actor, env),
            OrderCommand::CancelOrder { order_id, actor } => {
                Self::cancel_order(state, order_id, actor, env)
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use FulfillmentStatus::*;

    #[test]
    fn uniform_items_are_adopted() {
        assert_eq!(adopted_status([Shipped, Shipped]), Some(Shipped));
    }

    #[test]
    fn cancelled_items_do_not_block_adoption() {
        assert_eq!(adopted_status([Cancelled, Delivered]), Some(Delivered));
        assert_eq!(adopted_status([Cancelled, Cancelled]), Some(Cancelled));
    }

    #[test]
    fn disagreeing_items_are_mixed() {
        assert_eq!(adopted_status([Processing, Shipped]), None);
        assert_eq!(adopted_status([Shipped, ReadyForPickup]), None);
    }

    #[test]
    fn no_items_adopts_nothing() {
        assert_eq!(adopted_status(std::iter::empty()), None);
    }
}
