//! Return/refund adjudication.
//!
//! ```text
//! PENDING → APPROVED → COMPLETED
//!         → REJECTED
//! ```
//!
//! At most one request per item is active at a time. Approval issues a
//! drop-off code for the physical return; completion records that money went
//! back to the customer and does not wait for the drop-off.

use crate::environment::LedgerEnvironment;
use crate::ledger::Ledger;
use marketplace_core::returns::{ReturnDecision, ReturnReason, ReturnRequest};
use marketplace_core::{
    Actor, DateTime, Duration, Events, FulfillmentStatus, LedgerEvent, MarketResult,
    MarketplaceError, Money, OrderItemId, PreconditionFailed, Reducer, ReturnId, ReturnStatus,
    Role, UserId, Utc, ValidationError, smallvec,
};

/// Commands handled by [`ReturnReducer`]
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReturnCommand {
    /// Customer files a claim against a delivered item
    RequestReturn {
        /// Id for the new request
        request_id: ReturnId,
        /// Claimed item
        order_item_id: OrderItemId,
        /// Reason code
        reason: ReturnReason,
        /// Free text
        description: String,
        /// Refund asked for
        requested_amount: Money,
        /// Customer
        actor: Actor,
    },
    /// Vendor or admin approves or rejects
    Decide {
        /// Request
        request_id: ReturnId,
        /// Verdict
        decision: ReturnDecision,
        /// Response text; mandatory for a rejection
        response: Option<String>,
        /// Caller
        actor: Actor,
    },
    /// Agent receives the returned goods
    ConfirmDropoff {
        /// Request
        request_id: ReturnId,
        /// Code presented
        code: String,
        /// Caller
        actor: Actor,
    },
    /// Payment gateway reports the refund as paid
    Complete {
        /// Request
        request_id: ReturnId,
        /// Caller
        actor: Actor,
    },
}

/// A pending request and how long it has been waiting
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PendingReturnAge {
    /// Request
    pub request_id: ReturnId,
    /// Vendor expected to decide
    pub vendor_id: UserId,
    /// Time since the request
    pub age: Duration,
}

/// Pending requests, oldest first.
#[must_use]
pub fn pending_return_ages(ledger: &Ledger, now: DateTime<Utc>) -> Vec<PendingReturnAge> {
    let mut ages: Vec<PendingReturnAge> = ledger
        .returns()
        .filter(|request| request.status == ReturnStatus::Pending)
        .map(|request| PendingReturnAge {
            request_id: request.id,
            vendor_id: request.vendor_id,
            age: request.age(now),
        })
        .collect();
    ages.sort_by(|a, b| b.age.cmp(&a.age));
    ages
}

/// Sum of approved and completed refunds on an item
#[must_use]
pub fn refunded_on_item(ledger: &Ledger, item: OrderItemId) -> Money {
    ledger
        .item_returns(item)
        .filter(|request| request.counts_as_refund())
        .map(|request| request.requested_amount)
        .sum()
}

/// Reducer for [`ReturnCommand`]
#[derive(Clone, Copy, Debug, Default)]
pub struct ReturnReducer;

impl ReturnReducer {
    /// Creates the reducer
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    #[allow(clippy::too_many_arguments)]
    fn request_return(
        state: &Ledger,
        request_id: ReturnId,
        order_item_id: OrderItemId,
        reason: ReturnReason,
        description: String,
        requested_amount: Money,
        actor: Actor,
        env: &LedgerEnvironment,
    ) -> MarketResult<Events<LedgerEvent>> {
        if !requested_amount.is_positive() {
            return Err(ValidationError::NonPositiveRefund {
                amount: requested_amount,
            }
            .into());
        }
        let item = state.require_item(order_item_id)?;
        let order = state.require_order(item.order_id)?;
        if !actor.is(Role::Customer, order.customer_id) {
            return Err(MarketplaceError::forbidden(actor, "request a return"));
        }
        if item.status != FulfillmentStatus::Delivered {
            return Err(PreconditionFailed::ItemNotDelivered {
                item: item.id,
                current: item.status,
            }
            .into());
        }
        if let Some(existing) = state.active_return(item.id) {
            return Err(PreconditionFailed::DuplicateReturn {
                existing: existing.id,
            }
            .into());
        }

        let now = env.clock.now();
        let delivered_at = item.delivered_at.unwrap_or(item.updated_at);
        let closed_at = delivered_at + env.config.return_window();
        if now > closed_at {
            return Err(PreconditionFailed::ReturnWindowClosed {
                item: item.id,
                closed_at,
            }
            .into());
        }

        let line_total = item.line_total();
        let refundable = line_total - refunded_on_item(state, item.id);
        if requested_amount > refundable {
            return Err(ValidationError::RefundExceedsLineTotal {
                requested: requested_amount,
                refundable,
                line_total,
            }
            .into());
        }

        Ok(smallvec![LedgerEvent::ReturnRequested {
            request: ReturnRequest {
                id: request_id,
                order_id: order.id,
                order_item_id: item.id,
                customer_id: order.customer_id,
                vendor_id: item.vendor_id,
                reason,
                description: description.trim().to_string(),
                requested_amount,
                status: ReturnStatus::Pending,
                vendor_response: None,
                decided_by: None,
                requested_at: now,
                decided_at: None,
                completed_at: None,
                dropoff_code: None,
                dropped_off_at: None,
            },
        }])
    }

    fn decide(
        state: &Ledger,
        request_id: ReturnId,
        decision: ReturnDecision,
        response: Option<String>,
        actor: Actor,
        env: &LedgerEnvironment,
    ) -> MarketResult<Events<LedgerEvent>> {
        let request = state.require_return(request_id)?;
        if !(actor.is_admin() || actor.is(Role::Vendor, request.vendor_id)) {
            return Err(MarketplaceError::forbidden(actor, "decide a return"));
        }
        if request.status.is_decided() {
            return Err(PreconditionFailed::AlreadyDecided {
                request: request_id,
                current: request.status,
            }
            .into());
        }
        let response = response
            .map(|text| text.trim().to_string())
            .filter(|text| !text.is_empty());
        if decision == ReturnDecision::Reject && response.is_none() {
            return Err(ValidationError::MissingRejectionReason.into());
        }
        let dropoff_code = match decision {
            ReturnDecision::Approve => Some(env.allocate_code(state, &[])?),
            ReturnDecision::Reject => None,
        };

        Ok(smallvec![LedgerEvent::ReturnDecided {
            request_id,
            order_id: request.order_id,
            order_item_id: request.order_item_id,
            customer_id: request.customer_id,
            vendor_id: request.vendor_id,
            decision,
            response,
            decided_by: actor,
            dropoff_code,
            at: env.clock.now(),
        }])
    }

    fn confirm_dropoff(
        state: &Ledger,
        request_id: ReturnId,
        code: &str,
        actor: Actor,
        env: &LedgerEnvironment,
    ) -> MarketResult<Events<LedgerEvent>> {
        let request = state.require_return(request_id)?;
        let order = state.require_order(request.order_id)?;
        if !(actor.is_admin() || actor.is(Role::Agent, order.agent_id)) {
            return Err(MarketplaceError::forbidden(actor, "confirm a return drop-off"));
        }
        if request.dropped_off_at.is_some() {
            return Err(PreconditionFailed::DropoffAlreadyConfirmed {
                request: request_id,
            }
            .into());
        }
        if request.status != ReturnStatus::Approved {
            return Err(PreconditionFailed::NotApproved {
                request: request_id,
                current: request.status,
            }
            .into());
        }
        let Some(expected) = request.dropoff_code.as_ref() else {
            return Err(ValidationError::InvalidCode.into());
        };
        if expected.as_str() != code.trim() {
            return Err(ValidationError::InvalidCode.into());
        }

        Ok(smallvec![LedgerEvent::ReturnDroppedOff {
            request_id,
            code: expected.clone(),
            agent_id: actor.user_id,
            at: env.clock.now(),
        }])
    }

    fn complete(
        state: &Ledger,
        request_id: ReturnId,
        actor: Actor,
        env: &LedgerEnvironment,
    ) -> MarketResult<Events<LedgerEvent>> {
        if !actor.is_admin() {
            return Err(MarketplaceError::forbidden(actor, "complete a refund"));
        }
        let request = state.require_return(request_id)?;
        match request.status {
            ReturnStatus::Approved => {},
            ReturnStatus::Completed => {
                return Err(PreconditionFailed::AlreadyCompleted {
                    request: request_id,
                }
                .into());
            },
            current @ (ReturnStatus::Pending | ReturnStatus::Rejected) => {
                return Err(PreconditionFailed::NotApproved {
                    request: request_id,
                    current,
                }
                .into());
            },
        }

        Ok(smallvec![LedgerEvent::RefundCompleted {
            request_id,
            customer_id: request.customer_id,
            vendor_id: request.vendor_id,
            amount: request.requested_amount,
            at: env.clock.now(),
        }])
    }
}

impl Reducer for ReturnReducer {
    type State = Ledger;
    type Command = ReturnCommand;
    type Event = LedgerEvent;
    type Environment = LedgerEnvironment;

    fn reduce(
        &self,
        state: &Ledger,
        command: ReturnCommand,
        env: &LedgerEnvironment,
    ) -> MarketResult<Events<LedgerEvent>> {
        match command {
            ReturnCommand::RequestReturn {
                request_id,
                order_item_id,
                reason,
                description,
                requested_amount,
                actor,
            } => Self::request_return(
                state,
                request_id,
                order_item_id,
                reason,
                description,
                requested_amount,
                actor,
                env,
            ),
            ReturnCommand::Decide {
                request_id,
                decision,
                response,
                actor,
            } => Self::decide(state, request_id, decision, response, actor, env),
            ReturnCommand::ConfirmDropoff {
                request_id,
                code,
                actor,
            } => Self::confirm_dropoff(state, request_id, &code, actor, env),
            ReturnCommand::Complete { request_id, actor } => {
                Self::complete(state, request_id, actor, env)
            },
        }
    }
}
