//! Payout requests and admin review.
//!
//! A request is checked against the vendor's balance at decision time,
//! including the holds of every other pending or processing payout. All
//! payout events of a vendor share one stream, so two racing requests are
//! ordered and the second sees the first's hold.

use crate::environment::LedgerEnvironment;
use crate::ledger::Ledger;
use crate::settlement::vendor_balance;
use marketplace_core::payout::{BankDetails, Payout, PayoutDecision};
use marketplace_core::{
    Actor, Events, LedgerEvent, MarketResult, MarketplaceError, Money, PayoutId, PayoutStatus,
    PreconditionFailed, Reducer, Role, Transitions, ValidationError, smallvec,
};

/// Commands handled by [`PayoutReducer`]
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PayoutCommand {
    /// Vendor asks to withdraw
    RequestPayout {
        /// Id for the new payout
        payout_id: PayoutId,
        /// Amount
        amount: Money,
        /// Destination
        bank: BankDetails,
        /// Vendor
        actor: Actor,
    },
    /// Admin starts the transfer
    MarkProcessing {
        /// Payout
        payout_id: PayoutId,
        /// Admin
        actor: Actor,
    },
    /// Admin completes or fails the payout
    Decide {
        /// Payout
        payout_id: PayoutId,
        /// Verdict
        decision: PayoutDecision,
        /// Note for the vendor
        note: Option<String>,
        /// Admin
        actor: Actor,
    },
}

/// Reducer for [`PayoutCommand`]
#[derive(Clone, Copy, Debug, Default)]
pub struct PayoutReducer;

impl PayoutReducer {
    /// Creates the reducer
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn request_payout(
        state: &Ledger,
        payout_id: PayoutId,
        amount: Money,
        bank: &BankDetails,
        actor: Actor,
        env: &LedgerEnvironment,
    ) -> MarketResult<Events<LedgerEvent>> {
        if actor.role != Role::Vendor {
            return Err(MarketplaceError::forbidden(actor, "request a payout"));
        }
        if !amount.is_positive() {
            return Err(ValidationError::NonPositivePayout { amount }.into());
        }
        if !bank.is_complete() {
            return Err(ValidationError::IncompleteBankDetails.into());
        }
        let minimum = env.config.min_payout();
        if amount < minimum {
            return Err(ValidationError::BelowMinimumPayout {
                requested: amount,
                minimum,
            }
            .into());
        }
        let balance = vendor_balance(state, actor.user_id);
        if amount > balance.available {
            return Err(MarketplaceError::InsufficientBalance {
                requested: amount,
                available: balance.withdrawable(),
            });
        }

        Ok(smallvec![LedgerEvent::PayoutRequested {
            payout: Payout {
                id: payout_id,
                vendor_id: actor.user_id,
                amount,
                status: PayoutStatus::Pending,
                bank: bank.masked(),
                reference: Payout::reference_for(payout_id),
                requested_at: env.clock.now(),
                decided_at: None,
                note: None,
            },
        }])
    }

    fn transition(
        state: &Ledger,
        payout_id: PayoutId,
        to: PayoutStatus,
        note: Option<String>,
        actor: Actor,
        env: &LedgerEnvironment,
    ) -> MarketResult<Events<LedgerEvent>> {
        if !actor.is_admin() {
            return Err(MarketplaceError::forbidden(actor, "review a payout"));
        }
        let payout = state.require_payout(payout_id)?;
        if !payout.status.can_transition_to(to) {
            return Err(PreconditionFailed::InvalidPayoutTransition {
                payout: payout_id,
                current: payout.status,
                requested: to,
            }
            .into());
        }
        Ok(smallvec![LedgerEvent::PayoutStatusChanged {
            payout_id,
            vendor_id: payout.vendor_id,
            amount: payout.amount,
            from: payout.status,
            to,
            note: note
                .map(|text| text.trim().to_string())
                .filter(|text| !text.is_empty()),
            decided_by: actor.user_id,
            at: env.clock.now(),
        }])
    }
}

impl Reducer for PayoutReducer {
    type State = Ledger;
    type Command = PayoutCommand;
    type Event = LedgerEvent;
    type Environment = LedgerEnvironment;

    fn reduce(
        &self,
        state: &Ledger,
        command: PayoutCommand,
        env: &LedgerEnvironment,
    ) -> MarketResult<Events<LedgerEvent>> {
        match command {
            PayoutCommand::RequestPayout {
                payout_id,
                amount,
                bank,
                actor,
            } => Self::request_payout(state, payout_id, amount, &bank, actor, env),
            PayoutCommand::MarkProcessing { payout_id, actor } => {
                Self::transition(state, payout_id, PayoutStatus::Processing, None, actor, env)
            },
            PayoutCommand::Decide {
                payout_id,
                decision,
                note,
                actor,
            } => Self::transition(state, payout_id, decision.target_status(), note, actor, env),
        }
    }
}
