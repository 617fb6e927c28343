//! One entry point for every ledger command.

use crate::environment::LedgerEnvironment;
use crate::ledger::Ledger;
use crate::orders::{OrderCommand, OrderReducer};
use crate::payouts::{PayoutCommand, PayoutReducer};
use crate::returns::{ReturnCommand, ReturnReducer};
use marketplace_core::{Events, LedgerEvent, MarketResult, Reducer};

/// Any command the ledger accepts
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LedgerCommand {
    /// Order state machine
    Order(OrderCommand),
    /// Return adjudication
    Return(ReturnCommand),
    /// Payouts
    Payout(PayoutCommand),
}

impl LedgerCommand {
    /// Stable name used as a log field and metrics label
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Order(command) => match command {
                OrderCommand::PlaceOrder { .. } => "place_order",
                OrderCommand::RecordPaymentStatus { .. } => "record_payment_status",
                OrderCommand::AdvanceItemStatus { .. } => "advance_item_status",
                OrderCommand::IssuePickupCode { .. } => "issue_pickup_code",
                OrderCommand::VerifyAndConsumeCode { .. } => "verify_and_consume_code",
                OrderCommand::CancelOrder { .. } => "cancel_order",
            },
            Self::Return(command) => match command {
                ReturnCommand::RequestReturn { .. } => "request_return",
                ReturnCommand::Decide { .. } => "decide_return",
                ReturnCommand::ConfirmDropoff { .. } => "confirm_return_dropoff",
                ReturnCommand::Complete { .. } => "complete_return",
            },
            Self::Payout(command) => match command {
                PayoutCommand::RequestPayout { .. } => "request_payout",
                PayoutCommand::MarkProcessing { .. } => "mark_payout_processing",
                PayoutCommand::Decide { .. } => "decide_payout",
            },
        }
    }
}

impl From<OrderCommand> for LedgerCommand {
    fn from(command: OrderCommand) -> Self {
        Self::Order(command)
    }
}

impl From<ReturnCommand> for LedgerCommand {
    fn from(command: ReturnCommand) -> Self {
        Self::Return(command)
    }
}

impl From<PayoutCommand> for LedgerCommand {
    fn from(command: PayoutCommand) -> Self {
        Self::Payout(command)
    }
}

/// Routes a [`LedgerCommand`] to the reducer owning it
#[derive(Clone, Copy, Debug, Default)]
pub struct MarketplaceReducer {
    orders: OrderReducer,
    returns: ReturnReducer,
    payouts: PayoutReducer,
}

impl MarketplaceReducer {
    /// Creates the reducer
    #[must_use]
    pub const fn new() -> Self {
        Self {
            orders: OrderReducer::new(),
            returns: ReturnReducer::new(),
            payouts: PayoutReducer::new(),
        }
    }
}

impl Reducer for MarketplaceReducer {
    type State = Ledger;
    type Command = LedgerCommand;
    type Event = LedgerEvent;
    type Environment = LedgerEnvironment;

    fn reduce(
        &self,
        state: &Ledger,
        command: LedgerCommand,
        env: &LedgerEnvironment,
    ) -> MarketResult<Events<LedgerEvent>> {
        match command {
            LedgerCommand::Order(command) => self.orders.reduce(state, command, env),
            LedgerCommand::Return(command) => self.returns.reduce(state, command, env),
            LedgerCommand::Payout(command) => self.payouts.reduce(state, command, env),
        }
    }
}
