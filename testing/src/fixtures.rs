//! Ledger fixtures.
//!
//! Fixtures reach a state by running real commands through the reducers and
//! applying the events, never by writing ledger fields directly, so every
//! fixture state is one the system can actually be in.

#![allow(clippy::expect_used, clippy::panic)] // Fixture setup failing is a broken test
#![allow(clippy::missing_panics_doc)]

use crate::mocks::{FixedClock, ScriptedCodes, test_clock};
use marketplace_core::payout::{BankDetails, PayoutDecision};
use marketplace_core::returns::{ReturnDecision, ReturnReason};
use marketplace_core::{
    Actor, Apply, CommissionRate, Events, FulfillmentStatus, LedgerEvent, MarketResult, Money,
    OrderId, OrderItemId, PayoutId, ProductId, Reducer, ReturnId, UserId,
};
use marketplace_fulfillment::orders::{OrderCommand, OrderLine, PlaceOrder};
use marketplace_fulfillment::payouts::PayoutCommand;
use marketplace_fulfillment::returns::ReturnCommand;
use marketplace_fulfillment::{
    Ledger, LedgerCommand, LedgerEnvironment, MarketplaceConfig, MarketplaceReducer,
};
use std::sync::Arc;

/// One actor per role
#[derive(Clone, Copy, Debug)]
pub struct Cast {
    /// Buyer
    pub customer: Actor,
    /// Seller
    pub vendor: Actor,
    /// Pickup point
    pub agent: Actor,
    /// Platform operator
    pub admin: Actor,
}

impl Cast {
    /// Fresh ids for every role
    #[must_use]
    pub fn new() -> Self {
        Self {
            customer: Actor::customer(UserId::new()),
            vendor: Actor::vendor(UserId::new()),
            agent: Actor::agent(UserId::new()),
            admin: Actor::admin(UserId::new()),
        }
    }
}

impl Default for Cast {
    fn default() -> Self {
        Self::new()
    }
}

/// An order line with a price in cents and a commission in whole percent
#[must_use]
pub fn line(vendor: UserId, quantity: u32, unit_price_cents: i64, commission_percent: u32) -> OrderLine {
    OrderLine {
        product_id: ProductId::new(),
        vendor_id: vendor,
        quantity,
        unit_price: Money::from_cents(unit_price_cents),
        commission_rate: Some(CommissionRate::from_percent(commission_percent)),
    }
}

/// Test bank account
#[must_use]
pub fn bank() -> BankDetails {
    BankDetails::new("Ada Vendor", "First Test Bank", "DE89370400440532013000")
}

/// A ledger plus a deterministic environment and a cast of actors
#[derive(Debug)]
pub struct LedgerFixture {
    /// Current state
    pub ledger: Ledger,
    /// Environment handed to reducers
    pub env: LedgerEnvironment,
    /// Handle on the environment's clock
    pub clock: FixedClock,
    /// Handle on the environment's code generator
    pub codes: ScriptedCodes,
    /// Actors
    pub cast: Cast,
    reducer: MarketplaceReducer,
}

impl Default for LedgerFixture {
    fn default() -> Self {
        Self::new()
    }
}

impl LedgerFixture {
    /// Empty ledger, default policy
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(MarketplaceConfig::default())
    }

    /// Empty ledger under `config`
    #[must_use]
    pub fn with_config(config: MarketplaceConfig) -> Self {
        let clock = test_clock();
        let codes = ScriptedCodes::new();
        let env = LedgerEnvironment::new(Arc::new(clock.clone()), Arc::new(codes.clone()), config);
        Self {
            ledger: Ledger::new(),
            env,
            clock,
            codes,
            cast: Cast::new(),
            reducer: MarketplaceReducer::new(),
        }
    }

    /// Decides `command` and, if accepted, applies its events
    ///
    /// # Errors
    ///
    /// Whatever the reducer rejects the command with; the ledger is then
    /// unchanged.
    pub fn execute(&mut self, command: impl Into<LedgerCommand>) -> MarketResult<Events<LedgerEvent>> {
        let events = self.reducer.reduce(&self.ledger, command.into(), &self.env)?;
        self.ledger.apply_all(events.iter());
        Ok(events)
    }

    fn must(&mut self, command: impl Into<LedgerCommand>) -> Events<LedgerEvent> {
        let command = command.into();
        let name = command.name();
        self.execute(command)
            .unwrap_or_else(|error| panic!("fixture command {name} rejected: {error}"))
    }

    /// Places an order for the cast's customer at the cast's agent
    pub fn place_order(&mut self, lines: &[OrderLine]) -> OrderId {
        let order_id = OrderId::new();
        self.must(OrderCommand::PlaceOrder {
            actor: self.cast.customer,
            order: PlaceOrder {
                order_id,
                agent_id: self.cast.agent.user_id,
                lines: lines.to_vec(),
                discount: Money::ZERO,
                tax: Money::ZERO,
                shipping: Money::ZERO,
                coupon: None,
                expected_total: None,
            },
        });
        order_id
    }

    /// Item ids of an order, in checkout order
    #[must_use]
    pub fn item_ids(&self, order_id: OrderId) -> Vec<OrderItemId> {
        self.ledger.order_items(order_id).map(|item| item.id).collect()
    }

    /// Moves an item one edge forward as admin
    pub fn advance(&mut self, item_id: OrderItemId, to: FulfillmentStatus) {
        let observed = self.ledger.require_item(item_id).expect("known item").status;
        self.must(OrderCommand::AdvanceItemStatus {
            item_id,
            observed,
            to,
            actor: self.cast.admin,
        });
    }

    /// Takes every item to READY_FOR_PICKUP, then hands the order over with
    /// its pickup code
    pub fn deliver_order(&mut self, order_id: OrderId) {
        let items = self.item_ids(order_id);
        for status in [FulfillmentStatus::Processing, FulfillmentStatus::ReadyForPickup] {
            for item_id in &items {
                self.advance(*item_id, status);
            }
        }
        let code = self
            .ledger
            .require_order(order_id)
            .expect("known order")
            .pickup_code
            .clone()
            .expect("code issued on entering processing");
        self.must(OrderCommand::VerifyAndConsumeCode {
            order_id,
            code: code.as_str().to_string(),
            actor: self.cast.agent,
        });
    }

    /// Places and delivers a one-line order; returns its item
    pub fn delivered_item(&mut self, quantity: u32, unit_price_cents: i64, commission_percent: u32) -> OrderItemId {
        let order_id = self.place_order(&[line(
            self.cast.vendor.user_id,
            quantity,
            unit_price_cents,
            commission_percent,
        )]);
        self.deliver_order(order_id);
        self.item_ids(order_id)[0]
    }

    /// Files a return for `item` as the cast's customer
    pub fn request_return(&mut self, item: OrderItemId, amount_cents: i64) -> ReturnId {
        let request_id = ReturnId::new();
        self.must(ReturnCommand::RequestReturn {
            request_id,
            order_item_id: item,
            reason: ReturnReason::Damaged,
            description: "Screen cracked on arrival".into(),
            requested_amount: Money::from_cents(amount_cents),
            actor: self.cast.customer,
        });
        request_id
    }

    /// Approves a return as the cast's vendor
    pub fn approve_return(&mut self, request_id: ReturnId) {
        self.must(ReturnCommand::Decide {
            request_id,
            decision: ReturnDecision::Approve,
            response: Some("Sorry about that".into()),
            actor: self.cast.vendor,
        });
    }

    /// Requests a payout as the cast's vendor
    pub fn request_payout(&mut self, amount_cents: i64) -> PayoutId {
        let payout_id = PayoutId::new();
        self.must(PayoutCommand::RequestPayout {
            payout_id,
            amount: Money::from_cents(amount_cents),
            bank: bank(),
            actor: self.cast.vendor,
        });
        payout_id
    }

    /// Completes a payout as admin
    pub fn complete_payout(&mut self, payout_id: PayoutId) {
        self.must(PayoutCommand::Decide {
            payout_id,
            decision: PayoutDecision::Approve,
            note: None,
            actor: self.cast.admin,
        });
    }
}
