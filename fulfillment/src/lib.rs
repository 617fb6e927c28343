//! # Marketplace Fulfillment
//!
//! Business rules of the fulfillment and settlement lifecycle, expressed as
//! reducers over a single in-memory [`Ledger`].
//!
//! ## Components
//!
//! - [`orders`]: checkout, payment callbacks, per-item fulfillment, pickup
//!   codes, cancellation
//! - [`returns`]: return requests, vendor/admin decisions, drop-off,
//!   refund completion
//! - [`payouts`]: payout requests bounded by the vendor balance, admin review
//! - [`settlement`]: vendor balance recomputed from the ledger on every read
//! - [`notify`]: pure fan-out of events into notification drafts
//! - [`analytics`]: read-only rollups for reporting
//!
//! Reducers never touch state. A caller persists the returned events and
//! only then applies them:
//!
//! ```
//! use marketplace_core::returns::ReturnDecision;
//! use marketplace_core::{Actor, Reducer, ReturnId, UserId};
//! use marketplace_fulfillment::returns::ReturnCommand;
//! use marketplace_fulfillment::{Ledger, LedgerEnvironment, MarketplaceConfig, MarketplaceReducer};
//!
//! let ledger = Ledger::new();
//! let env = LedgerEnvironment::production(MarketplaceConfig::default());
//! let command = ReturnCommand::Decide {
//!     request_id: ReturnId::new(),
//!     decision: ReturnDecision::Approve,
//!     response: None,
//!     actor: Actor::admin(UserId::new()),
//! };
//! // Unknown request: rejected, nothing to apply
//! assert!(MarketplaceReducer::new().reduce(&ledger, command.into(), &env).is_err());
//! ```

pub mod analytics;
pub mod command;
pub mod config;
pub mod environment;
pub mod ledger;
pub mod notify;
pub mod orders;
pub mod payouts;
pub mod returns;
pub mod settlement;

pub use command::{LedgerCommand, MarketplaceReducer};
pub use config::{ConfigError, MarketplaceConfig, RiskPolicy};
pub use environment::LedgerEnvironment;
pub use ledger::{CodeHolder, Ledger};
pub use notify::{NotificationDraft, drafts_for};
pub use settlement::{VendorBalance, vendor_balance};
