//! # Marketplace Core
//!
//! Ledger entities and contracts for the marketplace fulfillment and
//! settlement lifecycle.
//!
//! This crate is deliberately free of behaviour beyond invariants that belong
//! to a single value (money arithmetic, status transition tables, commission
//! snapshots). Business rules that span entities live in
//! `marketplace-fulfillment`; persistence and fan-out live in
//! `marketplace-runtime`.
//!
//! ## Core Concepts
//!
//! - **Ledger entities**: [`order::Order`], [`order::OrderItem`],
//!   [`returns::ReturnRequest`], [`payout::Payout`],
//!   [`notification::Notification`]
//! - **Status machines**: closed enumerations with an explicit edge table
//!   ([`status::Transitions`])
//! - **Events**: [`event::LedgerEvent`] records every accepted transition
//! - **Reducer**: `(Ledger, Command, Environment) → Result<Events, Error>`
//! - **Environment**: injected clock and code generator
//!
//! ## Example
//!
//! ```
//! use marketplace_core::status::{FulfillmentStatus, Transitions};
//!
//! assert!(FulfillmentStatus::Pending.can_transition_to(FulfillmentStatus::Processing));
//! // Skipping edges is never allowed
//! assert!(!FulfillmentStatus::Pending.can_transition_to(FulfillmentStatus::Delivered));
//! ```

pub mod actor;
pub mod environment;
pub mod error;
pub mod event;
pub mod event_store;
pub mod ids;
pub mod money;
pub mod notification;
pub mod order;
pub mod payout;
pub mod reducer;
pub mod returns;
pub mod status;
pub mod stream;

// Re-export commonly used types
pub use chrono::{DateTime, Duration, Utc};
pub use smallvec::{SmallVec, smallvec};

pub use actor::{Actor, Role};
pub use environment::{Clock, CodeGenerator, RandomCodes, SystemClock};
pub use error::{ConflictError, EntityKind, MarketplaceError, PreconditionFailed, ValidationError};
pub use event::{LedgerEvent, SerializedEvent};
pub use event_store::{EventStore, EventStoreError, RecordedEvent};
pub use ids::{NotificationId, OrderId, OrderItemId, PayoutId, ProductId, ReturnId, UserId};
pub use money::{CommissionRate, Money};
pub use reducer::{Apply, Events, Reducer};
pub use status::{FulfillmentStatus, PaymentStatus, PayoutStatus, ReturnStatus, Transitions};
pub use stream::{StreamId, Version};

/// Result alias used by every business operation.
pub type MarketResult<T> = Result<T, MarketplaceError>;
