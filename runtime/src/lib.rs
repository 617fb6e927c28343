//! # Marketplace Runtime
//!
//! The command service that sits between the API layer and the ledger
//! reducers.
//!
//! ## Components
//!
//! - **[`MarketplaceStore`]**: serialized command execution, persistence
//!   with optimistic concurrency, notification fan-out, domain-event
//!   broadcast
//! - **[`inbox`]**: per-user notification inbox with dedupe
//! - **[`retry`]**: bounded automatic retry for `Conflict` results
//! - **[`metrics`]**: Prometheus recorder and metric descriptions
//! - **[`telemetry`]**: tracing bootstrap
//!
//! ## Example
//!
//! ```ignore
//! use marketplace_runtime::MarketplaceStore;
//!
//! let store = MarketplaceStore::recover(event_store, env).await?;
//! let mut events = store.subscribe();
//!
//! let payout = store.request_payout(vendor, Money::from_cents(3000), bank).await?;
//! assert_eq!(payout.status, PayoutStatus::Pending);
//! ```

pub mod inbox;
pub mod metrics;
pub mod retry;
pub mod store;
pub mod telemetry;

pub use inbox::NotificationInbox;
pub use retry::{RetryPolicy, retry_on_conflict};
pub use store::MarketplaceStore;
