//! # Marketplace Testing
//!
//! Testing utilities for the marketplace ledger.
//!
//! This crate provides:
//! - Deterministic environment doubles ([`FixedClock`], [`ScriptedCodes`])
//! - An in-memory [`EventStore`](marketplace_core::EventStore)
//! - [`ReducerTest`], a Given-When-Then harness for reducers
//! - Ledger fixtures that drive real commands to reach a given state
//! - proptest strategies for domain values
//!
//! ## Example
//!
//! ```
//! use marketplace_testing::fixtures::{LedgerFixture, line};
//! use marketplace_fulfillment::vendor_balance;
//!
//! let mut fixture = LedgerFixture::new();
//! let vendor = fixture.cast.vendor;
//! let order = fixture.place_order(&[line(vendor.user_id, 2, 1000, 10)]);
//! fixture.deliver_order(order);
//!
//! let balance = vendor_balance(&fixture.ledger, vendor.user_id);
//! assert_eq!(balance.net.cents(), 1800);
//! ```

pub mod fixtures;
pub mod reducer_test;

use chrono::{DateTime, Utc};
use marketplace_core::environment::{CODE_ALPHABET, Clock, CodeGenerator};

/// Mock implementations of environment and persistence traits.
pub mod mocks {
    use super::{CODE_ALPHABET, Clock, CodeGenerator, DateTime, Utc};
    use chrono::Duration;
    use marketplace_core::event_store::StoreFuture;
    use marketplace_core::{
        EventStore, EventStoreError, RecordedEvent, SerializedEvent, StreamId, Version,
    };
    use std::collections::{HashMap, VecDeque};
    use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
    use std::sync::{Arc, Mutex, PoisonError, RwLock};

    /// Controllable clock for deterministic tests
    ///
    /// Clones share the same time, so a test can hold one handle and move
    /// the clock seen by a store or environment.
    ///
    /// # Example
    ///
    /// ```
    /// use marketplace_testing::mocks::FixedClock;
    /// use marketplace_core::Clock;
    /// use chrono::{Duration, Utc};
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// let start = clock.now();
    /// assert_eq!(clock.now(), start);
    /// clock.advance(Duration::hours(25));
    /// assert_eq!(clock.now() - start, Duration::hours(25));
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: Arc<RwLock<DateTime<Utc>>>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub fn new(time: DateTime<Utc>) -> Self {
            Self {
                time: Arc::new(RwLock::new(time)),
            }
        }

        /// Moves the clock to `time`
        pub fn set(&self, time: DateTime<Utc>) {
            *self.time.write().unwrap_or_else(PoisonError::into_inner) = time;
        }

        /// Moves the clock forward by `by`
        pub fn advance(&self, by: Duration) {
            let mut time = self.time.write().unwrap_or_else(PoisonError::into_inner);
            *time += by;
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            *self.time.read().unwrap_or_else(PoisonError::into_inner)
        }
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    ///
    /// # Panics
    ///
    /// This function will panic if the hardcoded timestamp fails to parse,
    /// which should never happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(
            DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
                .expect("hardcoded timestamp should always parse")
                .with_timezone(&Utc),
        )
    }

    /// Code generator that replays a script, then counts.
    ///
    /// Scripted codes are handed out first, which lets a test force a
    /// collision. Once the script is exhausted, codes are `length`-character
    /// base-32 renderings of a counter, so they never repeat.
    #[derive(Debug, Clone, Default)]
    pub struct ScriptedCodes {
        script: Arc<Mutex<VecDeque<String>>>,
        counter: Arc<AtomicU64>,
    }

    impl ScriptedCodes {
        /// Counter codes only
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Hands out `codes` in order before counting
        #[must_use]
        pub fn scripted<I, S>(codes: I) -> Self
        where
            I: IntoIterator<Item = S>,
            S: Into<String>,
        {
            Self {
                script: Arc::new(Mutex::new(codes.into_iter().map(Into::into).collect())),
                counter: Arc::new(AtomicU64::new(0)),
            }
        }

        /// Queues more scripted codes
        pub fn push(&self, code: impl Into<String>) {
            self.script
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push_back(code.into());
        }
    }

    impl CodeGenerator for ScriptedCodes {
        fn generate(&self, length: usize) -> String {
            if let Some(code) = self
                .script
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .pop_front()
            {
                return code;
            }
            let mut n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
            let base = CODE_ALPHABET.len() as u64;
            let mut code = vec![CODE_ALPHABET[0]; length];
            for slot in code.iter_mut().rev() {
                #[allow(clippy::cast_possible_truncation)]
                let digit = (n % base) as usize;
                *slot = CODE_ALPHABET[digit];
                n /= base;
            }
            code.into_iter().map(char::from).collect()
        }
    }

    #[derive(Debug, Default)]
    struct Streams {
        streams: HashMap<StreamId, Vec<SerializedEvent>>,
        log: Vec<RecordedEvent>,
    }

    /// In-memory event store with per-stream optimistic concurrency.
    ///
    /// [`InMemoryEventStore::fail_next_append`] makes the next append fail
    /// with a database error, for testing that a failed persist leaves the
    /// ledger untouched.
    #[derive(Debug, Clone, Default)]
    pub struct InMemoryEventStore {
        inner: Arc<tokio::sync::RwLock<Streams>>,
        fail_next: Arc<AtomicBool>,
    }

    impl InMemoryEventStore {
        /// Empty store
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// The next `append_events` call fails with
        /// [`EventStoreError::DatabaseError`]
        pub fn fail_next_append(&self) {
            self.fail_next.store(true, Ordering::SeqCst);
        }

        /// Number of events stored across all streams
        pub async fn len(&self) -> usize {
            self.inner.read().await.log.len()
        }

        /// Whether nothing has been stored
        pub async fn is_empty(&self) -> bool {
            self.inner.read().await.log.is_empty()
        }
    }

    impl EventStore for InMemoryEventStore {
        fn append_events(
            &self,
            stream_id: StreamId,
            expected_version: Option<Version>,
            events: Vec<SerializedEvent>,
        ) -> StoreFuture<'_, Version> {
            Box::pin(async move {
                if self.fail_next.swap(false, Ordering::SeqCst) {
                    return Err(EventStoreError::DatabaseError(
                        "injected append failure".into(),
                    ));
                }
                let mut guard = self.inner.write().await;
                let Streams { streams, log } = &mut *guard;
                let stream = streams.entry(stream_id.clone()).or_default();
                let actual = Version::new(stream.len() as u64);
                if let Some(expected) = expected_version {
                    if expected != actual {
                        return Err(EventStoreError::ConcurrencyConflict {
                            stream_id,
                            expected,
                            actual,
                        });
                    }
                }
                let mut version = actual;
                for event in events {
                    version = version.next();
                    log.push(RecordedEvent {
                        stream_id: stream_id.clone(),
                        version,
                        position: log.len() as u64 + 1,
                        event: event.clone(),
                    });
                    stream.push(event);
                }
                Ok(version)
            })
        }

        fn load_events(
            &self,
            stream_id: StreamId,
            from_version: Option<Version>,
        ) -> StoreFuture<'_, Vec<SerializedEvent>> {
            Box::pin(async move {
                let guard = self.inner.read().await;
                let skip = from_version.map_or(0, |v| usize::try_from(v.value()).unwrap_or(usize::MAX));
                Ok(guard
                    .streams
                    .get(&stream_id)
                    .map(|events| events.iter().skip(skip).cloned().collect())
                    .unwrap_or_default())
            })
        }

        fn load_all(&self) -> StoreFuture<'_, Vec<RecordedEvent>> {
            Box::pin(async move { Ok(self.inner.read().await.log.clone()) })
        }
    }
}

/// proptest strategies for domain values.
pub mod properties {
    use marketplace_core::{FulfillmentStatus, Money};
    use proptest::prelude::*;

    /// Any fulfillment status
    pub fn fulfillment_status() -> impl Strategy<Value = FulfillmentStatus> {
        proptest::sample::select(FulfillmentStatus::ALL.to_vec())
    }

    /// Positive amounts between one cent and `max_cents`
    pub fn positive_money(max_cents: i64) -> impl Strategy<Value = Money> {
        (1..=max_cents).prop_map(Money::from_cents)
    }
}

/// Installs a test-friendly tracing subscriber once; later calls are no-ops.
///
/// Honours `RUST_LOG`, defaulting to `warn`.
pub fn init_test_tracing() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

// Re-export commonly used items
pub use fixtures::{Cast, LedgerFixture};
pub use mocks::{FixedClock, InMemoryEventStore, ScriptedCodes, test_clock};
pub use reducer_test::ReducerTest;

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use marketplace_core::{EventStore, EventStoreError, SerializedEvent, StreamId, UserId, Version};

    #[test]
    fn fixed_clock_is_shared_between_clones() {
        let clock = test_clock();
        let handle = clock.clone();
        handle.advance(chrono::Duration::hours(1));
        assert_eq!(clock.now(), handle.now());
    }

    #[test]
    fn scripted_codes_then_counter() {
        let codes = ScriptedCodes::scripted(["AAAAAA"]);
        assert_eq!(codes.generate(6), "AAAAAA");
        let first = codes.generate(6);
        let second = codes.generate(6);
        assert_eq!(first.len(), 6);
        assert_ne!(first, second);
    }

    fn event(tag: &str) -> SerializedEvent {
        SerializedEvent::new(tag.to_string(), vec![1, 2, 3], None)
    }

    #[tokio::test]
    async fn append_checks_expected_version() {
        let store = InMemoryEventStore::new();
        let stream = StreamId::payouts(UserId::new());

        let version = store
            .append_events(stream.clone(), Some(Version::INITIAL), vec![event("A.v1")])
            .await
            .unwrap();
        assert_eq!(version, Version::new(1));

        let stale = store
            .append_events(stream.clone(), Some(Version::INITIAL), vec![event("B.v1")])
            .await;
        assert!(matches!(
            stale,
            Err(EventStoreError::ConcurrencyConflict { actual, .. }) if actual == Version::new(1)
        ));
        assert_eq!(store.load_events(stream, None).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn load_all_keeps_global_order() {
        let store = InMemoryEventStore::new();
        let a = StreamId::payouts(UserId::new());
        let b = StreamId::payouts(UserId::new());
        store.append_events(a.clone(), None, vec![event("A.v1")]).await.unwrap();
        store.append_events(b.clone(), None, vec![event("B.v1")]).await.unwrap();
        store.append_events(a.clone(), None, vec![event("C.v1")]).await.unwrap();

        let all = store.load_all().await.unwrap();
        let tags: Vec<&str> = all.iter().map(|r| r.event.event_type.as_str()).collect();
        assert_eq!(tags, ["A.v1", "B.v1", "C.v1"]);
        assert_eq!(all[2].version, Version::new(2));
        assert_eq!(all[2].position, 3);
    }

    #[tokio::test]
    async fn injected_failure_stores_nothing() {
        let store = InMemoryEventStore::new();
        store.fail_next_append();
        let result = store
            .append_events(StreamId::payouts(UserId::new()), None, vec![event("A.v1")])
            .await;
        assert!(matches!(result, Err(EventStoreError::DatabaseError(_))));
        assert!(store.is_empty().await);
    }
}
