//! Ergonomic testing utilities for reducers
//!
//! This module provides a fluent API for testing reducers with readable
//! Given-When-Then syntax. State assertions see the state *after* the
//! produced events were applied, the same way the store folds them in.

#![allow(clippy::module_name_repetitions)] // ReducerTest is the natural name

use marketplace_core::{Apply, MarketplaceError, Reducer};

/// Type alias for state assertion functions
type StateAssertion<S> = Box<dyn FnOnce(&S)>;

/// Type alias for event assertion functions
type EventAssertion<E> = Box<dyn FnOnce(&[E])>;

/// Type alias for error assertion functions
type ErrorAssertion = Box<dyn FnOnce(&MarketplaceError)>;

/// Fluent API for testing reducers with Given-When-Then syntax
///
/// # Example
///
/// ```ignore
/// use marketplace_testing::ReducerTest;
///
/// ReducerTest::new(PayoutReducer::new())
///     .with_env(fixture.env.clone())
///     .given_state(fixture.ledger.clone())
///     .when_command(PayoutCommand::RequestPayout { .. })
///     .then_events(|events| assert_eq!(events.len(), 1))
///     .then_state(|ledger| assert_eq!(ledger.payouts().count(), 1))
///     .run();
/// ```
pub struct ReducerTest<R>
where
    R: Reducer,
{
    reducer: R,
    environment: Option<R::Environment>,
    initial_state: Option<R::State>,
    command: Option<R::Command>,
    state_assertions: Vec<StateAssertion<R::State>>,
    event_assertions: Vec<EventAssertion<R::Event>>,
    error_assertion: Option<ErrorAssertion>,
}

impl<R> ReducerTest<R>
where
    R: Reducer,
    R::State: Apply<R::Event>,
    R::Event: std::fmt::Debug,
{
    /// Create a new reducer test with the given reducer
    #[must_use]
    pub const fn new(reducer: R) -> Self {
        Self {
            reducer,
            environment: None,
            initial_state: None,
            command: None,
            state_assertions: Vec::new(),
            event_assertions: Vec::new(),
            error_assertion: None,
        }
    }

    /// Set the environment for the test
    #[must_use]
    pub fn with_env(mut self, env: R::Environment) -> Self {
        self.environment = Some(env);
        self
    }

    /// Set the initial state (Given)
    #[must_use]
    pub fn given_state(mut self, state: R::State) -> Self {
        self.initial_state = Some(state);
        self
    }

    /// Set the command to test (When)
    #[must_use]
    pub fn when_command(mut self, command: R::Command) -> Self {
        self.command = Some(command);
        self
    }

    /// Add an assertion about the resulting state (Then)
    #[must_use]
    pub fn then_state<F>(mut self, assertion: F) -> Self
    where
        F: FnOnce(&R::State) + 'static,
    {
        self.state_assertions.push(Box::new(assertion));
        self
    }

    /// Add an assertion about the produced events (Then)
    #[must_use]
    pub fn then_events<F>(mut self, assertion: F) -> Self
    where
        F: FnOnce(&[R::Event]) + 'static,
    {
        self.event_assertions.push(Box::new(assertion));
        self
    }

    /// Expect the command to be rejected (Then)
    #[must_use]
    pub fn then_error<F>(mut self, assertion: F) -> Self
    where
        F: FnOnce(&MarketplaceError) + 'static,
    {
        self.error_assertion = Some(Box::new(assertion));
        self
    }

    /// Run the test and execute all assertions
    ///
    /// # Panics
    ///
    /// Panics if initial state, command, or environment is not set, if the
    /// outcome (accepted or rejected) is not the expected one, or if any
    /// assertion fails.
    #[allow(clippy::panic)] // Test code can panic
    #[allow(clippy::expect_used)] // Test code can use expect
    pub fn run(self) {
        let mut state = self
            .initial_state
            .expect("Initial state must be set with given_state()");

        let command = self.command.expect("Command must be set with when_command()");

        let env = self
            .environment
            .expect("Environment must be set with with_env()");

        match (self.reducer.reduce(&state, command, &env), self.error_assertion) {
            (Ok(events), None) => {
                state.apply_all(events.iter());
                for assertion in self.event_assertions {
                    assertion(&events);
                }
                for assertion in self.state_assertions {
                    assertion(&state);
                }
            },
            (Err(error), Some(assertion)) => {
                assertion(&error);
                // A rejected command leaves the given state as it was
                for assertion in self.state_assertions {
                    assertion(&state);
                }
            },
            (Ok(events), Some(_)) => {
                panic!("Expected the command to be rejected, but it produced {events:?}")
            },
            (Err(error), None) => panic!("Expected the command to succeed, but got: {error}"),
        }
    }
}

/// Helper assertions for events
pub mod assertions {
    use marketplace_core::LedgerEvent;

    /// Assert that there are no events
    ///
    /// # Panics
    ///
    /// Panics if events is not empty.
    #[allow(clippy::panic)] // Test assertion
    pub fn assert_no_events<E: std::fmt::Debug>(events: &[E]) {
        assert!(
            events.is_empty(),
            "Expected no events, but found {}: {:?}",
            events.len(),
            events
        );
    }

    /// Assert the number of events
    ///
    /// # Panics
    ///
    /// Panics if the number of events doesn't match expected.
    #[allow(clippy::panic)] // Test assertion
    pub fn assert_events_count<E>(events: &[E], expected: usize) {
        assert_eq!(
            events.len(),
            expected,
            "Expected {} events, but found {}",
            expected,
            events.len()
        );
    }

    /// Assert the exact sequence of event type tags
    ///
    /// # Panics
    ///
    /// Panics if the tags differ.
    #[allow(clippy::panic)] // Test assertion
    pub fn assert_event_types(events: &[LedgerEvent], expected: &[&str]) {
        let actual: Vec<&str> = events.iter().map(LedgerEvent::event_type).collect();
        assert_eq!(actual, expected, "Unexpected event sequence");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use marketplace_core::{Events, ValidationError, smallvec};

    #[derive(Clone, Debug, Default)]
    struct TestState {
        count: i32,
    }

    #[derive(Clone, Debug, PartialEq)]
    enum TestEvent {
        Added(i32),
    }

    enum TestCommand {
        Add(i32),
    }

    struct TestReducer;

    struct TestEnv;

    impl Apply<TestEvent> for TestState {
        fn apply(&mut self, event: &TestEvent) {
            match event {
                TestEvent::Added(n) => self.count += n,
            }
        }
    }

    impl Reducer for TestReducer {
        type State = TestState;
        type Command = TestCommand;
        type Event = TestEvent;
        type Environment = TestEnv;

        fn reduce(
            &self,
            _state: &TestState,
            command: TestCommand,
            _env: &TestEnv,
        ) -> Result<Events<TestEvent>, MarketplaceError> {
            match command {
                TestCommand::Add(n) if n > 0 => Ok(smallvec![TestEvent::Added(n)]),
                TestCommand::Add(_) => Err(ValidationError::InvalidCode.into()),
            }
        }
    }

    #[test]
    fn test_reducer_test_applies_events() {
        ReducerTest::new(TestReducer)
            .with_env(TestEnv)
            .given_state(TestState { count: 1 })
            .when_command(TestCommand::Add(2))
            .then_events(|events| {
                assertions::assert_events_count(events, 1);
                assert_eq!(events[0], TestEvent::Added(2));
            })
            .then_state(|state| {
                assert_eq!(state.count, 3);
            })
            .run();
    }

    #[test]
    fn test_reducer_test_rejection() {
        ReducerTest::new(TestReducer)
            .with_env(TestEnv)
            .given_state(TestState::default())
            .when_command(TestCommand::Add(0))
            .then_error(|error| {
                assert_eq!(error.code(), "VALIDATION_ERROR");
            })
            .then_state(|state| {
                assert_eq!(state.count, 0);
            })
            .run();
    }

    #[test]
    #[should_panic(expected = "Expected the command to succeed")]
    fn test_reducer_test_unexpected_rejection() {
        ReducerTest::new(TestReducer)
            .with_env(TestEnv)
            .given_state(TestState::default())
            .when_command(TestCommand::Add(-1))
            .run();
    }

    #[test]
    fn test_assertions_no_events() {
        assertions::assert_no_events::<TestEvent>(&[]);
    }
}
