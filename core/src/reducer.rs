//! The decide/apply split every ledger component follows.
//!
//! A [`Reducer`] validates a command against the current state and either
//! rejects it with a typed [`MarketplaceError`] or returns the events that
//! record what happened. It never mutates state: the caller persists the
//! events first and only then folds them in with [`Apply`]. State therefore
//! never reflects a transition that failed to persist.

use crate::error::MarketplaceError;
use smallvec::SmallVec;

/// Events produced by one command. Most commands emit one to three.
pub type Events<E> = SmallVec<[E; 4]>;

/// Validates commands and turns them into events.
pub trait Reducer {
    /// State the command is checked against
    type State;

    /// Command type
    type Command;

    /// Event type produced on success
    type Event;

    /// Injected dependencies (clock, code generator, policy)
    type Environment;

    /// Decides a command.
    ///
    /// # Errors
    ///
    /// Any business rule violation, as a [`MarketplaceError`].
    fn reduce(
        &self,
        state: &Self::State,
        command: Self::Command,
        env: &Self::Environment,
    ) -> Result<Events<Self::Event>, MarketplaceError>;
}

/// Folds persisted events into state.
///
/// Implementations must be deterministic: replaying the same events in the
/// same order always yields the same state.
pub trait Apply<E> {
    /// Applies one event
    fn apply(&mut self, event: &E);

    /// Applies events in order
    fn apply_all<'a, I>(&mut self, events: I)
    where
        I: IntoIterator<Item = &'a E>,
        E: 'a,
    {
        for event in events {
            self.apply(event);
        }
    }
}
