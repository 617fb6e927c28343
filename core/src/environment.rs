//! Injected dependencies: time and code generation.
//!
//! Reducers never call `Utc::now()` or a random number generator directly;
//! tests swap these for fixed or scripted implementations.

use chrono::{DateTime, Utc};
use rand::Rng;

/// Source of the current time
pub trait Clock: Send + Sync {
    /// Current time
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Produces candidate pickup/drop-off codes.
///
/// Candidates need not be unique; the caller checks them against the active
/// code index and asks again on collision.
pub trait CodeGenerator: Send + Sync {
    /// A candidate code of `length` characters
    fn generate(&self, length: usize) -> String;
}

/// Characters used in codes. No `0/O` or `1/I`, which agents misread.
pub const CODE_ALPHABET: &[u8] = b"23456789ABCDEFGHJKLMNPQRSTUVWXYZ";

/// Codes drawn uniformly from [`CODE_ALPHABET`] with the thread RNG
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomCodes;

impl CodeGenerator for RandomCodes {
    fn generate(&self, length: usize) -> String {
        let mut rng = rand::thread_rng();
        (0..length)
            .map(|_| char::from(CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())]))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_codes_use_alphabet() {
        let code = RandomCodes.generate(6);
        assert_eq!(code.len(), 6);
        assert!(code.bytes().all(|b| CODE_ALPHABET.contains(&b)));
    }

    #[test]
    fn system_clock_moves_forward() {
        let first = SystemClock.now();
        assert!(SystemClock.now() >= first);
    }
}
