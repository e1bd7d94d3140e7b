//! Session code generation.

use std::ops::RangeInclusive;

use partyforge_protocol::SessionCode;
use rand::Rng;

use crate::SessionConfig;

/// Draws fixed-width numeric join codes.
///
/// Codes never start with `0`: a five-digit generator draws uniformly from
/// `10000..=99999`. Uniqueness is not checked here; `create_session`
/// retries when the store reports a collision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodeGenerator {
    digits: u32,
}

impl CodeGenerator {
    /// Creates a generator for `digits`-wide codes (clamped to `1..=9`).
    pub fn new(digits: u32) -> Self {
        Self {
            digits: digits.clamp(1, SessionConfig::MAX_CODE_DIGITS),
        }
    }

    pub fn digits(&self) -> u32 {
        self.digits
    }

    /// The inclusive range of numbers this generator draws from.
    pub fn range(&self) -> RangeInclusive<u64> {
        let low = 10u64.pow(self.digits - 1);
        let high = 10u64.pow(self.digits) - 1;
        low..=high
    }

    /// Number of distinct codes this generator can produce.
    pub fn capacity(&self) -> u64 {
        let range = self.range();
        range.end() - range.start() + 1
    }

    /// Draws a code from the thread-local RNG.
    pub fn generate(&self) -> SessionCode {
        self.generate_with(&mut rand::rng())
    }

    /// Draws a code from `rng`.
    pub fn generate_with<R: Rng + ?Sized>(&self, rng: &mut R) -> SessionCode {
        let value = rng.random_range(self.range());
        SessionCode::from_number(value, self.digits as usize)
    }
}

impl Default for CodeGenerator {
    fn default() -> Self {
        Self::new(SessionConfig::default().code_digits)
    }
}
