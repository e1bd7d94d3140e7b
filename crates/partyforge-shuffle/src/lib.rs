//! Shuffles for fair role assignment.
//!
//! Two flavors:
//!
//! - a plain uniform permutation (Fisher–Yates), and
//! - a **derangement**: a permutation where no element stays at its
//!   original index. Party games use this to hand every player someone
//!   else's secret, never their own.
//!
//! # Derangement search
//!
//! The derangement is found by rejection sampling: shuffle a working
//! permutation, check it has no fixed point, retry. About 37% of random
//! permutations are derangements for any length ≥ 2, so a handful of
//! attempts is typical and [`MAX_DERANGEMENT_ATTEMPTS`] is a safety valve,
//! not a statistical bound. Lengths 0 and 1 have no derangement at all and
//! are rejected up front.
//!
//! ```
//! use partyforge_shuffle::{is_derangement, Shuffler};
//! use rand::{SeedableRng, rngs::StdRng};
//!
//! let mut shuffler = Shuffler::with_rng(StdRng::seed_from_u64(7));
//! let perm = shuffler.derangement(5).unwrap();
//! assert!(is_derangement(&perm));
//! ```

use rand::Rng;
use rand::rngs::ThreadRng;
use tracing::{debug, trace};

/// How many shuffles the derangement search tries before giving up.
pub const MAX_DERANGEMENT_ATTEMPTS: u32 = 100;

/// Errors from the derangement search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ShuffleError {
    /// Sequences shorter than two elements have no derangement.
    #[error("cannot derange a sequence of length {len}")]
    TooShort { len: usize },

    /// Every attempt left at least one element in place.
    #[error("no derangement found after {attempts} attempts")]
    Exhausted { attempts: u32 },
}

// ---------------------------------------------------------------------------
// Shuffler
// ---------------------------------------------------------------------------

/// A shuffler bound to a random number generator.
///
/// Use [`Shuffler::new`] for the thread-local RNG, or
/// [`Shuffler::with_rng`] with a seeded RNG for reproducible results.
#[derive(Debug, Clone)]
pub struct Shuffler<R> {
    rng: R,
}

impl Shuffler<ThreadRng> {
    /// A shuffler drawing from the thread-local RNG.
    pub fn new() -> Self {
        Self { rng: rand::rng() }
    }
}

impl Default for Shuffler<ThreadRng> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Rng> Shuffler<R> {
    /// A shuffler drawing from `rng`.
    pub fn with_rng(rng: R) -> Self {
        Self { rng }
    }

    /// Shuffles `items` in place with Fisher–Yates. Every permutation is
    /// equally likely.
    pub fn permute_in_place<T>(&mut self, items: &mut [T]) {
        for i in (1..items.len()).rev() {
            let j = self.rng.random_range(0..=i);
            items.swap(i, j);
        }
    }

    /// A uniformly random permutation of `0..n`.
    ///
    /// `perm[i]` is the original index of the element that ends up at `i`.
    pub fn permutation(&mut self, n: usize) -> Vec<usize> {
        let mut perm: Vec<usize> = (0..n).collect();
        self.permute_in_place(&mut perm);
        perm
    }

    /// A random permutation of `0..n` with no fixed point.
    ///
    /// # Errors
    /// - [`ShuffleError::TooShort`] for `n < 2`, without trying.
    /// - [`ShuffleError::Exhausted`] if [`MAX_DERANGEMENT_ATTEMPTS`]
    ///   shuffles all had a fixed point.
    pub fn derangement(&mut self, n: usize) -> Result<Vec<usize>, ShuffleError> {
        if n < 2 {
            return Err(ShuffleError::TooShort { len: n });
        }

        let mut perm: Vec<usize> = (0..n).collect();
        for attempt in 1..=MAX_DERANGEMENT_ATTEMPTS {
            self.permute_in_place(&mut perm);
            if is_derangement(&perm) {
                debug!(len = n, attempt, "derangement found");
                return Ok(perm);
            }
            trace!(len = n, attempt, "candidate has a fixed point, reshuffling");
        }

        Err(ShuffleError::Exhausted {
            attempts: MAX_DERANGEMENT_ATTEMPTS,
        })
    }

    /// Returns a shuffled copy of `items`.
    ///
    /// With `allow_fixed_points` the result is a uniform permutation and
    /// this never fails. Without it the result is a derangement: no
    /// element is at the index it started at. Positions are what count,
    /// so equal values at different indices are still distinct elements.
    pub fn shuffle<T: Clone>(
        &mut self,
        items: &[T],
        allow_fixed_points: bool,
    ) -> Result<Vec<T>, ShuffleError> {
        let perm = if allow_fixed_points {
            self.permutation(items.len())
        } else {
            self.derangement(items.len())?
        };
        Ok(perm.into_iter().map(|i| items[i].clone()).collect())
    }
}

/// Shuffles `items` with the thread-local RNG. See [`Shuffler::shuffle`].
pub fn shuffle<T: Clone>(items: &[T], allow_fixed_points: bool) -> Result<Vec<T>, ShuffleError> {
    Shuffler::new().shuffle(items, allow_fixed_points)
}

/// Returns `true` if `perm` maps no index to itself.
///
/// The empty permutation is vacuously fixed-point free, which is why the
/// search rejects short inputs before checking.
pub fn is_derangement(perm: &[usize]) -> bool {
    perm.iter().enumerate().all(|(i, &p)| i != p)
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::*;

    fn seeded(seed: u64) -> Shuffler<StdRng> {
        Shuffler::with_rng(StdRng::seed_from_u64(seed))
    }

    #[test]
    fn test_is_derangement() {
        assert!(is_derangement(&[1, 0]));
        assert!(is_derangement(&[2, 0, 1]));
        assert!(!is_derangement(&[0, 1]));
        assert!(!is_derangement(&[1, 0, 2]));
    }

    #[test]
    fn test_derangement_rejects_empty_and_single() {
        let mut s = seeded(1);
        assert_eq!(s.derangement(0), Err(ShuffleError::TooShort { len: 0 }));
        assert_eq!(s.derangement(1), Err(ShuffleError::TooShort { len: 1 }));
    }

    #[test]
    fn test_derangement_of_two_is_swap() {
        let mut s = seeded(2);
        assert_eq!(s.derangement(2).unwrap(), vec![1, 0]);
    }

    #[test]
    fn test_permutation_contains_every_index_once() {
        let mut s = seeded(3);
        let mut perm = s.permutation(20);
        perm.sort_unstable();
        assert_eq!(perm, (0..20).collect::<Vec<_>>());
    }

    #[test]
    fn test_shuffle_allowing_fixed_points_keeps_elements() {
        let mut s = seeded(4);
        let items = vec!["a", "b", "c", "d"];
        let mut out = s.shuffle(&items, true).unwrap();
        out.sort_unstable();
        assert_eq!(out, items);
    }

    #[test]
    fn test_shuffle_allowing_fixed_points_accepts_short_input() {
        let mut s = seeded(5);
        assert_eq!(s.shuffle(&[42], true).unwrap(), vec![42]);
        assert_eq!(s.shuffle::<u8>(&[], true).unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn test_shuffle_without_fixed_points_moves_every_element() {
        let mut s = seeded(6);
        let items: Vec<String> = (0..8).map(|i| format!("p{i}")).collect();
        for _ in 0..50 {
            let out = s.shuffle(&items, false).unwrap();
            for (i, item) in out.iter().enumerate() {
                assert_ne!(item, &items[i], "element stayed at index {i}");
            }
        }
    }

    #[test]
    fn test_shuffle_error_display() {
        assert_eq!(
            ShuffleError::TooShort { len: 1 }.to_string(),
            "cannot derange a sequence of length 1"
        );
        assert_eq!(
            ShuffleError::Exhausted { attempts: 100 }.to_string(),
            "no derangement found after 100 attempts"
        );
    }
}
