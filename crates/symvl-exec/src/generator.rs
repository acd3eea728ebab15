//! Nondeterminism oracles
//!
//! Every choice the engine makes (goto successor, boolean for a symbolic
//! predicate, enablement of a guarded map case, trivial-solver values) is
//! delegated to a `Generator`. Running the engine repeatedly with different
//! generators yields different executions: the exhaustive generator walks
//! all choice sequences depth-first, the random generator samples, and the
//! trivial generator always takes the first choice.
//!
//! Generators are single-owner and consumed linearly within one execution.

use num_bigint::BigInt;
use num_traits::{Signed, ToPrimitive};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// A stream-producing choice oracle
pub trait Generator {
    /// Choose a boolean; `true` is the first choice
    fn gen_bool(&mut self) -> bool;

    /// Choose an index in `[0, n)`; `n` must be positive
    fn gen_index(&mut self, n: usize) -> usize;

    /// Choose an integer in `[-bound, +bound]`, or from the unbounded
    /// zigzag order `0, 1, -1, 2, -2, …` when no bound is given
    fn gen_integer(&mut self, bound: Option<&BigInt>) -> BigInt;
}

/// The k-th element of the order `0, 1, -1, 2, -2, …`
fn zigzag(k: u64) -> BigInt {
    let magnitude = BigInt::from(k.div_ceil(2));
    if k % 2 == 1 {
        magnitude
    } else {
        -magnitude
    }
}

/// Always takes the first choice: `true`, index 0, integer 0
#[derive(Debug, Default)]
pub struct TrivialGenerator;

impl Generator for TrivialGenerator {
    fn gen_bool(&mut self) -> bool {
        true
    }

    fn gen_index(&mut self, _n: usize) -> usize {
        0
    }

    fn gen_integer(&mut self, _bound: Option<&BigInt>) -> BigInt {
        BigInt::from(0)
    }
}

/// Samples choices from a seeded PRNG
#[derive(Debug)]
pub struct RandomGenerator {
    rng: StdRng,
    /// Magnitude used for unbounded integer choices
    default_bound: u64,
}

impl RandomGenerator {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            default_bound: 16,
        }
    }

    pub fn with_default_bound(mut self, bound: u64) -> Self {
        self.default_bound = bound;
        self
    }
}

impl Generator for RandomGenerator {
    fn gen_bool(&mut self) -> bool {
        self.rng.gen()
    }

    fn gen_index(&mut self, n: usize) -> usize {
        debug_assert!(n > 0);
        self.rng.gen_range(0..n)
    }

    fn gen_integer(&mut self, bound: Option<&BigInt>) -> BigInt {
        let b = bound
            .and_then(|b| b.abs().to_u64())
            .unwrap_or(self.default_bound);
        let raw: i128 = self.rng.gen_range(-(b as i128)..=(b as i128));
        BigInt::from(raw)
    }
}

/// One recorded choice point
#[derive(Debug, Clone, Copy)]
struct ChoicePoint {
    /// Choice taken in the current run
    choice: u64,
    /// Number of alternatives, if finite
    limit: Option<u64>,
}

/// Enumerates choice sequences depth-first
///
/// A run replays the recorded prefix and extends it with first choices;
/// `next_sequence` then advances the deepest choice point that still has an
/// untried alternative and truncates everything after it, odometer style.
/// The driver re-runs the engine until `next_sequence` reports exhaustion
/// or its solution bound is reached.
#[derive(Debug, Default)]
pub struct ExhaustiveGenerator {
    path: Vec<ChoicePoint>,
    cursor: usize,
    /// Cap on alternatives at choice points with no natural bound
    /// (unbounded integer choices)
    unbounded_limit: Option<u64>,
}

impl ExhaustiveGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bound the alternatives tried at unbounded integer choice points,
    /// making full enumeration finite
    pub fn with_unbounded_limit(mut self, limit: u64) -> Self {
        self.unbounded_limit = Some(limit);
        self
    }

    /// Rewind for the next run. Returns false when every sequence has been
    /// explored.
    pub fn next_sequence(&mut self) -> bool {
        while let Some(point) = self.path.last_mut() {
            let exhausted = match point.limit {
                Some(limit) => point.choice + 1 >= limit,
                None => false,
            };
            if exhausted {
                self.path.pop();
            } else {
                point.choice += 1;
                self.cursor = 0;
                return true;
            }
        }
        false
    }

    fn gen_raw(&mut self, limit: Option<u64>) -> u64 {
        let choice = if self.cursor < self.path.len() {
            self.path[self.cursor].choice
        } else {
            self.path.push(ChoicePoint { choice: 0, limit });
            0
        };
        self.cursor += 1;
        choice
    }
}

impl Generator for ExhaustiveGenerator {
    fn gen_bool(&mut self) -> bool {
        self.gen_raw(Some(2)) == 0
    }

    fn gen_index(&mut self, n: usize) -> usize {
        debug_assert!(n > 0);
        self.gen_raw(Some(n as u64)) as usize
    }

    fn gen_integer(&mut self, bound: Option<&BigInt>) -> BigInt {
        match bound.and_then(|b| b.abs().to_u64()) {
            Some(b) => zigzag(self.gen_raw(Some(2 * b + 1))),
            None => zigzag(self.gen_raw(self.unbounded_limit)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zigzag_order() {
        let got: Vec<i64> = (0..5).map(|k| zigzag(k).to_i64().unwrap()).collect();
        assert_eq!(got, vec![0, 1, -1, 2, -2]);
    }

    #[test]
    fn trivial_takes_first_choice() {
        let mut g = TrivialGenerator;
        assert!(g.gen_bool());
        assert_eq!(g.gen_index(5), 0);
        assert_eq!(g.gen_integer(None), BigInt::from(0));
    }

    #[test]
    fn exhaustive_enumerates_all_bool_pairs() {
        let mut g = ExhaustiveGenerator::new();
        let mut seen = Vec::new();
        loop {
            seen.push((g.gen_bool(), g.gen_bool()));
            if !g.next_sequence() {
                break;
            }
        }
        assert_eq!(
            seen,
            vec![(true, true), (true, false), (false, true), (false, false)]
        );
    }

    #[test]
    fn exhaustive_terminates_on_mixed_choices() {
        // A run making one index-of-3 choice and one boolean choice must
        // terminate after exactly 3 * 2 sequences.
        let mut g = ExhaustiveGenerator::new();
        let mut runs = 0;
        loop {
            let _ = g.gen_index(3);
            let _ = g.gen_bool();
            runs += 1;
            assert!(runs <= 6, "enumeration failed to terminate");
            if !g.next_sequence() {
                break;
            }
        }
        assert_eq!(runs, 6);
    }

    #[test]
    fn exhaustive_respects_unbounded_limit() {
        let mut g = ExhaustiveGenerator::new().with_unbounded_limit(3);
        let mut values = Vec::new();
        loop {
            values.push(g.gen_integer(None));
            if !g.next_sequence() {
                break;
            }
        }
        assert_eq!(
            values,
            vec![BigInt::from(0), BigInt::from(1), BigInt::from(-1)]
        );
    }

    #[test]
    fn random_is_deterministic_per_seed() {
        let mut a = RandomGenerator::new(42);
        let mut b = RandomGenerator::new(42);
        for _ in 0..32 {
            assert_eq!(a.gen_index(7), b.gen_index(7));
            assert_eq!(a.gen_bool(), b.gen_bool());
        }
    }

    #[test]
    fn random_respects_bound() {
        let mut g = RandomGenerator::new(7);
        let bound = BigInt::from(3);
        for _ in 0..100 {
            let v = g.gen_integer(Some(&bound));
            assert!(v.abs() <= bound);
        }
    }
}
