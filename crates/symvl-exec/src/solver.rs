//! The solver facade consumed by the engine, and the trivial fallback
//!
//! The engine hands the facade quantifier-free boolean thunks over logical
//! refs (universals are turned into map constraints or counterexample
//! instantiations before any solver call). `check` decides satisfiability;
//! `pick` produces a model, and repeated calls enumerate distinct models by
//! excluding every previously returned one with a blocking clause.

use crate::generator::Generator;
use num_bigint::BigInt;
use rustc_hash::FxHashMap;
use symvl_core::ast::Thunk;
use symvl_core::ty::Type;
use symvl_core::value::{Ref, Value};
use thiserror::Error;

/// Satisfiability verdict. UNKNOWN outcomes (timeouts, incomplete theories)
/// are conservatively folded into `Unsat` by implementations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sat {
    Sat,
    Unsat,
}

/// A model: one concrete value per logical ref
pub type Solution = FxHashMap<Ref, Value>;

/// Declared types of the engine's logical refs
pub type RefTypes = FxHashMap<Ref, Type>;

/// Faults of a solver backend (distinct from UNSAT verdicts); the engine
/// surfaces them as nonexecutable test cases
#[derive(Debug, Clone, Error)]
pub enum SolverError {
    #[error("solver cannot express construct: {0}")]
    Unsupported(String),
    #[error("solver backend error: {0}")]
    Backend(String),
}

pub type SolverResult<T> = Result<T, SolverError>;

/// Abstract SMT backend interface
pub trait Solver {
    /// Decide satisfiability of the conjunction of `constraints`
    fn check(&mut self, constraints: &[Thunk], refs: &RefTypes) -> SolverResult<Sat>;

    /// Produce a model of `constraints`, or `None` when unsatisfiable.
    /// Each call excludes all models returned by previous calls.
    fn pick(&mut self, constraints: &[Thunk], refs: &RefTypes) -> SolverResult<Option<Solution>>;
}

/// Non-SMT fallback: assigns every ref an independently generated value of
/// its declared type.
///
/// `check` reports SAT for *any* constraint set; this is deliberately
/// unsound for satisfiability queries and only safe when picking against an
/// empty constraint set (the engine detects inconsistencies downstream when
/// a real backend is attached). Use it when arbitrary values are all that
/// is needed.
pub struct TrivialSolver {
    /// Enumeration bound: values drawn from `[-bound, +bound]`, or the
    /// unbounded zigzag order when absent
    bound: Option<BigInt>,
    gen: Box<dyn Generator>,
}

impl TrivialSolver {
    pub fn new(bound: Option<BigInt>, gen: Box<dyn Generator>) -> Self {
        Self { bound, gen }
    }
}

impl Solver for TrivialSolver {
    fn check(&mut self, _constraints: &[Thunk], _refs: &RefTypes) -> SolverResult<Sat> {
        Ok(Sat::Sat)
    }

    fn pick(&mut self, _constraints: &[Thunk], refs: &RefTypes) -> SolverResult<Option<Solution>> {
        let mut solution = Solution::default();
        // sorted for a deterministic draw order
        let mut sorted: Vec<_> = refs.iter().collect();
        sorted.sort_by_key(|(r, _)| r.0);
        for (&r, ty) in sorted {
            let value = match ty {
                Type::Int => Value::Int(self.gen.gen_integer(self.bound.as_ref())),
                Type::Bool => Value::Bool(self.gen.gen_bool()),
                // map-typed names get heap references, never logical refs
                Type::Map { .. } => continue,
                Type::Custom(name) => {
                    return Err(SolverError::Unsupported(format!(
                        "cannot enumerate values of opaque type {}",
                        name
                    )))
                }
            };
            solution.insert(r, value);
        }
        Ok(Some(solution))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::TrivialGenerator;

    #[test]
    fn trivial_check_is_always_sat() {
        let mut s = TrivialSolver::new(None, Box::new(TrivialGenerator));
        assert_eq!(s.check(&[], &RefTypes::default()).unwrap(), Sat::Sat);
    }

    #[test]
    fn trivial_pick_covers_every_ref() {
        let mut refs = RefTypes::default();
        refs.insert(Ref(0), Type::Int);
        refs.insert(Ref(1), Type::Bool);
        let mut s = TrivialSolver::new(None, Box::new(TrivialGenerator));
        let sol = s.pick(&[], &refs).unwrap().unwrap();
        assert_eq!(sol.get(&Ref(0)), Some(&Value::int(0)));
        assert_eq!(sol.get(&Ref(1)), Some(&Value::Bool(true)));
    }

    #[test]
    fn trivial_pick_rejects_opaque_types() {
        let mut refs = RefTypes::default();
        refs.insert(Ref(0), Type::Custom("T".to_string()));
        let mut s = TrivialSolver::new(None, Box::new(TrivialGenerator));
        assert!(matches!(
            s.pick(&[], &refs),
            Err(SolverError::Unsupported(_))
        ));
    }
}
