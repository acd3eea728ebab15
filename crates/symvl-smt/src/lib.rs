//! symvl-smt - Z3 integration for the symvl engine
//!
//! This crate implements the engine's solver contract against Z3:
//! satisfiability checks over the residual constraint set, model
//! extraction back into engine values, and model enumeration via blocking
//! clauses. The engine itself never links Z3; attach an [`SmtSolver`]
//! where a `symvl_exec::Solver` is expected.

pub mod error;
pub mod solver;
pub mod translate;

pub use error::{SmtError, SmtResult};
pub use solver::SmtSolver;
pub use translate::Translator;
