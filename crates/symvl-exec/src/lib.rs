//! symvl-exec - Symbolic execution engine
//!
//! This crate provides:
//! - **Memory**: the four-region symbolic store with a map heap
//! - **Constraint store**: logical, per-name, and parametric per-map
//!   constraints with a dirty-point queue
//! - **Evaluator**: expression evaluation with lazy value choice
//! - **Executor**: basic-block execution with nondeterministic goto
//!   selection and the procedure engine
//! - **Constraint manager**: SAT checks after every statement and solution
//!   materialization
//! - **Solver facade**: the backend contract, plus the trivial fallback
//! - **Generators**: exhaustive, random, and trivial choice oracles
//!
//! # Quick start
//!
//! ```ignore
//! use symvl_exec::{execute_program, ExhaustiveGenerator, TrivialSolver};
//! use symvl_core::TypeContext;
//!
//! let mut ctx = TypeContext::from_program(&program);
//! let mut solver = /* an SMT facade, or TrivialSolver */;
//! let mut gen = ExhaustiveGenerator::new();
//! loop {
//!     let test = execute_program(&program, &mut ctx, &mut solver, true, &mut gen, "main");
//!     println!("{}", test);
//!     if !gen.next_sequence() { break; }
//! }
//! ```

pub mod engine;
pub mod error;
pub mod eval;
pub mod exec;
pub mod generator;
pub mod manager;
pub mod memory;
pub mod preprocess;
pub mod quant;
pub mod solver;
pub mod store;

pub use engine::{execute_program, Engine, TestCase, Verdict};
pub use error::{ExecResult, Failure, FailureSource, StackFrame};
pub use eval::euclidean;
pub use generator::{ExhaustiveGenerator, Generator, RandomGenerator, TrivialGenerator};
pub use memory::{MapInstance, Memory, Region};
pub use preprocess::{preprocess, Preprocessed};
pub use solver::{RefTypes, Sat, Solution, Solver, SolverError, SolverResult, TrivialSolver};
pub use store::{ConstraintScope, ConstraintStore, MapConstraint, Point};
