//! symvl-core - Data layer of the symvl symbolic interpreter
//!
//! This crate provides:
//! - **Spans**: source location tracking for failure reports
//! - **Values**: runtime representation of guest values (Int, Bool, map
//!   references, opaque customs)
//! - **AST**: the verification language as a closed tagged union with
//!   position metadata, plus free-variable and substitution helpers
//! - **Type context**: the pure name-resolution service the engine consumes
//!   in place of a type checker
//!
//! Parsing and type checking live upstream; the engine in `symvl-exec`
//! consumes well-typed programs whose bodies are flattened into basic
//! blocks.

pub mod ast;
pub mod span;
pub mod ty;
pub mod value;

pub use ast::{Expr, Program, Thunk};
pub use span::{FileId, Span, Spanned};
pub use ty::{Type, TypeContext};
pub use value::{MapRef, Ref, Value};
