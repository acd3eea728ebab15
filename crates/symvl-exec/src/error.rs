//! Runtime failures of the symbolic execution engine
//!
//! Three outcomes propagate upward as failures: a concrete assertion
//! violation (carrying witness memory), an infeasible path (`Unreachable`,
//! not an error from the user's point of view), and a construct beyond the
//! engine (`Unsupported`). Call sites push stack frames onto bubbling
//! failures; nothing is swallowed except `Unreachable` during goto retry.

use crate::memory::Memory;
use std::fmt;
use symvl_core::ast::{SpecKind, Thunk};
use symvl_core::Span;
use thiserror::Error;

/// What went wrong
#[derive(Debug, Clone, Error)]
pub enum FailureSource {
    /// A checked specification clause evaluated to false
    #[error("{kind} violated")]
    AssertViolated {
        /// The violated clause, as evaluated
        clause: Thunk,
        kind: SpecKind,
        /// Where the clause was defined
        def_pos: Span,
    },

    /// The accumulated path constraints are unsatisfiable
    #[error("assumption violated")]
    Unreachable,

    /// Construct the engine cannot model
    #[error("unsupported construct: {0}")]
    Unsupported(String),
}

/// One frame of the guest call stack, innermost first
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackFrame {
    /// Position of the call
    pub pos: Span,
    /// Name of the called procedure
    pub procedure: String,
}

/// A runtime failure with position, call trace, and (for concrete
/// violations) the memory snapshot holding witness values
#[derive(Debug, Clone)]
pub struct Failure {
    pub source: FailureSource,
    pub pos: Span,
    pub trace: Vec<StackFrame>,
    pub memory: Option<Box<Memory>>,
}

impl Failure {
    pub fn new(source: FailureSource, pos: Span) -> Self {
        Self {
            source,
            pos,
            trace: Vec::new(),
            memory: None,
        }
    }

    pub fn unreachable(pos: Span) -> Self {
        Self::new(FailureSource::Unreachable, pos)
    }

    pub fn unsupported(detail: impl Into<String>, pos: Span) -> Self {
        Self::new(FailureSource::Unsupported(detail.into()), pos)
    }

    pub fn is_unreachable(&self) -> bool {
        matches!(self.source, FailureSource::Unreachable)
    }

    pub fn is_unsupported(&self) -> bool {
        matches!(self.source, FailureSource::Unsupported(_))
    }

    /// Attach a call frame while bubbling through a call site
    pub fn push_frame(mut self, pos: Span, procedure: impl Into<String>) -> Self {
        self.trace.push(StackFrame {
            pos,
            procedure: procedure.into(),
        });
        self
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at {}", self.source, self.pos)?;
        for frame in &self.trace {
            write!(f, "\n  in call to {} at {}", frame.procedure, frame.pos)?;
        }
        Ok(())
    }
}

pub type ExecResult<T> = Result<T, Failure>;
