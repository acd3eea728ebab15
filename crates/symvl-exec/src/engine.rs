//! The engine and its driver-facing entry point
//!
//! `execute_program` explores one execution of the entry procedure under
//! the given generator: it preprocesses declarations, assumes closed
//! axioms, runs the procedure engine, and packages the outcome as a
//! `TestCase` the driver can classify and report.

use crate::error::{ExecResult, Failure, FailureSource};
use crate::generator::Generator;
use crate::memory::Memory;
use crate::preprocess::{preprocess, Preprocessed};
use crate::solver::{RefTypes, Solver};
use crate::store::ConstraintStore;
use rustc_hash::FxHashMap;
use std::fmt;
use symvl_core::ast::{Program, Thunk};
use symvl_core::ty::{ProcedureSig, Type, TypeContext};
use symvl_core::value::{MapRef, Ref};
use symvl_core::Span;

/// The symbolic execution engine: one instance explores one execution
pub struct Engine<'a> {
    pub(crate) prog: &'a Preprocessed,
    pub(crate) ctx: &'a mut TypeContext,
    pub(crate) solver: &'a mut dyn Solver,
    pub(crate) gen: &'a mut dyn Generator,
    pub(crate) mem: Memory,
    pub(crate) store: ConstraintStore,
    /// Declared types of all logical refs ever allocated; never shrinks,
    /// even across branch-retry restores
    pub(crate) ref_types: RefTypes,
    /// Bound variables currently treated as symbolic (quantifier bodies
    /// under extraction)
    pub(crate) sym_vars: FxHashMap<String, Type>,
    /// Global reads resolve against the Old region while set
    pub(crate) in_old: bool,
    /// Visit counters biasing goto selection, keyed (procedure, label)
    pub(crate) jump_counts: FxHashMap<(String, String), u64>,
    /// Map types per heap id, for rebuilding typed references
    pub(crate) map_types: FxHashMap<u64, Type>,
    next_ref: u64,
    next_map: u64,
    next_name: u64,
}

impl<'a> Engine<'a> {
    pub fn new(
        prog: &'a Preprocessed,
        ctx: &'a mut TypeContext,
        solver: &'a mut dyn Solver,
        gen: &'a mut dyn Generator,
        store: ConstraintStore,
    ) -> Self {
        Self {
            prog,
            ctx,
            solver,
            gen,
            mem: Memory::new(),
            store,
            ref_types: RefTypes::default(),
            sym_vars: FxHashMap::default(),
            in_old: false,
            jump_counts: FxHashMap::default(),
            map_types: FxHashMap::default(),
            next_ref: 0,
            next_map: 0,
            next_name: 0,
        }
    }

    /// Allocate a fresh logical ref of the given type
    pub(crate) fn fresh_logical(&mut self, ty: Type) -> Ref {
        let r = Ref(self.next_ref);
        self.next_ref += 1;
        self.ref_types.insert(r, ty);
        r
    }

    /// Allocate a fresh, empty map instance of the given map type
    pub(crate) fn fresh_map(&mut self, ty: Type) -> MapRef {
        let id = self.next_map;
        self.next_map += 1;
        self.mem.install_map(id, Default::default());
        self.map_types.insert(id, ty.clone());
        MapRef { id, ty }
    }

    /// A name that cannot collide with guest identifiers
    pub(crate) fn fresh_name(&mut self, base: &str) -> String {
        let n = self.next_name;
        self.next_name += 1;
        format!("{}#{}", base, n)
    }

    /// The visible symbolic state
    pub fn memory(&self) -> &Memory {
        &self.mem
    }

    /// The constraint subsystem's state
    pub fn constraints(&self) -> &ConstraintStore {
        &self.store
    }

    fn run_entry(&mut self, entry: &str, solve_passing: bool) -> ExecResult<()> {
        let closed = self.prog.closed_axioms.clone();
        for axiom in &closed {
            self.assume(axiom)?;
        }
        if !self.prog.procedures.contains_key(entry) {
            return Err(Failure::unsupported(
                format!("unknown entry procedure {}", entry),
                Span::dummy(),
            ));
        }
        tracing::debug!(entry, "starting execution");
        let (_, exit_pos) = self.exec_procedure(entry, Span::dummy(), None, false, true)?;
        if solve_passing {
            self.solve_and_concretize(exit_pos)?;
        }
        Ok(())
    }
}

/// Verdict of a test case
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Concrete passing run
    Pass,
    /// Concrete failing run, with witness values in the failure's memory
    Fail,
    /// Path infeasible; not an error from the user's point of view
    Invalid,
    /// The engine cannot model the program
    Nonexecutable,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Pass => write!(f, "pass"),
            Verdict::Fail => write!(f, "fail"),
            Verdict::Invalid => write!(f, "invalid"),
            Verdict::Nonexecutable => write!(f, "nonexecutable"),
        }
    }
}

/// Outcome of one explored execution
#[derive(Debug, Clone)]
pub struct TestCase {
    /// Entry procedure name
    pub entry: String,
    /// Entry signature as resolved by the type context
    pub signature: Option<ProcedureSig>,
    /// Final memory (for failing runs, the failure also carries the
    /// snapshot taken at the point of violation)
    pub memory: Memory,
    /// Final constraint store
    pub constraints: ConstraintStore,
    pub failure: Option<Failure>,
}

impl TestCase {
    pub fn verdict(&self) -> Verdict {
        match &self.failure {
            None => Verdict::Pass,
            Some(f) => match &f.source {
                FailureSource::Unreachable => Verdict::Invalid,
                FailureSource::Unsupported(_) => Verdict::Nonexecutable,
                FailureSource::AssertViolated { .. } => Verdict::Fail,
            },
        }
    }

    /// The memory holding witness values: the failure snapshot when
    /// present, the final memory otherwise
    pub fn witness_memory(&self) -> &Memory {
        self.failure
            .as_ref()
            .and_then(|f| f.memory.as_deref())
            .unwrap_or(&self.memory)
    }

    /// Concretized value of an entry input, if one was materialized
    pub fn input(&self, name: &str) -> Option<&Thunk> {
        let mem = self.witness_memory();
        mem.get_var(crate::memory::Region::Locals, name)
            .or_else(|| mem.get_var(crate::memory::Region::Globals, name))
            .or_else(|| mem.get_var(crate::memory::Region::Constants, name))
    }
}

impl fmt::Display for TestCase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.entry, self.verdict())?;
        if let Some(failure) = &self.failure {
            write!(f, "\n{}", failure)?;
        }
        Ok(())
    }
}

/// Explore one execution of `entry` and report it as a test case.
///
/// The generator is consumed linearly; running again with a different
/// generator (or the next exhaustive sequence) explores a different
/// execution. When `solve_passing` is set, passing runs are concretized so
/// every visible store entry is a literal.
pub fn execute_program(
    program: &Program,
    ctx: &mut TypeContext,
    solver: &mut dyn Solver,
    solve_passing: bool,
    gen: &mut dyn Generator,
    entry: &str,
) -> TestCase {
    let (pre, store) = preprocess(program);
    let mut engine = Engine::new(&pre, ctx, solver, gen, store);
    let result = engine.run_entry(entry, solve_passing);
    let signature = engine.ctx.procedure_sig(entry).cloned();
    TestCase {
        entry: entry.to_string(),
        signature,
        memory: engine.mem,
        constraints: engine.store,
        failure: result.err(),
    }
}
