//! The Z3-backed solver facade
//!
//! Implements the engine's `Solver` contract: `check` decides
//! satisfiability of the residual constraint set, `pick` extracts a model
//! as concrete values. Repeated picks enumerate distinct models: every
//! previously returned solution is excluded by a blocking clause that
//! negates its per-ref equalities, with opaque-typed refs blocked through
//! their equality and disequality classes rather than raw tags.
//!
//! UNKNOWN outcomes (timeouts, incompleteness) are conservatively treated
//! as UNSAT: the path is reported infeasible rather than concretized with
//! an unchecked model.

use crate::error::SmtResult;
use crate::translate::Translator;
use num_bigint::BigInt;
use std::collections::HashMap;
use std::time::Duration;
use symvl_core::ast::Thunk;
use symvl_core::ty::Type;
use symvl_core::value::{Ref, Value};
use symvl_exec::{RefTypes, Sat, Solution, Solver, SolverError, SolverResult};
use z3::ast::{Ast, Bool};
use z3::{Config, Context, SatResult, Solver as Z3Solver};

/// SMT facade over Z3. One instance per engine; solutions returned by
/// `pick` accumulate as blocking clauses for enumeration.
pub struct SmtSolver {
    timeout: Option<Duration>,
    prior: Vec<Solution>,
}

impl Default for SmtSolver {
    fn default() -> Self {
        Self::new()
    }
}

impl SmtSolver {
    pub fn new() -> Self {
        Self {
            timeout: None,
            prior: Vec::new(),
        }
    }

    /// Soft timeout per query
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Forget previously returned solutions (a new test case starts a new
    /// enumeration)
    pub fn reset_enumeration(&mut self) {
        self.prior.clear();
    }

    fn solve<'ctx>(
        &self,
        ctx: &'ctx Context,
        translator: &mut Translator<'ctx>,
        constraints: &[Thunk],
        refs: &RefTypes,
        block_prior: bool,
    ) -> SmtResult<(Z3Solver<'ctx>, SatResult)> {
        translator.declare_refs(refs)?;

        let solver = Z3Solver::new(ctx);
        if let Some(timeout) = self.timeout {
            let mut params = z3::Params::new(ctx);
            params.set_u32("timeout", timeout.as_millis() as u32);
            solver.set_params(&params);
        }

        let mut assertions = Vec::with_capacity(constraints.len() + self.prior.len());
        for c in constraints {
            assertions.push(translator.translate_bool(c)?);
        }
        if block_prior {
            for solution in &self.prior {
                if let Some(clause) = blocking_clause(ctx, translator, solution, refs)? {
                    assertions.push(clause);
                }
            }
        }
        // custom-literal tag pins accumulate during translation
        for a in translator.aux_assertions() {
            solver.assert(a);
        }
        for a in &assertions {
            solver.assert(a);
        }

        let outcome = solver.check();
        tracing::debug!(?outcome, constraints = constraints.len(), "z3 query");
        Ok((solver, outcome))
    }
}

impl Solver for SmtSolver {
    fn check(&mut self, constraints: &[Thunk], refs: &RefTypes) -> SolverResult<Sat> {
        let cfg = Config::new();
        let ctx = Context::new(&cfg);
        let mut translator = Translator::new(&ctx);
        let (_, outcome) = self
            .solve(&ctx, &mut translator, constraints, refs, false)
            .map_err(SolverError::from)?;
        Ok(match outcome {
            SatResult::Sat => Sat::Sat,
            SatResult::Unsat | SatResult::Unknown => Sat::Unsat,
        })
    }

    fn pick(&mut self, constraints: &[Thunk], refs: &RefTypes) -> SolverResult<Option<Solution>> {
        let cfg = Config::new();
        let ctx = Context::new(&cfg);
        let mut translator = Translator::new(&ctx);
        let (solver, outcome) = self
            .solve(&ctx, &mut translator, constraints, refs, true)
            .map_err(SolverError::from)?;
        match outcome {
            SatResult::Sat => {}
            SatResult::Unsat | SatResult::Unknown => return Ok(None),
        }
        let model = solver
            .get_model()
            .ok_or_else(|| SolverError::Backend("no model for SAT query".to_string()))?;

        let mut solution = Solution::default();
        for (r, ty) in refs {
            if let Some(v) = translator
                .ref_value(&model, *r, ty)
                .map_err(SolverError::from)?
            {
                solution.insert(*r, v);
            }
        }
        self.prior.push(solution.clone());
        Ok(Some(solution))
    }
}

/// Negation of one prior solution: scalar refs are pinned by equality;
/// opaque refs contribute their equality classes (chained equalities
/// within a class, pairwise disequalities between class representatives)
fn blocking_clause<'ctx>(
    ctx: &'ctx Context,
    translator: &mut Translator<'ctx>,
    solution: &Solution,
    refs: &RefTypes,
) -> SmtResult<Option<Bool<'ctx>>> {
    let mut parts: Vec<Bool<'ctx>> = Vec::new();
    // (type name, tag) -> refs in the class
    let mut classes: HashMap<(String, BigInt), Vec<Ref>> = HashMap::new();

    let mut sorted: Vec<_> = solution.iter().collect();
    sorted.sort_by_key(|(r, _)| r.0);
    for (r, v) in sorted {
        match (refs.get(r), v) {
            (Some(Type::Custom(_)), Value::Custom(c)) => {
                classes
                    .entry((c.ty.clone(), c.tag.clone()))
                    .or_default()
                    .push(*r);
            }
            (Some(_), v) => {
                let Some(term) = translator.ref_term(*r).cloned() else {
                    continue;
                };
                let value = translator.value_term(v)?;
                parts.push(term._eq(&value));
            }
            (None, _) => {}
        }
    }

    // within a class: chain equalities between successive refs
    let mut class_list: Vec<((String, BigInt), Vec<Ref>)> = classes.into_iter().collect();
    class_list.sort_by_key(|((_, _), members)| members[0].0);
    for (_, members) in &class_list {
        for pair in members.windows(2) {
            if let (Some(a), Some(b)) = (
                translator.ref_term(pair[0]).cloned(),
                translator.ref_term(pair[1]).cloned(),
            ) {
                parts.push(a._eq(&b));
            }
        }
    }
    // between classes of the same type: pairwise disequality of
    // representatives
    for (i, ((ty_a, _), members_a)) in class_list.iter().enumerate() {
        for ((ty_b, _), members_b) in class_list.iter().skip(i + 1) {
            if ty_a != ty_b {
                continue;
            }
            if let (Some(a), Some(b)) = (
                translator.ref_term(members_a[0]).cloned(),
                translator.ref_term(members_b[0]).cloned(),
            ) {
                parts.push(a._eq(&b).not());
            }
        }
    }

    if parts.is_empty() {
        return Ok(None);
    }
    let refs_vec: Vec<&Bool<'ctx>> = parts.iter().collect();
    Ok(Some(Bool::and(ctx, &refs_vec).not()))
}
