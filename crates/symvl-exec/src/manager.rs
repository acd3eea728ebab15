//! The constraint manager
//!
//! After every statement and at every procedure boundary the manager asks
//! the solver whether the accumulated constraints are still satisfiable,
//! draining the dirty-point queue one point per SAT round. At procedure
//! exit or on a concrete failure it picks a model and materializes it back
//! into memory, so every visible store entry becomes a literal.

use crate::engine::Engine;
use crate::error::{ExecResult, Failure};
use crate::quant::contains_quantifier;
use crate::solver::Sat;
use crate::store::MapConstraint;
use num_bigint::BigInt;
use std::collections::BTreeSet;
use symvl_core::ast::{lit, BinOp, Expr, Thunk};
use symvl_core::ty::Type;
use symvl_core::value::{CustomValue, MapRef, Ref, Value};
use symvl_core::{Span, Spanned};

/// Rounds of pick-then-reevaluate before concretization gives up
const MAX_CONCRETIZE_ROUNDS: usize = 64;

fn collect_refs(t: &Thunk, out: &mut BTreeSet<Ref>) {
    match &t.node {
        Expr::Logical(_, r) => {
            out.insert(*r);
        }
        Expr::Literal(_) | Expr::Var(_) => {}
        Expr::Old(e) | Expr::Unary(_, e) => collect_refs(e, out),
        Expr::Apply(_, args) => {
            for a in args {
                collect_refs(a, out);
            }
        }
        Expr::MapSelect(m, args) => {
            collect_refs(m, out);
            for a in args {
                collect_refs(a, out);
            }
        }
        Expr::MapUpdate(m, args, v) => {
            collect_refs(m, out);
            for a in args {
                collect_refs(a, out);
            }
            collect_refs(v, out);
        }
        Expr::Binary(_, l, r) => {
            collect_refs(l, out);
            collect_refs(r, out);
        }
        Expr::If(c, a, b) => {
            collect_refs(c, out);
            collect_refs(a, out);
            collect_refs(b, out);
        }
        Expr::Quantified(_, _, body) | Expr::Lambda(_, body) => collect_refs(body, out),
    }
}

impl Engine<'_> {
    /// The constraint set handed to the solver: logical constraints plus
    /// one selection equality per cached map point
    pub(crate) fn solver_constraints(&self) -> Vec<Thunk> {
        let mut cs: Vec<Thunk> = self.store.logical_constraints().cloned().collect();
        for id in self.mem.map_ids() {
            let Some(ty) = self.map_types.get(&id) else {
                continue;
            };
            let r = MapRef {
                id,
                ty: ty.clone(),
            };
            for (args, value) in self.mem.map_instance(&r).iter() {
                let sel = Spanned::new(
                    Expr::MapSelect(
                        Box::new(lit(Value::Map(r.clone()), value.span)),
                        args.clone(),
                    ),
                    value.span,
                );
                cs.push(Spanned::new(
                    Expr::Binary(BinOp::Eq, Box::new(sel), Box::new(value.clone())),
                    value.span,
                ));
            }
        }
        cs
    }

    /// Check satisfiability, draining the point queue. An UNSAT outcome
    /// aborts the path as unreachable at `pos`.
    pub fn check_sat(&mut self, pos: Span) -> ExecResult<()> {
        loop {
            if !self.store.changed() && !self.store.has_queued_points() {
                return Ok(());
            }
            if self.store.changed() {
                let cs = self.solver_constraints();
                tracing::debug!(constraints = cs.len(), "sat check");
                match self.solver.check(&cs, &self.ref_types) {
                    Ok(Sat::Sat) => self.store.clear_changed(),
                    Ok(Sat::Unsat) => {
                        tracing::debug!("unsat: path infeasible");
                        return Err(Failure::unreachable(pos));
                    }
                    Err(e) => return Err(Failure::unsupported(e.to_string(), pos)),
                }
            }
            if let Some(point) = self.store.dequeue_point() {
                self.apply_point(&point)?;
            }
        }
    }

    /// Check, pick a model, and write it back into memory so the visible
    /// state is concrete. Fresh refs minted while re-evaluating (division
    /// by zero, new map points) are filled in from the generator, the
    /// engine's trivial fallback for unconstrained values.
    pub fn solve_and_concretize(&mut self, pos: Span) -> ExecResult<()> {
        self.check_sat(pos)?;
        let cs = self.solver_constraints();
        tracing::debug!(constraints = cs.len(), "pick model");
        let solution = match self.solver.pick(&cs, &self.ref_types) {
            Ok(Some(s)) => s,
            Ok(None) => return Err(Failure::unreachable(pos)),
            Err(e) => return Err(Failure::unsupported(e.to_string(), pos)),
        };
        for (r, v) in solution {
            self.mem.commit_solution(r, v);
        }
        self.concretize_visible()?;
        self.check_sat(pos)?;

        for _ in 0..MAX_CONCRETIZE_ROUNDS {
            let unsolved = self.unsolved_visible_refs();
            if unsolved.is_empty() {
                return Ok(());
            }
            for r in unsolved {
                let ty = self.ref_types.get(&r).cloned().unwrap_or(Type::Int);
                let value = match ty {
                    Type::Int => Value::Int(self.gen.gen_integer(None)),
                    Type::Bool => Value::Bool(self.gen.gen_bool()),
                    Type::Custom(name) => Value::Custom(CustomValue {
                        ty: name,
                        // tags below the solver's range keep fresh customs
                        // distinct from every modeled value
                        tag: -BigInt::from(r.0 + 1),
                    }),
                    Type::Map { .. } => {
                        return Err(Failure::unsupported(
                            "map-typed logical value".to_string(),
                            pos,
                        ))
                    }
                };
                self.mem.commit_solution(r, value);
            }
            self.concretize_visible()?;
            self.check_sat(pos)?;
        }
        Err(Failure::unsupported(
            "concretization did not converge".to_string(),
            pos,
        ))
    }

    /// Re-evaluate every store and every map-constraint body, replacing
    /// solved logical refs by their values
    fn concretize_visible(&mut self) -> ExecResult<()> {
        use crate::memory::Region;
        for region in [Region::Locals, Region::Globals, Region::Old, Region::Constants] {
            for name in self.mem.names(region) {
                let Some(t) = self.mem.get_var(region, &name) else {
                    continue;
                };
                let t = t.clone();
                let t2 = self.eval(&t)?;
                self.mem.set_var(region, name, t2);
            }
        }

        for id in self.mem.map_ids() {
            let Some(ty) = self.map_types.get(&id).cloned() else {
                continue;
            };
            let r = MapRef { id, ty };
            let instance = self.mem.map_instance(&r);
            for (args, value) in instance.iter() {
                let args2 = args
                    .iter()
                    .map(|a| self.eval(a))
                    .collect::<ExecResult<Vec<_>>>()?;
                let value2 = self.eval(value)?;
                if args2 != *args {
                    self.mem.remove_map_key(&r, args);
                }
                self.mem.set_map_value(&r, args2, value2);
            }
        }

        let all: Vec<(u64, Vec<MapConstraint>)> = self
            .store
            .all_map_constraints()
            .map(|(id, v)| (id, v.iter().cloned().collect()))
            .collect();
        let mut rewritten = Vec::with_capacity(all.len());
        for (id, constraints) in all {
            let mut out = Vec::with_capacity(constraints.len());
            for c in constraints {
                for (n, ty) in &c.formals {
                    self.sym_vars.insert(n.clone(), ty.clone());
                }
                let guards = c
                    .guards
                    .iter()
                    .map(|g| {
                        if contains_quantifier(g) {
                            Ok(g.clone())
                        } else {
                            self.eval(g)
                        }
                    })
                    .collect::<ExecResult<Vec<_>>>();
                let body = self.eval(&c.body);
                for (n, _) in &c.formals {
                    self.sym_vars.remove(n);
                }
                out.push(MapConstraint {
                    formals: c.formals,
                    guards: guards?,
                    body: body?,
                });
            }
            rewritten.push((id, out));
        }
        self.store.set_map_constraints(rewritten);
        Ok(())
    }

    /// Logical refs still visible in memory without a committed solution
    fn unsolved_visible_refs(&self) -> Vec<Ref> {
        use crate::memory::Region;
        let mut refs = BTreeSet::new();
        for region in [Region::Locals, Region::Globals, Region::Old, Region::Constants] {
            for (_, t) in self.mem.vars(region) {
                collect_refs(t, &mut refs);
            }
        }
        for id in self.mem.map_ids() {
            let Some(ty) = self.map_types.get(&id) else {
                continue;
            };
            let r = MapRef {
                id,
                ty: ty.clone(),
            };
            for (args, value) in self.mem.map_instance(&r).iter() {
                for a in args {
                    collect_refs(a, &mut refs);
                }
                collect_refs(value, &mut refs);
            }
        }
        refs.into_iter()
            .filter(|r| !self.mem.has_solution(*r))
            .collect()
    }
}
