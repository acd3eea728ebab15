//! Quantifier normalization and parametric map-constraint extraction
//!
//! A force-true universal does not instantiate eagerly; instead its body is
//! normalized to negation normal form and mined for constraints of the
//! shape `lambda formals. guards ==> body`, one per map selection whose
//! arguments are quantified variables or fixed expressions. The constraints
//! attach to the selected maps and are applied at every cached point as the
//! point queue drains.
//!
//! Existential subformulas are opaque: no constraints are extracted from
//! them. Skolemization is future work.

use crate::engine::Engine;
use crate::error::ExecResult;
use crate::store::{MapConstraint, Point};
use std::collections::HashMap;
use symvl_core::ast::{
    as_literal, conjoin, free_vars, lit, negate, substitute, BinOp, Expr, QOp, Thunk, UnOp,
};
use symvl_core::ty::Type;
use symvl_core::value::{MapRef, Value};
use symvl_core::Spanned;

/// Negation normal form: negations pushed to the leaves, implications
/// rewritten, quantifiers flipped under negation
pub(crate) fn nnf(t: &Thunk, positive: bool) -> Thunk {
    let span = t.span;
    let bin = |op: BinOp, a: Thunk, b: Thunk| {
        Spanned::new(Expr::Binary(op, Box::new(a), Box::new(b)), span)
    };
    match &t.node {
        Expr::Unary(UnOp::Not, e) => nnf(e, !positive),
        Expr::Binary(BinOp::And, a, b) => {
            let op = if positive { BinOp::And } else { BinOp::Or };
            bin(op, nnf(a, positive), nnf(b, positive))
        }
        Expr::Binary(BinOp::Or, a, b) => {
            let op = if positive { BinOp::Or } else { BinOp::And };
            bin(op, nnf(a, positive), nnf(b, positive))
        }
        Expr::Binary(BinOp::Implies, a, b) => {
            if positive {
                bin(BinOp::Or, nnf(a, false), nnf(b, true))
            } else {
                bin(BinOp::And, nnf(a, true), nnf(b, false))
            }
        }
        Expr::Binary(BinOp::Explies, a, b) => {
            // a <== b is b ==> a
            if positive {
                bin(BinOp::Or, nnf(b, false), nnf(a, true))
            } else {
                bin(BinOp::And, nnf(b, true), nnf(a, false))
            }
        }
        Expr::Quantified(q, vars, body) => {
            let q = match (q, positive) {
                (QOp::Forall, true) | (QOp::Exists, false) => QOp::Forall,
                _ => QOp::Exists,
            };
            Spanned::new(
                Expr::Quantified(q, vars.clone(), Box::new(nnf(body, positive))),
                span,
            )
        }
        _ => {
            if positive {
                t.clone()
            } else {
                negate(t.clone())
            }
        }
    }
}

/// Does the thunk contain a quantifier anywhere?
pub(crate) fn contains_quantifier(t: &Thunk) -> bool {
    match &t.node {
        Expr::Quantified(_, _, _) => true,
        Expr::Literal(_) | Expr::Var(_) | Expr::Logical(_, _) => false,
        Expr::Old(e) | Expr::Unary(_, e) => contains_quantifier(e),
        Expr::Apply(_, args) => args.iter().any(contains_quantifier),
        Expr::MapSelect(m, args) => contains_quantifier(m) || args.iter().any(contains_quantifier),
        Expr::MapUpdate(m, args, v) => {
            contains_quantifier(m) || args.iter().any(contains_quantifier) || contains_quantifier(v)
        }
        Expr::Binary(_, l, r) => contains_quantifier(l) || contains_quantifier(r),
        Expr::If(c, a, b) => {
            contains_quantifier(c) || contains_quantifier(a) || contains_quantifier(b)
        }
        Expr::Lambda(_, body) => contains_quantifier(body),
    }
}

/// Map selections (whole node, map ref, arguments) occurring in a thunk,
/// deduplicated structurally
fn collect_selections(t: &Thunk, out: &mut Vec<(Thunk, MapRef, Vec<Thunk>)>) {
    match &t.node {
        Expr::MapSelect(m, args) => {
            if let Some(Value::Map(r)) = as_literal(m) {
                if !out.iter().any(|(seen, _, _)| seen.node == t.node) {
                    out.push((t.clone(), r.clone(), args.clone()));
                }
            }
            collect_selections(m, out);
            for a in args {
                collect_selections(a, out);
            }
        }
        Expr::Literal(_) | Expr::Var(_) | Expr::Logical(_, _) => {}
        Expr::Old(e) | Expr::Unary(_, e) => collect_selections(e, out),
        Expr::Apply(_, args) => {
            for a in args {
                collect_selections(a, out);
            }
        }
        Expr::MapUpdate(m, args, v) => {
            collect_selections(m, out);
            for a in args {
                collect_selections(a, out);
            }
            collect_selections(v, out);
        }
        Expr::Binary(_, l, r) => {
            collect_selections(l, out);
            collect_selections(r, out);
        }
        Expr::If(c, a, b) => {
            collect_selections(c, out);
            collect_selections(a, out);
            collect_selections(b, out);
        }
        Expr::Quantified(_, _, body) | Expr::Lambda(_, body) => collect_selections(body, out),
    }
}

/// Replace every node structurally equal to `target` with `replacement`
fn replace_expr(t: &Thunk, target: &Expr, replacement: &Expr) -> Thunk {
    if &t.node == target {
        return Spanned::new(replacement.clone(), t.span);
    }
    let span = t.span;
    let node = match &t.node {
        Expr::Literal(_) | Expr::Var(_) | Expr::Logical(_, _) => t.node.clone(),
        Expr::Old(e) => Expr::Old(Box::new(replace_expr(e, target, replacement))),
        Expr::Apply(f, args) => Expr::Apply(
            f.clone(),
            args.iter()
                .map(|a| replace_expr(a, target, replacement))
                .collect(),
        ),
        Expr::MapSelect(m, args) => Expr::MapSelect(
            Box::new(replace_expr(m, target, replacement)),
            args.iter()
                .map(|a| replace_expr(a, target, replacement))
                .collect(),
        ),
        Expr::MapUpdate(m, args, v) => Expr::MapUpdate(
            Box::new(replace_expr(m, target, replacement)),
            args.iter()
                .map(|a| replace_expr(a, target, replacement))
                .collect(),
            Box::new(replace_expr(v, target, replacement)),
        ),
        Expr::Unary(op, e) => Expr::Unary(*op, Box::new(replace_expr(e, target, replacement))),
        Expr::Binary(op, l, r) => Expr::Binary(
            *op,
            Box::new(replace_expr(l, target, replacement)),
            Box::new(replace_expr(r, target, replacement)),
        ),
        Expr::If(c, a, b) => Expr::If(
            Box::new(replace_expr(c, target, replacement)),
            Box::new(replace_expr(a, target, replacement)),
            Box::new(replace_expr(b, target, replacement)),
        ),
        Expr::Quantified(q, vars, body) => Expr::Quantified(
            *q,
            vars.clone(),
            Box::new(replace_expr(body, target, replacement)),
        ),
        Expr::Lambda(vars, body) => Expr::Lambda(
            vars.clone(),
            Box::new(replace_expr(body, target, replacement)),
        ),
    };
    Spanned::new(node, span)
}

impl Engine<'_> {
    /// Attach a parametric constraint and mark the map's materialized
    /// points dirty
    pub(crate) fn attach_map_constraint(&mut self, id: u64, constraint: MapConstraint) {
        let points = self.mem.map_points(id);
        self.store.extend_map(id, constraint, points);
    }

    /// Force-true universal: extract parametric constraints from the body
    /// and attach them to the maps they mention
    pub(crate) fn extract_and_attach(
        &mut self,
        vars: &[symvl_core::ast::BoundVar],
        body: &Thunk,
        span: symvl_core::Span,
    ) -> ExecResult<()> {
        let (formals, subst) = self.rename_bound(vars, span);
        let body = substitute(body, &subst);
        let normalized = nnf(&body, true);
        let bound: HashMap<String, Type> = formals.iter().cloned().collect();
        let result = self.extract_rec(&normalized, &bound, &[]);
        for (n, _) in &formals {
            self.sym_vars.remove(n);
        }
        result
    }

    fn extract_rec(
        &mut self,
        t: &Thunk,
        bound: &HashMap<String, Type>,
        guards: &[Thunk],
    ) -> ExecResult<()> {
        match &t.node {
            Expr::Quantified(QOp::Forall, vars, body) => {
                let (formals, subst) = self.rename_bound(vars, t.span);
                let body = substitute(body, &subst);
                let mut inner = bound.clone();
                inner.extend(formals.iter().cloned());
                let result = self.extract_rec(&body, &inner, guards);
                for (n, _) in &formals {
                    self.sym_vars.remove(n);
                }
                result
            }
            // existentials are opaque
            Expr::Quantified(QOp::Exists, _, _) => Ok(()),
            Expr::Binary(BinOp::And, a, b) => {
                self.extract_rec(a, bound, guards)?;
                self.extract_rec(b, bound, guards)
            }
            Expr::Binary(BinOp::Or, a, b) => {
                let mut ga = guards.to_vec();
                ga.push(nnf(b, false));
                self.extract_rec(a, bound, &ga)?;
                let mut gb = guards.to_vec();
                gb.push(nnf(a, false));
                self.extract_rec(b, bound, &gb)
            }
            _ => self.extract_leaf(t, bound, guards),
        }
    }

    fn extract_leaf(
        &mut self,
        t: &Thunk,
        bound: &HashMap<String, Type>,
        guards: &[Thunk],
    ) -> ExecResult<()> {
        // leaves hiding quantifiers (equivalences, nested existentials)
        // yield nothing
        if contains_quantifier(t) {
            return Ok(());
        }
        let ev = self.eval(t)?;
        if let Some(Value::Bool(true)) = as_literal(&ev) {
            return Ok(());
        }

        // a ground leaf under ground guards is assumed outright
        let ground = !self.contains_sym_var(&ev)
            && guards
                .iter()
                .all(|g| !self.contains_sym_var(g) && !contains_quantifier(g));
        if ground {
            if guards.is_empty() {
                return self.store.extend_logical(ev);
            }
            let imp = Spanned::new(
                Expr::Binary(
                    BinOp::Implies,
                    Box::new(conjoin(guards.to_vec(), t.span)),
                    Box::new(t.clone()),
                ),
                t.span,
            );
            return self.assume(&imp);
        }

        let mut selections = Vec::new();
        collect_selections(&ev, &mut selections);

        'selection: for (node, map_ref, args) in selections {
            let mut formals: Vec<(String, Type)> = Vec::new();
            let mut side_guards: Vec<Thunk> = Vec::new();
            let mut direct: Vec<String> = Vec::new();
            let mut formal_args: Vec<Thunk> = Vec::new();

            for arg in &args {
                if let Expr::Var(n) = &arg.node {
                    if let Some(ty) = bound.get(n) {
                        if direct.iter().any(|d| d == n) {
                            // repeated bound variable: fresh formal tied
                            // back by an equality guard
                            let f = self.fresh_name("v");
                            let fv = Spanned::new(Expr::Var(f.clone()), arg.span);
                            side_guards.push(Spanned::new(
                                Expr::Binary(
                                    BinOp::Eq,
                                    Box::new(fv.clone()),
                                    Box::new(arg.clone()),
                                ),
                                arg.span,
                            ));
                            formals.push((f, ty.clone()));
                            formal_args.push(fv);
                        } else {
                            direct.push(n.clone());
                            formals.push((n.clone(), ty.clone()));
                            formal_args.push(arg.clone());
                        }
                        continue;
                    }
                }
                if self.contains_sym_var(arg) {
                    // a non-fixed bound variable inside the argument
                    continue 'selection;
                }
                // fixed expression: fresh formal plus equality side guard
                let ty = self.type_of(arg)?;
                let f = self.fresh_name("v");
                let fv = Spanned::new(Expr::Var(f.clone()), arg.span);
                side_guards.push(Spanned::new(
                    Expr::Binary(BinOp::Eq, Box::new(fv.clone()), Box::new(arg.clone())),
                    arg.span,
                ));
                formals.push((f, ty));
                formal_args.push(fv);
            }

            // every quantified name in the leaf must be a direct formal
            let covered = free_vars(&ev)
                .into_iter()
                .filter(|n| self.sym_vars.contains_key(n))
                .all(|n| direct.contains(&n));
            if !covered {
                continue;
            }
            // guards may only mention direct formals among quantified names
            for g in guards {
                let ok = free_vars(g)
                    .into_iter()
                    .filter(|n| self.sym_vars.contains_key(n))
                    .all(|n| direct.contains(&n));
                if !ok {
                    continue 'selection;
                }
            }

            let mut all_guards = guards.to_vec();
            all_guards.extend(side_guards);

            let replacement = Expr::MapSelect(
                Box::new(lit(Value::Map(map_ref.clone()), node.span)),
                formal_args,
            );
            let body = replace_expr(&ev, &node.node, &replacement);
            tracing::trace!(map = map_ref.id, formals = formals.len(), "extract constraint");
            self.attach_map_constraint(
                map_ref.id,
                MapConstraint {
                    formals,
                    guards: all_guards,
                    body,
                },
            );
        }
        Ok(())
    }

    /// Propagate the pending constraints of one dequeued point: unguarded
    /// constraints are assumed at the arguments; guarded ones are enabled
    /// nondeterministically in least-used order, ties broken by the
    /// generator
    pub(crate) fn apply_point(&mut self, point: &Point) -> ExecResult<()> {
        let constraints = self.store.map_constraints_of(point.map_id);
        let start = self.store.applied_at(point.map_id, &point.args);
        if start >= constraints.len() {
            return Ok(());
        }
        self.store
            .mark_applied(point.map_id, point.args.clone(), constraints.len());
        tracing::debug!(map = point.map_id, pending = constraints.len() - start, "apply point");

        let mut guarded: Vec<usize> = Vec::new();
        for (i, c) in constraints.iter().enumerate().skip(start) {
            if c.is_guarded() {
                guarded.push(i);
            } else {
                self.apply_unguarded(c, &point.args)?;
            }
        }

        while !guarded.is_empty() {
            let Some(min) = guarded
                .iter()
                .map(|&i| self.store.case_count(point.map_id, i))
                .min()
            else {
                break;
            };
            let tied: Vec<usize> = (0..guarded.len())
                .filter(|&slot| self.store.case_count(point.map_id, guarded[slot]) == min)
                .collect();
            let pick = if tied.len() > 1 {
                self.gen.gen_index(tied.len())
            } else {
                0
            };
            let index = guarded.remove(tied[pick]);
            let enabled = self.apply_guarded(&constraints[index], &point.args)?;
            if enabled {
                self.store.bump_case_count(point.map_id, index);
            }
        }
        Ok(())
    }

    fn instantiation(c: &MapConstraint, args: &[Thunk]) -> Option<HashMap<String, Thunk>> {
        if c.formals.len() != args.len() {
            return None;
        }
        Some(
            c.formals
                .iter()
                .map(|(n, _)| n.clone())
                .zip(args.iter().cloned())
                .collect(),
        )
    }

    fn apply_unguarded(&mut self, c: &MapConstraint, args: &[Thunk]) -> ExecResult<()> {
        let Some(subst) = Self::instantiation(c, args) else {
            return Ok(());
        };
        let body = substitute(&c.body, &subst);
        self.assume(&body)
    }

    fn apply_guarded(&mut self, c: &MapConstraint, args: &[Thunk]) -> ExecResult<bool> {
        let Some(subst) = Self::instantiation(c, args) else {
            return Ok(false);
        };
        let body = substitute(&c.body, &subst);
        let guards: Vec<Thunk> = c.guards.iter().map(|g| substitute(g, &subst)).collect();
        let guard = conjoin(guards, body.span);
        let g = self.eval(&guard)?;
        match as_literal(&g) {
            Some(Value::Bool(false)) => Ok(false),
            Some(Value::Bool(true)) => {
                self.assume(&body)?;
                Ok(true)
            }
            _ => {
                if self.gen.gen_bool() {
                    self.store.extend_logical(g)?;
                    self.assume(&body)?;
                    Ok(true)
                } else {
                    self.store.extend_logical(negate(g))?;
                    Ok(false)
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use symvl_core::ast::BoundVar;
    use symvl_core::{Span, Type};

    fn var(name: &str) -> Thunk {
        Spanned::dummy(Expr::Var(name.to_string()))
    }

    fn and(a: Thunk, b: Thunk) -> Thunk {
        Spanned::dummy(Expr::Binary(BinOp::And, Box::new(a), Box::new(b)))
    }

    #[test]
    fn nnf_pushes_negation_through_conjunction() {
        let t = negate(and(var("a"), var("b")));
        let n = nnf(&t, true);
        match n.node {
            Expr::Binary(BinOp::Or, l, r) => {
                assert_eq!(l.node, negate(var("a")).node);
                assert_eq!(r.node, negate(var("b")).node);
            }
            other => panic!("expected disjunction, got {:?}", other),
        }
    }

    #[test]
    fn nnf_rewrites_implication() {
        let t = Spanned::dummy(Expr::Binary(
            BinOp::Implies,
            Box::new(var("a")),
            Box::new(var("b")),
        ));
        let n = nnf(&t, true);
        match n.node {
            Expr::Binary(BinOp::Or, l, r) => {
                assert_eq!(l.node, negate(var("a")).node);
                assert_eq!(r.node, var("b").node);
            }
            other => panic!("expected disjunction, got {:?}", other),
        }
    }

    #[test]
    fn nnf_flips_quantifier_under_negation() {
        let q = Spanned::dummy(Expr::Quantified(
            QOp::Forall,
            vec![BoundVar {
                name: "x".to_string(),
                ty: Type::Int,
            }],
            Box::new(var("p")),
        ));
        let n = nnf(&negate(q), true);
        assert!(matches!(n.node, Expr::Quantified(QOp::Exists, _, _)));
    }

    #[test]
    fn replace_expr_substitutes_all_occurrences() {
        let t = and(var("x"), and(var("x"), var("y")));
        let r = replace_expr(&t, &Expr::Var("x".to_string()), &Expr::Var("z".to_string()));
        assert_eq!(free_vars(&r).contains("x"), false);
        assert!(free_vars(&r).contains("z"));
    }

    #[test]
    fn collect_selections_finds_literal_map_targets() {
        let r = MapRef {
            id: 4,
            ty: Type::map(vec![Type::Int], Type::Int),
        };
        let sel = Spanned::dummy(Expr::MapSelect(
            Box::new(lit(Value::Map(r), Span::dummy())),
            vec![var("i")],
        ));
        let leaf = and(sel.clone(), var("p"));
        let mut out = Vec::new();
        collect_selections(&leaf, &mut out);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].1.id, 4);
    }
}
