//! Expression evaluation with lazy value choice
//!
//! `eval` reduces a thunk to another thunk, mutating memory along the way:
//! reading an unbound name materializes a fresh logical ref (maps get a
//! fresh empty instance), selecting an uncached map point binds a fresh
//! symbolic value and queues the point for constraint propagation. A result
//! that is not literal keeps enough structure to be handed to the solver.
//!
//! Formulas that are *assumed* evaluate in force mode: universals are
//! forced true (constraint extraction) or, under an odd number of
//! negations, forced false (counterexample binding). Everything else flips
//! the generator's bit at each quantifier.

use crate::engine::Engine;
use crate::error::{ExecResult, Failure};
use crate::memory::Region;
use crate::store::{ConstraintScope, MapConstraint};
use num_bigint::BigInt;
use num_integer::Integer;
use num_traits::Zero;
use std::collections::HashMap;
use symvl_core::ast::{
    as_literal, conjoin, free_vars, lit, negate, substitute, BinOp, BoundVar, Expr, QOp, Thunk,
    UnOp,
};
use symvl_core::ty::Type;
use symvl_core::value::Value;
use symvl_core::{Span, Spanned};

/// Quantifier forcing mode for assumed formulas
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Force {
    /// Flip the generator's bit at each quantifier
    Neutral,
    /// Universals extract constraints and evaluate to true
    True,
    /// Universals bind a counterexample and evaluate to false
    False,
}

impl Force {
    pub(crate) fn flip(self) -> Force {
        match self {
            Force::Neutral => Force::Neutral,
            Force::True => Force::False,
            Force::False => Force::True,
        }
    }

    fn decided(self) -> Option<bool> {
        match self {
            Force::Neutral => None,
            Force::True => Some(true),
            Force::False => Some(false),
        }
    }
}

/// Euclidean division: `q*b + r == a` with `0 <= r < |b|`
pub fn euclidean(a: &BigInt, b: &BigInt) -> (BigInt, BigInt) {
    let (q, r) = a.div_mod_floor(b);
    if r < BigInt::zero() {
        // floor remainder carries the divisor's sign; shift into [0, |b|)
        (q + 1, r - b)
    } else {
        (q, r)
    }
}

impl Engine<'_> {
    /// Evaluate without forcing
    pub fn eval(&mut self, t: &Thunk) -> ExecResult<Thunk> {
        self.eval_force(t, Force::Neutral)
    }

    /// Assume a formula: evaluate force-true and append to the logical
    /// constraints
    pub(crate) fn assume(&mut self, t: &Thunk) -> ExecResult<()> {
        let ev = self.eval_force(t, Force::True)?;
        self.store.extend_logical(ev)
    }

    pub(crate) fn eval_force(&mut self, t: &Thunk, force: Force) -> ExecResult<Thunk> {
        match &t.node {
            Expr::Literal(_) => Ok(t.clone()),

            Expr::Logical(_, r) => match self.mem.solution_of(*r) {
                Some(v) => Ok(lit(v.clone(), t.span)),
                None => Ok(t.clone()),
            },

            Expr::Var(name) => self.eval_var(name, t.span),

            Expr::Old(inner) => {
                let was = self.in_old;
                self.in_old = true;
                let result = self.eval_force(inner, force);
                self.in_old = was;
                result
            }

            Expr::Apply(f, args) => self.eval_apply(f, args, t.span),

            Expr::MapSelect(m, args) => {
                let m = self.eval(m)?;
                let args = args
                    .iter()
                    .map(|a| self.eval(a))
                    .collect::<ExecResult<Vec<_>>>()?;
                self.eval_select_on(m, args, t.span)
            }

            Expr::MapUpdate(m, args, v) => self.eval_update(m, args, v, t.span),

            Expr::Unary(op, e) => {
                let inner_force = match op {
                    UnOp::Not => force.flip(),
                    UnOp::Neg => Force::Neutral,
                };
                let e = self.eval_force(e, inner_force)?;
                Ok(match (op, as_literal(&e)) {
                    (UnOp::Neg, Some(Value::Int(i))) => lit(Value::Int(-i), t.span),
                    (UnOp::Not, Some(Value::Bool(b))) => lit(Value::Bool(!b), t.span),
                    _ => Spanned::new(Expr::Unary(*op, Box::new(e)), t.span),
                })
            }

            Expr::Binary(op, l, r) => self.eval_binary(*op, l, r, t.span, force),

            Expr::If(c, th, el) => {
                let c = self.eval(c)?;
                match as_literal(&c) {
                    Some(Value::Bool(true)) => self.eval_force(th, force),
                    Some(Value::Bool(false)) => self.eval_force(el, force),
                    _ => {
                        let th = self.eval(th)?;
                        let el = self.eval(el)?;
                        Ok(Spanned::new(
                            Expr::If(Box::new(c), Box::new(th), Box::new(el)),
                            t.span,
                        ))
                    }
                }
            }

            Expr::Quantified(QOp::Forall, vars, body) => {
                self.eval_forall(vars, body, t.span, force)
            }

            Expr::Quantified(QOp::Exists, vars, body) => {
                // exists x :: P  ==  !(forall x :: !P)
                let inner = Spanned::new(
                    Expr::Quantified(QOp::Forall, vars.clone(), Box::new(negate((**body).clone()))),
                    t.span,
                );
                let r = self.eval_force(&inner, force.flip())?;
                Ok(negate(r))
            }

            Expr::Lambda(vars, body) => self.eval_lambda(vars, body, t.span),
        }
    }

    /// Region a name resolves to, honoring old-state reads
    pub(crate) fn read_region(&self, name: &str) -> Region {
        if self.ctx.is_local(name) {
            Region::Locals
        } else if self.ctx.is_global(name) {
            if self.in_old {
                Region::Old
            } else {
                Region::Globals
            }
        } else {
            Region::Constants
        }
    }

    /// Region a name is written to (old is never a write target)
    pub(crate) fn write_region(&self, name: &str) -> Region {
        if self.ctx.is_local(name) {
            Region::Locals
        } else if self.ctx.is_global(name) {
            Region::Globals
        } else {
            Region::Constants
        }
    }

    pub(crate) fn fresh_value_thunk(&mut self, ty: &Type, span: Span) -> Thunk {
        if ty.is_map() {
            lit(Value::Map(self.fresh_map(ty.clone())), span)
        } else {
            let r = self.fresh_logical(ty.clone());
            Spanned::new(Expr::Logical(ty.clone(), r), span)
        }
    }

    fn eval_var(&mut self, name: &str, span: Span) -> ExecResult<Thunk> {
        // quantified bound variables stay symbolic
        if self.sym_vars.contains_key(name) {
            return Ok(Spanned::new(Expr::Var(name.to_string()), span));
        }
        let region = self.read_region(name);
        if let Some(t) = self.mem.get_var(region, name) {
            return Ok(t.clone());
        }

        let ty = self.ctx.var_type(name).cloned().ok_or_else(|| {
            Failure::unsupported(format!("undeclared name {}", name), span)
        })?;

        // an unmodified global and its old value are the same value
        if region == Region::Globals && !self.mem.is_modified(name) {
            if let Some(t) = self.mem.get_var(Region::Old, name) {
                let t = t.clone();
                self.mem.set_var(Region::Globals, name, t.clone());
                return Ok(t);
            }
        }
        if region == Region::Old && !self.mem.is_modified(name) {
            if let Some(t) = self.mem.get_var(Region::Globals, name) {
                let t = t.clone();
                self.mem.set_var(Region::Old, name, t.clone());
                return Ok(t);
            }
        }

        let fresh = self.fresh_value_thunk(&ty, span);
        tracing::trace!(name, ty = %ty, "materialize");
        self.mem.set_var(region, name, fresh.clone());
        match region {
            Region::Globals if !self.mem.is_modified(name) => {
                self.mem.set_var(Region::Old, name, fresh.clone());
            }
            Region::Old
                if !self.mem.is_modified(name)
                    && self.mem.get_var(Region::Globals, name).is_none() =>
            {
                self.mem.set_var(Region::Globals, name, fresh.clone());
            }
            _ => {}
        }

        // unique constants are pairwise distinct from their materialized
        // siblings of the same type
        if region == Region::Constants && self.prog.is_unique_const(&ty, name) {
            for sib in self.prog.unique_siblings(&ty, name) {
                if let Some(s) = self.mem.get_var(Region::Constants, &sib) {
                    let s = s.clone();
                    let neq = Spanned::new(
                        Expr::Binary(BinOp::Neq, Box::new(fresh.clone()), Box::new(s)),
                        span,
                    );
                    self.store.extend_logical(neq)?;
                }
            }
        }

        // where clauses and axioms keyed on this name fire now
        let scope = if region == Region::Locals {
            ConstraintScope::Locals
        } else {
            ConstraintScope::Globals
        };
        let constraints = self.store.name_constraints(scope, name);
        for c in constraints {
            self.assume(&c)?;
        }
        Ok(fresh)
    }

    fn eval_apply(&mut self, f: &str, args: &[Thunk], span: Span) -> ExecResult<Thunk> {
        let info = self
            .prog
            .functions
            .get(f)
            .cloned()
            .ok_or_else(|| Failure::unsupported(format!("unknown function {}", f), span))?;
        let args = args
            .iter()
            .map(|a| self.eval(a))
            .collect::<ExecResult<Vec<_>>>()?;

        if let Some(body) = &info.body {
            // non-recursive macro: unfold by substitution
            let subst: HashMap<String, Thunk> = info
                .sig
                .params
                .iter()
                .map(|(n, _)| n.clone())
                .zip(args)
                .collect();
            let unfolded = substitute(body, &subst);
            return self.eval(&unfolded);
        }

        // bodyless function: a map under the function's name, selected at
        // the arguments; its axioms fire when the map materializes
        let m = match self.mem.get_var(Region::Constants, f) {
            Some(t) => t.clone(),
            None => {
                let fresh = lit(Value::Map(self.fresh_map(info.sig.map_type())), span);
                self.mem.set_var(Region::Constants, f, fresh.clone());
                let constraints = self.store.name_constraints(ConstraintScope::Globals, f);
                for c in constraints {
                    self.assume(&c)?;
                }
                fresh
            }
        };
        self.eval_select_on(m, args, span)
    }

    /// Select on an evaluated map thunk with evaluated arguments
    pub(crate) fn eval_select_on(
        &mut self,
        m: Thunk,
        args: Vec<Thunk>,
        span: Span,
    ) -> ExecResult<Thunk> {
        let r = match as_literal(&m) {
            Some(Value::Map(r)) => r.clone(),
            // selection through an undecided conditional stays symbolic
            _ => return Ok(Spanned::new(Expr::MapSelect(Box::new(m), args), span)),
        };
        // selections with quantified arguments stay residual for the
        // constraint extractor; they never cache points
        if args.iter().any(|a| self.contains_sym_var(a)) {
            return Ok(Spanned::new(Expr::MapSelect(Box::new(m), args), span));
        }
        if let Some(v) = self.mem.map_lookup(&r, &args) {
            return Ok(v.clone());
        }
        let range = match &r.ty {
            Type::Map { range, .. } => (**range).clone(),
            _ => {
                return Err(Failure::unsupported(
                    "selection on non-map value".to_string(),
                    span,
                ))
            }
        };
        let fresh = self.fresh_value_thunk(&range, span);
        self.mem.set_map_value(&r, args.clone(), fresh.clone());
        self.store.enqueue_point(r.id, args);
        Ok(fresh)
    }

    fn eval_update(
        &mut self,
        m: &Thunk,
        args: &[Thunk],
        value: &Thunk,
        span: Span,
    ) -> ExecResult<Thunk> {
        let m = self.eval(m)?;
        let r = match as_literal(&m) {
            Some(Value::Map(r)) => r.clone(),
            _ => {
                return Err(Failure::unsupported(
                    "update on symbolic map value".to_string(),
                    span,
                ))
            }
        };
        let args = args
            .iter()
            .map(|a| self.eval(a))
            .collect::<ExecResult<Vec<_>>>()?;
        let value = self.eval(value)?;

        let r2 = self.fresh_map(r.ty.clone());
        self.mem.set_map_value(&r2, args.clone(), value);
        self.store.enqueue_point(r2.id, args.clone());

        // frame: forall bv :: bv != args ==> r[bv] == r2[bv]
        let domain = match &r.ty {
            Type::Map { domain, .. } => domain.clone(),
            _ => unreachable!("map ref with non-map type"),
        };
        let formals: Vec<(String, Type)> = domain
            .iter()
            .map(|t| (self.fresh_name("u"), t.clone()))
            .collect();
        let fvars: Vec<Thunk> = formals
            .iter()
            .map(|(n, _)| Spanned::new(Expr::Var(n.clone()), span))
            .collect();
        let eqs: Vec<Thunk> = fvars
            .iter()
            .zip(args.iter())
            .map(|(f, a)| {
                Spanned::new(
                    Expr::Binary(BinOp::Eq, Box::new(f.clone()), Box::new(a.clone())),
                    span,
                )
            })
            .collect();
        let guard = negate(conjoin(eqs, span));
        let body = Spanned::new(
            Expr::Binary(
                BinOp::Eq,
                Box::new(Spanned::new(
                    Expr::MapSelect(Box::new(lit(Value::Map(r.clone()), span)), fvars.clone()),
                    span,
                )),
                Box::new(Spanned::new(
                    Expr::MapSelect(Box::new(lit(Value::Map(r2.clone()), span)), fvars),
                    span,
                )),
            ),
            span,
        );
        let constraint = MapConstraint {
            formals,
            guards: vec![guard],
            body,
        };
        self.attach_map_constraint(r.id, constraint.clone());
        self.attach_map_constraint(r2.id, constraint);
        Ok(lit(Value::Map(r2), span))
    }

    fn eval_binary(
        &mut self,
        op: BinOp,
        lhs: &Thunk,
        rhs: &Thunk,
        span: Span,
        force: Force,
    ) -> ExecResult<Thunk> {
        let (fl, fr) = match op {
            BinOp::And | BinOp::Or => (force, force),
            BinOp::Implies => (force.flip(), force),
            BinOp::Explies => (force, force.flip()),
            _ => (Force::Neutral, Force::Neutral),
        };
        let l = self.eval_force(lhs, fl)?;

        // short-circuit: a determined left operand skips the right
        if op.is_short_circuit() {
            if let Some(&Value::Bool(b)) = as_literal(&l) {
                return match (op, b) {
                    (BinOp::And, false) | (BinOp::Or, true) | (BinOp::Implies, false) => {
                        Ok(lit(Value::Bool(matches!(op, BinOp::Or | BinOp::Implies)), span))
                    }
                    (BinOp::Explies, true) => Ok(lit(Value::Bool(true), span)),
                    (BinOp::Explies, false) => {
                        let r = self.eval_force(rhs, fr)?;
                        Ok(negate(r))
                    }
                    _ => self.eval_force(rhs, fr),
                };
            }
        }

        let r = self.eval_force(rhs, fr)?;

        // equality on map references unfolds to a pointwise universal
        if matches!(op, BinOp::Eq | BinOp::Neq | BinOp::Iff) {
            if let (Some(Value::Map(r1)), Some(Value::Map(r2))) =
                (as_literal(&l), as_literal(&r))
            {
                let (r1, r2) = (r1.clone(), r2.clone());
                let inner_force = if op == BinOp::Neq { force.flip() } else { force };
                let eq = self.eval_map_equality(&r1, &r2, span, inner_force)?;
                return Ok(if op == BinOp::Neq { negate(eq) } else { eq });
            }
        }

        if let (Some(lv), Some(rv)) = (as_literal(&l), as_literal(&r)) {
            let (lv, rv) = (lv.clone(), rv.clone());
            return self.apply_binary_literal(op, &lv, &rv, span);
        }

        // algebraic folds on a determined right operand
        let folded = match (op, as_literal(&r)) {
            (BinOp::And, Some(Value::Bool(true))) => Some(l.clone()),
            (BinOp::And, Some(Value::Bool(false))) => Some(lit(Value::Bool(false), span)),
            (BinOp::Or, Some(Value::Bool(false))) => Some(l.clone()),
            (BinOp::Or, Some(Value::Bool(true))) => Some(lit(Value::Bool(true), span)),
            (BinOp::Implies, Some(Value::Bool(true))) => Some(lit(Value::Bool(true), span)),
            (BinOp::Implies, Some(Value::Bool(false))) => Some(negate(l.clone())),
            (BinOp::Explies, Some(Value::Bool(false))) => Some(lit(Value::Bool(true), span)),
            (BinOp::Explies, Some(Value::Bool(true))) => Some(l.clone()),
            _ => None,
        };
        if let Some(t) = folded {
            return Ok(t);
        }
        // identical evaluated operands denote the same value
        if matches!(op, BinOp::Eq | BinOp::Iff) && l.node == r.node {
            return Ok(lit(Value::Bool(true), span));
        }
        if op == BinOp::Neq && l.node == r.node {
            return Ok(lit(Value::Bool(false), span));
        }
        Ok(Spanned::new(
            Expr::Binary(op, Box::new(l), Box::new(r)),
            span,
        ))
    }

    fn apply_binary_literal(
        &mut self,
        op: BinOp,
        lv: &Value,
        rv: &Value,
        span: Span,
    ) -> ExecResult<Thunk> {
        use BinOp::*;
        let type_error = || {
            Failure::unsupported(
                format!("ill-typed operands {} and {}", lv.type_name(), rv.type_name()),
                span,
            )
        };
        let out = match op {
            Eq => Value::Bool(lv == rv),
            Neq => Value::Bool(lv != rv),
            Add | Sub | Mul | Div | Mod | Lt | Le | Gt | Ge => {
                let (a, b) = match (lv, rv) {
                    (Value::Int(a), Value::Int(b)) => (a, b),
                    _ => return Err(type_error()),
                };
                match op {
                    Add => Value::Int(a + b),
                    Sub => Value::Int(a - b),
                    Mul => Value::Int(a * b),
                    Div | Mod => {
                        if b.is_zero() {
                            // unspecified but deterministic: a fresh value
                            return Ok(self.fresh_value_thunk(&Type::Int, span));
                        }
                        let (q, r) = euclidean(a, b);
                        Value::Int(if op == Div { q } else { r })
                    }
                    Lt => Value::Bool(a < b),
                    Le => Value::Bool(a <= b),
                    Gt => Value::Bool(a > b),
                    Ge => Value::Bool(a >= b),
                    _ => unreachable!(),
                }
            }
            And | Or | Implies | Explies | Iff => {
                let (a, b) = match (lv, rv) {
                    (Value::Bool(a), Value::Bool(b)) => (*a, *b),
                    _ => return Err(type_error()),
                };
                Value::Bool(match op {
                    And => a && b,
                    Or => a || b,
                    Implies => !a || b,
                    Explies => a || !b,
                    Iff => a == b,
                    _ => unreachable!(),
                })
            }
        };
        Ok(lit(out, span))
    }

    /// Equality of two map references: identical refs are true, refs of
    /// different map types are false, anything else unfolds to
    /// `forall bv :: r1[bv] == r2[bv]`
    fn eval_map_equality(
        &mut self,
        r1: &symvl_core::value::MapRef,
        r2: &symvl_core::value::MapRef,
        span: Span,
        force: Force,
    ) -> ExecResult<Thunk> {
        if r1.id == r2.id {
            return Ok(lit(Value::Bool(true), span));
        }
        if r1.ty != r2.ty {
            return Ok(lit(Value::Bool(false), span));
        }
        let domain = match &r1.ty {
            Type::Map { domain, .. } => domain.clone(),
            _ => unreachable!("map ref with non-map type"),
        };
        let vars: Vec<BoundVar> = domain
            .iter()
            .map(|t| BoundVar {
                name: self.fresh_name("e"),
                ty: t.clone(),
            })
            .collect();
        let fvars: Vec<Thunk> = vars
            .iter()
            .map(|v| Spanned::new(Expr::Var(v.name.clone()), span))
            .collect();
        let body = Spanned::new(
            Expr::Binary(
                BinOp::Eq,
                Box::new(Spanned::new(
                    Expr::MapSelect(
                        Box::new(lit(Value::Map(r1.clone()), span)),
                        fvars.clone(),
                    ),
                    span,
                )),
                Box::new(Spanned::new(
                    Expr::MapSelect(Box::new(lit(Value::Map(r2.clone()), span)), fvars),
                    span,
                )),
            ),
            span,
        );
        let q = Spanned::new(Expr::Quantified(QOp::Forall, vars, Box::new(body)), span);
        self.eval_force(&q, force)
    }

    fn eval_forall(
        &mut self,
        vars: &[BoundVar],
        body: &Thunk,
        span: Span,
        force: Force,
    ) -> ExecResult<Thunk> {
        let decision = match force.decided() {
            Some(d) => d,
            None => self.gen.gen_bool(),
        };
        if decision {
            self.extract_and_attach(vars, body, span)?;
            Ok(lit(Value::Bool(true), span))
        } else {
            // bind a counterexample: fresh witnesses, then assume the
            // negated instantiation
            let mut subst = HashMap::new();
            for v in vars {
                let w = self.fresh_value_thunk(&v.ty, span);
                subst.insert(v.name.clone(), w);
            }
            let instantiated = negate(substitute(body, &subst));
            self.assume(&instantiated)?;
            Ok(lit(Value::Bool(false), span))
        }
    }

    fn eval_lambda(
        &mut self,
        vars: &[BoundVar],
        body: &Thunk,
        span: Span,
    ) -> ExecResult<Thunk> {
        // rename formals apart and evaluate the body under them, capturing
        // the current state (closure semantics)
        let (formals, subst) = self.rename_bound(vars, span);
        let body = substitute(body, &subst);
        let result = self.eval(&body).and_then(|ev| {
            let range = self.type_of(&ev)?;
            Ok((ev, range))
        });
        for (n, _) in &formals {
            self.sym_vars.remove(n);
        }
        let (evaluated, range) = result?;

        let domain: Vec<Type> = formals.iter().map(|(_, t)| t.clone()).collect();
        let m = self.fresh_map(Type::map(domain, range));
        let fvars: Vec<Thunk> = formals
            .iter()
            .map(|(n, _)| Spanned::new(Expr::Var(n.clone()), span))
            .collect();
        let selection = Spanned::new(
            Expr::MapSelect(Box::new(lit(Value::Map(m.clone()), span)), fvars),
            span,
        );
        let constraint = MapConstraint {
            formals,
            guards: vec![],
            body: Spanned::new(
                Expr::Binary(BinOp::Eq, Box::new(selection), Box::new(evaluated)),
                span,
            ),
        };
        self.attach_map_constraint(m.id, constraint);
        Ok(lit(Value::Map(m), span))
    }

    /// Rename bound variables apart and mark them symbolic. Callers remove
    /// the names from `sym_vars` when done.
    pub(crate) fn rename_bound(
        &mut self,
        vars: &[BoundVar],
        span: Span,
    ) -> (Vec<(String, Type)>, HashMap<String, Thunk>) {
        let mut formals = Vec::with_capacity(vars.len());
        let mut subst = HashMap::new();
        for v in vars {
            let fresh = self.fresh_name(&v.name);
            self.sym_vars.insert(fresh.clone(), v.ty.clone());
            subst.insert(
                v.name.clone(),
                Spanned::new(Expr::Var(fresh.clone()), span),
            );
            formals.push((fresh, v.ty.clone()));
        }
        (formals, subst)
    }

    /// Does the thunk mention a currently-symbolic bound variable?
    pub(crate) fn contains_sym_var(&self, t: &Thunk) -> bool {
        if self.sym_vars.is_empty() {
            return false;
        }
        free_vars(t)
            .iter()
            .any(|n| self.sym_vars.contains_key(n))
    }

    /// Synthesized type of an evaluated thunk
    pub(crate) fn type_of(&mut self, t: &Thunk) -> ExecResult<Type> {
        let err = |msg: String| Failure::unsupported(msg, t.span);
        Ok(match &t.node {
            Expr::Literal(v) => v.ty(),
            Expr::Logical(ty, _) => ty.clone(),
            Expr::Var(name) => match self.sym_vars.get(name) {
                Some(ty) => ty.clone(),
                None => self
                    .ctx
                    .var_type(name)
                    .cloned()
                    .ok_or_else(|| err(format!("undeclared name {}", name)))?,
            },
            Expr::Old(e) => self.type_of(e)?,
            Expr::Apply(f, _) => self
                .prog
                .functions
                .get(f)
                .map(|i| i.sig.ret.clone())
                .ok_or_else(|| err(format!("unknown function {}", f)))?,
            Expr::MapSelect(m, _) => match self.type_of(m)? {
                Type::Map { range, .. } => *range,
                other => return Err(err(format!("selection on value of type {}", other))),
            },
            Expr::MapUpdate(m, _, _) => self.type_of(m)?,
            Expr::Unary(UnOp::Neg, _) => Type::Int,
            Expr::Unary(UnOp::Not, _) => Type::Bool,
            Expr::Binary(op, _, _) => match op {
                BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Div | BinOp::Mod => Type::Int,
                BinOp::Lt
                | BinOp::Le
                | BinOp::Gt
                | BinOp::Ge
                | BinOp::Eq
                | BinOp::Neq
                | BinOp::And
                | BinOp::Or
                | BinOp::Implies
                | BinOp::Explies
                | BinOp::Iff => Type::Bool,
            },
            Expr::If(_, th, _) => self.type_of(th)?,
            Expr::Quantified(_, _, _) => Type::Bool,
            Expr::Lambda(vars, body) => {
                let added: Vec<String> = vars
                    .iter()
                    .filter(|v| !self.sym_vars.contains_key(&v.name))
                    .map(|v| v.name.clone())
                    .collect();
                for v in vars {
                    self.sym_vars
                        .entry(v.name.clone())
                        .or_insert_with(|| v.ty.clone());
                }
                let range = self.type_of(body);
                for n in added {
                    self.sym_vars.remove(&n);
                }
                Type::map(vars.iter().map(|v| v.ty.clone()).collect(), range?)
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_traits::One;
    use proptest::prelude::*;

    #[test]
    fn euclidean_examples() {
        let e = |a: i64, b: i64| {
            let (q, r) = euclidean(&BigInt::from(a), &BigInt::from(b));
            (q, r)
        };
        assert_eq!(e(7, 2), (BigInt::from(3), BigInt::one()));
        assert_eq!(e(-7, 2), (BigInt::from(-4), BigInt::one()));
        assert_eq!(e(7, -2), (BigInt::from(-3), BigInt::one()));
        assert_eq!(e(-7, -2), (BigInt::from(4), BigInt::one()));
        assert_eq!(e(6, 3), (BigInt::from(2), BigInt::from(0)));
    }

    proptest! {
        // q*b + r == a  and  0 <= r < |b|
        #[test]
        fn prop_euclidean_division(a in -10_000i64..10_000, b in -100i64..100) {
            prop_assume!(b != 0);
            let (a, b) = (BigInt::from(a), BigInt::from(b));
            let (q, r) = euclidean(&a, &b);
            prop_assert_eq!(&q * &b + &r, a);
            prop_assert!(r >= BigInt::from(0));
            prop_assert!(r < BigInt::from(b.magnitude().clone()));
        }
    }
}
