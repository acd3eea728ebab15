//! Statement execution and the procedure engine
//!
//! Basic blocks execute sequentially with a SAT check after every
//! statement. Goto terminators are nondeterministic: successors are tried
//! in least-visited order starting from the generator's choice, and an
//! unreachable outcome on one successor restores the pre-branch snapshot
//! and tries the next. Procedure boundaries snapshot globals into the old
//! region, install formals, and enforce the contract: requires are assumed
//! at the entry point but asserted at call sites, ensures are asserted at
//! exit.

use crate::engine::Engine;
use crate::error::{ExecResult, Failure, FailureSource};
use crate::memory::Region;
use crate::store::ConstraintScope;
use symvl_core::ast::{
    as_literal, negate, AssignTarget, Body, Expr, IdTypeWhere, Implementation, ProcedureDecl,
    SpecClause, SpecKind, Stmt, Terminator, Thunk,
};
use symvl_core::ty::Type;
use symvl_core::value::Value;
use symvl_core::{Span, Spanned};

impl Engine<'_> {
    pub(crate) fn exec_stmt(&mut self, stmt: &Spanned<Stmt>) -> ExecResult<()> {
        match &stmt.node {
            Stmt::Predicate(clause) => self.exec_predicate(clause, stmt.span),

            Stmt::Havoc(names) => {
                for name in names {
                    let region = self.write_region(name);
                    self.mem.forget_var(region, name);
                    if region == Region::Globals {
                        self.mem.mark_modified(name.clone());
                    }
                }
                Ok(())
            }

            Stmt::Assign(targets, rhss) => self.exec_assign(targets, rhss, stmt.span),

            Stmt::Call(lhss, proc, args) => self.exec_call(lhss, proc, args, stmt.span),

            // modelled as a no-op: a spec-only dummy of the callee would
            // only havoc its modifies set under assumed postconditions
            Stmt::CallForall(_, _) => Ok(()),
        }
    }

    /// Assert or assume a specification clause. Checked clauses that do not
    /// reduce to a literal nondeterministically pass (assume the clause) or
    /// fail (assume the negation, solve for witnesses, report).
    pub(crate) fn exec_predicate(&mut self, clause: &SpecClause, fail_pos: Span) -> ExecResult<()> {
        if clause.free {
            return self.assume(&clause.expr);
        }
        let ev = self.eval(&clause.expr)?;
        match as_literal(&ev) {
            Some(Value::Bool(true)) => Ok(()),
            Some(Value::Bool(false)) => {
                self.solve_and_concretize(fail_pos)?;
                Err(self.assert_failure(clause, fail_pos))
            }
            _ => {
                if self.gen.gen_bool() {
                    self.store.extend_logical(ev)
                } else {
                    self.store.extend_logical(negate(ev))?;
                    self.solve_and_concretize(fail_pos)?;
                    Err(self.assert_failure(clause, fail_pos))
                }
            }
        }
    }

    fn assert_failure(&self, clause: &SpecClause, fail_pos: Span) -> Failure {
        let mut failure = Failure::new(
            FailureSource::AssertViolated {
                clause: clause.expr.clone(),
                kind: clause.kind,
                def_pos: clause.expr.span,
            },
            fail_pos,
        );
        failure.memory = Some(Box::new(self.mem.clone()));
        failure
    }

    fn exec_assign(
        &mut self,
        targets: &[AssignTarget],
        rhss: &[Thunk],
        span: Span,
    ) -> ExecResult<()> {
        // normalize map writes into updates on the right-hand side
        fn normalize(base: Thunk, indexes: &[Vec<Thunk>], rhs: Thunk, span: Span) -> Thunk {
            match indexes.split_first() {
                None => rhs,
                Some((group, rest)) => {
                    let selected = Spanned::new(
                        Expr::MapSelect(Box::new(base.clone()), group.clone()),
                        span,
                    );
                    let inner = normalize(selected, rest, rhs, span);
                    Spanned::new(
                        Expr::MapUpdate(Box::new(base), group.clone(), Box::new(inner)),
                        span,
                    )
                }
            }
        }

        // parallel assignment: evaluate all right-hand sides first
        let mut values = Vec::with_capacity(targets.len());
        for (target, rhs) in targets.iter().zip(rhss) {
            let base = Spanned::new(Expr::Var(target.name.clone()), span);
            let normalized = normalize(base, &target.indexes, rhs.clone(), span);
            values.push(self.eval(&normalized)?);
        }
        for (target, value) in targets.iter().zip(values) {
            let region = self.write_region(&target.name);
            self.mem.set_var(region, target.name.clone(), value);
            if region == Region::Globals {
                self.mem.mark_modified(target.name.clone());
            }
        }
        Ok(())
    }

    fn exec_call(
        &mut self,
        lhss: &[String],
        proc: &str,
        args: &[Thunk],
        call_pos: Span,
    ) -> ExecResult<()> {
        let actuals = args
            .iter()
            .map(|a| self.eval(a))
            .collect::<ExecResult<Vec<_>>>()?;
        let (outs, _) = self
            .exec_procedure(proc, call_pos, Some(actuals), true, false)
            .map_err(|f| f.push_frame(call_pos, proc))?;
        for (lhs, out) in lhss.iter().zip(outs) {
            let region = self.write_region(lhs);
            self.mem.set_var(region, lhs.clone(), out);
            if region == Region::Globals {
                self.mem.mark_modified(lhs.clone());
            }
        }
        Ok(())
    }

    /// Run a procedure: save the caller frame, snapshot globals into old,
    /// install formals, enforce the contract, execute the body, read out
    /// the returns, and restore the caller frame with clean-old merging.
    ///
    /// `actuals = None` leaves the formals unbound so entry inputs
    /// materialize lazily as symbolic values. The entry call keeps its
    /// frame (`keep_frame`) so the reported memory shows the inputs.
    pub(crate) fn exec_procedure(
        &mut self,
        name: &str,
        call_pos: Span,
        actuals: Option<Vec<Thunk>>,
        check_requires: bool,
        keep_frame: bool,
    ) -> ExecResult<(Vec<Thunk>, Span)> {
        let decl = self.prog.procedures.get(name).cloned().ok_or_else(|| {
            Failure::unsupported(format!("unknown procedure {}", name), call_pos)
        })?;
        let implementations = self
            .prog
            .implementations
            .get(name)
            .cloned()
            .unwrap_or_default();
        let implementation = if implementations.is_empty() {
            None
        } else {
            let i = if implementations.len() > 1 {
                self.gen.gen_index(implementations.len())
            } else {
                0
            };
            Some(implementations[i].clone())
        };

        let (params, returns, locals) = match &implementation {
            Some(im) => (im.params.clone(), im.returns.clone(), im.locals.clone()),
            None => (decl.params.clone(), decl.returns.clone(), Vec::new()),
        };

        tracing::debug!(procedure = name, body = implementation.is_some(), "enter");

        // save the caller frame
        let saved_locals = self.mem.take_region(Region::Locals);
        let saved_old = self.mem.clone_region(Region::Old);
        let saved_modified = self.mem.modified_set().clone();
        let saved_local_names = self.store.swap_local_names(Default::default());

        // snapshot globals into old for this frame
        let globals = self.mem.clone_region(Region::Globals);
        self.mem.replace_region(Region::Old, globals);
        self.mem.clear_modified();

        let scope: Vec<(String, Type)> = params
            .iter()
            .chain(returns.iter())
            .chain(locals.iter())
            .map(|v| (v.name.clone(), v.ty.clone()))
            .collect();
        self.ctx.push_locals(scope);

        if let Some(actuals) = actuals {
            for (param, actual) in params.iter().zip(actuals) {
                self.mem.set_var(Region::Locals, param.name.clone(), actual);
            }
        }
        for v in params.iter().chain(returns.iter()).chain(locals.iter()) {
            if let Some(clause) = &v.where_clause {
                self.store
                    .extend_name(ConstraintScope::Locals, clause.clone());
            }
        }

        let result =
            self.exec_procedure_inner(&decl, implementation.as_ref(), &returns, check_requires, call_pos);

        if !keep_frame {
            // restore the caller frame
            self.ctx.pop_locals();
            self.store.swap_local_names(saved_local_names);
            self.mem.replace_region(Region::Locals, saved_locals);

            // clean-old merge: globals the caller had not modified keep
            // the callee's pre-state value; the caller's own snapshot wins
            let callee_old = self.mem.clone_region(Region::Old);
            let callee_modified = self.mem.modified_set().clone();
            let mut merged = im::OrdMap::new();
            for (g, v) in callee_old.iter() {
                if !saved_modified.contains(g) {
                    merged.insert(g.clone(), v.clone());
                }
            }
            for (g, v) in saved_old.iter() {
                merged.insert(g.clone(), v.clone());
            }
            self.mem.replace_region(Region::Old, merged);
            self.mem.set_modified(saved_modified.union(callee_modified));
        }

        tracing::debug!(procedure = name, ok = result.is_ok(), "exit");
        result
    }

    fn exec_procedure_inner(
        &mut self,
        decl: &ProcedureDecl,
        implementation: Option<&Implementation>,
        returns: &[IdTypeWhere],
        check_requires: bool,
        call_pos: Span,
    ) -> ExecResult<(Vec<Thunk>, Span)> {
        for clause in &decl.requires {
            if !check_requires || clause.free {
                self.assume(&clause.expr)?;
            } else {
                let checked = SpecClause::new(clause.expr.clone(), false, SpecKind::Precondition);
                self.exec_predicate(&checked, call_pos)?;
            }
        }
        self.check_sat(if call_pos.is_dummy() { decl.pos } else { call_pos })?;

        let exit_pos = match implementation {
            Some(im) => self.exec_body(&im.body, &im.name)?,
            None => {
                // spec-only execution: havoc the modifies set, assume the
                // contract's promise
                for g in &decl.modifies {
                    self.mem.forget_var(Region::Globals, g);
                    self.mem.mark_modified(g.clone());
                }
                for clause in &decl.ensures {
                    self.assume(&clause.expr)?;
                }
                decl.pos
            }
        };

        if implementation.is_some() {
            for clause in &decl.ensures {
                if clause.free {
                    self.assume(&clause.expr)?;
                } else {
                    let checked =
                        SpecClause::new(clause.expr.clone(), false, SpecKind::Postcondition);
                    self.exec_predicate(&checked, exit_pos)?;
                }
            }
        }

        let outs = returns
            .iter()
            .map(|r| self.eval(&Spanned::new(Expr::Var(r.name.clone()), exit_pos)))
            .collect::<ExecResult<Vec<_>>>()?;
        self.check_sat(exit_pos)?;
        Ok((outs, exit_pos))
    }

    fn exec_body(&mut self, body: &Body, proc: &str) -> ExecResult<Span> {
        let Some(entry) = body.entry_label() else {
            return Ok(Span::dummy());
        };
        let entry = entry.to_string();
        self.exec_from(body, proc, &entry)
    }

    /// Execute from a block to a return, with snapshot-restore retry on
    /// infeasible successors
    fn exec_from(&mut self, body: &Body, proc: &str, label: &str) -> ExecResult<Span> {
        let block = body.block(label).ok_or_else(|| {
            Failure::unsupported(format!("unknown label {}", label), Span::dummy())
        })?;
        for stmt in &block.stmts {
            self.exec_stmt(stmt)?;
            self.check_sat(stmt.span)?;
        }
        match &block.terminator.node {
            Terminator::Return => Ok(block.terminator.span),
            Terminator::Goto(labels) => {
                // least-visited first, then the generator picks
                let mut order = labels.clone();
                order.sort_by_key(|l| {
                    self.jump_counts
                        .get(&(proc.to_string(), l.clone()))
                        .copied()
                        .unwrap_or(0)
                });
                if order.len() > 1 {
                    let i = self.gen.gen_index(order.len());
                    let chosen = order.remove(i);
                    order.insert(0, chosen);
                }

                let mut last = None;
                for successor in order {
                    *self
                        .jump_counts
                        .entry((proc.to_string(), successor.clone()))
                        .or_insert(0) += 1;
                    let mem_snapshot = self.mem.clone();
                    let store_snapshot = self.store.clone();
                    match self.exec_from(body, proc, &successor) {
                        Ok(pos) => return Ok(pos),
                        Err(f) if f.is_unreachable() => {
                            tracing::debug!(label = %successor, "successor infeasible, retrying");
                            self.mem = mem_snapshot;
                            self.store = store_snapshot;
                            last = Some(f);
                        }
                        Err(f) => return Err(f),
                    }
                }
                Err(last.unwrap_or_else(|| Failure::unreachable(block.terminator.span)))
            }
        }
    }
}
