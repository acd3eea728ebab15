//! Program preprocessing
//!
//! A single pass over declarations that collects procedure implementations,
//! function macros, and axioms, and seeds the constraint store: where
//! clauses and axioms are registered under every name they mention, so they
//! are assumed exactly when that name first materializes. Unique constants
//! are recorded per type; their pairwise disequalities are assumed at
//! materialization by the evaluator.

use crate::store::{ConstraintScope, ConstraintStore};
use rustc_hash::FxHashMap;
use std::collections::BTreeSet;
use symvl_core::ast::{
    free_vars, BoundVar, Decl, Expr, Implementation, ProcedureDecl, Program, QOp, Thunk,
};
use symvl_core::ty::{FunctionSig, Type};
use symvl_core::Spanned;

/// A function as the evaluator sees it
#[derive(Debug, Clone)]
pub struct FunctionInfo {
    pub sig: FunctionSig,
    /// Macro body; bodyless functions evaluate as map selections
    pub body: Option<Thunk>,
}

/// Everything the engine needs from the declaration pass
#[derive(Debug, Clone, Default)]
pub struct Preprocessed {
    pub procedures: FxHashMap<String, ProcedureDecl>,
    /// Implementations per procedure; selection among several is
    /// nondeterministic
    pub implementations: FxHashMap<String, Vec<Implementation>>,
    pub functions: FxHashMap<String, FunctionInfo>,
    /// Unique constants per type
    pub unique_consts: FxHashMap<Type, Vec<String>>,
    /// Axioms mentioning no name at all, assumed once at program start
    pub closed_axioms: Vec<Thunk>,
}

/// Names a constraint should be keyed on: free variables plus applied
/// function names (a bodyless function materializes as a map under its own
/// name, and its axioms must fire then)
fn constraint_names(thunk: &Thunk) -> BTreeSet<String> {
    fn applied(t: &Thunk, out: &mut BTreeSet<String>) {
        match &t.node {
            Expr::Apply(f, args) => {
                out.insert(f.clone());
                for a in args {
                    applied(a, out);
                }
            }
            Expr::Literal(_) | Expr::Var(_) | Expr::Logical(_, _) => {}
            Expr::Old(e) | Expr::Unary(_, e) => applied(e, out),
            Expr::MapSelect(m, args) => {
                applied(m, out);
                for a in args {
                    applied(a, out);
                }
            }
            Expr::MapUpdate(m, args, v) => {
                applied(m, out);
                for a in args {
                    applied(a, out);
                }
                applied(v, out);
            }
            Expr::Binary(_, l, r) => {
                applied(l, out);
                applied(r, out);
            }
            Expr::If(c, t1, t2) => {
                applied(c, out);
                applied(t1, out);
                applied(t2, out);
            }
            Expr::Quantified(_, _, body) | Expr::Lambda(_, body) => applied(body, out),
        }
    }
    let mut names = free_vars(thunk);
    applied(thunk, &mut names);
    names
}

fn register_axiom(store: &mut ConstraintStore, closed: &mut Vec<Thunk>, axiom: Thunk) {
    let names = constraint_names(&axiom);
    if names.is_empty() {
        closed.push(axiom);
        return;
    }
    // extend_name registers under free variables only; cover applied
    // function names by registering the same thunk per name directly
    for name in names {
        store.extend_name_as(ConstraintScope::Globals, &name, axiom.clone());
    }
}

/// Collect declarations and seed the global name constraints
pub fn preprocess(program: &Program) -> (Preprocessed, ConstraintStore) {
    let mut pre = Preprocessed::default();
    let mut store = ConstraintStore::new();

    for decl in &program.decls {
        match &decl.node {
            Decl::TypeDecl { .. } => {}

            Decl::Const {
                names,
                ty,
                unique,
                where_clause,
            } => {
                if let Some(clause) = where_clause {
                    store.extend_name(ConstraintScope::Globals, clause.clone());
                }
                if *unique {
                    pre.unique_consts
                        .entry(ty.clone())
                        .or_default()
                        .extend(names.iter().cloned());
                }
            }

            Decl::GlobalVar { decls } => {
                for d in decls {
                    if let Some(clause) = &d.where_clause {
                        store.extend_name(ConstraintScope::Globals, clause.clone());
                    }
                }
            }

            Decl::Function {
                name,
                params,
                ret,
                body,
            } => {
                let sig = FunctionSig {
                    params: params.clone(),
                    ret: ret.clone(),
                };
                if let Some(body) = body {
                    // definitional axiom: forall params :: name(params) == body
                    let formals: Vec<BoundVar> = params
                        .iter()
                        .map(|(n, t)| BoundVar {
                            name: n.clone(),
                            ty: t.clone(),
                        })
                        .collect();
                    let args: Vec<Thunk> = params
                        .iter()
                        .map(|(n, _)| body.replace(Expr::Var(n.clone())))
                        .collect();
                    let app = body.replace(Expr::Apply(name.clone(), args));
                    let eq = body.replace(Expr::Binary(
                        symvl_core::ast::BinOp::Eq,
                        Box::new(app),
                        Box::new(body.clone()),
                    ));
                    let axiom = if formals.is_empty() {
                        eq
                    } else {
                        Spanned::new(
                            Expr::Quantified(QOp::Forall, formals, Box::new(eq)),
                            body.span,
                        )
                    };
                    register_axiom(&mut store, &mut pre.closed_axioms, axiom);
                }
                pre.functions.insert(
                    name.clone(),
                    FunctionInfo {
                        sig,
                        body: body.clone(),
                    },
                );
            }

            Decl::Axiom(a) => register_axiom(&mut store, &mut pre.closed_axioms, a.clone()),

            Decl::Procedure(p) => {
                pre.procedures.insert(p.name.clone(), p.clone());
            }

            Decl::Implementation(i) => {
                pre.implementations
                    .entry(i.name.clone())
                    .or_default()
                    .push(i.clone());
            }
        }
    }

    (pre, store)
}

impl Preprocessed {
    /// Other unique constants of the same type as `name`
    pub fn unique_siblings(&self, ty: &Type, name: &str) -> Vec<String> {
        self.unique_consts
            .get(ty)
            .map(|v| v.iter().filter(|n| *n != name).cloned().collect())
            .unwrap_or_default()
    }

    pub fn is_unique_const(&self, ty: &Type, name: &str) -> bool {
        self.unique_consts
            .get(ty)
            .is_some_and(|v| v.iter().any(|n| n == name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use symvl_core::ast::{lit, BinOp};
    use symvl_core::{Span, Value};

    fn var(name: &str) -> Thunk {
        Spanned::dummy(Expr::Var(name.to_string()))
    }

    #[test]
    fn axiom_keys_on_applied_function_names() {
        // axiom: forall i: int :: f(i) >= 0
        let body = Spanned::dummy(Expr::Binary(
            BinOp::Ge,
            Box::new(Spanned::dummy(Expr::Apply("f".to_string(), vec![var("i")]))),
            Box::new(lit(Value::int(0), Span::dummy())),
        ));
        let axiom = Spanned::dummy(Expr::Quantified(
            QOp::Forall,
            vec![BoundVar {
                name: "i".to_string(),
                ty: Type::Int,
            }],
            Box::new(body),
        ));
        let mut program = Program::default();
        program.decls.push(Spanned::dummy(Decl::Function {
            name: "f".to_string(),
            params: vec![("x".to_string(), Type::Int)],
            ret: Type::Int,
            body: None,
        }));
        program.decls.push(Spanned::dummy(Decl::Axiom(axiom)));

        let (pre, store) = preprocess(&program);
        assert!(pre.functions.contains_key("f"));
        assert_eq!(
            store.name_constraints(ConstraintScope::Globals, "f").len(),
            1
        );
    }

    #[test]
    fn function_body_emits_definitional_axiom() {
        let body = Spanned::dummy(Expr::Binary(
            BinOp::Add,
            Box::new(var("x")),
            Box::new(lit(Value::int(1), Span::dummy())),
        ));
        let mut program = Program::default();
        program.decls.push(Spanned::dummy(Decl::Function {
            name: "inc".to_string(),
            params: vec![("x".to_string(), Type::Int)],
            ret: Type::Int,
            body: Some(body),
        }));

        let (pre, store) = preprocess(&program);
        assert!(pre.functions["inc"].body.is_some());
        // the definitional axiom is keyed on the function's own name
        assert_eq!(
            store
                .name_constraints(ConstraintScope::Globals, "inc")
                .len(),
            1
        );
    }

    #[test]
    fn unique_constants_register_per_type() {
        let mut program = Program::default();
        program.decls.push(Spanned::dummy(Decl::Const {
            names: vec!["a".to_string(), "b".to_string()],
            ty: Type::Custom("T".to_string()),
            unique: true,
            where_clause: None,
        }));
        let (pre, _) = preprocess(&program);
        let t = Type::Custom("T".to_string());
        assert!(pre.is_unique_const(&t, "a"));
        assert_eq!(pre.unique_siblings(&t, "a"), vec!["b".to_string()]);
    }
}
