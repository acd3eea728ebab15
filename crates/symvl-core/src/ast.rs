//! Abstract syntax of the verification language
//!
//! The AST is a closed tagged union of node kinds with position metadata as
//! an outer wrapper (`Spanned`). Parsing, type checking, and basic-block
//! decomposition happen upstream; the engine consumes programs whose
//! procedure bodies are already flattened into labeled blocks.
//!
//! Two node kinds never come from a frontend: `Literal` wraps a runtime
//! value produced by evaluation, and `Logical` is a placeholder the engine
//! introduces for a value the solver will choose.

use crate::span::{Span, Spanned};
use crate::ty::Type;
use crate::value::{Ref, Value};
use std::collections::{BTreeSet, HashMap};

/// An expression with its source position. Evaluation reduces a thunk to
/// another thunk; a thunk is *literal* when its root node wraps a value.
pub type Thunk = Spanned<Expr>;

/// Unary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnOp {
    /// Arithmetic negation: -e
    Neg,
    /// Logical negation: !e
    Not,
}

/// Binary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    /// Euclidean division
    Div,
    /// Euclidean remainder
    Mod,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Neq,
    /// Short-circuit conjunction
    And,
    /// Short-circuit disjunction
    Or,
    /// Short-circuit implication: a ==> b
    Implies,
    /// Reverse implication: a <== b
    Explies,
    /// Equivalence: a <==> b
    Iff,
}

impl BinOp {
    /// Operators whose left literal operand can determine the result
    pub fn is_short_circuit(self) -> bool {
        matches!(self, BinOp::And | BinOp::Or | BinOp::Implies | BinOp::Explies)
    }
}

/// A quantifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QOp {
    Forall,
    Exists,
}

/// A quantified or lambda-bound variable
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BoundVar {
    pub name: String,
    pub ty: Type,
}

/// Expression node kinds
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Expr {
    /// A concrete value (introduced by evaluation)
    Literal(Value),
    /// Name reference
    Var(String),
    /// Placeholder for a solver-chosen value (introduced by the engine)
    Logical(Type, Ref),
    /// Value of an expression in the pre-state: old(e)
    Old(Box<Thunk>),
    /// Function application: f(args)
    Apply(String, Vec<Thunk>),
    /// Map selection: m[args]
    MapSelect(Box<Thunk>, Vec<Thunk>),
    /// Map update: m[args := value]
    MapUpdate(Box<Thunk>, Vec<Thunk>, Box<Thunk>),
    /// Unary operation
    Unary(UnOp, Box<Thunk>),
    /// Binary operation
    Binary(BinOp, Box<Thunk>, Box<Thunk>),
    /// Conditional: if c then t else e
    If(Box<Thunk>, Box<Thunk>, Box<Thunk>),
    /// Quantified formula
    Quantified(QOp, Vec<BoundVar>, Box<Thunk>),
    /// Map comprehension: lambda formals :: body
    Lambda(Vec<BoundVar>, Box<Thunk>),
}

impl Expr {
    /// Literal true
    pub fn tt() -> Expr {
        Expr::Literal(Value::Bool(true))
    }

    /// Literal false
    pub fn ff() -> Expr {
        Expr::Literal(Value::Bool(false))
    }
}

/// Wrap a value as a literal thunk at `span`
pub fn lit(value: Value, span: Span) -> Thunk {
    Spanned::new(Expr::Literal(value), span)
}

/// The value under a literal thunk, if any
pub fn as_literal(thunk: &Thunk) -> Option<&Value> {
    match &thunk.node {
        Expr::Literal(v) => Some(v),
        _ => None,
    }
}

/// Negate a boolean thunk at the same position
pub fn negate(thunk: Thunk) -> Thunk {
    let span = thunk.span;
    match thunk.node {
        Expr::Literal(Value::Bool(b)) => lit(Value::Bool(!b), span),
        Expr::Unary(UnOp::Not, inner) => *inner,
        node => Spanned::new(Expr::Unary(UnOp::Not, Box::new(Spanned::new(node, span))), span),
    }
}

/// Conjoin boolean thunks; the empty conjunction is literal true
pub fn conjoin(mut thunks: Vec<Thunk>, span: Span) -> Thunk {
    let Some(mut acc) = thunks.pop() else {
        return lit(Value::Bool(true), span);
    };
    while let Some(t) = thunks.pop() {
        let s = t.span.merge(acc.span);
        acc = Spanned::new(Expr::Binary(BinOp::And, Box::new(t), Box::new(acc)), s);
    }
    acc
}

/// Names occurring free in a thunk (bound variables of enclosing
/// quantifiers and lambdas excluded)
pub fn free_vars(thunk: &Thunk) -> BTreeSet<String> {
    fn go(t: &Thunk, bound: &mut Vec<String>, out: &mut BTreeSet<String>) {
        match &t.node {
            Expr::Literal(_) | Expr::Logical(_, _) => {}
            Expr::Var(name) => {
                if !bound.iter().any(|b| b == name) {
                    out.insert(name.clone());
                }
            }
            Expr::Old(e) => go(e, bound, out),
            Expr::Apply(_, args) => {
                for a in args {
                    go(a, bound, out);
                }
            }
            Expr::MapSelect(m, args) => {
                go(m, bound, out);
                for a in args {
                    go(a, bound, out);
                }
            }
            Expr::MapUpdate(m, args, v) => {
                go(m, bound, out);
                for a in args {
                    go(a, bound, out);
                }
                go(v, bound, out);
            }
            Expr::Unary(_, e) => go(e, bound, out),
            Expr::Binary(_, l, r) => {
                go(l, bound, out);
                go(r, bound, out);
            }
            Expr::If(c, t1, t2) => {
                go(c, bound, out);
                go(t1, bound, out);
                go(t2, bound, out);
            }
            Expr::Quantified(_, vars, body) | Expr::Lambda(vars, body) => {
                let n = bound.len();
                bound.extend(vars.iter().map(|v| v.name.clone()));
                go(body, bound, out);
                bound.truncate(n);
            }
        }
    }
    let mut out = BTreeSet::new();
    go(thunk, &mut Vec::new(), &mut out);
    out
}

/// Substitute thunks for free variable occurrences. Bound names of
/// quantifiers and lambdas shadow the substitution.
pub fn substitute(thunk: &Thunk, subst: &HashMap<String, Thunk>) -> Thunk {
    if subst.is_empty() {
        return thunk.clone();
    }
    let span = thunk.span;
    let node = match &thunk.node {
        Expr::Literal(_) | Expr::Logical(_, _) => thunk.node.clone(),
        Expr::Var(name) => match subst.get(name) {
            Some(t) => return t.clone(),
            None => thunk.node.clone(),
        },
        Expr::Old(e) => Expr::Old(Box::new(substitute(e, subst))),
        Expr::Apply(f, args) => Expr::Apply(
            f.clone(),
            args.iter().map(|a| substitute(a, subst)).collect(),
        ),
        Expr::MapSelect(m, args) => Expr::MapSelect(
            Box::new(substitute(m, subst)),
            args.iter().map(|a| substitute(a, subst)).collect(),
        ),
        Expr::MapUpdate(m, args, v) => Expr::MapUpdate(
            Box::new(substitute(m, subst)),
            args.iter().map(|a| substitute(a, subst)).collect(),
            Box::new(substitute(v, subst)),
        ),
        Expr::Unary(op, e) => Expr::Unary(*op, Box::new(substitute(e, subst))),
        Expr::Binary(op, l, r) => Expr::Binary(
            *op,
            Box::new(substitute(l, subst)),
            Box::new(substitute(r, subst)),
        ),
        Expr::If(c, t, e) => Expr::If(
            Box::new(substitute(c, subst)),
            Box::new(substitute(t, subst)),
            Box::new(substitute(e, subst)),
        ),
        Expr::Quantified(q, vars, body) => {
            let inner = shadowed(subst, vars);
            Expr::Quantified(*q, vars.clone(), Box::new(substitute(body, &inner)))
        }
        Expr::Lambda(vars, body) => {
            let inner = shadowed(subst, vars);
            Expr::Lambda(vars.clone(), Box::new(substitute(body, &inner)))
        }
    };
    Spanned::new(node, span)
}

fn shadowed(subst: &HashMap<String, Thunk>, vars: &[BoundVar]) -> HashMap<String, Thunk> {
    subst
        .iter()
        .filter(|(k, _)| !vars.iter().any(|v| &v.name == *k))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

// ---------------------------------------------------------------------------
// Statements and bodies
// ---------------------------------------------------------------------------

/// Role of a specification clause, reported on violation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SpecKind {
    /// Inline assert or assume
    Inline,
    /// Procedure requires clause
    Precondition,
    /// Procedure ensures clause
    Postcondition,
    /// Loop invariant
    LoopInvariant,
}

impl std::fmt::Display for SpecKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SpecKind::Inline => write!(f, "assertion"),
            SpecKind::Precondition => write!(f, "precondition"),
            SpecKind::Postcondition => write!(f, "postcondition"),
            SpecKind::LoopInvariant => write!(f, "loop invariant"),
        }
    }
}

/// A specification clause. Free clauses are assumed, never checked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecClause {
    pub expr: Thunk,
    pub free: bool,
    pub kind: SpecKind,
}

impl SpecClause {
    pub fn new(expr: Thunk, free: bool, kind: SpecKind) -> Self {
        Self { expr, free, kind }
    }
}

/// Left-hand side of an assignment: a name followed by zero or more index
/// groups, as in `a[i][j, k] := e`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssignTarget {
    pub name: String,
    pub indexes: Vec<Vec<Thunk>>,
}

/// Statement kinds within a basic block
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stmt {
    /// assert or assume, depending on the clause's `free` flag
    Predicate(SpecClause),
    /// Drop the bindings of the named variables
    Havoc(Vec<String>),
    /// Parallel assignment
    Assign(Vec<AssignTarget>, Vec<Thunk>),
    /// Procedure call: lhss := call proc(args)
    Call(Vec<String>, String, Vec<Thunk>),
    /// call forall proc(args)
    CallForall(String, Vec<Thunk>),
}

/// Block terminator
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Terminator {
    /// Nondeterministic jump to one of the labels
    Goto(Vec<String>),
    /// Leave the procedure
    Return,
}

/// A labeled basic block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BasicBlock {
    pub label: String,
    pub stmts: Vec<Spanned<Stmt>>,
    pub terminator: Spanned<Terminator>,
}

/// A flattened procedure body; execution starts at the first block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Body {
    pub blocks: Vec<BasicBlock>,
}

impl Body {
    pub fn entry_label(&self) -> Option<&str> {
        self.blocks.first().map(|b| b.label.as_str())
    }

    pub fn block(&self, label: &str) -> Option<&BasicBlock> {
        self.blocks.iter().find(|b| b.label == label)
    }
}

// ---------------------------------------------------------------------------
// Declarations
// ---------------------------------------------------------------------------

/// A declared name with its type and optional where clause
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdTypeWhere {
    pub name: String,
    pub ty: Type,
    pub where_clause: Option<Thunk>,
}

impl IdTypeWhere {
    pub fn new(name: impl Into<String>, ty: Type) -> Self {
        Self {
            name: name.into(),
            ty,
            where_clause: None,
        }
    }

    pub fn with_where(mut self, clause: Thunk) -> Self {
        self.where_clause = Some(clause);
        self
    }
}

/// A procedure declaration (contract; bodies come as implementations)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcedureDecl {
    pub name: String,
    pub params: Vec<IdTypeWhere>,
    pub returns: Vec<IdTypeWhere>,
    pub modifies: Vec<String>,
    pub requires: Vec<SpecClause>,
    pub ensures: Vec<SpecClause>,
    pub pos: Span,
}

/// A procedure implementation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Implementation {
    pub name: String,
    pub params: Vec<IdTypeWhere>,
    pub returns: Vec<IdTypeWhere>,
    pub locals: Vec<IdTypeWhere>,
    pub body: Body,
    pub pos: Span,
}

/// Top-level declaration kinds
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decl {
    /// Opaque type declaration
    TypeDecl { name: String },
    /// Constant declaration; unique constants of a type are pairwise distinct
    Const {
        names: Vec<String>,
        ty: Type,
        unique: bool,
        where_clause: Option<Thunk>,
    },
    /// Global variable declaration
    GlobalVar { decls: Vec<IdTypeWhere> },
    /// Function declaration; a body makes it a macro
    Function {
        name: String,
        params: Vec<(String, Type)>,
        ret: Type,
        body: Option<Thunk>,
    },
    /// Axiom
    Axiom(Thunk),
    /// Procedure contract
    Procedure(ProcedureDecl),
    /// Procedure implementation
    Implementation(Implementation),
}

/// A complete program
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Program {
    pub decls: Vec<Spanned<Decl>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::span::Span;

    fn var(name: &str) -> Thunk {
        Spanned::dummy(Expr::Var(name.to_string()))
    }

    #[test]
    fn free_vars_respect_binders() {
        // forall x :: x < y
        let body = Spanned::dummy(Expr::Binary(
            BinOp::Lt,
            Box::new(var("x")),
            Box::new(var("y")),
        ));
        let q = Spanned::dummy(Expr::Quantified(
            QOp::Forall,
            vec![BoundVar {
                name: "x".to_string(),
                ty: Type::Int,
            }],
            Box::new(body),
        ));
        let fv = free_vars(&q);
        assert!(!fv.contains("x"));
        assert!(fv.contains("y"));
    }

    #[test]
    fn substitute_shadows_bound_names() {
        let mut subst = HashMap::new();
        subst.insert("x".to_string(), lit(Value::int(7), Span::dummy()));

        let q = Spanned::dummy(Expr::Quantified(
            QOp::Forall,
            vec![BoundVar {
                name: "x".to_string(),
                ty: Type::Int,
            }],
            Box::new(var("x")),
        ));
        // bound x untouched
        assert_eq!(substitute(&q, &subst), q);

        // free x replaced
        assert_eq!(
            substitute(&var("x"), &subst).node,
            Expr::Literal(Value::int(7))
        );
    }

    #[test]
    fn negate_folds_literals_and_double_negation() {
        let t = lit(Value::Bool(true), Span::dummy());
        assert_eq!(negate(t).node, Expr::ff());
        let x = var("x");
        assert_eq!(negate(negate(x.clone())), x);
    }
}
