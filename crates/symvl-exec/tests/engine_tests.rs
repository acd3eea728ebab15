//! End-to-end engine tests over hand-built programs
//!
//! These run against the trivial solver, so they exercise the evaluator,
//! the constraint machinery, and the procedure engine without an SMT
//! backend; satisfiability-sensitive scenarios live in the smt crate's
//! scenario tests.

use num_bigint::BigInt;
use symvl_core::ast::{
    lit, AssignTarget, BasicBlock, BinOp, Body, BoundVar, Decl, Expr, IdTypeWhere, Implementation,
    ProcedureDecl, Program, QOp, SpecClause, SpecKind, Stmt, Terminator, Thunk, UnOp,
};
use symvl_core::ty::Type;
use symvl_core::value::Value;
use symvl_core::{FileId, Span, Spanned, TypeContext};
use symvl_exec::{
    execute_program, preprocess, Engine, Generator, Region, TrivialGenerator, TrivialSolver,
    Verdict,
};

// ---------------------------------------------------------------------------
// builders
// ---------------------------------------------------------------------------

fn sp<T>(node: T) -> Spanned<T> {
    Spanned::dummy(node)
}

fn int(i: i64) -> Thunk {
    lit(Value::int(i), Span::dummy())
}

fn var(name: &str) -> Thunk {
    sp(Expr::Var(name.to_string()))
}

fn bin(op: BinOp, l: Thunk, r: Thunk) -> Thunk {
    sp(Expr::Binary(op, Box::new(l), Box::new(r)))
}

fn old(e: Thunk) -> Thunk {
    sp(Expr::Old(Box::new(e)))
}

fn assert_stmt(e: Thunk) -> Spanned<Stmt> {
    sp(Stmt::Predicate(SpecClause::new(e, false, SpecKind::Inline)))
}

fn assume_stmt(e: Thunk) -> Spanned<Stmt> {
    sp(Stmt::Predicate(SpecClause::new(e, true, SpecKind::Inline)))
}

fn assign(name: &str, rhs: Thunk) -> Spanned<Stmt> {
    sp(Stmt::Assign(
        vec![AssignTarget {
            name: name.to_string(),
            indexes: vec![],
        }],
        vec![rhs],
    ))
}

fn ret_block(label: &str, stmts: Vec<Spanned<Stmt>>) -> BasicBlock {
    BasicBlock {
        label: label.to_string(),
        stmts,
        terminator: sp(Terminator::Return),
    }
}

fn goto_block(label: &str, stmts: Vec<Spanned<Stmt>>, targets: &[&str]) -> BasicBlock {
    BasicBlock {
        label: label.to_string(),
        stmts,
        terminator: sp(Terminator::Goto(
            targets.iter().map(|s| s.to_string()).collect(),
        )),
    }
}

fn plain_proc(name: &str) -> ProcedureDecl {
    ProcedureDecl {
        name: name.to_string(),
        params: vec![],
        returns: vec![],
        modifies: vec![],
        requires: vec![],
        ensures: vec![],
        pos: Span::dummy(),
    }
}

fn implementation(name: &str, locals: Vec<IdTypeWhere>, blocks: Vec<BasicBlock>) -> Implementation {
    Implementation {
        name: name.to_string(),
        params: vec![],
        returns: vec![],
        locals,
        body: Body { blocks },
        pos: Span::dummy(),
    }
}

fn program(decls: Vec<Decl>) -> Program {
    Program {
        decls: decls.into_iter().map(sp).collect(),
    }
}

fn run(program: &Program, entry: &str) -> symvl_exec::TestCase {
    let mut ctx = TypeContext::from_program(program);
    let mut solver = TrivialSolver::new(None, Box::new(TrivialGenerator));
    let mut gen = TrivialGenerator;
    execute_program(program, &mut ctx, &mut solver, true, &mut gen, entry)
}

/// Generator with scripted boolean answers (first choices otherwise)
struct ScriptedBools {
    script: Vec<bool>,
    at: usize,
}

impl ScriptedBools {
    fn new(script: Vec<bool>) -> Self {
        Self { script, at: 0 }
    }
}

impl Generator for ScriptedBools {
    fn gen_bool(&mut self) -> bool {
        let b = self.script.get(self.at).copied().unwrap_or(true);
        self.at += 1;
        b
    }

    fn gen_index(&mut self, _n: usize) -> usize {
        0
    }

    fn gen_integer(&mut self, _bound: Option<&BigInt>) -> BigInt {
        BigInt::from(0)
    }
}

// ---------------------------------------------------------------------------
// evaluator-level properties
// ---------------------------------------------------------------------------

#[test]
fn literal_evaluation_is_idempotent_and_pure() {
    let prog = Program::default();
    let (pre, store) = preprocess(&prog);
    let mut ctx = TypeContext::new();
    let mut solver = TrivialSolver::new(None, Box::new(TrivialGenerator));
    let mut gen = TrivialGenerator;
    let mut engine = Engine::new(&pre, &mut ctx, &mut solver, &mut gen, store);

    let before = engine.memory().clone();
    for t in [int(42), lit(Value::Bool(true), Span::dummy())] {
        assert_eq!(engine.eval(&t).unwrap(), t);
    }
    assert_eq!(engine.memory(), &before);
}

#[test]
fn map_update_reads_back_and_frames_the_rest() {
    let prog = Program::default();
    let (pre, store) = preprocess(&prog);
    let mut ctx = TypeContext::new();
    ctx.declare_global("m", Type::map(vec![Type::Int], Type::Int));
    let mut solver = TrivialSolver::new(None, Box::new(TrivialGenerator));
    let mut gen = TrivialGenerator;
    let mut engine = Engine::new(&pre, &mut ctx, &mut solver, &mut gen, store);

    // m' := m[3 := 9]
    let updated = engine
        .eval(&sp(Expr::MapUpdate(
            Box::new(var("m")),
            vec![int(3)],
            Box::new(int(9)),
        )))
        .unwrap();
    // m'[3] == 9
    let read = engine
        .eval(&sp(Expr::MapSelect(Box::new(updated.clone()), vec![int(3)])))
        .unwrap();
    assert_eq!(read, int(9));

    // selecting m'[4] links back to m[4] through the frame constraint
    let v2 = engine
        .eval(&sp(Expr::MapSelect(Box::new(updated), vec![int(4)])))
        .unwrap();
    assert!(matches!(v2.node, Expr::Logical(_, _)));
    engine.check_sat(Span::dummy()).unwrap();
    let v1 = engine
        .eval(&sp(Expr::MapSelect(Box::new(var("m")), vec![int(4)])))
        .unwrap();
    assert!(matches!(v1.node, Expr::Logical(_, _)));
    // the propagated frame constraint ties the two selections together
    assert!(engine.constraints().logical_constraints().count() >= 1);
}

#[test]
fn repeated_selection_at_distinct_spans_shares_one_point() {
    let prog = Program::default();
    let (pre, store) = preprocess(&prog);
    let mut ctx = TypeContext::new();
    ctx.declare_global("m", Type::map(vec![Type::Int], Type::Int));
    let mut solver = TrivialSolver::new(None, Box::new(TrivialGenerator));
    let mut gen = TrivialGenerator;
    let mut engine = Engine::new(&pre, &mut ctx, &mut solver, &mut gen, store);

    // m[5] written at two different source positions is one point, one
    // symbolic value
    let occurrence = |start: u32| {
        let at = Span::new(FileId(0), start, start + 4);
        Spanned::new(
            Expr::MapSelect(
                Box::new(Spanned::new(Expr::Var("m".to_string()), at)),
                vec![lit(Value::int(5), at)],
            ),
            at,
        )
    };
    let v1 = engine.eval(&occurrence(10)).unwrap();
    let v2 = engine.eval(&occurrence(50)).unwrap();
    assert!(matches!(v1.node, Expr::Logical(_, _)));
    assert_eq!(v1, v2);
    assert_eq!(engine.memory().map_points(0).len(), 1);
}

#[test]
fn refuted_universal_binds_a_counterexample() {
    let prog = Program::default();
    let (pre, store) = preprocess(&prog);
    let mut ctx = TypeContext::new();
    ctx.declare_global("m", Type::map(vec![Type::Int], Type::Int));
    let mut solver = TrivialSolver::new(None, Box::new(TrivialGenerator));
    let mut gen = ScriptedBools::new(vec![false]);
    let mut engine = Engine::new(&pre, &mut ctx, &mut solver, &mut gen, store);

    // forall i :: m[i] >= 0, decided false
    let q = sp(Expr::Quantified(
        QOp::Forall,
        vec![BoundVar {
            name: "i".to_string(),
            ty: Type::Int,
        }],
        Box::new(bin(
            BinOp::Ge,
            sp(Expr::MapSelect(Box::new(var("m")), vec![var("i")])),
            int(0),
        )),
    ));
    let result = engine.eval(&q).unwrap();
    assert_eq!(result.node, Expr::ff());
    // the negated instantiation at the fresh witness is in the store
    assert_eq!(engine.constraints().logical_constraints().count(), 1);
    // and the witness point is cached on m
    assert_eq!(engine.memory().map_points(0).len(), 1);
}

// ---------------------------------------------------------------------------
// end-to-end scenarios (trivial solver)
// ---------------------------------------------------------------------------

#[test]
fn havoc_and_assert_square_nonnegative_passes() {
    // procedure p() { var x: int; havoc x; assert x*x >= 0; }
    let prog = program(vec![
        Decl::Procedure(plain_proc("p")),
        Decl::Implementation(implementation(
            "p",
            vec![IdTypeWhere::new("x", Type::Int)],
            vec![ret_block(
                "entry",
                vec![
                    sp(Stmt::Havoc(vec!["x".to_string()])),
                    assert_stmt(bin(BinOp::Ge, bin(BinOp::Mul, var("x"), var("x")), int(0))),
                ],
            )],
        )),
    ]);
    let test = run(&prog, "p");
    assert_eq!(test.verdict(), Verdict::Pass);
    // the passing run is concretized
    let x = test.input("x").expect("x materialized");
    assert!(matches!(x.node, Expr::Literal(_)));
}

#[test]
fn division_by_zero_is_underconstrained_not_failing() {
    // procedure p() returns (r: int) { var a, b: int; r := a div b; }
    let mut decl = plain_proc("p");
    decl.returns = vec![IdTypeWhere::new("r", Type::Int)];
    let mut imp = implementation(
        "p",
        vec![
            IdTypeWhere::new("a", Type::Int),
            IdTypeWhere::new("b", Type::Int),
        ],
        vec![ret_block(
            "entry",
            vec![assign("r", bin(BinOp::Div, var("a"), var("b")))],
        )],
    );
    imp.returns = vec![IdTypeWhere::new("r", Type::Int)];
    let prog = program(vec![Decl::Procedure(decl), Decl::Implementation(imp)]);

    let test = run(&prog, "p");
    assert_eq!(test.verdict(), Verdict::Pass);
    // every visible local is a literal after concretization
    for (name, thunk) in test.memory.vars(Region::Locals) {
        assert!(
            matches!(thunk.node, Expr::Literal(_)),
            "{} not concretized: {:?}",
            name,
            thunk
        );
    }
}

#[test]
fn failed_precondition_reports_a_violation_with_trace() {
    // procedure q(x: int) requires x > 0;  procedure main() { call q(-1); }
    let mut q = plain_proc("q");
    q.params = vec![IdTypeWhere::new("x", Type::Int)];
    q.requires = vec![SpecClause::new(
        bin(BinOp::Gt, var("x"), int(0)),
        false,
        SpecKind::Precondition,
    )];
    let prog = program(vec![
        Decl::Procedure(q),
        Decl::Procedure(plain_proc("main")),
        Decl::Implementation(implementation(
            "main",
            vec![],
            vec![ret_block(
                "entry",
                vec![sp(Stmt::Call(vec![], "q".to_string(), vec![int(-1)]))],
            )],
        )),
    ]);

    let test = run(&prog, "main");
    assert_eq!(test.verdict(), Verdict::Fail);
    let failure = test.failure.expect("failure recorded");
    match &failure.source {
        symvl_exec::FailureSource::AssertViolated { kind, .. } => {
            assert_eq!(*kind, SpecKind::Precondition);
        }
        other => panic!("expected assertion violation, got {:?}", other),
    }
    assert_eq!(failure.trace[0].procedure, "q");
}

#[test]
fn postcondition_over_old_state_passes_concretely() {
    // var g: int;
    // procedure inc() modifies g; ensures g == old(g) + 1 { g := g + 1; }
    // procedure main() { call inc(); assert g == old(g) + 1; }
    let mut inc = plain_proc("inc");
    inc.modifies = vec!["g".to_string()];
    inc.ensures = vec![SpecClause::new(
        bin(BinOp::Eq, var("g"), bin(BinOp::Add, old(var("g")), int(1))),
        false,
        SpecKind::Postcondition,
    )];
    let prog = program(vec![
        Decl::GlobalVar {
            decls: vec![IdTypeWhere::new("g", Type::Int)],
        },
        Decl::Procedure(inc),
        Decl::Implementation(implementation(
            "inc",
            vec![],
            vec![ret_block(
                "entry",
                vec![assign("g", bin(BinOp::Add, var("g"), int(1)))],
            )],
        )),
        Decl::Procedure(plain_proc("main")),
        Decl::Implementation(implementation(
            "main",
            vec![],
            vec![ret_block(
                "entry",
                vec![
                    sp(Stmt::Call(vec![], "inc".to_string(), vec![])),
                    // clean-old merge: old(g) in main is still g's entry value
                    assert_stmt(bin(
                        BinOp::Eq,
                        var("g"),
                        bin(BinOp::Add, old(var("g")), int(1)),
                    )),
                ],
            )],
        )),
    ]);

    let test = run(&prog, "main");
    assert_eq!(test.verdict(), Verdict::Pass);
}

#[test]
fn infeasible_goto_successor_is_retried() {
    // entry: goto a, b;  a: assume false; return;  b: return;
    let prog = program(vec![
        Decl::Procedure(plain_proc("p")),
        Decl::Implementation(implementation(
            "p",
            vec![],
            vec![
                goto_block("entry", vec![], &["a", "b"]),
                ret_block("a", vec![assume_stmt(lit(Value::Bool(false), Span::dummy()))]),
                ret_block("b", vec![]),
            ],
        )),
    ]);
    let test = run(&prog, "p");
    assert_eq!(test.verdict(), Verdict::Pass);
}

#[test]
fn all_infeasible_successors_make_the_path_invalid() {
    let prog = program(vec![
        Decl::Procedure(plain_proc("p")),
        Decl::Implementation(implementation(
            "p",
            vec![],
            vec![
                goto_block("entry", vec![], &["a"]),
                ret_block("a", vec![assume_stmt(lit(Value::Bool(false), Span::dummy()))]),
            ],
        )),
    ]);
    let test = run(&prog, "p");
    assert_eq!(test.verdict(), Verdict::Invalid);
}

#[test]
fn assert_false_is_a_concrete_failure() {
    let prog = program(vec![
        Decl::Procedure(plain_proc("p")),
        Decl::Implementation(implementation(
            "p",
            vec![],
            vec![ret_block(
                "entry",
                vec![assert_stmt(bin(BinOp::Lt, int(1), int(0)))],
            )],
        )),
    ]);
    let test = run(&prog, "p");
    assert_eq!(test.verdict(), Verdict::Fail);
    assert!(test.failure.is_some());
}

#[test]
fn negation_unary_folds_through_the_engine() {
    // assert !(1 < 0)
    let prog = program(vec![
        Decl::Procedure(plain_proc("p")),
        Decl::Implementation(implementation(
            "p",
            vec![],
            vec![ret_block(
                "entry",
                vec![assert_stmt(sp(Expr::Unary(
                    UnOp::Not,
                    Box::new(bin(BinOp::Lt, int(1), int(0))),
                )))],
            )],
        )),
    ]);
    assert_eq!(run(&prog, "p").verdict(), Verdict::Pass);
}

#[test]
fn test_case_display_names_entry_and_verdict() {
    let prog = program(vec![
        Decl::Procedure(plain_proc("p")),
        Decl::Implementation(implementation("p", vec![], vec![ret_block("entry", vec![])])),
    ]);
    let test = run(&prog, "p");
    assert_eq!(test.to_string(), "p: pass");
}
