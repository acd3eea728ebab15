//! Property-based tests for the expression evaluator
//!
//! These verify algebraic laws of concrete evaluation across randomized
//! inputs: literal arithmetic agrees with bignum arithmetic, division is
//! Euclidean, boolean operators match their truth tables, and
//! short-circuit operators never touch the right operand when the left
//! decides.

use num_bigint::BigInt;
use proptest::prelude::*;
use symvl_core::ast::{lit, BinOp, Expr, Program, Thunk};
use symvl_core::value::Value;
use symvl_core::{Span, Spanned, TypeContext};
use symvl_exec::{preprocess, Engine, ExecResult, TrivialGenerator, TrivialSolver};

fn int(i: i64) -> Thunk {
    lit(Value::int(i), Span::dummy())
}

fn boolean(b: bool) -> Thunk {
    lit(Value::Bool(b), Span::dummy())
}

fn bin(op: BinOp, l: Thunk, r: Thunk) -> Thunk {
    Spanned::dummy(Expr::Binary(op, Box::new(l), Box::new(r)))
}

/// Evaluate one expression in a fresh engine
fn eval_one(t: &Thunk) -> ExecResult<Thunk> {
    let prog = Program::default();
    let (pre, store) = preprocess(&prog);
    let mut ctx = TypeContext::new();
    let mut solver = TrivialSolver::new(None, Box::new(TrivialGenerator));
    let mut gen = TrivialGenerator;
    let mut engine = Engine::new(&pre, &mut ctx, &mut solver, &mut gen, store);
    engine.eval(t)
}

fn eval_int(t: &Thunk) -> BigInt {
    match eval_one(t).unwrap().node {
        Expr::Literal(Value::Int(i)) => i,
        other => panic!("expected integer literal, got {:?}", other),
    }
}

fn eval_bool(t: &Thunk) -> bool {
    match eval_one(t).unwrap().node {
        Expr::Literal(Value::Bool(b)) => b,
        other => panic!("expected boolean literal, got {:?}", other),
    }
}

proptest! {
    #[test]
    fn prop_arithmetic_matches_bignum(a in -10_000i64..10_000, b in -10_000i64..10_000) {
        prop_assert_eq!(eval_int(&bin(BinOp::Add, int(a), int(b))), BigInt::from(a) + b);
        prop_assert_eq!(eval_int(&bin(BinOp::Sub, int(a), int(b))), BigInt::from(a) - b);
        prop_assert_eq!(eval_int(&bin(BinOp::Mul, int(a), int(b))), BigInt::from(a) * b);
    }

    #[test]
    fn prop_division_is_euclidean(a in -10_000i64..10_000, b in -100i64..100) {
        prop_assume!(b != 0);
        let q = eval_int(&bin(BinOp::Div, int(a), int(b)));
        let r = eval_int(&bin(BinOp::Mod, int(a), int(b)));
        prop_assert_eq!(&q * b + &r, BigInt::from(a));
        prop_assert!(r >= BigInt::from(0));
        prop_assert!(r < BigInt::from(b.unsigned_abs()));
    }

    #[test]
    fn prop_comparisons_match(a in -1000i64..1000, b in -1000i64..1000) {
        prop_assert_eq!(eval_bool(&bin(BinOp::Lt, int(a), int(b))), a < b);
        prop_assert_eq!(eval_bool(&bin(BinOp::Le, int(a), int(b))), a <= b);
        prop_assert_eq!(eval_bool(&bin(BinOp::Gt, int(a), int(b))), a > b);
        prop_assert_eq!(eval_bool(&bin(BinOp::Ge, int(a), int(b))), a >= b);
        prop_assert_eq!(eval_bool(&bin(BinOp::Eq, int(a), int(b))), a == b);
        prop_assert_eq!(eval_bool(&bin(BinOp::Neq, int(a), int(b))), a != b);
    }

    #[test]
    fn prop_boolean_truth_tables(a: bool, b: bool) {
        prop_assert_eq!(eval_bool(&bin(BinOp::And, boolean(a), boolean(b))), a && b);
        prop_assert_eq!(eval_bool(&bin(BinOp::Or, boolean(a), boolean(b))), a || b);
        prop_assert_eq!(eval_bool(&bin(BinOp::Implies, boolean(a), boolean(b))), !a || b);
        prop_assert_eq!(eval_bool(&bin(BinOp::Explies, boolean(a), boolean(b))), a || !b);
        prop_assert_eq!(eval_bool(&bin(BinOp::Iff, boolean(a), boolean(b))), a == b);
    }
}

#[test]
fn division_by_literal_zero_yields_a_fresh_symbolic_integer() {
    let d = eval_one(&bin(BinOp::Div, int(7), int(0))).unwrap();
    assert!(matches!(d.node, Expr::Logical(_, _)));
    let m = eval_one(&bin(BinOp::Mod, int(7), int(0))).unwrap();
    assert!(matches!(m.node, Expr::Logical(_, _)));
}

#[test]
fn short_circuit_skips_the_right_operand() {
    // the right operand is an undeclared name: evaluating it would fail
    let poison = || Spanned::dummy(Expr::Var("nonexistent".to_string()));
    assert!(!eval_bool(&bin(BinOp::And, boolean(false), poison())));
    assert!(eval_bool(&bin(BinOp::Or, boolean(true), poison())));
    assert!(eval_bool(&bin(BinOp::Implies, boolean(false), poison())));
    assert!(eval_bool(&bin(BinOp::Explies, boolean(true), poison())));
    // and with a deciding operand the poison is reached
    assert!(eval_one(&bin(BinOp::And, boolean(true), poison())).is_err());
}
