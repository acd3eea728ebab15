//! Translation from residual thunks to Z3 terms
//!
//! The engine eliminates quantifiers, lambdas, map updates, and program
//! variables before consulting the solver, so the fragment translated here
//! is quantifier-free: literals, logical refs, map selections on literal
//! references (possibly under undecided conditionals), and the scalar
//! operators.
//!
//! Encoding:
//! - integers and booleans are native sorts
//! - each opaque type is an uninterpreted sort with a total projection
//!   `tag_T : T -> Int`, so every custom value is denotable by its tag
//! - each map reference becomes an uninterpreted function over its domain
//!   sorts (tuple-indexed selection); map-typed positions are carried as
//!   integer ids, matching the engine's arena

use crate::error::{SmtError, SmtResult};
use num_bigint::BigInt;
use num_traits::ToPrimitive;
use std::collections::HashMap;
use symvl_core::ast::{as_literal, BinOp, Expr, Thunk, UnOp};
use symvl_core::ty::Type;
use symvl_core::value::{MapRef, Ref, Value};
use symvl_exec::RefTypes;
use z3::ast::{Ast, Bool, Dynamic, Int};
use z3::{Context, FuncDecl, Model, Sort, Symbol};

pub struct Translator<'ctx> {
    ctx: &'ctx Context,
    /// Declared logical refs by id
    refs: HashMap<u64, (Type, Dynamic<'ctx>)>,
    /// Uninterpreted sorts per opaque type
    sorts: HashMap<String, Sort<'ctx>>,
    /// Tag projections per opaque type
    tags: HashMap<String, FuncDecl<'ctx>>,
    /// Selection functions per map id
    maps: HashMap<u64, FuncDecl<'ctx>>,
    /// Constants for custom literals, keyed (type, tag)
    customs: HashMap<(String, BigInt), Dynamic<'ctx>>,
    /// Side conditions pinning custom literals to their tags
    aux: Vec<Bool<'ctx>>,
}

impl<'ctx> Translator<'ctx> {
    pub fn new(ctx: &'ctx Context) -> Self {
        Self {
            ctx,
            refs: HashMap::new(),
            sorts: HashMap::new(),
            tags: HashMap::new(),
            maps: HashMap::new(),
            customs: HashMap::new(),
            aux: Vec::new(),
        }
    }

    /// Declare every logical ref up front so models cover them all
    pub fn declare_refs(&mut self, refs: &RefTypes) -> SmtResult<()> {
        let mut sorted: Vec<_> = refs.iter().collect();
        sorted.sort_by_key(|(r, _)| r.0);
        for (r, ty) in sorted {
            if ty.is_map() {
                // map-typed names get heap references, never logical refs
                continue;
            }
            self.declare_ref(*r, ty)?;
        }
        Ok(())
    }

    fn declare_ref(&mut self, r: Ref, ty: &Type) -> SmtResult<Dynamic<'ctx>> {
        if let Some((_, d)) = self.refs.get(&r.0) {
            return Ok(d.clone());
        }
        let name = format!("l{}", r.0);
        let d = match ty {
            Type::Bool => Dynamic::from_ast(&Bool::new_const(self.ctx, name)),
            Type::Int => Dynamic::from_ast(&Int::new_const(self.ctx, name)),
            Type::Custom(t) => {
                let sort = self.opaque_sort(t);
                // a nullary function is a constant of the uninterpreted sort
                FuncDecl::new(self.ctx, name, &[], &sort).apply(&[])
            }
            Type::Map { .. } => {
                return Err(SmtError::Untranslatable("map-typed logical ref".to_string()))
            }
        };
        self.refs.insert(r.0, (ty.clone(), d.clone()));
        Ok(d)
    }

    fn opaque_sort(&mut self, name: &str) -> Sort<'ctx> {
        if let Some(s) = self.sorts.get(name) {
            return s.clone();
        }
        let sort = Sort::uninterpreted(self.ctx, Symbol::String(format!("T_{}", name)));
        self.sorts.insert(name.to_string(), sort.clone());
        sort
    }

    fn tag_fn(&mut self, name: &str) -> FuncDecl<'ctx> {
        if let Some(f) = self.tags.get(name) {
            return f.clone();
        }
        let sort = self.opaque_sort(name);
        let f = FuncDecl::new(
            self.ctx,
            format!("tag_{}", name),
            &[&sort],
            &Sort::int(self.ctx),
        );
        self.tags.insert(name.to_string(), f.clone());
        f
    }

    /// Sort a selection argument or result translates at
    fn scalar_sort(&mut self, ty: &Type) -> Sort<'ctx> {
        match ty {
            Type::Bool => Sort::bool(self.ctx),
            Type::Int => Sort::int(self.ctx),
            Type::Custom(n) => self.opaque_sort(n),
            // map references are carried as arena ids
            Type::Map { .. } => Sort::int(self.ctx),
        }
    }

    fn map_fn(&mut self, r: &MapRef) -> SmtResult<FuncDecl<'ctx>> {
        if let Some(f) = self.maps.get(&r.id) {
            return Ok(f.clone());
        }
        let (domain, range) = match &r.ty {
            Type::Map { domain, range } => (domain.clone(), (**range).clone()),
            other => {
                return Err(SmtError::Untranslatable(format!(
                    "selection on reference of type {}",
                    other
                )))
            }
        };
        let domain_sorts: Vec<Sort<'ctx>> = domain.iter().map(|t| self.scalar_sort(t)).collect();
        let domain_refs: Vec<&Sort<'ctx>> = domain_sorts.iter().collect();
        let range_sort = self.scalar_sort(&range);
        let f = FuncDecl::new(self.ctx, format!("m{}", r.id), &domain_refs, &range_sort);
        self.maps.insert(r.id, f.clone());
        Ok(f)
    }

    fn int_term(&self, i: &BigInt) -> Int<'ctx> {
        if let Some(v) = i.to_i64() {
            return Int::from_i64(self.ctx, v);
        }
        // fold the decimal digits for numerals beyond machine range
        let ten = Int::from_i64(self.ctx, 10);
        let mut acc = Int::from_i64(self.ctx, 0);
        for d in i.magnitude().to_radix_be(10) {
            let digit = Int::from_i64(self.ctx, d as i64);
            acc = Int::add(self.ctx, &[&Int::mul(self.ctx, &[&acc, &ten]), &digit]);
        }
        if i.sign() == num_bigint::Sign::Minus {
            acc = Int::sub(self.ctx, &[&Int::from_i64(self.ctx, 0), &acc]);
        }
        acc
    }

    fn value(&mut self, v: &Value) -> SmtResult<Dynamic<'ctx>> {
        Ok(match v {
            Value::Int(i) => Dynamic::from_ast(&self.int_term(i)),
            Value::Bool(b) => Dynamic::from_ast(&Bool::from_bool(self.ctx, *b)),
            Value::Map(r) => Dynamic::from_ast(&Int::from_i64(self.ctx, r.id as i64)),
            Value::Custom(c) => {
                let key = (c.ty.clone(), c.tag.clone());
                if let Some(d) = self.customs.get(&key) {
                    return Ok(d.clone());
                }
                let sort = self.opaque_sort(&c.ty);
                let d = FuncDecl::new(
                    self.ctx,
                    format!("c_{}_{}", c.ty, c.tag),
                    &[],
                    &sort,
                )
                .apply(&[]);
                let tag = self.tag_fn(&c.ty);
                let projected = tag
                    .apply(&[&d as &dyn Ast<'ctx>])
                    .as_int()
                    .ok_or_else(|| SmtError::ModelError("tag projection is not Int".into()))?;
                self.aux.push(projected._eq(&self.int_term(&c.tag)));
                self.customs.insert(key, d.clone());
                d
            }
        })
    }

    /// Side conditions accumulated while translating (custom-literal tags)
    pub fn aux_assertions(&self) -> &[Bool<'ctx>] {
        &self.aux
    }

    /// Translate a concrete value (used for blocking clauses)
    pub fn value_term(&mut self, v: &Value) -> SmtResult<Dynamic<'ctx>> {
        self.value(v)
    }

    pub fn translate_bool(&mut self, t: &Thunk) -> SmtResult<Bool<'ctx>> {
        self.translate(t)?
            .as_bool()
            .ok_or_else(|| SmtError::Untranslatable("non-boolean constraint".to_string()))
    }

    fn translate_int(&mut self, t: &Thunk) -> SmtResult<Int<'ctx>> {
        self.translate(t)?
            .as_int()
            .ok_or_else(|| SmtError::Untranslatable("non-integer operand".to_string()))
    }

    pub fn translate(&mut self, t: &Thunk) -> SmtResult<Dynamic<'ctx>> {
        match &t.node {
            Expr::Literal(v) => self.value(v),

            Expr::Logical(ty, r) => self.declare_ref(*r, ty),

            Expr::MapSelect(m, args) => self.translate_select(m, args),

            Expr::If(c, a, b) => {
                let c = self.translate_bool(c)?;
                let a = self.translate(a)?;
                let b = self.translate(b)?;
                Ok(c.ite(&a, &b))
            }

            Expr::Unary(UnOp::Not, e) => Ok(Dynamic::from_ast(&self.translate_bool(e)?.not())),

            Expr::Unary(UnOp::Neg, e) => {
                let i = self.translate_int(e)?;
                Ok(Dynamic::from_ast(&Int::sub(
                    self.ctx,
                    &[&Int::from_i64(self.ctx, 0), &i],
                )))
            }

            Expr::Binary(op, l, r) => self.translate_binary(*op, l, r),

            Expr::Var(name) => Err(SmtError::Untranslatable(format!(
                "unresolved variable {}",
                name
            ))),
            Expr::Old(_) => Err(SmtError::Untranslatable("old-state expression".to_string())),
            Expr::Apply(f, _) => Err(SmtError::Untranslatable(format!(
                "unexpanded application of {}",
                f
            ))),
            Expr::MapUpdate(_, _, _) => {
                Err(SmtError::Untranslatable("residual map update".to_string()))
            }
            Expr::Quantified(_, _, _) => {
                Err(SmtError::Untranslatable("residual quantifier".to_string()))
            }
            Expr::Lambda(_, _) => Err(SmtError::Untranslatable("residual lambda".to_string())),
        }
    }

    fn translate_select(&mut self, m: &Thunk, args: &[Thunk]) -> SmtResult<Dynamic<'ctx>> {
        match (&m.node, as_literal(m)) {
            (_, Some(Value::Map(r))) => {
                let r = r.clone();
                let f = self.map_fn(&r)?;
                let translated = args
                    .iter()
                    .map(|a| self.translate(a))
                    .collect::<SmtResult<Vec<_>>>()?;
                let arg_refs: Vec<&dyn Ast<'ctx>> =
                    translated.iter().map(|d| d as &dyn Ast<'ctx>).collect();
                Ok(f.apply(&arg_refs))
            }
            // push selection through an undecided conditional
            (Expr::If(c, a, b), _) => {
                let c = self.translate_bool(c)?;
                let a = self.translate_select(a, args)?;
                let b = self.translate_select(b, args)?;
                Ok(c.ite(&a, &b))
            }
            _ => Err(SmtError::Untranslatable(
                "selection on symbolic map".to_string(),
            )),
        }
    }

    fn translate_binary(&mut self, op: BinOp, l: &Thunk, r: &Thunk) -> SmtResult<Dynamic<'ctx>> {
        use BinOp::*;
        Ok(match op {
            Eq | Neq => {
                let l = self.translate(l)?;
                let r = self.translate(r)?;
                let eq = l._eq(&r);
                Dynamic::from_ast(&if op == Neq { eq.not() } else { eq })
            }
            And | Or | Implies | Explies | Iff => {
                let l = self.translate_bool(l)?;
                let r = self.translate_bool(r)?;
                Dynamic::from_ast(&match op {
                    And => Bool::and(self.ctx, &[&l, &r]),
                    Or => Bool::or(self.ctx, &[&l, &r]),
                    Implies => l.implies(&r),
                    Explies => r.implies(&l),
                    Iff => l._eq(&r),
                    _ => unreachable!(),
                })
            }
            Add | Sub | Mul | Div | Mod | Lt | Le | Gt | Ge => {
                let l = self.translate_int(l)?;
                let r = self.translate_int(r)?;
                match op {
                    Add => Dynamic::from_ast(&Int::add(self.ctx, &[&l, &r])),
                    Sub => Dynamic::from_ast(&Int::sub(self.ctx, &[&l, &r])),
                    Mul => Dynamic::from_ast(&Int::mul(self.ctx, &[&l, &r])),
                    // SMT-LIB div/mod share the engine's Euclidean
                    // convention
                    Div => Dynamic::from_ast(&l.div(&r)),
                    Mod => Dynamic::from_ast(&l.modulo(&r)),
                    Lt => Dynamic::from_ast(&l.lt(&r)),
                    Le => Dynamic::from_ast(&l.le(&r)),
                    Gt => Dynamic::from_ast(&l.gt(&r)),
                    Ge => Dynamic::from_ast(&l.ge(&r)),
                    _ => unreachable!(),
                }
            }
        })
    }

    /// The declared term of a ref, if it was declared
    pub fn ref_term(&self, r: Ref) -> Option<&Dynamic<'ctx>> {
        self.refs.get(&r.0).map(|(_, d)| d)
    }

    /// Read a ref's value out of a model
    pub fn ref_value(&mut self, model: &Model<'ctx>, r: Ref, ty: &Type) -> SmtResult<Option<Value>> {
        let Some((_, d)) = self.refs.get(&r.0) else {
            return Ok(None);
        };
        let d = d.clone();
        Ok(match ty {
            Type::Int => {
                let i = d
                    .as_int()
                    .ok_or_else(|| SmtError::ModelError("expected Int term".into()))?;
                model.eval(&i, true).map(|v| Value::Int(int_of_model(&v)))
            }
            Type::Bool => {
                let b = d
                    .as_bool()
                    .ok_or_else(|| SmtError::ModelError("expected Bool term".into()))?;
                model
                    .eval(&b, true)
                    .and_then(|v| v.as_bool())
                    .map(Value::Bool)
            }
            Type::Custom(name) => {
                let tag = self.tag_fn(name);
                let projected = tag
                    .apply(&[&d as &dyn Ast<'ctx>])
                    .as_int()
                    .ok_or_else(|| SmtError::ModelError("tag projection is not Int".into()))?;
                model.eval(&projected, true).map(|v| {
                    Value::Custom(symvl_core::value::CustomValue {
                        ty: name.clone(),
                        tag: int_of_model(&v),
                    })
                })
            }
            Type::Map { .. } => None,
        })
    }
}

/// Integer of an evaluated model term, falling back to parsing Z3's
/// printed form for numerals beyond machine range
fn int_of_model(v: &Int<'_>) -> BigInt {
    if let Some(i) = v.as_i64() {
        return BigInt::from(i);
    }
    let printed = v.to_string();
    let trimmed = printed
        .trim()
        .trim_start_matches("(-")
        .trim_end_matches(')')
        .trim()
        .replace(' ', "");
    let parsed = BigInt::parse_bytes(trimmed.as_bytes(), 10).unwrap_or_default();
    if printed.trim_start().starts_with("(-") {
        -parsed
    } else {
        parsed
    }
}
