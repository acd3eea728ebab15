//! Types and the type-context service
//!
//! The engine consumes the type checker as a pure service: it resolves the
//! declared type of a name, computes function and procedure signatures, and
//! answers scope queries. No checking happens here; programs handed to the
//! engine are assumed well typed.

use crate::ast::{Decl, Program};
use std::collections::HashMap;
use std::fmt;

/// A type of the verification language
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    /// Boolean
    Bool,
    /// Mathematical integer
    Int,
    /// Map from a tuple of domain types to a range type
    Map {
        domain: Vec<Type>,
        range: Box<Type>,
    },
    /// Opaque user-defined type
    Custom(String),
}

impl Type {
    /// Convenience map-type constructor
    pub fn map(domain: Vec<Type>, range: Type) -> Self {
        Type::Map {
            domain,
            range: Box::new(range),
        }
    }

    pub fn is_map(&self) -> bool {
        matches!(self, Type::Map { .. })
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Bool => write!(f, "bool"),
            Type::Int => write!(f, "int"),
            Type::Map { domain, range } => {
                write!(f, "[")?;
                for (i, d) in domain.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{}", d)?;
                }
                write!(f, "]{}", range)
            }
            Type::Custom(name) => write!(f, "{}", name),
        }
    }
}

/// Signature of a (mathematical) function
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionSig {
    pub params: Vec<(String, Type)>,
    pub ret: Type,
}

impl FunctionSig {
    /// The map type a bodyless function denotes
    pub fn map_type(&self) -> Type {
        Type::map(
            self.params.iter().map(|(_, t)| t.clone()).collect(),
            self.ret.clone(),
        )
    }
}

/// Signature of a procedure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcedureSig {
    pub params: Vec<(String, Type)>,
    pub returns: Vec<(String, Type)>,
}

/// Pure name-resolution service consumed by the engine.
///
/// Global scope (variables, constants, functions, procedures) is fixed at
/// construction; the engine pushes and pops local scopes as it enters and
/// exits procedure frames.
#[derive(Debug, Clone, Default)]
pub struct TypeContext {
    globals: HashMap<String, Type>,
    constants: HashMap<String, Type>,
    functions: HashMap<String, FunctionSig>,
    procedures: HashMap<String, ProcedureSig>,
    local_scopes: Vec<HashMap<String, Type>>,
}

impl TypeContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a context from a program's declarations. This is a declaration
    /// scan, not a checker; it exists so drivers and tests can construct the
    /// service without a frontend.
    pub fn from_program(program: &Program) -> Self {
        let mut ctx = Self::new();
        for decl in &program.decls {
            match &decl.node {
                Decl::Const {
                    names,
                    ty,
                    ..
                } => {
                    for n in names {
                        ctx.constants.insert(n.clone(), ty.clone());
                    }
                }
                Decl::GlobalVar { decls } => {
                    for d in decls {
                        ctx.globals.insert(d.name.clone(), d.ty.clone());
                    }
                }
                Decl::Function {
                    name, params, ret, ..
                } => {
                    ctx.functions.insert(
                        name.clone(),
                        FunctionSig {
                            params: params.clone(),
                            ret: ret.clone(),
                        },
                    );
                }
                Decl::Procedure(p) => {
                    ctx.procedures.insert(
                        p.name.clone(),
                        ProcedureSig {
                            params: p.params.iter().map(|v| (v.name.clone(), v.ty.clone())).collect(),
                            returns: p
                                .returns
                                .iter()
                                .map(|v| (v.name.clone(), v.ty.clone()))
                                .collect(),
                        },
                    );
                }
                Decl::TypeDecl { .. } | Decl::Axiom(_) | Decl::Implementation(_) => {}
            }
        }
        ctx
    }

    pub fn declare_global(&mut self, name: impl Into<String>, ty: Type) {
        self.globals.insert(name.into(), ty);
    }

    pub fn declare_constant(&mut self, name: impl Into<String>, ty: Type) {
        self.constants.insert(name.into(), ty);
    }

    pub fn declare_function(&mut self, name: impl Into<String>, sig: FunctionSig) {
        self.functions.insert(name.into(), sig);
    }

    pub fn declare_procedure(&mut self, name: impl Into<String>, sig: ProcedureSig) {
        self.procedures.insert(name.into(), sig);
    }

    /// Enter a local scope (procedure frame)
    pub fn push_locals(&mut self, vars: impl IntoIterator<Item = (String, Type)>) {
        self.local_scopes.push(vars.into_iter().collect());
    }

    /// Leave the innermost local scope
    pub fn pop_locals(&mut self) {
        self.local_scopes.pop();
    }

    /// Is `name` a local of the innermost frame?
    pub fn is_local(&self, name: &str) -> bool {
        self.local_scopes
            .last()
            .is_some_and(|s| s.contains_key(name))
    }

    /// Is `name` a global variable?
    pub fn is_global(&self, name: &str) -> bool {
        self.globals.contains_key(name)
    }

    /// Is `name` a declared constant?
    pub fn is_constant(&self, name: &str) -> bool {
        self.constants.contains_key(name)
    }

    /// Declared type of `name`, resolved innermost-first:
    /// locals, then globals, then constants.
    pub fn var_type(&self, name: &str) -> Option<&Type> {
        if let Some(scope) = self.local_scopes.last() {
            if let Some(t) = scope.get(name) {
                return Some(t);
            }
        }
        self.globals.get(name).or_else(|| self.constants.get(name))
    }

    pub fn function_sig(&self, name: &str) -> Option<&FunctionSig> {
        self.functions.get(name)
    }

    pub fn procedure_sig(&self, name: &str) -> Option<&ProcedureSig> {
        self.procedures.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolution_order_is_locals_globals_constants() {
        let mut ctx = TypeContext::new();
        ctx.declare_constant("x", Type::Bool);
        ctx.declare_global("x", Type::Int);
        assert_eq!(ctx.var_type("x"), Some(&Type::Int));

        ctx.push_locals([("x".to_string(), Type::Custom("T".to_string()))]);
        assert_eq!(ctx.var_type("x"), Some(&Type::Custom("T".to_string())));
        assert!(ctx.is_local("x"));

        ctx.pop_locals();
        assert!(!ctx.is_local("x"));
        assert_eq!(ctx.var_type("x"), Some(&Type::Int));
    }

    #[test]
    fn map_type_display() {
        let t = Type::map(vec![Type::Int, Type::Bool], Type::Int);
        assert_eq!(t.to_string(), "[int,bool]int");
    }
}
