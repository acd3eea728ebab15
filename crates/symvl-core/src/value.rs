//! Runtime values of the verification language
//!
//! Values are immutable; map updates allocate fresh references rather than
//! mutating instances in place. Map contents live in the engine's map heap
//! and are referred to by id everywhere, so values themselves stay small.

use crate::ty::Type;
use num_bigint::BigInt;
use std::fmt;

/// Identifier of a logical (symbolic) variable, allocated monotonically by
/// the engine. Once a ref appears in memory or a constraint it persists for
/// the rest of the test case.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Ref(pub u64);

impl fmt::Debug for Ref {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Ref({})", self.0)
    }
}

impl fmt::Display for Ref {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "?{}", self.0)
    }
}

/// Type-tagged reference into the map heap
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MapRef {
    /// Heap id
    pub id: u64,
    /// Full map type of the referenced instance
    pub ty: Type,
}

/// A value of an opaque user-defined type. Two customs are equal iff their
/// types and tag integers match.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CustomValue {
    /// Name of the opaque type
    pub ty: String,
    /// Integer tag denoting the value
    pub tag: BigInt,
}

/// A concrete runtime value
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Value {
    /// Arbitrary-precision integer
    Int(BigInt),
    /// Boolean
    Bool(bool),
    /// Reference to a map instance in the heap
    Map(MapRef),
    /// Value of an opaque user-defined type
    Custom(CustomValue),
}

impl Value {
    /// Convenience integer constructor
    pub fn int(i: impl Into<BigInt>) -> Self {
        Value::Int(i.into())
    }

    /// The type of this value
    pub fn ty(&self) -> Type {
        match self {
            Value::Int(_) => Type::Int,
            Value::Bool(_) => Type::Bool,
            Value::Map(r) => r.ty.clone(),
            Value::Custom(c) => Type::Custom(c.ty.clone()),
        }
    }

    /// Short name of this value's type, for error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Int(_) => "int",
            Value::Bool(_) => "bool",
            Value::Map(_) => "map",
            Value::Custom(_) => "custom",
        }
    }

    pub fn as_int(&self) -> Option<&BigInt> {
        match self {
            Value::Int(i) => Some(i),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_map_ref(&self) -> Option<&MapRef> {
        match self {
            Value::Map(r) => Some(r),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(i) => write!(f, "{}", i),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Map(r) => write!(f, "map!{}", r.id),
            Value::Custom(c) => write!(f, "{}!{}", c.ty, c.tag),
        }
    }
}
