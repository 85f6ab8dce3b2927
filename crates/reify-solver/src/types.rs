//! Core value types: declaration and parameter identities, concrete type
//! arguments, and the argument expressions found in base lists.

use reify_common::Atom;
use serde::Serialize;
use std::sync::Arc;

// =============================================================================
// Identities
// =============================================================================

/// Identifier of a registered declaration.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct DeclId(pub u32);

impl DeclId {
    /// Sentinel value for an invalid `DeclId`.
    pub const INVALID: Self = Self(0);

    /// First valid `DeclId`.
    pub const FIRST_VALID: u32 = 1;

    pub const fn is_valid(self) -> bool {
        self.0 >= Self::FIRST_VALID
    }
}

/// A parameter slot: (home declaration, index).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ParamRef {
    pub decl: DeclId,
    pub index: u32,
}

impl ParamRef {
    pub const fn new(decl: DeclId, index: u32) -> Self {
        Self { decl, index }
    }
}

// =============================================================================
// Values
// =============================================================================

/// A concrete type argument.
///
/// Values are structural: two values are equal when they have the same shape,
/// and hashing follows equality, so values can key the specialization cache.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum Value {
    /// An opaque named type such as `int` or `str`.
    Intrinsic(Atom),
    /// A bare declaration used as an argument.
    Decl(DeclId),
    /// A declaration applied to arguments, e.g. `List[int]`.
    Applied { decl: DeclId, args: Arc<[Value]> },
    /// An unbound parameter. Appears when an argument is itself a type
    /// parameter or when a trailing slot has no default.
    Param(ParamRef),
}

impl Value {
    pub fn applied(decl: DeclId, args: impl Into<Arc<[Value]>>) -> Self {
        Value::Applied {
            decl,
            args: args.into(),
        }
    }

    #[inline]
    pub fn is_placeholder(&self) -> bool {
        matches!(self, Value::Param(_))
    }
}

// =============================================================================
// Argument expressions
// =============================================================================

/// One argument of a base specialization, written in terms of the owning
/// declaration's parameters.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ArgExpr {
    /// A fixed value. Resolution stops here.
    Concrete(Value),
    /// The owning declaration's own parameter at this index.
    Forward(u32),
    /// A nested specialization whose arguments are themselves expressions.
    Nested { decl: DeclId, args: Arc<[ArgExpr]> },
}

impl ArgExpr {
    pub fn nested(decl: DeclId, args: impl IntoIterator<Item = ArgExpr>) -> Self {
        ArgExpr::Nested {
            decl,
            args: args.into_iter().collect(),
        }
    }

    /// Evaluate against bindings for the owner's parameters.
    ///
    /// Returns `None` when a forwarded parameter is unbound.
    pub fn evaluate(&self, bindings: &[Option<Value>]) -> Option<Value> {
        match self {
            ArgExpr::Concrete(value) => Some(value.clone()),
            ArgExpr::Forward(index) => bindings.get(*index as usize).cloned().flatten(),
            ArgExpr::Nested { decl, args } => {
                let values = args
                    .iter()
                    .map(|arg| arg.evaluate(bindings))
                    .collect::<Option<Vec<_>>>()?;
                Some(Value::applied(*decl, values))
            }
        }
    }

    /// Rewrite an expression written over some declaration's parameters into
    /// one written over the parameters of whoever supplied `outer` as that
    /// declaration's base arguments.
    pub fn compose(&self, outer: &[ArgExpr]) -> ArgExpr {
        match self {
            ArgExpr::Concrete(value) => ArgExpr::Concrete(value.clone()),
            ArgExpr::Forward(index) => outer
                .get(*index as usize)
                .cloned()
                .unwrap_or_else(|| self.clone()),
            ArgExpr::Nested { decl, args } => ArgExpr::Nested {
                decl: *decl,
                args: args.iter().map(|arg| arg.compose(outer)).collect(),
            },
        }
    }}

// =============================================================================
// Declaration shape
// =============================================================================

/// A parameter slot's static information.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParamInfo {
    pub name: Atom,
    /// Used when no argument is supplied.
    pub default: Option<Value>,
    /// Only consulted as a fallback value; never enforced.
    pub bound: Option<Value>,
}

impl ParamInfo {
    pub const fn new(name: Atom) -> Self {
        Self {
            name,
            default: None,
            bound: None,
        }
    }

    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }

    pub fn with_bound(mut self, bound: Value) -> Self {
        self.bound = Some(bound);
        self
    }
}

/// A base specialization in a declaration's base list.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BaseSpec {
    pub decl: DeclId,
    pub args: Arc<[ArgExpr]>,
}

impl BaseSpec {
    pub fn new(decl: DeclId, args: impl IntoIterator<Item = ArgExpr>) -> Self {
        Self {
            decl,
            args: args.into_iter().collect(),
        }
    }

    /// A base listed without arguments.
    pub fn bare(decl: DeclId) -> Self {
        Self {
            decl,
            args: Arc::from(Vec::new()),
        }
    }
}

/// Resolution result: one entry per ancestor parameter, `None` when absent.
pub type ResolvedArgs = Arc<[Option<Value>]>;
