//! Errors raised by the solver.
//!
//! Every failure is local and synchronous: nothing is retried and no partial
//! result is returned alongside an error. `Display` prints raw ids; use
//! `ValueFormatter::describe_error` for a message with declaration names.

use crate::types::DeclId;
use reify_common::Atom;
use smallvec::SmallVec;
use std::fmt;

pub type ReifyResult<T> = Result<T, ReifyError>;

/// Where a resolved ancestor slot came from.
///
/// `origin` is the chain of base-list indices walked from the resolution
/// start; it is empty when the slot was reached from one of the start
/// declaration's own parameters. `slot` is the parameter index in the
/// declaration at the end of that chain.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Provenance {
    pub origin: SmallVec<[u32; 2]>,
    pub slot: u32,
}

impl Provenance {
    pub fn own(slot: u32) -> Self {
        Self {
            origin: SmallVec::new(),
            slot,
        }
    }

    /// The same provenance seen from one level up, through base `base`.
    pub fn through_base(&self, base: u32) -> Self {
        let mut origin = SmallVec::with_capacity(self.origin.len() + 1);
        origin.push(base);
        origin.extend_from_slice(&self.origin);
        Self {
            origin,
            slot: self.slot,
        }
    }

    #[inline]
    pub fn is_own(&self) -> bool {
        self.origin.is_empty()
    }
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.origin.is_empty() {
            return write!(f, "parameter {}", self.slot);
        }
        write!(f, "base ")?;
        for (i, base) in self.origin.iter().enumerate() {
            if i > 0 {
                write!(f, ".")?;
            }
            write!(f, "{base}")?;
        }
        write!(f, " parameter {}", self.slot)
    }
}

/// Why a declaration was rejected at registration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DeclarationError {
    DuplicateParameter {
        name: Atom,
    },
    UnknownBase {
        base: u32,
        decl: DeclId,
    },
    DuplicateBase {
        decl: DeclId,
    },
    /// A base (or a nested specialization inside a base argument) was given
    /// more arguments than it has parameters.
    BaseArity {
        base: u32,
        decl: DeclId,
        expected: usize,
        found: usize,
    },
    ForwardOutOfRange {
        base: u32,
        index: u32,
        arity: usize,
    },
    ExpressionTooDeep {
        base: u32,
        limit: u32,
    },
    InconsistentResolutionOrder {
        bases: Vec<DeclId>,
    },
}

impl fmt::Display for DeclarationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeclarationError::DuplicateParameter { name } => {
                write!(f, "duplicate parameter name (atom {})", name.0)
            }
            DeclarationError::UnknownBase { base, decl } => {
                write!(f, "base {base} refers to unknown declaration #{}", decl.0)
            }
            DeclarationError::DuplicateBase { decl } => {
                write!(f, "declaration #{} is listed more than once as a base", decl.0)
            }
            DeclarationError::BaseArity {
                base,
                decl,
                expected,
                found,
            } => write!(
                f,
                "base {base}: declaration #{} takes {expected} argument(s) but {found} were given",
                decl.0
            ),
            DeclarationError::ForwardOutOfRange { base, index, arity } => write!(
                f,
                "base {base} forwards parameter {index} but the declaration has {arity} parameter(s)"
            ),
            DeclarationError::ExpressionTooDeep { base, limit } => {
                write!(f, "base {base}: argument nesting exceeds {limit} levels")
            }
            DeclarationError::InconsistentResolutionOrder { bases } => {
                write!(f, "cannot build a consistent resolution order for bases [")?;
                for (i, decl) in bases.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "#{}", decl.0)?;
                }
                write!(f, "]")
            }
        }
    }
}

impl std::error::Error for DeclarationError {}

/// Fieldless discriminant of [`ReifyError`], convenient for matching in
/// callers and tests.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotGeneric,
    ForeignManaged,
    AmbiguousProvenance,
    UnreachableAncestor,
    MissingReceiverContext,
    UnknownDeclaration,
    InvalidDeclaration,
    ArityMismatch,
    MemberNotFound,
    NotCallable,
    DepthExceeded,
    Operation,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReifyError {
    /// The declaration has no parameters.
    NotGeneric { decl: DeclId },
    /// The declaration runs its own generic protocol.
    ForeignManaged { decl: DeclId },
    /// Two paths with different provenance reach the same ancestor slot.
    AmbiguousProvenance {
        root: DeclId,
        ancestor: DeclId,
        index: u32,
        first: Provenance,
        second: Provenance,
    },
    /// Not every ancestor slot is reachable from the root.
    UnreachableAncestor {
        root: DeclId,
        ancestor: DeclId,
        found: usize,
        expected: usize,
    },
    /// Ancestor redirection without a defining frame, or with a frame that
    /// is not in the receiver's resolution order.
    MissingReceiverContext { member: Atom },
    UnknownDeclaration { decl: DeclId },
    InvalidDeclaration {
        name: Atom,
        error: DeclarationError,
    },
    ArityMismatch {
        decl: DeclId,
        expected: usize,
        found: usize,
    },
    MemberNotFound { decl: DeclId, member: Atom },
    NotCallable { decl: DeclId, member: Atom },
    DepthExceeded { limit: u32 },
    /// Raised by an operation body.
    Operation(String),
}

impl ReifyError {
    pub const fn kind(&self) -> ErrorKind {
        match self {
            ReifyError::NotGeneric { .. } => ErrorKind::NotGeneric,
            ReifyError::ForeignManaged { .. } => ErrorKind::ForeignManaged,
            ReifyError::AmbiguousProvenance { .. } => ErrorKind::AmbiguousProvenance,
            ReifyError::UnreachableAncestor { .. } => ErrorKind::UnreachableAncestor,
            ReifyError::MissingReceiverContext { .. } => ErrorKind::MissingReceiverContext,
            ReifyError::UnknownDeclaration { .. } => ErrorKind::UnknownDeclaration,
            ReifyError::InvalidDeclaration { .. } => ErrorKind::InvalidDeclaration,
            ReifyError::ArityMismatch { .. } => ErrorKind::ArityMismatch,
            ReifyError::MemberNotFound { .. } => ErrorKind::MemberNotFound,
            ReifyError::NotCallable { .. } => ErrorKind::NotCallable,
            ReifyError::DepthExceeded { .. } => ErrorKind::DepthExceeded,
            ReifyError::Operation(_) => ErrorKind::Operation,
        }
    }

    pub fn operation(message: impl Into<String>) -> Self {
        ReifyError::Operation(message.into())
    }
}

impl fmt::Display for ReifyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReifyError::NotGeneric { decl } => {
                write!(f, "declaration #{} is not generic", decl.0)
            }
            ReifyError::ForeignManaged { decl } => write!(
                f,
                "declaration #{} is foreign-managed and cannot be specialized",
                decl.0
            ),
            ReifyError::AmbiguousProvenance {
                root,
                ancestor,
                index,
                first,
                second,
            } => write!(
                f,
                "ambiguous resolution of #{} slot {index} from #{}: reached from {first} and from {second}",
                ancestor.0, root.0
            ),
            ReifyError::UnreachableAncestor {
                root,
                ancestor,
                found,
                expected,
            } => write!(
                f,
                "cannot resolve #{} from #{}: found {found} of {expected} parameter(s)",
                ancestor.0, root.0
            ),
            ReifyError::MissingReceiverContext { member } => write!(
                f,
                "ancestor redirection of member (atom {}) has no defining frame in the receiver",
                member.0
            ),
            ReifyError::UnknownDeclaration { decl } => {
                write!(f, "unknown declaration #{}", decl.0)
            }
            ReifyError::InvalidDeclaration { name, error } => {
                write!(f, "invalid declaration (atom {}): {error}", name.0)
            }
            ReifyError::ArityMismatch {
                decl,
                expected,
                found,
            } => write!(
                f,
                "declaration #{} takes {expected} argument(s) but {found} were given",
                decl.0
            ),
            ReifyError::MemberNotFound { decl, member } => write!(
                f,
                "declaration #{} has no member (atom {})",
                decl.0, member.0
            ),
            ReifyError::NotCallable { decl, member } => write!(
                f,
                "member (atom {}) of declaration #{} is not callable",
                member.0, decl.0
            ),
            ReifyError::DepthExceeded { limit } => {
                write!(f, "dispatch depth limit of {limit} exceeded")
            }
            ReifyError::Operation(message) => write!(f, "{message}"),
        }
    }
}

impl std::error::Error for ReifyError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ReifyError::InvalidDeclaration { error, .. } => Some(error),
            _ => None,
        }
    }
}
