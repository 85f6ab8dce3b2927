//! Dispatch proxy and ancestor redirection.
//!
//! A [`DispatchProxy`] wraps a specialization. Member lookup walks the
//! declaration's resolution order without binding; alias-aware operations
//! are then bound with the specialization as receiver, everything else with
//! the plain declaration.
//!
//! Operation bodies receive a [`CallContext`] carrying the receiver and the
//! defining declaration (the *frame*). [`CallContext::call_base`] invokes the
//! same-named operation on the next declaration after the frame in the
//! resolution order of the receiver the chain started from. When that
//! implementation is alias-aware and that receiver is a specialization, it is
//! handed the specialization of its own declaration, computed by resolving
//! the starting receiver against it.

use crate::error::{ReifyError, ReifyResult};
use crate::resolve::Root;
use crate::specialize::Specialization;
use crate::system::TypeSystem;
use crate::types::{DeclId, ParamRef, ResolvedArgs, Value};
use reify_common::Atom;
use std::sync::Arc;
use tracing::{debug, trace};

// =============================================================================
// Members
// =============================================================================

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum OperationKind {
    /// Receives the specialization when invoked through one.
    AliasAware,
    /// Always receives the plain declaration.
    Plain,
}

pub type OperationFn = dyn Fn(&CallContext<'_>, &[Value]) -> ReifyResult<Value> + Send + Sync;

/// A class-level member.
#[derive(Clone)]
pub enum Member {
    Operation {
        kind: OperationKind,
        body: Arc<OperationFn>,
    },
    Attribute(Value),
}

impl Member {
    pub fn alias_aware(
        body: impl Fn(&CallContext<'_>, &[Value]) -> ReifyResult<Value> + Send + Sync + 'static,
    ) -> Self {
        Member::Operation {
            kind: OperationKind::AliasAware,
            body: Arc::new(body),
        }
    }

    pub fn plain(
        body: impl Fn(&CallContext<'_>, &[Value]) -> ReifyResult<Value> + Send + Sync + 'static,
    ) -> Self {
        Member::Operation {
            kind: OperationKind::Plain,
            body: Arc::new(body),
        }
    }

    pub fn attribute(value: Value) -> Self {
        Member::Attribute(value)
    }

    pub fn is_alias_aware(&self) -> bool {
        matches!(
            self,
            Member::Operation {
                kind: OperationKind::AliasAware,
                ..
            }
        )
    }

    pub fn is_callable(&self) -> bool {
        matches!(self, Member::Operation { .. })
    }
}

impl std::fmt::Debug for Member {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Member::Operation { kind, .. } => f
                .debug_struct("Operation")
                .field("kind", kind)
                .finish_non_exhaustive(),
            Member::Attribute(value) => f.debug_tuple("Attribute").field(value).finish(),
        }
    }
}

// =============================================================================
// Receivers
// =============================================================================

/// What an operation is bound to.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Receiver {
    Declaration(DeclId),
    Specialization(Specialization),
}

impl Receiver {
    pub fn decl(&self) -> DeclId {
        match self {
            Receiver::Declaration(decl) => *decl,
            Receiver::Specialization(spec) => spec.decl(),
        }
    }

    pub fn as_specialization(&self) -> Option<&Specialization> {
        match self {
            Receiver::Specialization(spec) => Some(spec),
            Receiver::Declaration(_) => None,
        }
    }

    pub fn is_specialization(&self) -> bool {
        matches!(self, Receiver::Specialization(_))
    }

    pub fn root(&self) -> Root<'_> {
        match self {
            Receiver::Declaration(decl) => Root::Declaration(*decl),
            Receiver::Specialization(spec) => Root::Specialization(spec),
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            Receiver::Declaration(decl) => Value::Decl(*decl),
            Receiver::Specialization(spec) => spec.as_value(),
        }
    }
}

impl From<Specialization> for Receiver {
    fn from(spec: Specialization) -> Self {
        Receiver::Specialization(spec)
    }
}

impl From<DeclId> for Receiver {
    fn from(decl: DeclId) -> Self {
        Receiver::Declaration(decl)
    }
}

// =============================================================================
// Call context
// =============================================================================

/// The receiver, frame and nesting depth of a running operation.
///
/// `origin` is the receiver the redirection chain started from. Its
/// resolution order drives [`call_base`](Self::call_base), and every rebased
/// receiver is resolved from it, so a chain through a diamond visits each
/// implementation once in the leaf's order.
pub struct CallContext<'a> {
    system: &'a TypeSystem,
    receiver: Receiver,
    origin: Receiver,
    /// Declaration whose member body is executing.
    frame: Option<DeclId>,
    member: Atom,
    depth: u32,
}

impl<'a> CallContext<'a> {
    /// A top-level context with no frame.
    pub fn detached(system: &'a TypeSystem, receiver: Receiver) -> Self {
        Self {
            system,
            origin: receiver.clone(),
            receiver,
            frame: None,
            member: Atom::NONE,
            depth: 0,
        }
    }

    pub fn system(&self) -> &'a TypeSystem {
        self.system
    }

    pub fn receiver(&self) -> &Receiver {
        &self.receiver
    }

    /// Receiver the current redirection chain started from.
    pub fn origin(&self) -> &Receiver {
        &self.origin
    }

    pub fn frame(&self) -> Option<DeclId> {
        self.frame
    }

    pub fn member(&self) -> Atom {
        self.member
    }

    pub fn depth(&self) -> u32 {
        self.depth
    }

    /// Resolve the receiver against `ancestor`.
    pub fn resolve(&self, ancestor: DeclId) -> ReifyResult<ResolvedArgs> {
        self.system.resolve(&self.receiver, ancestor)
    }

    /// Invoke `name` on this context's receiver.
    pub fn call(&self, name: &str, args: &[Value]) -> ReifyResult<Value> {
        let name = self.system.intern(name);
        let decl = self.receiver.decl();
        let (owner, member) = self
            .system
            .store()
            .lookup_member(decl, name, None)?
            .ok_or(ReifyError::MemberNotFound { decl, member: name })?;
        let receiver = bind_receiver(&self.receiver, &member);
        invoke(
            self.system,
            receiver.clone(),
            receiver,
            owner,
            name,
            &member,
            args,
            self.depth,
        )
    }

    /// Invoke the running operation as implemented by the next declaration
    /// after the frame in the origin's resolution order.
    pub fn call_base(&self, args: &[Value]) -> ReifyResult<Value> {
        self.call_base_member(self.member, args)
    }

    /// Like [`call_base`](Self::call_base) for an arbitrary member name.
    pub fn call_base_member(&self, name: Atom, args: &[Value]) -> ReifyResult<Value> {
        let bound = self.base_member(name)?;
        invoke(
            self.system,
            bound.receiver,
            bound.origin,
            bound.owner,
            name,
            &bound.member,
            args,
            self.depth,
        )
    }

    /// Look up `name` after the frame and bind it for redirection.
    pub fn base_member(&self, name: Atom) -> ReifyResult<BoundMember<'a>> {
        let Some(frame) = self.frame else {
            debug!(member = name.0, "redirection without a frame");
            return Err(ReifyError::MissingReceiverContext { member: name });
        };
        let decl = self.origin.decl();
        let mro = self.system.store().mro(decl)?;
        if !mro.contains(&frame) {
            debug!(
                member = name.0,
                frame = frame.0,
                origin = decl.0,
                "frame is not in the origin's resolution order"
            );
            return Err(ReifyError::MissingReceiverContext { member: name });
        }

        let (owner, member) = self
            .system
            .store()
            .lookup_member(decl, name, Some(frame))?
            .ok_or(ReifyError::MemberNotFound { decl, member: name })?;

        let receiver = if member.is_alias_aware() {
            self.rebase(owner)?
        } else {
            Receiver::Declaration(decl)
        };
        trace!(
            member = name.0,
            frame = frame.0,
            owner = owner.0,
            "redirecting to base"
        );
        Ok(BoundMember {
            system: self.system,
            receiver,
            origin: self.origin.clone(),
            owner,
            name,
            member,
            depth: self.depth,
        })
    }

    /// The receiver an alias-aware implementation on `owner` should see.
    ///
    /// The origin specialization is re-expressed as a specialization of
    /// `owner`, with unresolvable slots left open. Bare origins, and owners
    /// that are not generic or are foreign-managed, keep the origin.
    pub fn rebase(&self, owner: DeclId) -> ReifyResult<Receiver> {
        let Receiver::Specialization(spec) = &self.origin else {
            return Ok(self.origin.clone());
        };
        if spec.decl() == owner {
            return Ok(self.origin.clone());
        }
        let owner_entry = self.system.store().entry(owner)?;
        if !owner_entry.info.is_generic() || self.system.is_foreign(owner) {
            return Ok(self.origin.clone());
        }

        let resolved = self
            .system
            .resolve_root(Root::Specialization(spec), owner, false)?;
        let args: Vec<Value> = resolved
            .iter()
            .enumerate()
            .map(|(index, value)| {
                value
                    .clone()
                    .unwrap_or(Value::Param(ParamRef::new(owner, index as u32)))
            })
            .collect();
        let rebased = self.system.specialize(owner, &args)?;
        Ok(Receiver::Specialization(rebased))
    }
}

/// Receiver an ordinary lookup binds `member` to.
fn bind_receiver(receiver: &Receiver, member: &Member) -> Receiver {
    if member.is_alias_aware() {
        receiver.clone()
    } else {
        Receiver::Declaration(receiver.decl())
    }
}

fn invoke(
    system: &TypeSystem,
    receiver: Receiver,
    origin: Receiver,
    owner: DeclId,
    name: Atom,
    member: &Member,
    args: &[Value],
    depth: u32,
) -> ReifyResult<Value> {
    let Member::Operation { body, .. } = member else {
        return Err(ReifyError::NotCallable {
            decl: owner,
            member: name,
        });
    };
    let limit = system.options().max_dispatch_depth;
    if depth >= limit {
        debug!(member = name.0, limit, "dispatch depth exceeded");
        return Err(ReifyError::DepthExceeded { limit });
    }
    let ctx = CallContext {
        system,
        receiver,
        origin,
        frame: Some(owner),
        member: name,
        depth: depth + 1,
    };
    body(&ctx, args)
}

// =============================================================================
// Bound members and the proxy
// =============================================================================

/// A member looked up and bound to its receiver, ready to call.
pub struct BoundMember<'a> {
    system: &'a TypeSystem,
    receiver: Receiver,
    origin: Receiver,
    owner: DeclId,
    name: Atom,
    member: Member,
    depth: u32,
}

impl<'a> BoundMember<'a> {
    pub(crate) fn lookup(
        system: &'a TypeSystem,
        receiver: Receiver,
        name: Atom,
    ) -> ReifyResult<Self> {
        let decl = receiver.decl();
        let (owner, member) = system
            .store()
            .lookup_member(decl, name, None)?
            .ok_or(ReifyError::MemberNotFound { decl, member: name })?;
        let receiver = bind_receiver(&receiver, &member);
        Ok(Self {
            system,
            origin: receiver.clone(),
            receiver,
            owner,
            name,
            member,
            depth: 0,
        })
    }

    pub fn receiver(&self) -> &Receiver {
        &self.receiver
    }

    /// Declaration that defines the member.
    pub fn owner(&self) -> DeclId {
        self.owner
    }

    pub fn name(&self) -> Atom {
        self.name
    }

    pub fn member(&self) -> &Member {
        &self.member
    }

    pub fn is_alias_aware(&self) -> bool {
        self.member.is_alias_aware()
    }

    /// The value of an attribute member.
    pub fn value(&self) -> Option<&Value> {
        match &self.member {
            Member::Attribute(value) => Some(value),
            Member::Operation { .. } => None,
        }
    }

    pub fn call(&self, args: &[Value]) -> ReifyResult<Value> {
        invoke(
            self.system,
            self.receiver.clone(),
            self.origin.clone(),
            self.owner,
            self.name,
            &self.member,
            args,
            self.depth,
        )
    }
}

/// A specialization that forwards member access to its declaration.
#[derive(Clone)]
pub struct DispatchProxy<'a> {
    system: &'a TypeSystem,
    spec: Specialization,
}

impl std::fmt::Debug for DispatchProxy<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("DispatchProxy").field(&self.spec).finish()
    }
}

impl<'a> DispatchProxy<'a> {
    pub fn new(system: &'a TypeSystem, spec: Specialization) -> Self {
        Self { system, spec }
    }

    pub fn specialization(&self) -> &Specialization {
        &self.spec
    }

    pub fn into_specialization(self) -> Specialization {
        self.spec
    }

    pub fn decl(&self) -> DeclId {
        self.spec.decl()
    }

    pub fn args(&self) -> &Arc<[Value]> {
        self.spec.args()
    }

    pub fn member(&self, name: &str) -> ReifyResult<BoundMember<'a>> {
        self.member_atom(self.system.intern(name))
    }

    pub fn member_atom(&self, name: Atom) -> ReifyResult<BoundMember<'a>> {
        BoundMember::lookup(
            self.system,
            Receiver::Specialization(self.spec.clone()),
            name,
        )
    }

    pub fn call(&self, name: &str, args: &[Value]) -> ReifyResult<Value> {
        self.member(name)?.call(args)
    }

    pub fn resolve(&self, ancestor: DeclId) -> ReifyResult<ResolvedArgs> {
        self.system
            .resolve(&Receiver::Specialization(self.spec.clone()), ancestor)
    }
}

#[cfg(test)]
#[path = "../tests/dispatch_tests.rs"]
mod tests;
