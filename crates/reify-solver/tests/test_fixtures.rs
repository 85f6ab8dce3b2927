//! Shared helpers for building declaration hierarchies in unit tests.

use crate::dispatch::{CallContext, Member};
use crate::system::TypeSystem;
use crate::types::{ArgExpr, BaseSpec, DeclId, ParamInfo, Value};
use crate::def::DeclarationInfo;
use crate::error::ReifyResult;

/// Register `name[params](bases)` with no members.
pub(crate) fn declare(sys: &TypeSystem, name: &str, params: &[&str], bases: Vec<BaseSpec>) -> DeclId {
    let info = DeclarationInfo::generic(
        sys.intern(name),
        params.iter().map(|p| ParamInfo::new(sys.intern(p))).collect(),
    );
    let info = bases.into_iter().fold(info, DeclarationInfo::with_base);
    sys.declare(info).expect("declaration is valid")
}

/// `decl[args]` as a base.
pub(crate) fn base(decl: DeclId, args: impl IntoIterator<Item = ArgExpr>) -> BaseSpec {
    BaseSpec::new(decl, args)
}

pub(crate) fn fwd(index: u32) -> ArgExpr {
    ArgExpr::Forward(index)
}

pub(crate) fn lit(value: Value) -> ArgExpr {
    ArgExpr::Concrete(value)
}

/// An alias-aware operation returning its receiver as a value.
pub(crate) fn receiver_op() -> Member {
    Member::alias_aware(|ctx: &CallContext<'_>, _args: &[Value]| -> ReifyResult<Value> {
        Ok(ctx.receiver().to_value())
    })
}

/// An alias-aware operation that redirects to the next implementation.
pub(crate) fn redirect_op() -> Member {
    Member::alias_aware(|ctx: &CallContext<'_>, args: &[Value]| ctx.call_base(args))
}

/// The diamond `Base[T]`, `Mid1[T](Base[T])`, `Mid2[T](Base[T])`,
/// `Leaf[T](Mid1[T], Mid2[T])`, returned as (base, mid1, mid2, leaf).
pub(crate) fn diamond(sys: &TypeSystem) -> (DeclId, DeclId, DeclId, DeclId) {
    let b = declare(sys, "Base", &["T"], vec![]);
    let m1 = declare(sys, "Mid1", &["T"], vec![base(b, [fwd(0)])]);
    let m2 = declare(sys, "Mid2", &["T"], vec![base(b, [fwd(0)])]);
    let leaf = declare(sys, "Leaf", &["T"], vec![base(m1, [fwd(0)]), base(m2, [fwd(0)])]);
    (b, m1, m2, leaf)
}
