use super::*;
use crate::def::DeclarationInfo;
use crate::dispatch::Receiver;
use crate::error::ErrorKind;
use crate::system::TypeSystem;
use crate::test_fixtures::{base, declare, diamond, fwd, lit};
use crate::types::{BaseSpec, ParamInfo};
use reify_common::ReifyOptions;

fn bare(sys: &TypeSystem, decl: DeclId, ancestor: DeclId) -> ReifyResult<ResolvedArgs> {
    sys.resolve(&Receiver::Declaration(decl), ancestor)
}

fn applied(
    sys: &TypeSystem,
    decl: DeclId,
    args: &[Value],
    ancestor: DeclId,
) -> ReifyResult<ResolvedArgs> {
    let spec = sys.specialize(decl, args)?;
    sys.resolve(&Receiver::Specialization(spec), ancestor)
}

fn declare_with_default(sys: &TypeSystem, name: &str, param: &str, default: Value) -> DeclarationInfo {
    DeclarationInfo::generic(
        sys.intern(name),
        vec![ParamInfo::new(sys.intern(param)).with_default(default)],
    )
}

// -- self resolution --

#[test]
fn test_bare_self_resolution_is_unresolved() {
    let sys = TypeSystem::new();
    let b = declare(&sys, "Base", &["T"], vec![]);
    assert_eq!(&*bare(&sys, b, b).unwrap(), &[None]);
}

#[test]
fn test_bare_self_resolution_uses_defaults() {
    let sys = TypeSystem::new();
    let int = sys.intrinsic("int");
    let b = sys
        .declare(declare_with_default(&sys, "Base", "T", int.clone()))
        .unwrap();
    assert_eq!(&*bare(&sys, b, b).unwrap(), &[Some(int)]);
}

#[test]
fn test_specialization_self_resolution_returns_args() {
    let sys = TypeSystem::new();
    let pair = declare(&sys, "Pair", &["K", "V"], vec![]);
    let args = [sys.intrinsic("int"), sys.intrinsic("str")];
    let resolved = applied(&sys, pair, &args, pair).unwrap();
    assert_eq!(
        &*resolved,
        &[Some(args[0].clone()), Some(args[1].clone())]
    );
}

// -- diamonds --

#[test]
fn test_diamond_resolves_single_forwarded_parameter() {
    let sys = TypeSystem::new();
    let (b, _, _, leaf) = diamond(&sys);
    assert_eq!(&*bare(&sys, leaf, b).unwrap(), &[None]);

    let int = sys.intrinsic("int");
    assert_eq!(
        &*applied(&sys, leaf, &[int.clone()], b).unwrap(),
        &[Some(int)]
    );
}

#[test]
fn test_conflicting_diamond_is_ambiguous() {
    let sys = TypeSystem::new();
    let b = declare(&sys, "Base", &["T"], vec![]);
    let m1 = declare(&sys, "Mid1", &["T"], vec![base(b, [fwd(0)])]);
    let m2 = declare(&sys, "Mid2", &["U"], vec![base(b, [fwd(0)])]);
    let leaf = declare(
        &sys,
        "Leaf",
        &["T", "U"],
        vec![base(m1, [fwd(0)]), base(m2, [fwd(1)])],
    );

    let err = bare(&sys, leaf, b).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AmbiguousProvenance);
    match err {
        ReifyError::AmbiguousProvenance {
            index,
            first,
            second,
            ..
        } => {
            assert_eq!(index, 0);
            assert_eq!(first, Provenance::own(0));
            assert_eq!(second, Provenance::own(1));
        }
        other => panic!("unexpected error: {other}"),
    }

    // Ambiguity is structural: specializing does not help.
    let int = sys.intrinsic("int");
    let err = applied(&sys, leaf, &[int.clone(), int], b).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AmbiguousProvenance);
}

#[test]
fn test_conflicting_concrete_bases_are_ambiguous() {
    let sys = TypeSystem::new();
    let (b, m1, m2, _) = diamond(&sys);
    let leaf = declare(
        &sys,
        "Leaf2",
        &[],
        vec![
            base(m1, [lit(sys.intrinsic("int"))]),
            base(m2, [lit(sys.intrinsic("str"))]),
        ],
    );
    let err = bare(&sys, leaf, b).unwrap_err();
    match err {
        ReifyError::AmbiguousProvenance { first, second, .. } => {
            assert_eq!(first.origin.as_slice(), &[0]);
            assert_eq!(second.origin.as_slice(), &[1]);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_equal_concrete_bases_agree() {
    let sys = TypeSystem::new();
    let (b, m1, m2, _) = diamond(&sys);
    let int = sys.intrinsic("int");
    let leaf = declare(
        &sys,
        "Leaf2",
        &[],
        vec![base(m1, [lit(int.clone())]), base(m2, [lit(int.clone())])],
    );
    assert_eq!(&*bare(&sys, leaf, b).unwrap(), &[Some(int)]);
}

// -- defaults and bounds --

#[test]
fn test_default_fallback() {
    let sys = TypeSystem::new();
    let int = sys.intrinsic("int");
    let str_ = sys.intrinsic("str");
    let b = declare(&sys, "Base", &["T"], vec![]);
    let child = sys
        .declare(declare_with_default(&sys, "Child", "T", int.clone()).with_base(BaseSpec::new(b, [fwd(0)])))
        .unwrap();

    assert_eq!(&*bare(&sys, child, b).unwrap(), &[Some(int)]);
    assert_eq!(
        &*applied(&sys, child, &[str_.clone()], b).unwrap(),
        &[Some(str_)]
    );
}

#[test]
fn test_bare_specialization_takes_default() {
    let sys = TypeSystem::new();
    let str_ = sys.intrinsic("str");
    let d = sys
        .declare(declare_with_default(&sys, "Defaulted", "T", str_.clone()))
        .unwrap();
    // No arguments: the default fills the slot.
    assert_eq!(&*applied(&sys, d, &[], d).unwrap(), &[Some(str_)]);
}

#[test]
fn test_bound_fallback_is_opt_in() {
    for fallback in [false, true] {
        let sys = TypeSystem::with_options(ReifyOptions::default().with_fallback_to_bound(fallback));
        let b = declare(&sys, "Base", &["T"], vec![]);
        let child = sys
            .declare(
                DeclarationInfo::generic(
                    sys.intern("Child"),
                    vec![ParamInfo::new(sys.intern("U")).with_bound(sys.intrinsic("float"))],
                )
                .with_base(BaseSpec::new(b, [fwd(0)])),
            )
            .unwrap();
        let resolved = bare(&sys, child, b).unwrap();
        if fallback {
            assert_eq!(resolved[0], Some(sys.intrinsic("float")));
        } else {
            assert_eq!(resolved[0], None);
        }
    }
}

#[test]
fn test_bound_found_further_along_path() {
    let sys = TypeSystem::with_options(ReifyOptions::default().with_fallback_to_bound(true));
    let object = sys.intrinsic("object");
    let b = sys
        .declare(DeclarationInfo::generic(
            sys.intern("Base"),
            vec![ParamInfo::new(sys.intern("T")).with_bound(object.clone())],
        ))
        .unwrap();
    let child = declare(&sys, "Child", &["U"], vec![base(b, [fwd(0)])]);
    assert_eq!(&*bare(&sys, child, b).unwrap(), &[Some(object)]);
}

#[test]
fn test_default_wins_over_bound() {
    let sys = TypeSystem::with_options(ReifyOptions::default().with_fallback_to_bound(true));
    let int = sys.intrinsic("int");
    let b = declare(&sys, "Base", &["T"], vec![]);
    let child = sys
        .declare(
            DeclarationInfo::generic(
                sys.intern("Child"),
                vec![
                    ParamInfo::new(sys.intern("U"))
                        .with_default(int.clone())
                        .with_bound(sys.intrinsic("float")),
                ],
            )
            .with_base(BaseSpec::new(b, [fwd(0)])),
        )
        .unwrap();
    assert_eq!(&*bare(&sys, child, b).unwrap(), &[Some(int)]);
}

// -- base-list arguments --

#[test]
fn test_concrete_base_argument() {
    let sys = TypeSystem::new();
    let int = sys.intrinsic("int");
    let b = declare(&sys, "Base", &["T"], vec![]);
    let child = declare(&sys, "Child", &[], vec![base(b, [lit(int.clone())])]);
    assert_eq!(&*bare(&sys, child, b).unwrap(), &[Some(int)]);
}

#[test]
fn test_concrete_argument_two_levels_down() {
    let sys = TypeSystem::new();
    let int = sys.intrinsic("int");
    let b = declare(&sys, "Base", &["T"], vec![]);
    let mid = declare(&sys, "Mid", &["U"], vec![base(b, [fwd(0)])]);
    let child = declare(&sys, "Child", &[], vec![base(mid, [lit(int.clone())])]);
    assert_eq!(&*bare(&sys, child, b).unwrap(), &[Some(int)]);

    let plan = sys.plan(child, b).unwrap();
    let slot = plan.slots[0].as_ref().unwrap();
    assert_eq!(slot.provenance.origin.as_slice(), &[0]);
    assert_eq!(slot.provenance.slot, 0);
}

#[test]
fn test_nested_argument_is_substituted() {
    let sys = TypeSystem::new();
    let list = declare(&sys, "List", &["E"], vec![]);
    let b = declare(&sys, "Base", &["T"], vec![]);
    let child = declare(
        &sys,
        "Child",
        &["T"],
        vec![base(b, [ArgExpr::nested(list, [fwd(0)])])],
    );

    let str_ = sys.intrinsic("str");
    assert_eq!(
        &*applied(&sys, child, &[str_.clone()], b).unwrap(),
        &[Some(Value::applied(list, vec![str_]))]
    );
    // T has no default, so the bare declaration cannot build List[T].
    assert_eq!(&*bare(&sys, child, b).unwrap(), &[None]);
}

#[test]
fn test_mixed_forward_and_concrete() {
    let sys = TypeSystem::new();
    let int = sys.intrinsic("int");
    let str_ = sys.intrinsic("str");
    let pair = declare(&sys, "Pair", &["A", "B"], vec![]);
    let mid = declare(&sys, "Mid", &["U"], vec![base(pair, [lit(int.clone()), fwd(0)])]);
    let leaf = declare(&sys, "Leaf", &["T"], vec![base(mid, [fwd(0)])]);

    assert_eq!(
        &*applied(&sys, leaf, &[str_.clone()], pair).unwrap(),
        &[Some(int.clone()), Some(str_)]
    );
    assert_eq!(&*bare(&sys, leaf, pair).unwrap(), &[Some(int), None]);
}

#[test]
fn test_swapped_parameters() {
    let sys = TypeSystem::new();
    let pair = declare(&sys, "Pair", &["K", "V"], vec![]);
    let swap = declare(&sys, "Swap", &["A", "B"], vec![base(pair, [fwd(1), fwd(0)])]);
    let int = sys.intrinsic("int");
    let str_ = sys.intrinsic("str");
    assert_eq!(
        &*applied(&sys, swap, &[int.clone(), str_.clone()], pair).unwrap(),
        &[Some(str_), Some(int)]
    );
}

#[test]
fn test_partial_forwarding_to_ancestor() {
    // SuperDuper[T1, T2](Super[T1]) applied to [float, str] sees Super as (float,).
    let sys = TypeSystem::new();
    let sup = declare(&sys, "Super", &["T"], vec![]);
    let duper = declare(&sys, "SuperDuper", &["T1", "T2"], vec![base(sup, [fwd(0)])]);
    let float = sys.intrinsic("float");
    assert_eq!(
        &*applied(&sys, duper, &[float.clone(), sys.intrinsic("str")], sup).unwrap(),
        &[Some(float)]
    );
}

#[test]
fn test_unfilled_base_slot_is_absent() {
    let sys = TypeSystem::new();
    let pair = declare(&sys, "Pair", &["K", "V"], vec![]);
    let child = declare(&sys, "Child", &["T"], vec![base(pair, [fwd(0)])]);
    let int = sys.intrinsic("int");
    assert_eq!(
        &*applied(&sys, child, &[int.clone()], pair).unwrap(),
        &[Some(int), None]
    );
}

// -- placeholders --

#[test]
fn test_placeholder_argument_uses_its_default() {
    let sys = TypeSystem::new();
    let int = sys.intrinsic("int");
    let other = sys
        .declare(declare_with_default(&sys, "Other", "X", int.clone()))
        .unwrap();
    let b = declare(&sys, "Base", &["T"], vec![]);
    let child = declare(&sys, "Child", &["U"], vec![base(b, [fwd(0)])]);

    let placeholder = Value::Param(ParamRef::new(other, 0));
    assert_eq!(
        &*applied(&sys, child, &[placeholder], b).unwrap(),
        &[Some(int)]
    );
}

#[test]
fn test_placeholder_without_default_is_absent() {
    let sys = TypeSystem::new();
    let b = declare(&sys, "Base", &["T"], vec![]);
    let child = declare(&sys, "Child", &["U"], vec![base(b, [fwd(0)])]);
    let spec = sys.specialize(child, &[]).unwrap();
    assert_eq!(spec.args()[0], Value::Param(ParamRef::new(child, 0)));
    assert_eq!(
        &*sys.resolve(&Receiver::Specialization(spec), b).unwrap(),
        &[None]
    );
}

// -- failures and caching --

#[test]
fn test_unrelated_ancestor_is_unreachable() {
    let sys = TypeSystem::new();
    let a = declare(&sys, "A", &["T"], vec![]);
    let b = declare(&sys, "B", &["T"], vec![]);
    let err = bare(&sys, a, b).unwrap_err();
    assert_eq!(
        err,
        ReifyError::UnreachableAncestor {
            root: a,
            ancestor: b,
            found: 0,
            expected: 1,
        }
    );
}

#[test]
fn test_non_generic_ancestor_resolves_empty() {
    let sys = TypeSystem::new();
    let plain = sys.declare(DeclarationInfo::new(sys.intern("Plain"))).unwrap();
    let child = declare(&sys, "Child", &["T"], vec![BaseSpec::bare(plain)]);
    assert!(bare(&sys, child, plain).unwrap().is_empty());
}

#[test]
fn test_plans_and_failures_are_cached() {
    let sys = TypeSystem::new();
    let (b, _, _, leaf) = diamond(&sys);
    let first = sys.plan(leaf, b).unwrap();
    let second = sys.plan(leaf, b).unwrap();
    assert!(Arc::ptr_eq(&first, &second));

    let a = declare(&sys, "Unrelated", &["T"], vec![]);
    let before = sys.plans().len();
    assert!(sys.plan(a, b).is_err());
    assert!(sys.plan(a, b).is_err());
    assert_eq!(sys.plans().len(), before + 1);
}

#[test]
fn test_trace_slot_records_first_path() {
    let sys = TypeSystem::new();
    let (b, m1, _, leaf) = diamond(&sys);
    let engine = ResolutionEngine::new(sys.store(), sys.plans());
    let paths = engine.trace_slot(ParamRef::new(leaf, 0), b).unwrap();
    assert_eq!(paths.len(), 1);
    let path = &paths[0];
    assert_eq!(path.origin(), ParamRef::new(leaf, 0));
    assert_eq!(path.target(), ParamRef::new(b, 0));
    assert_eq!(path.nodes[1], ParamRef::new(m1, 0));
    assert_eq!(path.edges.as_slice(), &[0, 0]);
    assert_eq!(path.len(), 2);
}

#[test]
fn test_lifted_forward_extends_path_with_owner_edge() {
    let sys = TypeSystem::new();
    let b = declare(&sys, "Base", &["T"], vec![]);
    let mid = declare(&sys, "Mid", &["U"], vec![base(b, [fwd(0)])]);
    let leaf = declare(&sys, "Leaf", &["T"], vec![base(mid, [fwd(0)])]);
    let engine = ResolutionEngine::new(sys.store(), sys.plans());

    let sub = engine.plan(mid, b).unwrap();
    let slot = sub.slots[0].as_ref().unwrap();
    let leaf_graph = sys.graph(leaf).unwrap();
    let lifted = slot.through_base(&leaf_graph, 0, &[fwd(0)]);

    assert_eq!(lifted.source, SlotSource::Expr(fwd(0)));
    assert_eq!(lifted.path.origin(), ParamRef::new(leaf, 0));
    assert_eq!(lifted.path.target(), ParamRef::new(b, 0));
    assert_eq!(lifted.path.edges.as_slice(), &[0, 0]);
    assert_eq!(lifted.path.nodes.len(), lifted.path.edges.len() + 1);
    assert_eq!(lifted.path.len(), 2);
}

#[test]
fn test_lifted_concrete_keeps_base_path() {
    let sys = TypeSystem::new();
    let b = declare(&sys, "Base", &["T"], vec![]);
    let mid = declare(&sys, "Mid", &["U"], vec![base(b, [fwd(0)])]);
    let leaf = declare(&sys, "Leaf", &[], vec![base(mid, [lit(sys.intrinsic("int"))])]);
    let plan = sys.plan(leaf, b).unwrap();
    let slot = plan.slots[0].as_ref().unwrap();
    assert_eq!(slot.path.origin(), ParamRef::new(mid, 0));
    assert_eq!(slot.path.nodes.len(), slot.path.edges.len() + 1);
}

// -- precedence --

#[test]
fn test_own_parameter_overrides_concrete_sibling_base() {
    let sys = TypeSystem::new();
    let b = declare(&sys, "Base", &["T"], vec![]);
    let m1 = declare(&sys, "Mid1", &["T"], vec![base(b, [fwd(0)])]);
    let m2 = declare(&sys, "Mid2", &["X"], vec![base(b, [lit(sys.intrinsic("int"))])]);
    let leaf = declare(
        &sys,
        "Leaf",
        &["T"],
        vec![base(m1, [fwd(0)]), base(m2, [lit(sys.intrinsic("str"))])],
    );

    let bytes = sys.intrinsic("bytes");
    assert_eq!(
        &*applied(&sys, leaf, &[bytes.clone()], b).unwrap(),
        &[Some(bytes)]
    );
    // The own path still claims the slot when the root is bare.
    assert_eq!(&*bare(&sys, leaf, b).unwrap(), &[None]);
    let plan = sys.plan(leaf, b).unwrap();
    assert!(plan.slots[0].as_ref().unwrap().provenance.is_own());
}

#[test]
fn test_memoized_on_specialization() {
    let sys = TypeSystem::new();
    let (b, _, _, leaf) = diamond(&sys);
    let spec = sys.specialize(leaf, &[sys.intrinsic("int")]).unwrap();
    let receiver = Receiver::Specialization(spec.clone());
    let first = sys.resolve(&receiver, b).unwrap();
    let second = sys.resolve(&receiver, b).unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(spec.memo_len(), 1);
}

#[test]
fn test_memoization_can_be_disabled() {
    let sys = TypeSystem::with_options(ReifyOptions::default().with_memoize_resolutions(false));
    let (b, _, _, leaf) = diamond(&sys);
    let spec = sys.specialize(leaf, &[sys.intrinsic("int")]).unwrap();
    sys.resolve(&Receiver::Specialization(spec.clone()), b).unwrap();
    assert_eq!(spec.memo_len(), 0);
}
