use super::*;

fn order(ids: &[u32]) -> Arc<[DeclId]> {
    ids.iter().map(|&i| DeclId(i)).collect()
}

#[test]
fn test_no_bases() {
    let mro = linearize(DeclId(1), &[], &[]).unwrap();
    assert_eq!(mro, vec![DeclId(1)]);
}

#[test]
fn test_single_chain() {
    // 3(2), 2(1)
    let mro = linearize(DeclId(3), &[DeclId(2)], &[order(&[2, 1])]).unwrap();
    assert_eq!(mro, vec![DeclId(3), DeclId(2), DeclId(1)]);
}

#[test]
fn test_diamond() {
    // Base=1, Mid1=2(1), Mid2=3(1), Leaf=4(2, 3)
    let mro = linearize(
        DeclId(4),
        &[DeclId(2), DeclId(3)],
        &[order(&[2, 1]), order(&[3, 1])],
    )
    .unwrap();
    assert_eq!(mro, vec![DeclId(4), DeclId(2), DeclId(3), DeclId(1)]);
}

#[test]
fn test_inconsistent_order_is_rejected() {
    // A=1, B=2(1); C(A, B) puts A before its own subclass B.
    let err = linearize(DeclId(3), &[DeclId(1), DeclId(2)], &[order(&[1]), order(&[2, 1])])
        .unwrap_err();
    assert!(matches!(
        err,
        DeclarationError::InconsistentResolutionOrder { .. }
    ));
}

#[test]
fn test_local_precedence_is_kept() {
    // X=1, Y=2, A=3(1, 2), B=4(2, 1): C(A, B) cannot order X and Y.
    let err = linearize(
        DeclId(5),
        &[DeclId(3), DeclId(4)],
        &[order(&[3, 1, 2]), order(&[4, 2, 1])],
    )
    .unwrap_err();
    assert!(matches!(
        err,
        DeclarationError::InconsistentResolutionOrder { .. }
    ));
}
