//! Specialization registry benchmarks.

use criterion::{Criterion, black_box, criterion_group, criterion_main};
use reify::{DeclarationInfo, Member, ParamInfo, TypeSystem, Value};

fn bench_specialize(c: &mut Criterion) {
    let sys = TypeSystem::new();
    let pair = sys
        .declare(DeclarationInfo::generic(
            sys.intern("Pair"),
            vec![ParamInfo::new(sys.intern("K")), ParamInfo::new(sys.intern("V"))],
        ))
        .unwrap();
    let args = [sys.intrinsic("int"), sys.intrinsic("str")];

    // Held so every iteration is a cache hit.
    let _live = sys.specialize(pair, &args).unwrap();
    c.bench_function("specialize_hit", |b| {
        b.iter(|| black_box(sys.specialize(pair, &args).unwrap()))
    });

    let other = [sys.intrinsic("float"), sys.intrinsic("bytes")];
    c.bench_function("specialize_create_and_evict", |b| {
        b.iter(|| drop(black_box(sys.specialize(pair, &other).unwrap())))
    });
}

fn bench_proxy_call(c: &mut Criterion) {
    let sys = TypeSystem::new();
    let me = Member::alias_aware(|ctx, _args: &[Value]| Ok(ctx.receiver().to_value()));
    let boxed = sys
        .declare(
            DeclarationInfo::generic(sys.intern("Box"), vec![ParamInfo::new(sys.intern("T"))])
                .with_member(sys.intern("me"), me),
        )
        .unwrap();
    let proxy = sys
        .apply(boxed, &[sys.intrinsic("int")])
        .unwrap()
        .into_proxy()
        .unwrap();
    c.bench_function("proxy_call", |b| {
        b.iter(|| black_box(proxy.call("me", &[]).unwrap()))
    });
}

criterion_group!(specialize_benches, bench_specialize, bench_proxy_call);
criterion_main!(specialize_benches);
