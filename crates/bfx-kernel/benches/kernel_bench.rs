//! Criterion benchmarks for the identity hot paths.

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use bfx_kernel::{expand, fnv1a64, promote, rebase, IdentityAlgo, SubstrateId};

fn bench_fnv1a64(c: &mut Criterion) {
    let small = b"profile.address.city";
    let large = vec![0xabu8; 64 * 1024];
    c.bench_function("fnv1a64_20b", |b| b.iter(|| fnv1a64(black_box(small))));
    c.bench_function("fnv1a64_64k", |b| b.iter(|| fnv1a64(black_box(&large))));
}

fn bench_sha256_fold(c: &mut Criterion) {
    let payload = vec![0x5au8; 4096];
    c.bench_function("sha256_fold_4k", |b| {
        b.iter(|| SubstrateId::of_with(black_box(&payload), IdentityAlgo::Sha256))
    });
}

fn bench_promote_chain(c: &mut Criterion) {
    let id = SubstrateId::of(b"bench seed");
    c.bench_function("promote_x7", |b| {
        b.iter(|| {
            let mut cur = black_box(id);
            for _ in 0..7 {
                cur = promote(cur);
            }
            cur
        })
    });
}

fn bench_expand(c: &mut Criterion) {
    let id = SubstrateId::of(b"expansion");
    c.bench_function("expand_4k", |b| b.iter(|| expand(black_box(id), 4096)));
}

fn bench_rebase(c: &mut Criterion) {
    let base = vec![0u8; 4096];
    let mut ours = base.clone();
    let mut theirs = base.clone();
    for i in (0..4096).step_by(2) {
        ours[i] ^= 0x11;
    }
    for i in (1..4096).step_by(2) {
        theirs[i] ^= 0x22;
    }
    c.bench_function("rebase_4k_disjoint", |b| {
        b.iter(|| rebase(black_box(&base), black_box(&ours), black_box(&theirs)))
    });
}

criterion_group!(
    benches,
    bench_fnv1a64,
    bench_sha256_fold,
    bench_promote_chain,
    bench_expand,
    bench_rebase,
);
criterion_main!(benches);
