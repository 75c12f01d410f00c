use abse_core::{recombine, split};
use ark_std::rand::SeedableRng;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::rngs::StdRng;

const PASSPHRASE: &[u8] = b"correct-horse-battery-staple";

fn benchmark_split_recombine(c: &mut Criterion) {
    let mut group = c.benchmark_group("secret_sharing");

    for size in [64usize, 1024, 16 * 1024] {
        let payload = "k".repeat(size);

        group.bench_function(BenchmarkId::new("split", size), |b| {
            b.iter(|| {
                let mut local_rng = StdRng::seed_from_u64(42);
                let _shares =
                    split(black_box(PASSPHRASE), black_box(&payload), &mut local_rng).unwrap();
            });
        });

        let mut rng = StdRng::seed_from_u64(43);
        let shares = split(PASSPHRASE, &payload, &mut rng).unwrap();
        let pair = [shares[3].clone(), shares[7].clone()];

        group.bench_function(BenchmarkId::new("recombine", size), |b| {
            b.iter(|| {
                let _payload = recombine(black_box(PASSPHRASE), black_box(&pair));
            });
        });
    }

    group.finish();
}

criterion_group!(benches, benchmark_split_recombine);
criterion_main!(benches);
