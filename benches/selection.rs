//! Selection benchmarks
//!
//! EM fitting dominates a sweep; these measure a single fit, the held-out
//! scoring pass and a small parallel vs sequential sweep.
//!
//! Run with: cargo bench --bench selection

use boutmix::config::RunConfig;
use boutmix::matrix::{FeatureMatrix, Matrix};
use boutmix::model::{GaussianMixtureEstimator, MixtureEstimator, MixtureModel};
use boutmix::selection::select;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Three separated groups in a 4-feature space
fn bouts(n: usize, seed: u64) -> FeatureMatrix {
    let mut rng = StdRng::seed_from_u64(seed);
    let rows: Vec<Vec<f64>> = (0..n)
        .map(|i| {
            let centre = [0.0, 8.0, 16.0][i % 3];
            (0..4).map(|_| centre + rng.gen_range(-1.0..1.0)).collect()
        })
        .collect();
    Matrix::from_rows(&rows).unwrap()
}

fn bench_fit(c: &mut Criterion) {
    let mut group = c.benchmark_group("em_fit");
    let estimator = GaussianMixtureEstimator::default();

    for n in [1_000, 10_000] {
        let data = vec![bouts(n, 1), bouts(n, 2)];
        group.bench_with_input(BenchmarkId::new("k3", n), &data, |b, data| {
            b.iter(|| {
                let mut rng = StdRng::seed_from_u64(0);
                estimator.fit(3, black_box(data), &mut rng)
            });
        });
    }

    group.finish();
}

fn bench_held_out(c: &mut Criterion) {
    let mut group = c.benchmark_group("held_out_log_likelihood");
    let train = vec![bouts(2_000, 1), bouts(2_000, 2)];
    let model = GaussianMixtureEstimator::default()
        .fit(3, &train, &mut StdRng::seed_from_u64(0))
        .unwrap();

    for n in [1_000, 100_000] {
        let held_out = vec![bouts(n, 3), bouts(n, 4)];
        group.bench_with_input(BenchmarkId::new("k3", n), &held_out, |b, held_out| {
            b.iter(|| model.held_out_log_likelihood(black_box(held_out)));
        });
    }

    group.finish();
}

fn bench_sweep(c: &mut Criterion) {
    let mut group = c.benchmark_group("selection_sweep");
    group.sample_size(10);
    let data = vec![bouts(3_000, 1), bouts(3_000, 2)];
    let estimator = GaussianMixtureEstimator::default();

    for parallel in [false, true] {
        let config = RunConfig::builder()
            .cluster_counts(2..=5)
            .repetitions(2)
            .train_size(1_500)
            .parallel(parallel)
            .build()
            .unwrap();
        let label = if parallel { "parallel" } else { "sequential" };
        group.bench_function(label, |b| {
            b.iter(|| select(&estimator, black_box(&data), &config));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_fit, bench_held_out, bench_sweep);
criterion_main!(benches);
