use std::hint::black_box;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use glam::DVec3;
use rand::Rng;
use xrpose_calib::{average_transforms, select_mode_cluster, ClusterThresholds};
use xrpose_lie::{SE3, SO3};

fn noisy_samples(truth: &SE3, num_samples: usize, num_outliers: usize) -> Vec<SE3> {
    let mut rng = rand::rng();
    let mut samples: Vec<SE3> = (0..num_samples)
        .map(|_| {
            let dt = DVec3::new(
                rng.random_range(-0.002..0.002),
                rng.random_range(-0.002..0.002),
                rng.random_range(-0.002..0.002),
            );
            let dr = SO3::exp(DVec3::new(
                rng.random_range(-0.01..0.01),
                rng.random_range(-0.01..0.01),
                rng.random_range(-0.01..0.01),
            ));
            SE3::new(truth.r * dr, truth.t + dt)
        })
        .collect();
    samples.extend((0..num_outliers).map(|_| SE3::from_random()));
    samples
}

fn bench_select_mode_cluster(c: &mut Criterion) {
    let mut group = c.benchmark_group("select_mode_cluster");
    let truth = SE3::from_random();
    let thresholds = ClusterThresholds::default();

    for num_samples in [6, 15, 60, 240] {
        let samples = noisy_samples(&truth, num_samples, num_samples / 4);
        group.bench_with_input(
            BenchmarkId::from_parameter(num_samples),
            &samples,
            |b, samples| b.iter(|| black_box(select_mode_cluster(samples, &thresholds))),
        );
    }

    group.finish();
}

fn bench_average_transforms(c: &mut Criterion) {
    let mut group = c.benchmark_group("average_transforms");
    let truth = SE3::from_random();

    for num_samples in [6, 15, 60, 240] {
        let samples = noisy_samples(&truth, num_samples, 0);
        group.bench_with_input(
            BenchmarkId::from_parameter(num_samples),
            &samples,
            |b, samples| b.iter(|| black_box(average_transforms(samples))),
        );
    }

    group.finish();
}

criterion_group!(benches, bench_select_mode_cluster, bench_average_transforms);
criterion_main!(benches);
