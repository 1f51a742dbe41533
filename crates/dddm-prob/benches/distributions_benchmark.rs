use criterion::{Criterion, criterion_group, criterion_main};
use std::hint::black_box;

fn bench_scalar_distributions(c: &mut Criterion) {
    let xs: Vec<f64> = (0..10_000).map(|i| (i as f64) * 0.001 - 5.0).collect();

    c.bench_function("normal_pdf_10k", |b| {
        b.iter(|| {
            let mut acc = 0.0;
            for &x in &xs {
                acc += dddm_prob::normal::pdf(x, 0.0, 1.3).unwrap();
            }
            black_box(acc)
        })
    });

    let us: Vec<f64> = (0..10_000).map(|i| ((i as f64) + 0.5) / 10_000.0).collect();
    c.bench_function("truncated_quantile_10k", |b| {
        b.iter(|| {
            let mut acc = 0.0;
            for &u in &us {
                acc += dddm_prob::normal::truncated_quantile(u, 544.0, 33.0, 379.0, 709.0).unwrap();
            }
            black_box(acc)
        })
    });

    let ks: Vec<f64> = (0..10_000).map(|i| (i % 30) as f64).collect();
    c.bench_function("poisson_logpmf_10k", |b| {
        b.iter(|| {
            let mut acc = 0.0;
            for &k in &ks {
                acc += dddm_prob::poisson::logpmf(k, 3.2).unwrap();
            }
            black_box(acc)
        })
    });
}

criterion_group!(benches, bench_scalar_distributions);
criterion_main!(benches);
