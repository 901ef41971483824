//! Build and search benchmarks.

use criterion::{Criterion, criterion_group, criterion_main};
use std::hint::black_box;
use std::sync::Arc;
use vicinage::builder::Brute;
use vicinage::dataset::GaussianMixture;
use vicinage::search::ApproximateSearch;
use vicinage::similarity::L2Similarity;

fn bench_brute_build(c: &mut Criterion) {
    let points = GaussianMixture::new(8, 10)
        .with_size(1000)
        .with_seed(3)
        .generate();
    let mut brute = Brute::new();
    brute.set_k(10).unwrap();
    brute.set_similarity(Arc::new(L2Similarity));

    c.bench_function("brute_build_1k", |b| {
        b.iter(|| black_box(brute.compute_graph(points.clone()).unwrap()))
    });
}

fn bench_approximate_search(c: &mut Criterion) {
    let points = GaussianMixture::new(8, 10)
        .with_size(2000)
        .with_seed(5)
        .generate();
    let query = points[0].clone();

    let mut brute = Brute::new();
    brute.set_k(10).unwrap();
    brute.set_similarity(Arc::new(L2Similarity));
    let graph = brute.compute_graph(points).unwrap();

    let search = ApproximateSearch::seeded(graph, 5, 4, Arc::new(L2Similarity), 7).unwrap();

    c.bench_function("approximate_search_2k_p4", |b| {
        b.iter(|| black_box(search.search(&query, 10, 400)))
    });
}

criterion_group!(benches, bench_brute_build, bench_approximate_search);
criterion_main!(benches);
