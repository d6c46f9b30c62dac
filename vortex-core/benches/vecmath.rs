//! Benchmarks for vector math primitives and the flat-index search path.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::Rng;
use vortex_core::vecmath::{cosine_similarity, normalize, squared_l2};

fn generate_random_vector(dim: usize) -> Vec<f32> {
    let mut rng = rand::thread_rng();
    (0..dim).map(|_| rng.gen_range(-1.0..1.0)).collect()
}

fn bench_cosine_similarity(c: &mut Criterion) {
    let mut group = c.benchmark_group("cosine_similarity");

    for dim in [128, 384, 768, 1536].iter() {
        let a = normalize(&generate_random_vector(*dim)).unwrap();
        let b = normalize(&generate_random_vector(*dim)).unwrap();

        group.throughput(Throughput::Elements(*dim as u64));
        group.bench_with_input(BenchmarkId::from_parameter(dim), dim, |bench, _| {
            bench.iter(|| cosine_similarity(black_box(&a), black_box(&b)))
        });
    }

    group.finish();
}

fn bench_squared_l2(c: &mut Criterion) {
    let mut group = c.benchmark_group("squared_l2");

    for dim in [128, 384, 768, 1536].iter() {
        let a = normalize(&generate_random_vector(*dim)).unwrap();
        let b = normalize(&generate_random_vector(*dim)).unwrap();

        group.throughput(Throughput::Elements(*dim as u64));
        group.bench_with_input(BenchmarkId::from_parameter(dim), dim, |bench, _| {
            bench.iter(|| squared_l2(black_box(&a), black_box(&b)))
        });
    }

    group.finish();
}

fn bench_flat_index_search(c: &mut Criterion) {
    use uuid::Uuid;
    use vortex_core::index::FlatIndex;
    use vortex_core::VectorIndex;

    let mut group = c.benchmark_group("flat_index_search");

    for num_vectors in [1_000, 10_000, 50_000].iter() {
        let dim = 384;
        let mut index = FlatIndex::new(dim);

        for i in 0..*num_vectors {
            let vector = normalize(&generate_random_vector(dim)).unwrap();
            index.insert(Uuid::from_u128(i as u128), vector).unwrap();
        }

        let query = normalize(&generate_random_vector(dim)).unwrap();

        group.throughput(Throughput::Elements(*num_vectors as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(num_vectors),
            num_vectors,
            |bench, _| bench.iter(|| index.search(black_box(&query), 10)),
        );
    }

    group.finish();
}

criterion_group!(benches, bench_cosine_similarity, bench_squared_l2, bench_flat_index_search);
criterion_main!(benches);
