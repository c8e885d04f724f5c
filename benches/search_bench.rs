use chunkdb::{DbConfig, IndexAlgorithm, Metadata, NewChunk, NewDocument, Store};
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, StandardNormal};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn generate_vectors(count: usize, dim: usize, seed: u64) -> Vec<Vec<f32>> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..count)
        .map(|_| (0..dim).map(|_| StandardNormal.sample(&mut rng)).collect())
        .collect()
}

fn chunks(vectors: &[Vec<f32>]) -> Vec<NewChunk> {
    vectors
        .iter()
        .enumerate()
        .map(|(i, v)| NewChunk {
            chunk_id: Some(format!("c{i:06}")),
            text: "bench payload".into(),
            embedding: v.clone(),
            metadata: Metadata::new(),
        })
        .collect()
}

fn populated_store(vectors: &[Vec<f32>], algorithm: IndexAlgorithm) -> Store {
    let store = Store::new(&DbConfig::default());
    store.create_library("bench", Metadata::new()).unwrap();
    store
        .create_document(
            "bench",
            NewDocument {
                document_id: Some("doc".into()),
                title: "bench".into(),
                metadata: Metadata::new(),
                chunks: chunks(vectors),
            },
        )
        .unwrap();
    store.index_library("bench", Some(algorithm)).unwrap();
    store
}

// ---------------------------------------------------------------------------
// Bulk insert throughput
// ---------------------------------------------------------------------------

fn bench_bulk_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("bulk_insert");

    for &dim in &[64, 256] {
        for &n in &[1_000usize, 10_000] {
            let vectors = generate_vectors(n, dim, 99);

            group.bench_with_input(BenchmarkId::new(format!("dim={dim}"), n), &n, |b, _| {
                b.iter(|| {
                    let store = Store::new(&DbConfig::default());
                    store.create_library("bench", Metadata::new()).unwrap();
                    store
                        .create_document(
                            "bench",
                            NewDocument {
                                document_id: Some("doc".into()),
                                title: "bench".into(),
                                metadata: Metadata::new(),
                                chunks: vec![],
                            },
                        )
                        .unwrap();
                    store
                        .create_chunks_bulk("bench", "doc", chunks(&vectors))
                        .unwrap();
                });
            });
        }
    }

    group.finish();
}

// ---------------------------------------------------------------------------
// Single query latency: LSH vs exact over the same data
// ---------------------------------------------------------------------------

fn bench_search(c: &mut Criterion) {
    let mut group = c.benchmark_group("search");
    let k = 10;

    for &dim in &[64, 256] {
        for &n in &[1_000usize, 10_000] {
            let vectors = generate_vectors(n, dim, 99);
            let query = generate_vectors(1, dim, 1234)[0].clone();

            let lsh = populated_store(&vectors, IndexAlgorithm::Lsh);
            group.bench_with_input(
                BenchmarkId::new(format!("lsh/dim={dim}"), n),
                &n,
                |b, _| {
                    b.iter(|| lsh.search("bench", &query, k, None).unwrap());
                },
            );

            let exact = populated_store(&vectors, IndexAlgorithm::Exact);
            group.bench_with_input(
                BenchmarkId::new(format!("exact/dim={dim}"), n),
                &n,
                |b, _| {
                    b.iter(|| exact.search("bench", &query, k, None).unwrap());
                },
            );
        }
    }

    group.finish();
}

// ---------------------------------------------------------------------------
// Algorithm swap cost
// ---------------------------------------------------------------------------

fn bench_swap(c: &mut Criterion) {
    let mut group = c.benchmark_group("swap");

    for &n in &[1_000usize, 10_000] {
        let vectors = generate_vectors(n, 64, 99);
        let store = populated_store(&vectors, IndexAlgorithm::Exact);

        group.bench_with_input(BenchmarkId::new("exact_to_lsh", n), &n, |b, _| {
            b.iter(|| {
                store.index_library("bench", Some(IndexAlgorithm::Lsh)).unwrap();
                store.index_library("bench", Some(IndexAlgorithm::Exact)).unwrap();
            });
        });
    }

    group.finish();
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

criterion_group!(benches, bench_bulk_insert, bench_search, bench_swap);
criterion_main!(benches);
