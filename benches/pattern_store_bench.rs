//! Performance benchmarks for the pattern store
//!
//! Targets:
//! - Exact lookup: <10µs
//! - Similarity scan over a full category (1000 entries): <5ms
//! - Insert into a full category (with eviction): <1ms
//! - Snapshot save of 1000 entries: <20ms

use criterion::{black_box, criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion, Throughput};
use pattern_cache::similarity::jaccard;
use pattern_cache::storage::StoreOptions;
use pattern_cache::{
    JsonFilePersistence, PatternCategory, PatternEntry, PatternInput, PatternPersistence, PatternStore,
};
use std::sync::Arc;
use tempfile::TempDir;

const WORDS: &[&str] = &[
    "create", "sword", "shield", "player", "inventory", "update", "render", "damage", "enemy", "spawn",
    "level", "score", "health", "potion", "quest", "map", "tile", "sprite", "sound", "menu",
];

/// Deterministic pseudo-sentence for entry `n`
fn sentence(n: usize) -> String {
    let mut words: Vec<String> = (0..8)
        .map(|i| WORDS[(n * 7 + i * 13 + n / WORDS.len()) % WORDS.len()].to_string())
        .collect();
    words.push(format!("item{}", n));
    words.join(" ")
}

fn filled_store(count: usize) -> PatternStore {
    let store = PatternStore::new(StoreOptions {
        max_patterns: count,
        ..StoreOptions::default()
    });
    for n in 0..count {
        store
            .insert(PatternEntry::new(
                PatternCategory::CodeGeneration,
                sentence(n).into(),
                format!("output {}", n),
            ))
            .unwrap();
    }
    store
}

/// Benchmark 1: Similarity scoring
fn bench_similarity(c: &mut Criterion) {
    let mut group = c.benchmark_group("similarity");
    group.throughput(Throughput::Elements(1));

    let a = sentence(1);
    let b = sentence(2);
    group.bench_function("jaccard", |bench| {
        bench.iter(|| black_box(jaccard(black_box(&a), black_box(&b))));
    });

    group.finish();
}

/// Benchmark 2: Lookups
fn bench_lookup(c: &mut Criterion) {
    let mut group = c.benchmark_group("lookup");

    for size in [100usize, 1000] {
        let store = filled_store(size);
        let exact: PatternInput = sentence(size / 2).into();
        let near: PatternInput = format!("{} extra", sentence(size / 3)).into();

        group.bench_with_input(BenchmarkId::new("find_exact", size), &exact, |b, input| {
            b.iter(|| {
                let hit = store
                    .find_exact(PatternCategory::CodeGeneration, black_box(input))
                    .unwrap();
                black_box(hit);
            });
        });

        group.bench_with_input(BenchmarkId::new("find_similar", size), &near, |b, input| {
            b.iter(|| {
                let hit = store
                    .find_similar(PatternCategory::CodeGeneration, black_box(input), 0.8)
                    .unwrap();
                black_box(hit);
            });
        });
    }

    group.finish();
}

/// Benchmark 3: Inserts
fn bench_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("insert");
    group.throughput(Throughput::Elements(1));

    group.bench_function("insert_with_eviction", |b| {
        let store = filled_store(1000);
        let mut n = 1000;
        b.iter(|| {
            n += 1;
            let outcome = store
                .insert(PatternEntry::new(
                    PatternCategory::CodeGeneration,
                    sentence(n).into(),
                    "output",
                ))
                .unwrap();
            black_box(outcome);
        });
    });

    group.finish();
}

/// Benchmark 4: Persistence
fn bench_persistence(c: &mut Criterion) {
    let mut group = c.benchmark_group("persistence");
    group.sample_size(20);

    let entries = filled_store(1000).snapshot().unwrap();
    let dir = TempDir::new().unwrap();
    let backend = Arc::new(JsonFilePersistence::new(dir.path().join("patterns.json")));

    group.bench_function("save_1000", |b| {
        b.iter(|| backend.save(black_box(&entries)).unwrap());
    });

    backend.save(&entries).unwrap();
    group.bench_function("load_1000", |b| {
        b.iter_batched(
            || Arc::clone(&backend),
            |backend| black_box(backend.load().unwrap()),
            BatchSize::SmallInput,
        );
    });

    group.finish();
}

criterion_group!(benches, bench_similarity, bench_lookup, bench_insert, bench_persistence);
criterion_main!(benches);
