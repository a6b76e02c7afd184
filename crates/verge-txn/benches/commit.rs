//! Commit-path benchmarks for the transaction engine.
//!
//! Benchmarks for:
//! - Insert-only commits over fresh keys
//! - Read-modify-write commits against one hot record set
//! - Read-only commits

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use verge_common::types::{Key, TableId, Value};
use verge_mvcc::VersionDb;
use verge_store::MemoryStore;
use verge_txn::Transaction;

const TABLE: TableId = TableId::new(1);

fn fresh_db() -> Arc<VersionDb> {
    Arc::new(VersionDb::new(Arc::new(MemoryStore::new())))
}

/// Generate distinct record keys.
fn generate_keys(count: usize) -> Vec<Key> {
    (0..count)
        .map(|i| Key::from_vec(format!("person:{i:08}").into_bytes()))
        .collect()
}

/// Seed a database with committed values for every key.
fn seed(db: &Arc<VersionDb>, keys: &[Key], value_size: usize) {
    let mut rng = StdRng::seed_from_u64(42);
    for key in keys {
        let payload: Vec<u8> = (0..value_size).map(|_| rng.gen()).collect();
        let mut tx = Transaction::begin(Arc::clone(db)).unwrap();
        tx.read_and_initialize(TABLE, key).unwrap();
        tx.insert(TABLE, key, Value::from_vec(payload)).unwrap();
        assert!(tx.commit().unwrap().is_committed());
    }
}

/// Benchmark insert-only commits over fresh keys.
fn bench_insert_commit(c: &mut Criterion) {
    let mut group = c.benchmark_group("txn/insert_commit");

    for size in [100, 1_000].iter() {
        let keys = generate_keys(*size);

        group.throughput(Throughput::Elements(*size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter(|| {
                let db = fresh_db();
                for key in &keys {
                    let mut tx = Transaction::begin(Arc::clone(&db)).unwrap();
                    tx.insert(TABLE, key, Value::from("payload")).unwrap();
                    assert!(tx.commit().unwrap().is_committed());
                }
                black_box(db.stats().committed.load(std::sync::atomic::Ordering::Relaxed))
            });
        });
    }

    group.finish();
}

/// Benchmark read-modify-write commits against seeded records.
fn bench_update_commit(c: &mut Criterion) {
    let mut group = c.benchmark_group("txn/update_commit");

    for size in [100, 1_000].iter() {
        let keys = generate_keys(*size);
        let db = fresh_db();
        seed(&db, &keys, 100);

        group.throughput(Throughput::Elements(*size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter(|| {
                for key in &keys {
                    let mut tx = Transaction::begin(Arc::clone(&db)).unwrap();
                    let current = tx.read(TABLE, key).unwrap().unwrap();
                    tx.update(TABLE, key, current).unwrap();
                    assert!(tx.commit().unwrap().is_committed());
                }
                black_box(db.stats().committed.load(std::sync::atomic::Ordering::Relaxed))
            });
        });
    }

    group.finish();
}

/// Benchmark read-only commits against one seeded record.
fn bench_read_only_commit(c: &mut Criterion) {
    let keys = generate_keys(1);
    let db = fresh_db();
    seed(&db, &keys, 100);

    c.bench_function("txn/read_only_commit", |b| {
        b.iter(|| {
            let mut tx = Transaction::begin(Arc::clone(&db)).unwrap();
            black_box(tx.read(TABLE, &keys[0]).unwrap());
            assert!(tx.commit().unwrap().is_committed());
        });
    });
}

criterion_group!(
    benches,
    bench_insert_commit,
    bench_update_commit,
    bench_read_only_commit
);
criterion_main!(benches);
