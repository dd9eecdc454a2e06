//! Benchmarks for vector-migrate hot paths.
//!
//! Run with: cargo bench -p vector-migrate

#![allow(clippy::pedantic)]

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::sync::Arc;

use vector_migrate::connectors::common::parse_vector_from_json;
use vector_migrate::connectors::memory::MemoryStore;
use vector_migrate::connectors::{CollectionDescriptor, Distance, Payload, Record};
use vector_migrate::retry::RetryConfig;
use vector_migrate::transform::{FieldExtraction, TransformConfig};
use vector_migrate::{MigrationPlan, Pipeline, ProgressTracker, Transformer};

fn incident_record(id: u64, dim: usize) -> Record {
    let payload = serde_json::json!({
        "embedding_text": "Ransomware attack on regional hospital network",
        "metadata": {
            "source_file": "incidents_2024.json",
            "original_record": {
                "description": "A".repeat(2000),
                "title": "Hospital ransomware",
                "severity": "high",
                "organization": "Regional Health",
            }
        }
    });
    let payload: Payload = match payload {
        serde_json::Value::Object(map) => map,
        _ => Payload::new(),
    };
    Record::new(id, vec![0.01; dim], payload)
}

fn loader_transform() -> TransformConfig {
    TransformConfig {
        extract: vec![
            FieldExtraction {
                target: "content".to_string(),
                candidates: vec![
                    "metadata.original_record.description".to_string(),
                    "metadata.original_record.text".to_string(),
                    "embedding_text".to_string(),
                ],
                default: serde_json::json!(""),
                max_chars: Some(1000),
            },
            FieldExtraction {
                target: "metadata.title".to_string(),
                candidates: vec!["metadata.original_record.title".to_string()],
                default: serde_json::json!(""),
                max_chars: None,
            },
        ],
        exclude_fields: vec!["metadata".to_string()],
        ..TransformConfig::default()
    }
}

/// Benchmark the loader-style payload transformation on one batch.
fn bench_transform_batch(c: &mut Criterion) {
    let transformer = Transformer::new(loader_transform());
    let batch: Vec<Record> = (0..100).map(|i| incident_record(i, 1536)).collect();

    c.bench_function("transform_batch_100", |b| {
        b.iter(|| black_box(transformer.transform_batch(batch.clone())))
    });
}

/// Benchmark vector parsing from JSON by dimension.
fn bench_parse_vector(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse_vector_by_dimension");
    for dim in [384, 768, 1536, 3072] {
        let value = serde_json::json!(vec![0.001_f32; dim]);
        group.bench_with_input(BenchmarkId::new("dimension", dim), &value, |b, v| {
            b.iter(|| black_box(parse_vector_from_json(v, "vector")))
        });
    }
    group.finish();
}

/// Benchmark the progress computation done after every batch.
fn bench_progress_update(c: &mut Criterion) {
    c.bench_function("progress_update", |b| {
        b.iter(|| {
            black_box(ProgressTracker::update(
                black_box(50_000),
                black_box(1_000_000),
                black_box(12.5),
            ))
        })
    });
}

/// Benchmark a full in-memory migration by worker count.
fn bench_pipeline_memory(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().expect("runtime");
    let records: Vec<Record> = (0..2_000).map(|i| incident_record(i, 128)).collect();
    let source = MemoryStore::with_collection(
        CollectionDescriptor::new("incidents", 128, Distance::Cosine),
        records,
    );

    let mut group = c.benchmark_group("pipeline_memory_2000");
    group.sample_size(20);
    for workers in [1, 2, 4] {
        group.bench_with_input(BenchmarkId::new("workers", workers), &workers, |b, &w| {
            b.to_async(&runtime).iter(|| {
                let source = source.clone();
                async move {
                    let mut plan = MigrationPlan::new("incidents");
                    plan.workers = w;
                    plan.max_in_flight = w;
                    plan.retry = RetryConfig::no_retry();
                    plan.transform = loader_transform();
                    let pipeline =
                        Pipeline::new(Arc::new(source), Arc::new(MemoryStore::new()), plan);
                    black_box(pipeline.run().await.is_ok())
                }
            })
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_transform_batch,
    bench_parse_vector,
    bench_progress_update,
    bench_pipeline_memory
);
criterion_main!(benches);
