//! Criterion benchmarks for code rendering and file-backed allocation.

use std::hint::black_box;
use std::sync::Arc;

use chrono::{DateTime, FixedOffset};
use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};

use seqmint::config::FileStorageConfig;
use seqmint::domain::{ContextData, IdentifierLogic, ResetMode, context};
use seqmint::service::{SequenceAllocator, Template, build_token, render};
use seqmint::storage::LogicStorage;
use seqmint::storage::file::FileStorage;

fn now() -> DateTime<FixedOffset> {
    DateTime::parse_from_rfc3339("2025-11-04T09:30:00+02:00").unwrap()
}

fn bench_render(c: &mut Criterion) {
    let mut group = c.benchmark_group("render");
    let data = context([("PREFIX", "EMP"), ("REGION", "EU")]);
    let now = now();

    for format in [
        "EMP-{YYYY}-{MM}-{#####}",
        "{PREFIX}-{REGION}-{YY}{MM}{DD}-{########}",
        "{MISSING}--{PREFIX}--{####}-",
    ] {
        group.bench_with_input(BenchmarkId::new("parse_and_render", format), format, |b, f| {
            b.iter(|| render(black_box(f), &data, &now, black_box(12_345), 5));
        });

        let template = Template::parse(format);
        group.bench_with_input(BenchmarkId::new("render_parsed", format), &template, |b, t| {
            b.iter(|| t.render(&data, &now, black_box(12_345), 5));
        });
    }

    group.finish();
}

fn bench_token(c: &mut Criterion) {
    let data = context([("CUSTOMER", "ACME"), ("REGION", "EU")]);
    let keys = vec!["CUSTOMER".to_string(), "YYYY".to_string(), "MM".to_string()];
    let now = now();

    c.bench_function("build_token", |b| {
        b.iter(|| build_token(black_box(&keys), &data, &now));
    });
}

fn bench_file_allocation(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let temp_dir = tempfile::TempDir::new().unwrap();
    let storage = Arc::new(
        FileStorage::new(&FileStorageConfig {
            data_dir: temp_dir.path().to_path_buf(),
            lock_timeout_ms: 5000,
        })
        .unwrap(),
    );
    runtime
        .block_on(storage.save_logic(&IdentifierLogic::new(
            "bench",
            "B-{YYYY}-{########}",
            ResetMode::Yearly,
        )))
        .unwrap();

    let allocator = SequenceAllocator::new(storage);
    let data = ContextData::new();
    let now = now();

    c.bench_function("file_allocate", |b| {
        b.to_async(&runtime)
            .iter(|| async { allocator.allocate("bench", &data, now).await.unwrap() });
    });
}

criterion_group!(benches, bench_render, bench_token, bench_file_allocation);
criterion_main!(benches);
