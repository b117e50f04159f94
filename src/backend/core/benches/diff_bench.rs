//! Benchmarks for the diff engine and timeline construction.

use chrono::{Duration, TimeZone, Utc};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use codetrail_core::events::{merge, ActionKind, RawEvent, SourceKind};
use codetrail_core::timeline::{build, positional_diff};

fn snapshot(lines: usize, edit_every: usize) -> String {
    (0..lines)
        .map(|i| if edit_every > 0 && i % edit_every == 0 { format!("    x_{i} = {i} + 1") } else { format!("    x_{i} = {i}") })
        .collect::<Vec<_>>()
        .join("\n")
}

fn events(n: usize, source: SourceKind, offset_ms: i64) -> Vec<RawEvent> {
    let start = Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap();
    (0..n)
        .map(|i| RawEvent {
            source,
            timestamp: start + Duration::milliseconds(i as i64 * 2_000 + offset_ms),
            exercise_ref: None,
            action_kind: match source { SourceKind::Fine => ActionKind::Keystroke, SourceKind::Coarse => ActionKind::Run },
            code: snapshot(20 + i % 40, 7),
            changes: None,
            output: None,
            error: None,
            is_submission: i % 50 == 0,
        })
        .collect()
}

fn bench_positional_diff(c: &mut Criterion) {
    let mut group = c.benchmark_group("positional_diff");
    for lines in [10, 100, 1_000] {
        let previous = snapshot(lines, 0);
        let current = snapshot(lines, 5);
        group.throughput(Throughput::Elements(lines as u64));
        group.bench_with_input(BenchmarkId::from_parameter(lines), &lines, |b, _| { b.iter(|| black_box(positional_diff(&previous, &current))); });
    }
    group.finish();
}

fn bench_reconstruct(c: &mut Criterion) {
    let mut group = c.benchmark_group("diff_reconstruct");
    let result = positional_diff(&snapshot(500, 0), &snapshot(500, 3));
    group.bench_function("current", |b| { b.iter(|| black_box(result.reconstruct_current())); });
    group.bench_function("previous", |b| { b.iter(|| black_box(result.reconstruct_previous())); });
    group.bench_function("render", |b| { b.iter(|| black_box(result.render())); });
    group.finish();
}

fn bench_merge_and_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("merge_and_build");
    for n in [100, 1_000] {
        let fine = events(n, SourceKind::Fine, 0);
        let coarse = events(n / 4, SourceKind::Coarse, 300);
        group.throughput(Throughput::Elements(n as u64));
        group.bench_with_input(BenchmarkId::new("merge", n), &n, |b, _| { b.iter(|| black_box(merge(fine.clone(), coarse.clone()))); });
        group.bench_with_input(BenchmarkId::new("build", n), &n, |b, _| {
            b.iter(|| { let (merged, _) = merge(fine.clone(), coarse.clone()); black_box(build(merged)) });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_positional_diff, bench_reconstruct, bench_merge_and_build);
criterion_main!(benches);
