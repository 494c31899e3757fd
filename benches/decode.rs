//! Frame decoding benchmarks.
//!
//! Measures envelope decoding for typical dashboard frames:
//! - Small job progress updates
//! - Issue table pages with nested tagged scalars
//!
//! Run with: cargo bench --bench decode
//! Results saved to: target/criterion/

use std::hint::black_box;

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use serde_json::json;

use fz_notifications::Envelope;

// ============================================================================
// Benchmark Parameters
// ============================================================================

const ROW_COUNTS: &[usize] = &[10, 100, 1000];

// ============================================================================
// Fixtures
// ============================================================================

fn progress_frame() -> String {
    json!({
        "action": "job_progress",
        "data": { "ident": 42, "progress": { "$numberDouble": "42.5" } }
    })
    .to_string()
}

fn issues_frame(rows: usize) -> String {
    let rows: Vec<_> = (0..rows)
        .map(|i| {
            json!({
                "_id": { "$oid": format!("5cc9a1{i:06x}") },
                "id": format!("crash-{i}"),
                "fuzzer": "random_content",
                "sut": "jsc",
                "count": { "$numberDouble": format!("{i}.0") },
                "first_seen": { "$date": "2019-05-01T12:00:00.000Z" },
                "last_seen": { "$date": { "$numberLong": "1556712000000" } },
                "invalid": false
            })
        })
        .collect();

    json!({ "action": "get_issues", "data": { "total": rows.len(), "rows": rows } }).to_string()
}

// ============================================================================
// Benchmark: Decode
// ============================================================================

fn bench_progress(c: &mut Criterion) {
    let frame = progress_frame();

    c.bench_function("decode/job_progress", |b| {
        b.iter(|| Envelope::decode(black_box(&frame)).unwrap());
    });
}

fn bench_issue_pages(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode/get_issues");

    for &rows in ROW_COUNTS {
        let frame = issues_frame(rows);
        group.throughput(Throughput::Bytes(frame.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(rows), &frame, |b, frame| {
            b.iter(|| Envelope::decode(black_box(frame)).unwrap());
        });
    }

    group.finish();
}

criterion_group!(benches, bench_progress, bench_issue_pages);
criterion_main!(benches);
