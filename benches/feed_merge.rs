//! Feed merge over synthetic event sources.
//!
//! Run with:
//! ```bash
//! cargo bench --bench feed_merge
//! ```

use chrono::{Duration as ChronoDuration, TimeZone, Utc};
use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use std::hint::black_box;
use std::time::Duration;

use tapglue::controller::feed::merge;
use tapglue::service::{Event, Visibility};

/// Three overlapping sources of `per_source` events each.
fn sources(per_source: u64) -> Vec<Vec<Event>> {
    let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).single().unwrap_or_default();
    (0..3u64)
        .map(|source| {
            (0..per_source)
                .map(|i| {
                    // Every other event also appears in the next source.
                    let id = source * per_source / 2 + i + 1;
                    Event {
                        id,
                        user_id: id % 97,
                        kind: "check_in".into(),
                        visibility: Visibility::Public,
                        enabled: true,
                        created_at: base + ChronoDuration::seconds(((id * 7919) % 100_000) as i64),
                        ..Default::default()
                    }
                })
                .collect()
        })
        .collect()
}

fn feed_merge_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("feed_merge");
    group.measurement_time(Duration::from_secs(5));

    for per_source in [50u64, 200, 1_000, 5_000] {
        let input = sources(per_source);
        group.throughput(Throughput::Elements(per_source * 3));
        group.bench_with_input(BenchmarkId::new("events", per_source), &input, |b, input| {
            b.iter(|| black_box(merge(black_box(input.clone()))));
        });
    }

    group.finish();
}

criterion_group!(benches, feed_merge_benchmarks);
criterion_main!(benches);
