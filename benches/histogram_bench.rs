//! Benchmarks for histogram accounting and query replay
//!
//! Run with: cargo bench

use agescope::histogram::AgeHistogram;
use agescope::profiler::{QueryDescriptor, QueryReplayer};
use agescope::promql::EngineOpts;
use chrono::{Duration, TimeZone, Utc};
use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use std::sync::Arc;

fn bench_increment(c: &mut Criterion) {
    let mut group = c.benchmark_group("increment");
    group.throughput(Throughput::Elements(1));

    let hourly = AgeHistogram::hourly(396).unwrap();
    let tiered = AgeHistogram::tiered(395).unwrap();

    for (name, younger, older) in [
        ("recent", Duration::zero(), Duration::minutes(5)),
        ("week", Duration::hours(1), Duration::days(7)),
        ("beyond_horizon", Duration::days(400), Duration::days(500)),
    ] {
        group.bench_function(format!("hourly_{}", name), |b| {
            b.iter(|| hourly.increment_for_interval(black_box(younger), black_box(older)))
        });
        group.bench_function(format!("tiered_{}", name), |b| {
            b.iter(|| tiered.increment_for_interval(black_box(younger), black_box(older)))
        });
    }

    group.finish();
}

fn bench_replay(c: &mut Criterion) {
    let mut group = c.benchmark_group("replay");

    let replayer = QueryReplayer::new(
        EngineOpts::default(),
        Arc::new(AgeHistogram::tiered(395).unwrap()),
    );
    let executed_at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();

    let instant = QueryDescriptor::instant(
        executed_at,
        r#"sum by (job) (rate(http_requests_total{code=~"5.."}[5m])) / sum by (job) (rate(http_requests_total[5m]))"#,
        executed_at,
    );
    group.bench_function("instant_ratio", |b| {
        b.iter(|| replayer.replay(black_box(&instant)).unwrap())
    });

    let range = QueryDescriptor::range(
        executed_at,
        "max_over_time(rate(x[5m])[1h:1m])",
        executed_at - Duration::days(7),
        executed_at,
        Duration::minutes(5),
    );
    group.bench_function("range_subquery_week", |b| {
        b.iter(|| replayer.replay(black_box(&range)).unwrap())
    });

    group.finish();
}

criterion_group!(benches, bench_increment, bench_replay);
criterion_main!(benches);
