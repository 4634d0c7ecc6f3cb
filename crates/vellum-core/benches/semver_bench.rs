//! Benchmarks for version parsing and pattern matching.

use criterion::{Criterion, black_box, criterion_group, criterion_main};
use vellum_core::{SemanticPattern, SemanticVersion};

fn bench_version_parsing(c: &mut Criterion) {
    let versions = vec![
        "1",
        "1.2",
        "1.2.3",
        "10.20.30",
        "1.0.0-alpha",
        "1.0.0-alpha.beta.rc.1",
        "1.0.0-rc.1+build.123",
        "2147483647.0.0",
    ];

    c.bench_function("version_parse", |b| {
        b.iter(|| {
            for v in &versions {
                black_box(SemanticVersion::parse(v)).ok();
            }
        });
    });
}

fn bench_version_compare(c: &mut Criterion) {
    let versions: Vec<_> = [
        "1.0.0-alpha",
        "1.0.0-alpha.1",
        "1.0.0-beta.11",
        "1.0.0-rc.1",
        "1.0.0",
        "1.9.3",
        "2.0.0",
    ]
    .iter()
    .map(|v| SemanticVersion::parse(v).unwrap())
    .collect();

    c.bench_function("version_compare_pairs", |b| {
        b.iter(|| {
            for a in &versions {
                for z in &versions {
                    black_box(a.compare(z));
                }
            }
        });
    });
}

fn bench_pattern_matching(c: &mut Criterion) {
    let pattern = SemanticPattern::parse(">=1.2 <2.0 || >=3.0-alpha").unwrap();
    let versions: Vec<_> = (0..100)
        .map(|i| SemanticVersion::parse(&format!("{}.{}.0", i / 10, i % 10)).unwrap())
        .collect();

    c.bench_function("pattern_match_100", |b| {
        b.iter(|| {
            for v in &versions {
                black_box(pattern.matches(Some(v)));
            }
        });
    });
}

criterion_group!(
    benches,
    bench_version_parsing,
    bench_version_compare,
    bench_pattern_matching,
);

criterion_main!(benches);
