//! Benchmarks for import tree resolution.

use criterion::{Criterion, black_box, criterion_group, criterion_main};
use parking_lot::Mutex;
use serde_json::{Value, json};
use std::sync::Arc;
use vellum_resolver::{
    MemoryPackageManager, Package, PackageManager, PackageResolver, PendingImport, Session,
};

fn package_payload(import: Value) -> String {
    json!({"type": "vellum", "version": "1.0", "import": import}).to_string()
}

/// pkg0 imports pkg1 imports ... imports pkg(depth-1).
fn chain_manager(depth: usize) -> Arc<MemoryPackageManager> {
    let manager = Arc::new(MemoryPackageManager::new());
    for level in 0..depth {
        let import = if level + 1 < depth {
            json!([{"name": format!("pkg{}", level + 1), "version": "1.0"}])
        } else {
            json!([])
        };
        manager.put(format!("pkg{level}:1.0"), package_payload(import));
    }
    manager
}

/// width independent leaf packages.
fn wide_manager(width: usize) -> Arc<MemoryPackageManager> {
    let manager = Arc::new(MemoryPackageManager::new());
    for index in 0..width {
        manager.put(format!("pkg{index}:1.0"), package_payload(json!([])));
    }
    manager
}

fn resolve(manager: &Arc<MemoryPackageManager>, import: Value) -> Vec<String> {
    let root = Arc::new(
        Package::new(
            "main",
            json!({"type": "vellum", "version": "1.0", "import": import}),
        )
        .unwrap(),
    );
    let pending = Arc::new(Mutex::new(PendingImport::new(
        root,
        None,
        Arc::new(Session::new()),
        Vec::new(),
    )));
    let resolver = PackageResolver::new(Arc::clone(manager) as Arc<dyn PackageManager>);

    let names = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&names);
    resolver.load(
        pending,
        move |ordered| {
            *sink.lock() = ordered
                .iter()
                .map(|package| package.name().to_string())
                .collect();
        },
        |_, message, _| panic!("bench import failed: {message}"),
    );

    let resolved = names.lock().clone();
    resolved
}

fn bench_chain_resolution(c: &mut Criterion) {
    let manager = chain_manager(32);
    c.bench_function("resolve_chain_32", |b| {
        b.iter(|| {
            black_box(resolve(
                &manager,
                json!([{"name": "pkg0", "version": "1.0"}]),
            ))
        });
    });
}

fn bench_wide_resolution(c: &mut Criterion) {
    let width = 64;
    let manager = wide_manager(width);
    let import: Vec<Value> = (0..width)
        .map(|index| json!({"name": format!("pkg{index}"), "version": "1.0"}))
        .collect();
    c.bench_function("resolve_wide_64", |b| {
        b.iter(|| black_box(resolve(&manager, Value::Array(import.clone()))));
    });
}

fn bench_load_after_ordering(c: &mut Criterion) {
    // Sibling i waits on sibling i+1, declared in the worst order so
    // nearly every entry defers before placement.
    let width = 32;
    let manager = wide_manager(width);
    let import: Vec<Value> = (0..width)
        .map(|index| {
            if index + 1 < width {
                json!({
                    "name": format!("pkg{index}"),
                    "version": "1.0",
                    "loadAfter": format!("pkg{}", index + 1)
                })
            } else {
                json!({"name": format!("pkg{index}"), "version": "1.0"})
            }
        })
        .collect();
    c.bench_function("resolve_load_after_32", |b| {
        b.iter(|| black_box(resolve(&manager, Value::Array(import.clone()))));
    });
}

criterion_group!(
    benches,
    bench_chain_resolution,
    bench_wide_resolution,
    bench_load_after_ordering
);
criterion_main!(benches);
