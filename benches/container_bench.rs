//! Benchmarks for the container core

use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use std::collections::BTreeSet;
use std::hint::black_box;
use std::sync::Arc;
use wirecore::cache::Cache;
use wirecore::injector::Injector;
use wirecore::metadata::{ClassDescriptor, FieldDescriptor, Qualifier, ScopeTag};
use wirecore::scanner::StaticScanner;
use wirecore::types::TypeDescriptor;

fn world() -> Vec<Arc<ClassDescriptor>> {
    vec![
        ClassDescriptor::builder("app.Config")
            .scope(ScopeTag::singleton())
            .build(),
        ClassDescriptor::builder("app.Repo").interface().build(),
        ClassDescriptor::builder("app.PrimaryRepo")
            .implements("app.Repo")
            .qualifier(Qualifier::named("primary"))
            .scope(ScopeTag::singleton())
            .build(),
        ClassDescriptor::builder("app.Service")
            .field(FieldDescriptor::injectable("config", "app.Config"))
            .field(
                FieldDescriptor::injectable("repo", "app.Repo")
                    .with_qualifier(Qualifier::named("primary")),
            )
            .build(),
    ]
}

fn bench_cache(c: &mut Criterion) {
    let mut group = c.benchmark_group("cache");
    group.throughput(Throughput::Elements(1));

    group.bench_function("hit", |b| {
        let cache: Cache<u64, u64> = Cache::new(1024);
        cache.compute_if_absent(1, || 42);
        b.iter(|| black_box(cache.compute_if_absent(1, || unreachable!())));
    });

    group.bench_function("miss_and_evict", |b| {
        let cache: Cache<u64, u64> = Cache::new(64);
        let mut key = 0u64;
        b.iter(|| {
            key = key.wrapping_add(1);
            black_box(cache.compute_if_absent(key, || key))
        });
    });

    group.finish();
}

fn bench_resolution(c: &mut Criterion) {
    let mut group = c.benchmark_group("resolution");
    group.throughput(Throughput::Elements(1));

    group.bench_function("singleton_hot", |b| {
        let injector = Injector::new(Arc::new(StaticScanner::with_classes(world()))).unwrap();
        let target = TypeDescriptor::class("app.Config");
        injector.inject(&target).unwrap();
        b.iter(|| black_box(injector.inject(&target).unwrap()));
    });

    group.bench_function("dependent_full_wiring", |b| {
        let injector = Injector::new(Arc::new(StaticScanner::with_classes(world()))).unwrap();
        let target = TypeDescriptor::class("app.Service");
        b.iter(|| black_box(injector.inject(&target).unwrap()));
    });

    group.bench_function("qualified_lookup", |b| {
        let injector = Injector::new(Arc::new(StaticScanner::with_classes(world()))).unwrap();
        let target = TypeDescriptor::class("app.Repo");
        let mut qualifiers = BTreeSet::new();
        qualifiers.insert(Qualifier::named("primary"));
        b.iter(|| black_box(injector.inject_with(&target, qualifiers.clone()).unwrap()));
    });

    group.finish();
}

criterion_group!(benches, bench_cache, bench_resolution);
criterion_main!(benches);
