//! Benchmarks for the IP restriction filter.
//!
//! Tests: allow-list lookup (exact and CIDR), protected-path matching, the
//! full decision path with a warm cache, and cache refill after invalidation.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use pathgate::modules::ip_restriction::{
    AccessDecisionEngine, AllowList, PathMatchMode, PathMatcher, RequestContext, RuleCache,
    RuleStore,
};
use std::hint::black_box;
use std::sync::Arc;
use std::time::Duration;

fn allow_entries(count: usize) -> Vec<String> {
    (0..count)
        .map(|i| {
            if i % 2 == 0 {
                format!("10.{}.{}.0/24", i / 256 % 256, i % 256)
            } else {
                format!("192.168.{}.{}", i / 256 % 256, i % 256)
            }
        })
        .collect()
}

fn path_patterns(count: usize) -> Vec<String> {
    (0..count).map(|i| format!("^/section-{i}/admin")).collect()
}

fn bench_allow_list(c: &mut Criterion) {
    let mut group = c.benchmark_group("ip_restriction/allow_list");

    for size in [10usize, 100, 1000] {
        let list = AllowList::new(allow_entries(size));

        group.bench_with_input(BenchmarkId::new("exact_hit", size), &list, |b, list| {
            b.iter(|| black_box(list.is_allowed(black_box("192.168.0.1"))));
        });

        group.bench_with_input(BenchmarkId::new("cidr_miss", size), &list, |b, list| {
            b.iter(|| black_box(list.is_allowed(black_box("172.16.5.5"))));
        });
    }

    group.finish();
}

fn bench_path_matcher(c: &mut Criterion) {
    let mut group = c.benchmark_group("ip_restriction/path_matcher");

    for size in [1usize, 10, 100] {
        let patterns = path_patterns(size);
        let prefix = PathMatcher::new(&patterns, PathMatchMode::Prefix);
        let full = PathMatcher::new(&patterns, PathMatchMode::Full);

        group.bench_with_input(BenchmarkId::new("prefix_miss", size), &prefix, |b, m| {
            b.iter(|| black_box(m.is_protected(black_box("/public/assets/app.js"))));
        });

        group.bench_with_input(BenchmarkId::new("full_miss", size), &full, |b, m| {
            b.iter(|| black_box(m.is_protected(black_box("/public/assets/app.js"))));
        });
    }

    group.finish();
}

fn bench_decision(c: &mut Criterion) {
    let mut group = c.benchmark_group("ip_restriction/decision");

    let store = RuleStore::new(allow_entries(100), path_patterns(10));
    let cache = Arc::new(RuleCache::new(store, Duration::from_secs(300)));
    let engine = AccessDecisionEngine::new(Arc::clone(&cache));

    let unprotected = RequestContext::new()
        .with_path("/public/home")
        .with_peer_address("198.51.100.9");
    let allowed = RequestContext::new()
        .with_path("/section-3/admin/users")
        .with_peer_address("10.0.4.20");
    let forwarded = RequestContext::new()
        .with_path("/section-3/admin/users")
        .with_peer_address("70.41.3.18")
        .with_header("X-Forwarded-For", "192.168.0.1, 70.41.3.18");

    group.bench_function("unprotected", |b| {
        b.iter(|| black_box(engine.check_request(black_box(&unprotected))));
    });

    group.bench_function("protected_allowed", |b| {
        b.iter(|| black_box(engine.check_request(black_box(&allowed))));
    });

    group.bench_function("protected_forwarded_for", |b| {
        b.iter(|| black_box(engine.check_request(black_box(&forwarded))));
    });

    group.bench_function("refill_after_invalidate", |b| {
        b.iter(|| {
            cache.invalidate();
            black_box(engine.check_request(black_box(&allowed)))
        });
    });

    group.finish();
}

criterion_group!(benches, bench_allow_list, bench_path_matcher, bench_decision);
criterion_main!(benches);
