//! Routing benchmarks

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::time::Duration;
use tokio::runtime::Runtime;
use vfswitch::mount::{MountTable, MountTableEntry};
use vfswitch::storage::{byte_stream, Storage};
use vfswitch::wrapper::WrapperSpec;
use vfswitch::{CallContext, VirtualStorage};

/// Router with a root mount plus `count` mounts nested `depth` levels deep
fn build_router(count: usize, depth: usize) -> VirtualStorage {
    let mut mounts = vec![MountTableEntry::new("/", "root", "memory")];
    for i in 0..count {
        let mut point = String::new();
        for level in 0..depth {
            point.push_str(&format!("/m{}_{}", i, level));
        }
        mounts.push(MountTableEntry::new(point, format!("m{}", i), "memory"));
    }
    VirtualStorage::from_table(&MountTable { mounts }).unwrap()
}

fn bench_resolve(c: &mut Criterion) {
    let mut group = c.benchmark_group("resolve");
    group.measurement_time(Duration::from_secs(5));
    group.throughput(Throughput::Elements(1));

    for count in [1usize, 10, 100, 1000] {
        let router = build_router(count, 4);
        let deep = format!("/m{0}_0/m{0}_1/m{0}_2/m{0}_3/a/b/c/d/e.txt", count / 2);

        group.bench_with_input(BenchmarkId::new("deep_path", count), &deep, |b, target| {
            b.iter(|| black_box(router.get_mount(target).unwrap()));
        });

        group.bench_with_input(BenchmarkId::new("fallback_to_root", count), &count, |b, _| {
            b.iter(|| black_box(router.get_mount("/unmounted/x/y/z").unwrap()));
        });

        let resource_id = format!("m{}:1", count / 2);
        group.bench_with_input(
            BenchmarkId::new("namespace_id", count),
            &resource_id,
            |b, target| {
                b.iter(|| black_box(router.get_mount(target).unwrap()));
            },
        );
    }

    group.finish();
}

fn bench_get_metadata(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("get_metadata");
    group.measurement_time(Duration::from_secs(5));
    group.throughput(Throughput::Elements(1));

    let chains: Vec<(&str, Vec<WrapperSpec>)> = vec![
        ("bare", vec![]),
        ("log", vec![WrapperSpec::new(1, "log")]),
        (
            "log_cache",
            vec![WrapperSpec::new(2, "log"), WrapperSpec::new(1, "cache")],
        ),
    ];

    for (name, wrappers) in chains {
        let mut entry = MountTableEntry::new("/home", "home", "memory");
        for spec in wrappers {
            entry = entry.with_wrapper(spec);
        }
        let router = VirtualStorage::from_table(&MountTable {
            mounts: vec![MountTableEntry::new("/", "root", "memory"), entry],
        })
        .unwrap();

        let ctx = CallContext::new();
        rt.block_on(router.upload(&ctx, "/home/bench.txt", byte_stream("bench")))
            .unwrap();

        group.bench_function(BenchmarkId::new("by_path", name), |b| {
            b.to_async(&rt).iter(|| async {
                black_box(router.get_metadata(&ctx, "/home/bench.txt").await.unwrap())
            });
        });

        let resource_id = rt
            .block_on(router.get_metadata(&ctx, "/home/bench.txt"))
            .unwrap()
            .id;
        group.bench_function(BenchmarkId::new("by_id", name), |b| {
            b.to_async(&rt).iter(|| async {
                black_box(router.get_metadata(&ctx, &resource_id).await.unwrap())
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_resolve, bench_get_metadata);
criterion_main!(benches);
