//! 服务注册表性能基准测试
//!
//! - 过滤器解析与匹配
//! - 按接口查找服务
//! - 按过滤器查找服务

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use chips_runtime::service::SERVICE_RANKING;
use chips_runtime::{
    ActivatorRegistry, Filter, Framework, FrameworkConfig, ModuleDescriptor, Properties,
};
use std::sync::Arc;

// ============================================================================
// 过滤器基准测试
// ============================================================================

fn filter_benchmark(c: &mut Criterion) {
    let text = "(&(objectClass=com.example.Shape)(|(color=red)(color=blue))(size>=3)(!(name=tmp*)))";
    let props = Properties::new()
        .with("objectClass", vec!["com.example.Shape"])
        .with("color", "blue")
        .with("size", 5i64)
        .with("name", "circle");

    c.bench_function("filter_parse", |b| {
        b.iter(|| Filter::parse(black_box(text)).unwrap())
    });

    let filter = Filter::parse(text).unwrap();
    c.bench_function("filter_match", |b| {
        b.iter(|| filter.matches(black_box(&props)))
    });
}

// ============================================================================
// 服务查找基准测试
// ============================================================================

fn lookup_benchmark(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let mut group = c.benchmark_group("service_lookup");

    for count in [10usize, 100, 1000] {
        let fw = Framework::new(
            FrameworkConfig::builder().synchronous_stop().build(),
            Arc::new(ActivatorRegistry::new()),
        );
        let module = fw
            .install(ModuleDescriptor::new("bench:provider"))
            .unwrap();
        rt.block_on(fw.start()).unwrap();
        let context = module.context().unwrap();
        for i in 0..count {
            let interface = if i % 2 == 0 { "bench.Even" } else { "bench.Odd" };
            context
                .register_object(
                    &[interface],
                    i,
                    Properties::new()
                        .with(SERVICE_RANKING, (i % 7) as i64)
                        .with("index", i as i64),
                )
                .unwrap();
        }
        let filter = Filter::parse("(index<=50)").unwrap();

        group.bench_with_input(BenchmarkId::new("by_interface", count), &count, |b, _| {
            b.iter(|| fw.registry().get_best_reference(Some(black_box("bench.Even")), None))
        });
        group.bench_with_input(BenchmarkId::new("by_filter", count), &count, |b, _| {
            b.iter(|| fw.registry().get_references(None, Some(black_box(&filter))))
        });

        rt.block_on(fw.stop()).unwrap();
    }

    group.finish();
}

criterion_group!(benches, filter_benchmark, lookup_benchmark);
criterion_main!(benches);
