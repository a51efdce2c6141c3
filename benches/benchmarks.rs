//! Performance benchmarks for exthost.
//!
//! This module contains benchmarks for:
//! - Manifest parsing (JSON, TOML, YAML)
//! - Event bus fan-out with many subscribers
//! - Resource cache hits and full start-up
//!
//! Run with: `cargo bench`

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use futures::executor::block_on;
use serde_json::json;

use exthost::plugin::{
    EventBus, HostRuntime, ManifestFormat, ManifestLoader, PluginDescriptor, PluginRegistry,
    ResourceCache, StaticLoader,
};

// ============================================================================
// Mock Data Fixtures
// ============================================================================

mod fixtures {
    use super::*;

    /// Descriptors `ext-0 .. ext-n`, every third one depending on its
    /// predecessor.
    pub fn descriptors(count: usize) -> Vec<PluginDescriptor> {
        (0..count)
            .map(|i| {
                let descriptor =
                    PluginDescriptor::new(format!("ext-{i}"), format!("plugins/ext-{i}.js"), true);
                if i % 3 == 2 {
                    descriptor.with_dependencies([format!("ext-{}", i - 1)])
                } else {
                    descriptor
                }
            })
            .collect()
    }

    /// The same descriptors rendered as a TOML manifest.
    pub fn toml_manifest(count: usize) -> String {
        let mut out = String::new();
        for d in descriptors(count) {
            out.push_str(&format!(
                "[[plugins]]\nid = \"{}\"\nentry = \"{}\"\nenabledByDefault = true\n",
                d.id, d.entry_locator
            ));
            if !d.dependencies.is_empty() {
                out.push_str(&format!("dependencies = [\"{}\"]\n", d.dependencies[0]));
            }
            out.push('\n');
        }
        out
    }

    /// Loader whose entries register an initializer that does nothing.
    pub fn loader(count: usize) -> StaticLoader {
        (0..count).fold(StaticLoader::new(), |loader, i| {
            loader.with_entry(format!("plugins/ext-{i}.js"), move |registrar| {
                registrar.register(format!("ext-{i}"), |_| async { anyhow::Ok(()) })?;
                Ok(())
            })
        })
    }
}

// ============================================================================
// Manifest Benchmarks
// ============================================================================

fn bench_manifest_parsing(c: &mut Criterion) {
    let mut group = c.benchmark_group("manifest");

    for count in [10, 100, 1000].iter() {
        let toml = fixtures::toml_manifest(*count);
        let descriptors = fixtures::descriptors(*count);
        let json = serde_json::to_string(&descriptors).unwrap_or_default();
        let yaml = serde_yaml::to_string(&descriptors).unwrap_or_default();

        group.throughput(Throughput::Elements(*count as u64));
        for (name, content, format) in [
            ("toml", &toml, ManifestFormat::Toml),
            ("json", &json, ManifestFormat::Json),
            ("yaml", &yaml, ManifestFormat::Yaml),
        ] {
            group.bench_with_input(BenchmarkId::new(name, count), content, |b, content| {
                b.iter(|| ManifestLoader::from_str(black_box(content), format));
            });
        }
    }

    group.finish();
}

// ============================================================================
// Event Bus Benchmarks
// ============================================================================

fn bench_event_fan_out(c: &mut Criterion) {
    let mut group = c.benchmark_group("events");

    for subscribers in [1, 10, 100].iter() {
        let bus = EventBus::new();
        let subscriptions: Vec<_> =
            (0..*subscribers).map(|_| bus.subscribe("x", |payload| {
                black_box(payload);
                Ok(())
            })).collect();

        group.throughput(Throughput::Elements(*subscribers as u64));
        group.bench_with_input(BenchmarkId::new("emit", subscribers), &bus, |b, bus| {
            b.iter(|| bus.emit("x", json!({"id": "bench"})));
        });

        drop(subscriptions);
    }

    group.finish();
}

// ============================================================================
// Resource & Start-up Benchmarks
// ============================================================================

fn bench_cached_resource(c: &mut Criterion) {
    let cache = ResourceCache::new(
        Arc::new(StaticLoader::new().with_script("lib/shared.js")),
        PluginRegistry::new(),
    );
    let _ = block_on(cache.load_script("lib/shared.js"));

    c.bench_function("resources/cache_hit", |b| {
        b.iter(|| block_on(cache.load_script(black_box("lib/shared.js"))));
    });
}

fn bench_startup(c: &mut Criterion) {
    let mut group = c.benchmark_group("startup");

    for count in [10, 100].iter() {
        let loader = Arc::new(fixtures::loader(*count));
        let descriptors = fixtures::descriptors(*count);

        group.throughput(Throughput::Elements(*count as u64));
        group.bench_with_input(BenchmarkId::new("start", count), &descriptors, |b, descriptors| {
            b.iter(|| {
                let mut runtime = HostRuntime::new(loader.clone());
                black_box(block_on(runtime.start(descriptors.clone())))
            });
        });
    }

    group.finish();
}

// ============================================================================
// Criterion Groups and Main
// ============================================================================

criterion_group!(manifest_benches, bench_manifest_parsing,);

criterion_group!(runtime_benches, bench_event_fan_out, bench_cached_resource, bench_startup,);

criterion_main!(manifest_benches, runtime_benches,);
