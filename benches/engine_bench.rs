use app_lifecycle::{Config, Engine, Error, Hook, ShutdownRegistry};
use criterion::{black_box, criterion_group, criterion_main, Criterion};

fn bench_engine_creation(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let _guard = rt.enter();

    c.bench_function("engine_creation", |b| {
        b.iter(|| {
            let engine = Engine::builder()
                .name("bench")
                .without_signals()
                .build()
                .unwrap();
            black_box(engine);
        });
    });
}

fn bench_hook_registration(c: &mut Criterion) {
    c.bench_function("hook_registration", |b| {
        b.iter(|| {
            let registry = ShutdownRegistry::new(None);
            for name in ["db", "cache", "http", "queue"] {
                registry
                    .register(name, Hook::new(|| async { Ok(()) }))
                    .unwrap();
            }
            black_box(registry);
        });
    });
}

fn bench_shutdown_round(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    c.bench_function("shutdown_round_8_hooks", |b| {
        b.to_async(&rt).iter(|| async {
            let registry = ShutdownRegistry::new(None);
            for i in 0..8 {
                registry
                    .register_fn(&format!("hook-{i}"), || async { Ok(()) })
                    .unwrap();
            }
            registry.shutdown_all().await;
            black_box(registry.get_stats());
        });
    });

    c.bench_function("shutdown_round_blocking_hooks", |b| {
        b.to_async(&rt).iter(|| async {
            let registry = ShutdownRegistry::new(None);
            for i in 0..4 {
                registry
                    .register_blocking(&format!("blocking-{i}"), || Ok(()))
                    .unwrap();
            }
            registry.shutdown_all().await;
            black_box(registry.get_stats());
        });
    });
}

fn bench_config_loading(c: &mut Criterion) {
    c.bench_function("config_loading", |b| {
        b.iter(|| {
            let config = Config::from_env().unwrap();
            black_box(config);
        });
    });
}

fn bench_error_creation(c: &mut Criterion) {
    c.bench_function("error_creation", |b| {
        b.iter(|| {
            let err = Error::shutdown(black_box("benchmark error"));
            black_box(err);
        });
    });
}

criterion_group!(
    benches,
    bench_engine_creation,
    bench_hook_registration,
    bench_shutdown_round,
    bench_config_loading,
    bench_error_creation
);
criterion_main!(benches);
