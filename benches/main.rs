// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use libdd_logger::level::Level;
use libdd_logger::registry::Logger;
use libdd_logger::{log_output, RuntimeConfig};
use std::sync::Arc;
use tempfile::NamedTempFile;

fn disabled_level_fast_path(c: &mut Criterion) {
    let logger = Logger::new("bench.disabled", Level::Warning);
    c.bench_function("log_output disabled by level", |b| {
        b.iter(|| {
            // `Info` is below `Warning`: the macro's own check should stop
            // this before a single byte is formatted or the runtime touched.
            log_output!(&logger, "value = {}", black_box(42));
        });
    });
}

fn enqueue_throughput(c: &mut Criterion) {
    let file = NamedTempFile::new().expect("tempfile");
    let path = file.path().to_str().unwrap().to_string();
    libdd_logger::init_with_config("bench", &path, RuntimeConfig::default())
        .expect("init should succeed");
    libdd_logger::remember_identity("bench", &path);

    let logger: Arc<Logger> = Logger::new("bench.hot", Level::Lowest);
    libdd_logger::register(logger.clone());

    c.bench_function("log_output enqueue", |b| {
        b.iter(|| {
            log_output!(&logger, "iteration {}", black_box(1));
        });
    });

    let _ = libdd_logger::flush();
    let _ = libdd_logger::finalize();
}

criterion_group!(benches, disabled_level_fast_path, enqueue_throughput);
criterion_main!(benches);
