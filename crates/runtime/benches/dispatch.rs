// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Benchmarks for whole-network runs and tile parameter computation.

use accel_core::{tile_table, HwLimits};
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use layer_ir::presets;
use runtime::{InferenceSession, RuntimeConfig};

fn bench_toy_run(c: &mut Criterion) {
    let rt = tokio::runtime::Builder::new_current_thread()
        .build()
        .unwrap();
    let input: Vec<f32> = (0..3 * 16 * 16).map(|i| (i % 11) as f32 / 11.0).collect();
    let mut group = c.benchmark_group("toy_run");

    for tm in [1usize, 4, 32] {
        let config = RuntimeConfig {
            hw: HwLimits::default().with_max_tm(tm),
            enable_profiling: false,
            ..RuntimeConfig::synthetic("toy")
        };
        let mut session = InferenceSession::new(config.clone())
            .plan()
            .unwrap()
            .prepare::<f32>()
            .unwrap();
        group.bench_with_input(BenchmarkId::new("fp32", tm), &tm, |b, _| {
            b.iter(|| rt.block_on(session.run(&input)).unwrap())
        });

        let mut session = InferenceSession::new(RuntimeConfig {
            precision: "int16".into(),
            ..config
        })
        .plan()
        .unwrap()
        .prepare::<i16>()
        .unwrap();
        group.bench_with_input(BenchmarkId::new("int16", tm), &tm, |b, _| {
            b.iter(|| rt.block_on(session.run(&input)).unwrap())
        });
    }
    group.finish();
}

fn bench_yolov2_tile_table(c: &mut Criterion) {
    let net = presets::yolov2().unwrap();
    let hw = HwLimits::default();
    c.bench_function("yolov2_tile_table", |b| {
        b.iter(|| tile_table(net.table.layers(), &hw).unwrap())
    });
}

criterion_group!(benches, bench_toy_run, bench_yolov2_tile_table);
criterion_main!(benches);
