// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! `accel-sched bench` command: repeated runs on one prepared session.
//!
//! The session is planned and prepared once; each iteration reuses the
//! arena and weights, so the numbers cover dispatch and host transforms
//! only.

use accel_core::{Element, Precision};
use anyhow::Context;
use runtime::{InferenceSession, RuntimeConfig};
use std::time::{Duration, Instant};

pub async fn execute(config: RuntimeConfig, iterations: usize, warmup: usize) -> anyhow::Result<()> {
    println!("╔══════════════════════════════════════════════════════╗");
    println!("║           accel-sched · Benchmark Suite             ║");
    println!("╚══════════════════════════════════════════════════════╝");
    println!();

    if iterations == 0 {
        anyhow::bail!("--iterations must be at least 1");
    }

    let precision = config.parse_precision()?;
    println!("  Network:    {}", config.network);
    println!("  Precision:  {precision}");
    println!("  Layout:     {}", config.layout);
    println!("  Tm:         {}", config.hw.tm);
    println!("  Iterations: {iterations} (+{warmup} warmup)");
    println!();

    let samples = match precision {
        Precision::Fp32 => measure::<f32>(config, iterations, warmup).await?,
        Precision::Int16 => measure::<i16>(config, iterations, warmup).await?,
    };

    let stats = LatencyStats::from_samples(samples);
    println!("  Latency:");
    println!("   min    {:>10.3}ms", ms(stats.min));
    println!("   median {:>10.3}ms", ms(stats.median));
    println!("   mean   {:>10.3}ms", ms(stats.mean));
    println!("   p95    {:>10.3}ms", ms(stats.p95));
    println!("   max    {:>10.3}ms", ms(stats.max));
    println!();
    println!("  Throughput: {:.1} inferences/s", 1.0 / stats.mean.as_secs_f64().max(1e-9));
    println!();

    Ok(())
}

async fn measure<T: Element>(
    config: RuntimeConfig,
    iterations: usize,
    warmup: usize,
) -> anyhow::Result<Vec<Duration>> {
    let mut session = InferenceSession::new(config)
        .plan()
        .context("planning failed")?
        .prepare::<T>()
        .context("failed to prepare session")?;
    let input = super::load_input(None, session.network().table.input)?;

    for _ in 0..warmup {
        session.run(&input).await?;
    }

    let mut samples = Vec::with_capacity(iterations);
    let mut last = None;
    for i in 0..iterations {
        let start = Instant::now();
        let output = session.run(&input).await?;
        samples.push(start.elapsed());
        tracing::debug!(iteration = i, "{}", output.metrics.summary());
        last = Some(output);
    }

    if let Some(output) = last {
        println!("  Last run:");
        println!("   {}", output.metrics.summary());
        println!();
    }
    Ok(samples)
}

/// Order statistics over a set of run latencies.
#[derive(Debug, Clone, Copy, PartialEq)]
struct LatencyStats {
    min: Duration,
    median: Duration,
    mean: Duration,
    p95: Duration,
    max: Duration,
}

impl LatencyStats {
    fn from_samples(mut samples: Vec<Duration>) -> Self {
        samples.sort();
        let n = samples.len();
        if n == 0 {
            return Self {
                min: Duration::ZERO,
                median: Duration::ZERO,
                mean: Duration::ZERO,
                p95: Duration::ZERO,
                max: Duration::ZERO,
            };
        }
        let total: Duration = samples.iter().sum();
        let p95_index = ((n as f64 * 0.95).ceil() as usize).clamp(1, n) - 1;
        Self {
            min: samples[0],
            median: samples[n / 2],
            mean: total / n as u32,
            p95: samples[p95_index],
            max: samples[n - 1],
        }
    }
}

fn ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latency_stats() {
        let samples = (1..=20).rev().map(Duration::from_millis).collect();
        let stats = LatencyStats::from_samples(samples);
        assert_eq!(stats.min, Duration::from_millis(1));
        assert_eq!(stats.max, Duration::from_millis(20));
        assert_eq!(stats.median, Duration::from_millis(11));
        assert_eq!(stats.p95, Duration::from_millis(19));
        assert_eq!(stats.mean, Duration::from_micros(10_500));
    }

    #[test]
    fn test_latency_stats_empty() {
        let stats = LatencyStats::from_samples(Vec::new());
        assert_eq!(stats.max, Duration::ZERO);
    }
}
