// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! `accel-sched run` command: execute one inference.
//!
//! Walks the full type-state pipeline:
//! ```text
//! InferenceSession<Idle> → plan → <Planned> → prepare::<T> → <Ready<T>> → run
//! ```

use super::{load_input, truncate};
use accel_core::{Element, Precision};
use anyhow::Context;
use runtime::{InferenceOutput, InferenceSession, RuntimeConfig};
use std::path::PathBuf;

pub async fn execute(
    config: RuntimeConfig,
    input: Option<PathBuf>,
    output: Option<PathBuf>,
    json: bool,
) -> anyhow::Result<()> {
    println!("╔══════════════════════════════════════════════════════╗");
    println!("║          accel-sched · Inference Runner             ║");
    println!("╚══════════════════════════════════════════════════════╝");
    println!();

    let precision = config.parse_precision()?;

    println!("  Config:");
    println!("   Network:   {}", truncate(&config.network, 50));
    println!("   Precision: {precision}");
    println!("   Layout:    {}", config.layout);
    println!(
        "   Weights:   {}",
        match &config.weights {
            Some(files) if !config.synthetic_weights => files.weights.display().to_string(),
            _ => "synthetic".to_string(),
        }
    );
    println!("   Tm:        {}", config.hw.tm);
    println!();

    match precision {
        Precision::Fp32 => run_typed::<f32>(config, input, output, json).await,
        Precision::Int16 => run_typed::<i16>(config, input, output, json).await,
    }
}

async fn run_typed<T: Element>(
    config: RuntimeConfig,
    input: Option<PathBuf>,
    output: Option<PathBuf>,
    json: bool,
) -> anyhow::Result<()> {
    // Step 1: Idle → Planned (build the layer table and plan the arena).
    println!("  [1/3] Building layer table and planning arena...");
    let planned = InferenceSession::new(config)
        .plan()
        .context("planning failed")?;
    println!("        {}", planned.network().table.summary());
    println!("        {}", planned.map().summary());
    println!();

    // Step 2: Planned → Ready (weights, arena and accelerator).
    println!("  [2/3] Loading weights and allocating arena...");
    let mut session = planned
        .prepare::<T>()
        .context("failed to prepare session")?;
    println!(
        "        Weights from {} ({} + {} elements)",
        session.weights().source(),
        session.weights().weights().len(),
        session.weights().bias().len(),
    );
    println!();

    // Step 3: run.
    println!("  [3/3] Running inference on '{}'...", session.accelerator_name());
    let data = load_input(input.as_deref(), session.network().table.input)?;
    let result = session.run(&data).await?;
    println!();

    print_results(&result);
    println!("  Arena:");
    println!("   {}", session.arena_stats().summary());
    println!();

    if let Some(path) = output {
        let bytes: Vec<u8> = result.output.iter().flat_map(|v| v.to_le_bytes()).collect();
        std::fs::write(&path, bytes)
            .with_context(|| format!("failed to write output '{}'", path.display()))?;
        println!("  Output written to {}", path.display());
        println!();
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&result.metrics)?);
    }

    Ok(())
}

fn print_results(result: &InferenceOutput) {
    let out = &result.output;
    let (min, max) = out
        .iter()
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    let mean = if out.is_empty() {
        0.0
    } else {
        out.iter().map(|&v| v as f64).sum::<f64>() / out.len() as f64
    };

    println!("  Results:");
    println!("   Output shape: {} ({} values)", result.shape, out.len());
    if !out.is_empty() {
        println!("   Range:        [{min:.4}, {max:.4}], mean {mean:.4}");
    }
    println!(
        "   First values: {:?}{}",
        &out[..out.len().min(8)],
        if out.len() > 8 { " ..." } else { "" },
    );
    println!();
    println!("  Metrics:");
    println!("   {}", result.metrics.summary());
    if let Some(slow) = result.metrics.slowest_layer() {
        println!(
            "   Slowest layer: {} ({}) {:.3}ms",
            slow.layer,
            slow.kind.as_str(),
            slow.duration.as_secs_f64() * 1000.0,
        );
    }
    println!();
}
