// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! `accel-sched tiles` command: tile sizes and loop bounds per layer.

use anyhow::Context;
use runtime::{InferenceSession, RuntimeConfig};

pub fn execute(config: RuntimeConfig) -> anyhow::Result<()> {
    println!("╔══════════════════════════════════════════════════════╗");
    println!("║            accel-sched · Tile Calculator            ║");
    println!("╚══════════════════════════════════════════════════════╝");
    println!();

    let hw = config.hw.clone();
    let planned = InferenceSession::new(config)
        .plan()
        .context("planning failed")?;
    let table = &planned.network().table;
    let tiles = planned.tile_table()?;

    println!(
        "  Limits: Tm={} Tn={} Tr={} Tc={} K={} S={} input buffer {}x{}",
        hw.tm,
        hw.tn,
        hw.tr,
        hw.tc,
        hw.max_kernel,
        hw.max_stride,
        hw.input_buffer_rows,
        hw.input_buffer_cols,
    );
    println!();

    println!(
        "  {:<4} {:<7} {:<14} {:>4} {:>4} {:>4} {:>4} {:>7} {:>6} {:>7} {:>6} {:>6}",
        "Idx", "Op", "Output", "TM", "TN", "TR", "TC", "mLoops", "ofm", "mloops", "drain", "steps",
    );
    println!("  {}", "-".repeat(86));

    let mut total_steps = 0;
    for (index, t) in &tiles {
        let shape = table
            .layer(*index)
            .map(|l| l.output_shape().to_string())
            .unwrap_or_default();
        println!(
            "  {:<4} {:<7} {:<14} {:>4} {:>4} {:>4} {:>4} {:>7} {:>6} {:>7} {:>6} {:>6}",
            index,
            t.op.as_str(),
            shape,
            t.tm,
            t.tn,
            t.tr,
            t.tc,
            t.m_loops,
            t.ofm_bound,
            t.mloops_bound,
            t.drain_bound,
            t.steps(),
        );
        total_steps += t.steps();
    }
    println!();
    println!(
        "  {} accelerated layers of {}, {} m-steps per spatial tile in total",
        tiles.len(),
        table.len(),
        total_steps,
    );
    println!();

    Ok(())
}
