// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! `accel-sched plan` command: print where every layer lives in the arena.

use anyhow::Context;
use runtime::{InferenceSession, RuntimeConfig};

pub fn execute(config: RuntimeConfig, json: bool) -> anyhow::Result<()> {
    let planned = InferenceSession::new(config)
        .plan()
        .context("planning failed")?;
    let map = planned.map();

    if json {
        println!("{}", serde_json::to_string_pretty(map)?);
        return Ok(());
    }

    println!("╔══════════════════════════════════════════════════════╗");
    println!("║            accel-sched · Arena Planner              ║");
    println!("╚══════════════════════════════════════════════════════╝");
    println!();

    let table = &planned.network().table;
    println!("  Network: {}", table.summary());
    println!("  Arena:   {}", map.budget);
    println!("  Input:   {}", map.input);
    println!();

    // ── Per-Layer Slots ────────────────────────────────────────
    println!(
        "  {:<4} {:<8} {:<14} {:<28} {:<22} {:<14} {:>5}",
        "Idx", "Kind", "Output", "Inputs", "Output span", "Placement", "Live",
    );
    println!("  {}", "-".repeat(102));

    for slot in &map.slots {
        let shape = table
            .layer(slot.layer)
            .map(|l| l.output_shape().to_string())
            .unwrap_or_default();
        let inputs: Vec<String> = slot.inputs.iter().map(|s| s.to_string()).collect();
        let output = slot
            .output
            .map(|s| s.to_string())
            .unwrap_or_else(|| "-".to_string());
        let placement = match slot.placement {
            layout_planner::Placement::Alias { source } => format!("alias({source})"),
            p => p.as_str().to_string(),
        };
        println!(
            "  {:<4} {:<8} {:<14} {:<28} {:<22} {:<14} {:>5}",
            slot.layer,
            slot.kind.as_str(),
            shape,
            super::truncate(&inputs.join(" "), 28),
            output,
            placement,
            slot.live_until,
        );
    }
    println!();

    // ── Reservations ───────────────────────────────────────────
    let reservations = map.reservations();
    if !reservations.is_empty() {
        println!("  Standing reservations:");
        for (layer, len) in reservations {
            println!("   layer {layer:<4} {len:>10} elements");
        }
        println!();
    }

    println!("  {}", map.summary());
    println!();

    Ok(())
}
