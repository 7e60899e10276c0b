// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # accel-sched
//!
//! Command-line interface for the accelerator inference scheduler.
//!
//! ## Usage
//! ```bash
//! # Run YOLOv2 with real weights
//! accel-sched run --network yolov2 --weights w.bin --bias b.bin --input image.f32
//!
//! # Run the toy network with generated weights in fixed point
//! accel-sched run --network toy --precision int16
//!
//! # Show where every layer lives in the arena
//! accel-sched plan --network yolov2 --layout ping-pong
//!
//! # Show tile sizes for every accelerated layer
//! accel-sched tiles --network yolov2 --tm 16
//!
//! # Repeat a run and report latency statistics
//! accel-sched bench --network toy --iterations 50
//! ```

mod commands;

use clap::{Parser, Subcommand};
use commands::NetworkArgs;

#[derive(Parser)]
#[command(
    name = "accel-sched",
    about = "Layer-by-layer CNN inference scheduler for a tiled accelerator",
    version,
    author
)]
struct Cli {
    /// Path to a TOML configuration file (overrides CLI arguments).
    #[arg(short, long, global = true)]
    config: Option<std::path::PathBuf>,

    /// Enable verbose logging (repeat for more: -v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one inference and print the output summary and metrics.
    Run {
        #[command(flatten)]
        net: NetworkArgs,

        /// Dense `[c][h][w]` little-endian f32 input file. A deterministic
        /// ramp is used when omitted.
        #[arg(short, long)]
        input: Option<std::path::PathBuf>,

        /// Write the dense f32 output here, little-endian.
        #[arg(short, long)]
        output: Option<std::path::PathBuf>,

        /// Print the per-layer metrics as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Plan the arena and print the buffer map.
    Plan {
        #[command(flatten)]
        net: NetworkArgs,

        /// Print the buffer map as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Print tile parameters for every accelerated layer.
    Tiles {
        #[command(flatten)]
        net: NetworkArgs,
    },

    /// Repeat a run and report latency statistics.
    Bench {
        #[command(flatten)]
        net: NetworkArgs,

        /// Timed runs.
        #[arg(short = 'n', long, default_value_t = 20)]
        iterations: usize,

        /// Untimed runs before measuring.
        #[arg(long, default_value_t = 2)]
        warmup: usize,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    commands::init_tracing(cli.verbose);

    match cli.command {
        Commands::Run {
            net,
            input,
            output,
            json,
        } => {
            let config = net.resolve(cli.config.as_deref())?;
            commands::run::execute(config, input, output, json).await
        }
        Commands::Plan { net, json } => {
            let config = net.resolve(cli.config.as_deref())?;
            commands::plan::execute(config, json)
        }
        Commands::Tiles { net } => {
            let config = net.resolve(cli.config.as_deref())?;
            commands::tiles::execute(config)
        }
        Commands::Bench {
            net,
            iterations,
            warmup,
        } => {
            let config = net.resolve(cli.config.as_deref())?;
            commands::bench::execute(config, iterations, warmup).await
        }
    }
}
