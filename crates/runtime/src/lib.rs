// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # runtime
//!
//! Runs a planned network on an accelerator, one layer at a time.
//!
//! The runtime takes:
//! - A validated `LayerTable` and its `ModelLayout` from `layer-ir`.
//! - A `BufferMap` from `layout-planner`.
//! - An `Arena` from `arena` and an `Accelerator` from `accel-core`.
//!
//! And walks the layer table in order: conv and pool layers are tiled and
//! dispatched, reorg, route and region run on the host, and the final
//! output is read back as dense `f32`.
//!
//! # Type-State Pipeline
//! ```text
//! InferenceSession<Idle> → InferenceSession<Planned> → InferenceSession<Ready<T>>
//! ```
//! Transitions are compile-time checked. `T` is the datapath element,
//! `f32` or `i16` fixed point.
//!
//! # Async Execution
//! [`InferenceSession::run`] yields to the `tokio` scheduler between
//! layers. Layers never overlap; the only concurrency is inside one
//! layer's tile pipeline.

mod config;
pub mod cpu;
mod error;
mod executor;
mod metrics;
mod quant;
mod session;
mod weight_loader;

pub use config::{QFiles, RuntimeConfig, WeightFiles, TIMEOUT_ENV};
pub use error::RuntimeError;
pub use executor::{ExecContext, LayerExecutor, RunState};
pub use metrics::{InferenceMetrics, LayerMetrics};
pub use quant::QTables;
pub use session::{Idle, InferenceOutput, InferenceSession, Planned, Ready, SessionState};
pub use weight_loader::WeightStore;
