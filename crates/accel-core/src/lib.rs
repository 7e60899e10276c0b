// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # accel-core
//!
//! Everything between a validated layer descriptor and the accelerator.
//!
//! This crate provides:
//! - [`HwLimits`]: the fixed on-chip capacities (TM, TN, TR, TC, buffers).
//! - [`tile_params`]: tile sizes and output-channel loop bounds per layer.
//! - [`LayerRequest`]: the per-layer operand block handed to the device.
//! - [`Accelerator`]: the driver contract, plus [`ReferenceAccelerator`],
//!   a pure-software implementation.
//! - [`dispatch()`]: the double-buffered load/compute/write tile walk.
//! - [`Element`]: `f32` and `i16` fixed-point arithmetic.
//!
//! # Design Goals
//! - One tile walk shared by every accelerator implementation.
//! - Tiling never changes results: outputs are bit-identical for any TM.
//! - Precondition violations are reported before any data moves.

pub mod dispatch;
mod driver;
mod element;
mod error;
mod hw;
mod reference;
mod request;
mod tiling;

pub use dispatch::{
    dispatch, Bank, BankId, DispatchStats, PingPong, PipelineState, StageFlags, TileEngine,
    TileRef,
};
pub use driver::{Accelerator, DeviceMemory};
pub use element::{Element, Precision};
pub use error::{DriverError, TileError};
pub use hw::HwLimits;
pub use reference::ReferenceAccelerator;
pub use request::{LayerRequest, Operands, QScales};
pub use tiling::{tile_params, tile_table, OpKind, TileParams};
