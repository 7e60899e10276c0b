// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for tiling and accelerator dispatch.

use layer_ir::LayerKind;
use std::time::Duration;

/// A tile parameter or layer operand outside what the hardware accepts.
///
/// These are programming or configuration errors in the layer shapes,
/// never transient conditions.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TileError {
    /// The layer kind runs on the CPU and has no tile parameters.
    #[error("{0} layers are not tiled")]
    NotTileable(LayerKind),

    /// A value falls outside its permitted range.
    #[error("{name} = {value} outside [{min}, {max}]")]
    OutOfRange {
        name: &'static str,
        value: usize,
        min: usize,
        max: usize,
    },

    /// The tile's input footprint does not fit the on-chip input buffer.
    #[error("input tile {rows}x{cols} exceeds on-chip buffer {max_rows}x{max_cols}")]
    InputTileOverflow {
        rows: usize,
        cols: usize,
        max_rows: usize,
        max_cols: usize,
    },

    /// The hardware description itself is unusable.
    #[error("invalid hardware limits: {0}")]
    InvalidLimits(String),
}

/// Failure reported by an accelerator for one layer invocation.
#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    /// A tile did not complete within the caller-supplied timeout.
    #[error("accelerator timed out after {0:?}")]
    Timeout(Duration),

    /// The request was rejected before any data moved.
    #[error("request rejected: {0}")]
    Rejected(#[from] TileError),

    /// An operand address points outside its memory space.
    #[error("{space} access [{start}, {end}) outside {len} elements")]
    OutOfBounds {
        space: &'static str,
        start: usize,
        end: usize,
        len: usize,
    },

    /// Any other device-side failure.
    #[error("accelerator fault: {0}")]
    Fault(String),
}
