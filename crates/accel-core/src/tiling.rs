// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Tile parameter calculation.
//!
//! Converts a layer's logical shape into hardware-sized tiles and the loop
//! bounds the pipeline dispatcher keys its stage flags on.

use crate::{HwLimits, TileError};
use layer_ir::LayerDescriptor;

/// Which pipeline shape a layer runs with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpKind {
    /// Load and compute in the same step, write one step later.
    Conv,
    /// Load, compute and write each one step apart.
    MaxPool,
}

impl OpKind {
    /// Opcode passed to the hardware.
    pub fn code(self) -> u32 {
        match self {
            Self::Conv => 0,
            Self::MaxPool => 1,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Conv => "conv",
            Self::MaxPool => "maxpool",
        }
    }
}

/// Tile sizes and output-channel loop bounds for one layer invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct TileParams {
    pub op: OpKind,
    /// Output-channel tile.
    pub tm: usize,
    /// Input-channel tile (zero for pooling).
    pub tn: usize,
    /// Output-row tile.
    pub tr: usize,
    /// Output-column tile.
    pub tc: usize,
    /// Output-channel tile iterations that carry real work.
    pub m_loops: usize,
    /// Exclusive end of the `m` walk, drain steps included.
    pub ofm_bound: usize,
    /// `m_loops * tm`: first step with no tile left to load.
    pub mloops_bound: usize,
    /// `(m_loops + 1) * tm`: first step with nothing left to compute.
    pub drain_bound: usize,
}

impl TileParams {
    /// Number of `m` steps the dispatcher walks per spatial tile.
    pub fn steps(&self) -> usize {
        self.ofm_bound / self.tm
    }

    /// Channels covered by `m_loops` tiles (>= the real channel count).
    pub fn covered_channels(&self) -> usize {
        self.mloops_bound
    }

    /// Rows of input one row tile reads.
    pub fn input_rows(&self, ksize: usize, stride: usize) -> usize {
        (self.tr - 1) * stride + ksize
    }

    /// Columns of input one column tile reads.
    pub fn input_cols(&self, ksize: usize, stride: usize) -> usize {
        (self.tc - 1) * stride + ksize
    }
}

fn spatial_tile(
    name: &'static str,
    buffer: usize,
    window: usize,
    stride: usize,
    hw_max: usize,
    extent: usize,
) -> Result<usize, TileError> {
    if stride == 0 || window > buffer {
        return Err(TileError::OutOfRange {
            name,
            value: 0,
            min: 1,
            max: hw_max,
        });
    }
    let t = ((buffer - window) / stride + 1).min(hw_max).min(extent);
    if t == 0 {
        return Err(TileError::OutOfRange {
            name,
            value: t,
            min: 1,
            max: hw_max,
        });
    }
    Ok(t)
}

/// Computes tile parameters for a conv or max-pool layer.
///
/// Reorg, route and region layers run on the CPU and yield
/// [`TileError::NotTileable`].
pub fn tile_params(layer: &LayerDescriptor, hw: &HwLimits) -> Result<TileParams, TileError> {
    let (op, window, stride, ifm, ofm, out_h, out_w) = match layer {
        LayerDescriptor::Conv(c) => (
            OpKind::Conv,
            c.size,
            c.stride,
            c.input.c,
            c.output.c,
            c.output.h,
            c.output.w,
        ),
        LayerDescriptor::MaxPool(p) => (
            OpKind::MaxPool,
            p.size,
            p.stride,
            p.input.c,
            p.output.c,
            p.output.h,
            p.output.w,
        ),
        other => return Err(TileError::NotTileable(other.kind())),
    };

    let tr = spatial_tile("TR", hw.input_buffer_rows, window, stride, hw.tr, out_h)?;
    let tc = spatial_tile("TC", hw.input_buffer_cols, window, stride, hw.tc, out_w)?;

    let (tm, tn) = match op {
        OpKind::Conv => (ofm.min(hw.tm), ifm.min(hw.tn)),
        // Pooling stages channels through the input buffer, so it is also
        // bounded by the input-channel tile.
        OpKind::MaxPool => (hw.tm.min(hw.tn).min(ifm), 0),
    };
    if tm == 0 || tm > hw.tm {
        return Err(TileError::OutOfRange {
            name: "TM",
            value: tm,
            min: 1,
            max: hw.tm,
        });
    }
    if tn > hw.tn {
        return Err(TileError::OutOfRange {
            name: "TN",
            value: tn,
            min: 0,
            max: hw.tn,
        });
    }

    let m_loops = ofm.div_ceil(tm);
    let drain_steps = match op {
        OpKind::Conv => 1,
        OpKind::MaxPool => 2,
    };

    let params = TileParams {
        op,
        tm,
        tn,
        tr,
        tc,
        m_loops,
        ofm_bound: (m_loops + drain_steps) * tm,
        mloops_bound: m_loops * tm,
        drain_bound: (m_loops + 1) * tm,
    };
    tracing::trace!(?params, "tile parameters");
    Ok(params)
}

/// Convenience: tile parameters for every accelerated layer of a table.
pub fn tile_table<'a>(
    layers: impl IntoIterator<Item = &'a LayerDescriptor>,
    hw: &HwLimits,
) -> Result<Vec<(usize, TileParams)>, (usize, TileError)> {
    let mut out = Vec::new();
    for (i, layer) in layers.into_iter().enumerate() {
        if !layer.kind().is_accelerated() {
            continue;
        }
        let params = tile_params(layer, hw).map_err(|e| (i, e))?;
        out.push((i, params));
    }
    Ok(out)
}
