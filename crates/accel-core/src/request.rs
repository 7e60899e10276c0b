// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The per-layer request handed to an accelerator.
//!
//! Addresses are element offsets into the caller's memory spaces (arena,
//! weight table, bias table). Translating them to bus addresses is the
//! driver's business.

use crate::{OpKind, TileError, TileParams};
use layer_ir::{Activation, FeatureShape, LayerDescriptor};
use std::time::Duration;

/// Fixed-point scale exponents for one convolution.
///
/// The scheduler forwards these untouched; only the datapath interprets them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct QScales {
    pub weight: i32,
    pub bias: i32,
    pub act_in: i32,
    pub act_out: i32,
}

impl QScales {
    /// Q of a weight x activation product.
    pub fn product(&self) -> i32 {
        self.weight + self.act_in
    }

    /// Fractional bits dropped when narrowing a product to the output Q.
    pub fn output_shift(&self) -> i32 {
        self.product() - self.act_out
    }
}

/// Arena, weight and bias offsets of one invocation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Operands {
    pub input: usize,
    pub output: usize,
    pub weights: usize,
    pub bias: usize,
}

/// Everything the hardware needs to run one conv or pool layer.
#[derive(Debug, Clone, PartialEq)]
pub struct LayerRequest {
    /// Table index, for diagnostics only.
    pub layer: usize,
    pub input_addr: usize,
    pub output_addr: usize,
    pub weight_addr: usize,
    pub bias_addr: usize,
    pub ifm: usize,
    pub ofm: usize,
    pub ksize: usize,
    pub stride: usize,
    pub in_w: usize,
    pub in_h: usize,
    pub out_w: usize,
    pub out_h: usize,
    /// Leading padding on the top and left edges.
    pub padding: usize,
    pub activation: bool,
    pub batch_norm: bool,
    pub tiles: TileParams,
    /// Present in fixed-point mode.
    pub q: Option<QScales>,
    /// Bound on waiting for any single tile.
    pub timeout: Duration,
}

impl LayerRequest {
    /// Builds a request for a conv or pool descriptor.
    pub fn from_layer(
        layer: usize,
        desc: &LayerDescriptor,
        tiles: TileParams,
        operands: Operands,
        timeout: Duration,
    ) -> Result<Self, TileError> {
        let (input, output, ksize, stride, padding, activation, batch_norm) = match desc {
            LayerDescriptor::Conv(c) => (
                c.input,
                c.output,
                c.size,
                c.stride,
                c.padding,
                c.activation == Activation::Leaky,
                c.batch_norm,
            ),
            LayerDescriptor::MaxPool(p) => (
                p.input,
                p.output,
                p.size,
                p.stride,
                p.leading_padding(),
                false,
                false,
            ),
            other => return Err(TileError::NotTileable(other.kind())),
        };
        Ok(Self {
            layer,
            input_addr: operands.input,
            output_addr: operands.output,
            weight_addr: operands.weights,
            bias_addr: operands.bias,
            ifm: input.c,
            ofm: output.c,
            ksize,
            stride,
            in_w: input.w,
            in_h: input.h,
            out_w: output.w,
            out_h: output.h,
            padding,
            activation,
            batch_norm,
            tiles,
            q: None,
            timeout,
        })
    }

    pub fn with_q(mut self, q: QScales) -> Self {
        self.q = Some(q);
        self
    }

    pub fn op(&self) -> OpKind {
        self.tiles.op
    }

    pub fn input_shape(&self) -> FeatureShape {
        FeatureShape::new(self.ifm, self.in_h, self.in_w)
    }

    pub fn output_shape(&self) -> FeatureShape {
        FeatureShape::new(self.ofm, self.out_h, self.out_w)
    }

    /// Weight elements read, `[ofm][ifm][k][k]`.
    pub fn weight_count(&self) -> usize {
        match self.op() {
            OpKind::Conv => self.ofm * self.ifm * self.ksize * self.ksize,
            OpKind::MaxPool => 0,
        }
    }

    pub fn bias_count(&self) -> usize {
        match self.op() {
            OpKind::Conv => self.ofm,
            OpKind::MaxPool => 0,
        }
    }
}
