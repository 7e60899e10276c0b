// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Software stand-in for the accelerator.
//!
//! [`ReferenceAccelerator`] drives the same tile pipeline as the hardware
//! and keeps its banks in host memory. Arithmetic order is fixed per output
//! element (bias, then input-channel tiles, then kernel taps), so the
//! result does not depend on TM, TR or TC.

use crate::dispatch::{dispatch, BankId, TileEngine, TileRef};
use crate::{Accelerator, DeviceMemory, DispatchStats, DriverError, Element, LayerRequest, OpKind};
use layer_ir::FeatureShape;

/// Pure-software accelerator. Never blocks.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReferenceAccelerator;

impl ReferenceAccelerator {
    pub fn new() -> Self {
        Self
    }
}

impl<T: Element> Accelerator<T> for ReferenceAccelerator {
    fn name(&self) -> &str {
        "reference"
    }

    fn execute(
        &mut self,
        req: &LayerRequest,
        mem: &mut DeviceMemory<'_, T>,
    ) -> Result<DispatchStats, DriverError> {
        mem.check_bounds(req)?;
        let mut engine = ReferenceEngine::new(req, mem);
        dispatch(req, &mut engine)
    }
}

/// Host-memory banks for one layer invocation.
struct ReferenceEngine<'r, 'a, T: Element> {
    req: &'r LayerRequest,
    mem: &'r mut DeviceMemory<'a, T>,
    input: FeatureShape,
    output: FeatureShape,
    in_rows: usize,
    in_cols: usize,
    /// Conv: weight slab `[tm][ifm][k][k]`. Pool: input tile `[tm][rows][cols]`.
    input_banks: [Vec<T>; 2],
    bias_banks: [Vec<T>; 2],
    /// Conv input-channel slice `[tn][rows][cols]`.
    scratch: Vec<T>,
    /// Accumulators `[tm][tr][tc]`.
    output_banks: [Vec<T::Acc>; 2],
}

impl<'r, 'a, T: Element> ReferenceEngine<'r, 'a, T> {
    fn new(req: &'r LayerRequest, mem: &'r mut DeviceMemory<'a, T>) -> Self {
        let t = &req.tiles;
        let in_rows = t.input_rows(req.ksize, req.stride);
        let in_cols = t.input_cols(req.ksize, req.stride);
        let input_bank_len = match t.op {
            OpKind::Conv => t.tm * req.ifm * req.ksize * req.ksize,
            OpKind::MaxPool => t.tm * in_rows * in_cols,
        };
        let bias_len = match t.op {
            OpKind::Conv => t.tm,
            OpKind::MaxPool => 0,
        };
        let scratch_len = match t.op {
            OpKind::Conv => t.tn.max(1) * in_rows * in_cols,
            OpKind::MaxPool => 0,
        };
        let out_len = t.tm * t.tr * t.tc;
        Self {
            req,
            mem,
            input: req.input_shape(),
            output: req.output_shape(),
            in_rows,
            in_cols,
            input_banks: [vec![T::default(); input_bank_len], vec![T::default(); input_bank_len]],
            bias_banks: [vec![T::default(); bias_len], vec![T::default(); bias_len]],
            scratch: vec![T::default(); scratch_len],
            output_banks: [vec![T::Acc::default(); out_len], vec![T::Acc::default(); out_len]],
        }
    }

    /// Reads input element `(ch, row, col)` with signed spatial coordinates,
    /// returning `fill` outside the feature map.
    #[inline]
    fn input_at(&self, ch: usize, row: isize, col: isize, fill: T) -> T {
        if row < 0 || col < 0 || row as usize >= self.input.h || col as usize >= self.input.w {
            return fill;
        }
        self.mem.arena[self.req.input_addr + self.input.offset(ch, row as usize, col as usize)]
    }

    /// Copies a `[channels][in_rows][in_cols]` input window starting at
    /// channel `ch0` for the output tile at (`tile.row`, `tile.col`).
    fn fetch_window(&self, dst: &mut [T], ch0: usize, channels: usize, tile: &TileRef, fill: T) {
        let r0 = (tile.row * self.req.stride) as isize - self.req.padding as isize;
        let c0 = (tile.col * self.req.stride) as isize - self.req.padding as isize;
        let plane = self.in_rows * self.in_cols;
        for t in 0..channels {
            for i in 0..self.in_rows {
                for j in 0..self.in_cols {
                    dst[t * plane + i * self.in_cols + j] =
                        self.input_at(ch0 + t, r0 + i as isize, c0 + j as isize, fill);
                }
            }
        }
    }

    fn compute_conv(&mut self, src: usize, dst: usize, tile: &TileRef) {
        let req = self.req;
        let t = &req.tiles;
        let k = req.ksize;
        let s = req.stride;
        let q = req.q.unwrap_or_default();
        let plane = self.in_rows * self.in_cols;
        let tn = t.tn.max(1);

        let mut out = std::mem::take(&mut self.output_banks[dst]);
        let mut scratch = std::mem::take(&mut self.scratch);
        let weights = &self.input_banks[src];
        let bias = &self.bias_banks[src];

        for o in 0..tile.channels {
            let b = T::bias_acc(bias[o], q.bias, q.product());
            for r in 0..tile.rows {
                for c in 0..tile.cols {
                    out[(o * t.tr + r) * t.tc + c] = b;
                }
            }
        }

        for n in (0..req.ifm).step_by(tn) {
            let tn_min = tn.min(req.ifm - n);
            self.fetch_window(&mut scratch, n, tn_min, tile, T::default());
            for i in 0..k {
                for j in 0..k {
                    for r in 0..tile.rows {
                        for c in 0..tile.cols {
                            let x_base = (r * s + i) * self.in_cols + c * s + j;
                            for o in 0..tile.channels {
                                let w_base = (o * req.ifm + n) * k * k + i * k + j;
                                let mut partial = T::Acc::default();
                                for tt in 0..tn_min {
                                    partial = T::add_acc(
                                        partial,
                                        T::mul_acc(weights[w_base + tt * k * k], scratch[tt * plane + x_base]),
                                    );
                                }
                                let idx = (o * t.tr + r) * t.tc + c;
                                out[idx] = T::add_acc(out[idx], partial);
                            }
                        }
                    }
                }
            }
        }

        self.scratch = scratch;
        self.output_banks[dst] = out;
    }

    fn compute_pool(&mut self, src: usize, dst: usize, tile: &TileRef) {
        let t = &self.req.tiles;
        let k = self.req.ksize;
        let s = self.req.stride;
        let plane = self.in_rows * self.in_cols;
        let input = &self.input_banks[src];
        let out = &mut self.output_banks[dst];
        for o in 0..tile.channels {
            for r in 0..tile.rows {
                for c in 0..tile.cols {
                    let mut best = T::POOL_FLOOR;
                    for i in 0..k {
                        for j in 0..k {
                            let v = input[o * plane + (r * s + i) * self.in_cols + c * s + j];
                            if v > best {
                                best = v;
                            }
                        }
                    }
                    out[(o * t.tr + r) * t.tc + c] = best.widen();
                }
            }
        }
    }
}

impl<T: Element> TileEngine for ReferenceEngine<'_, '_, T> {
    fn load(&mut self, bank: BankId, tile: &TileRef) -> Result<(), DriverError> {
        let b = bank.index();
        match self.req.op() {
            OpKind::Conv => {
                let per_filter = self.req.ifm * self.req.ksize * self.req.ksize;
                let start = self.req.weight_addr + tile.m * per_filter;
                let len = tile.channels * per_filter;
                self.input_banks[b][..len].copy_from_slice(&self.mem.weights[start..start + len]);
                let bstart = self.req.bias_addr + tile.m;
                self.bias_banks[b][..tile.channels]
                    .copy_from_slice(&self.mem.bias[bstart..bstart + tile.channels]);
            }
            OpKind::MaxPool => {
                let mut bank_data = std::mem::take(&mut self.input_banks[b]);
                self.fetch_window(&mut bank_data, tile.m, tile.channels, tile, T::POOL_FLOOR);
                self.input_banks[b] = bank_data;
            }
        }
        Ok(())
    }

    fn compute(&mut self, src: BankId, dst: BankId, tile: &TileRef) -> Result<(), DriverError> {
        match self.req.op() {
            OpKind::Conv => self.compute_conv(src.index(), dst.index(), tile),
            OpKind::MaxPool => self.compute_pool(src.index(), dst.index(), tile),
        }
        Ok(())
    }

    fn write(&mut self, bank: BankId, tile: &TileRef) -> Result<(), DriverError> {
        let t = self.req.tiles;
        let leaky = self.req.activation;
        let shift = match (self.req.op(), self.req.q) {
            (OpKind::Conv, Some(q)) => q.output_shift(),
            _ => 0,
        };
        let out = &self.output_banks[bank.index()];
        for o in 0..tile.channels {
            for r in 0..tile.rows {
                for c in 0..tile.cols {
                    let mut v = out[(o * t.tr + r) * t.tc + c];
                    if leaky {
                        v = T::leaky(v);
                    }
                    let dst = self.req.output_addr
                        + self.output.offset(tile.m + o, tile.row + r, tile.col + c);
                    self.mem.arena[dst] = T::narrow(v, shift);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{tile_params, HwLimits, Operands, QScales};
    use layer_ir::{Activation, LayerDescriptor, NetworkBuilder};
    use std::time::Duration;

    fn single(input: FeatureShape, f: impl FnOnce(NetworkBuilder) -> NetworkBuilder) -> LayerDescriptor {
        f(NetworkBuilder::new("t", input))
            .build()
            .unwrap()
            .validate()
            .unwrap()
            .layers()[0]
            .clone()
    }

    /// Writes a dense `[c][h][w]` tensor into the padded arena layout.
    fn pack(shape: FeatureShape, dense: &[f32], arena: &mut [f32], base: usize) {
        for ch in 0..shape.c {
            for r in 0..shape.h {
                for c in 0..shape.w {
                    arena[base + shape.offset(ch, r, c)] = dense[(ch * shape.h + r) * shape.w + c];
                }
            }
        }
    }

    fn run(desc: &LayerDescriptor, hw: &HwLimits, input: &[f32], weights: &[f32], bias: &[f32]) -> Vec<f32> {
        let in_shape = desc.input_shape();
        let out_shape = desc.output_shape();
        let out_base = in_shape.aligned_len();
        let mut arena = vec![0.0f32; out_base + out_shape.aligned_len()];
        pack(in_shape, input, &mut arena, 0);
        let tiles = tile_params(desc, hw).unwrap();
        let ops = Operands {
            input: 0,
            output: out_base,
            weights: 0,
            bias: 0,
        };
        let req = LayerRequest::from_layer(0, desc, tiles, ops, Duration::from_secs(5)).unwrap();
        let mut mem = DeviceMemory::new(&mut arena, weights, bias);
        ReferenceAccelerator.execute(&req, &mut mem).unwrap();
        let mut dense = Vec::with_capacity(out_shape.dense_len());
        for ch in 0..out_shape.c {
            for r in 0..out_shape.h {
                for c in 0..out_shape.w {
                    dense.push(arena[out_base + out_shape.offset(ch, r, c)]);
                }
            }
        }
        dense
    }

    fn naive_conv(
        input: &[f32],
        shape: FeatureShape,
        weights: &[f32],
        bias: &[f32],
        filters: usize,
        k: usize,
        pad: usize,
    ) -> Vec<f32> {
        let mut out = vec![0.0; filters * shape.h * shape.w];
        for o in 0..filters {
            for r in 0..shape.h {
                for c in 0..shape.w {
                    let mut acc = bias[o];
                    for n in 0..shape.c {
                        for i in 0..k {
                            for j in 0..k {
                                let y = r as isize + i as isize - pad as isize;
                                let x = c as isize + j as isize - pad as isize;
                                if y < 0 || x < 0 || y >= shape.h as isize || x >= shape.w as isize {
                                    continue;
                                }
                                acc += weights[((o * shape.c + n) * k + i) * k + j]
                                    * input[(n * shape.h + y as usize) * shape.w + x as usize];
                            }
                        }
                    }
                    out[(o * shape.h + r) * shape.w + c] = if acc < 0.0 { acc * 0.1 } else { acc };
                }
            }
        }
        out
    }

    fn pattern(len: usize, seed: usize) -> Vec<f32> {
        (0..len)
            .map(|i| (((i * 7 + seed * 13) % 17) as f32 - 8.0) / 8.0)
            .collect()
    }

    #[test]
    fn test_conv_matches_direct_convolution() {
        let shape = FeatureShape::new(5, 9, 10);
        let desc = single(shape, |b| b.conv(6, 3, 1, true, Activation::Leaky, false));
        let input = pattern(shape.dense_len(), 1);
        let weights = pattern(6 * 5 * 9, 2);
        let bias = pattern(6, 3);
        let got = run(&desc, &HwLimits::default(), &input, &weights, &bias);
        let want = naive_conv(&input, shape, &weights, &bias, 6, 3, 1);
        for (g, w) in got.iter().zip(&want) {
            assert!((g - w).abs() < 1e-4, "{g} vs {w}");
        }
    }

    #[test]
    fn test_conv_bit_identical_across_tm() {
        let shape = FeatureShape::new(6, 12, 12);
        let desc = single(shape, |b| b.conv(10, 3, 1, true, Activation::Leaky, false));
        let input = pattern(shape.dense_len(), 4);
        let weights = pattern(10 * 6 * 9, 5);
        let bias = pattern(10, 6);
        let wide = run(&desc, &HwLimits::default(), &input, &weights, &bias);
        let narrow_hw = HwLimits {
            tm: 1,
            tr: 5,
            tc: 7,
            ..HwLimits::default()
        };
        let narrow = run(&desc, &narrow_hw, &input, &weights, &bias);
        assert_eq!(wide, narrow);
    }

    #[test]
    fn test_pool_takes_window_max_with_trailing_pad() {
        let shape = FeatureShape::new(2, 3, 3);
        let desc = single(shape, |b| b.maxpool(2, 2));
        assert_eq!(desc.output_shape(), FeatureShape::new(2, 2, 2));
        let input: Vec<f32> = (0..18).map(|v| v as f32).collect();
        let got = run(&desc, &HwLimits::default(), &input, &[], &[]);
        // channel 0 is 0..9 row-major; bottom/right windows see only real taps
        assert_eq!(&got[..4], &[4.0, 5.0, 7.0, 8.0]);
        assert_eq!(&got[4..], &[13.0, 14.0, 16.0, 17.0]);
    }

    #[test]
    fn test_fixed_point_conv_requantizes() {
        let shape = FeatureShape::new(1, 1, 1);
        let desc = single(shape, |b| b.conv(1, 1, 1, false, Activation::Linear, false));
        let tiles = tile_params(&desc, &HwLimits::default()).unwrap();
        let mut arena = vec![i16::quantize(2.0, 8), 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0];
        let weights = [i16::quantize(0.75, 10)];
        let bias = [i16::quantize(0.5, 6)];
        let ops = Operands {
            input: 0,
            output: 8,
            weights: 0,
            bias: 0,
        };
        let q = QScales {
            weight: 10,
            bias: 6,
            act_in: 8,
            act_out: 7,
        };
        let req = LayerRequest::from_layer(0, &desc, tiles, ops, Duration::from_secs(1))
            .unwrap()
            .with_q(q);
        let mut mem = DeviceMemory::new(&mut arena, &weights, &bias);
        ReferenceAccelerator.execute(&req, &mut mem).unwrap();
        assert_eq!(arena[8].dequantize(7), 2.0);
    }

    #[test]
    fn test_out_of_bounds_weights_rejected() {
        let shape = FeatureShape::new(2, 4, 4);
        let desc = single(shape, |b| b.conv(2, 3, 1, true, Activation::Leaky, false));
        let tiles = tile_params(&desc, &HwLimits::default()).unwrap();
        let mut arena = vec![0.0f32; 256];
        let weights = vec![0.0f32; 35];
        let bias = vec![0.0f32; 2];
        let ops = Operands {
            input: 0,
            output: 64,
            weights: 0,
            bias: 0,
        };
        let req = LayerRequest::from_layer(0, &desc, tiles, ops, Duration::from_secs(1)).unwrap();
        let mut mem = DeviceMemory::new(&mut arena, &weights, &bias);
        let err = ReferenceAccelerator.execute(&req, &mut mem).unwrap_err();
        assert!(matches!(err, DriverError::OutOfBounds { space: "weights", .. }));
    }
}
