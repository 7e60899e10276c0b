// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Host-side layer transforms.
//!
//! Reorg, concatenating routes and output extraction never reach the
//! accelerator. They work on arena spans in the padded row layout of
//! [`FeatureShape`].

use crate::RuntimeError;
use accel_core::Element;
use arena::{Arena, Span};
use layer_ir::{FeatureShape, ReorgLayer};

/// Copies the valid columns of a padded map into a dense `[c][h][w]` buffer.
pub fn strip<T: Copy>(padded: &[T], shape: FeatureShape) -> Vec<T> {
    let aligned_w = shape.aligned_w();
    let mut dense = Vec::with_capacity(shape.dense_len());
    for row in padded.chunks_exact(aligned_w).take(shape.c * shape.h) {
        dense.extend_from_slice(&row[..shape.w]);
    }
    dense
}

/// Writes a dense map into padded rows. Padding columns are left as they are.
pub fn repad<T: Copy>(dense: &[T], shape: FeatureShape, padded: &mut [T]) {
    let aligned_w = shape.aligned_w();
    for (src, dst) in dense
        .chunks_exact(shape.w)
        .zip(padded.chunks_exact_mut(aligned_w))
    {
        dst[..shape.w].copy_from_slice(src);
    }
}

/// Space-to-depth over a dense `[c][h][w]` map, as the detector's
/// passthrough branch expects it.
///
/// The map is viewed as `stride²` planes of `w` by `h·c/stride²` and each
/// plane gathers one `stride x stride` phase of that view. This is darknet
/// `reorg_cpu(x, w, h·c/stride², stride², stride)`, not a per-channel
/// space-to-depth. `input.h * input.c` must be a multiple of `stride²`.
pub fn space_to_depth<T: Copy>(dense: &[T], input: FeatureShape, stride: usize) -> Vec<T> {
    let planes = stride * stride;
    let w = input.w;
    let h = input.h * input.c / planes;
    let mut out = Vec::with_capacity(w * h * planes);
    for k in 0..planes {
        let (dx, dy) = (k % stride, k / stride);
        for j in 0..h {
            let row = (j * stride + dy) * w * stride;
            for i in 0..w {
                out.push(dense[row + i * stride + dx]);
            }
        }
    }
    out
}

/// Runs a reorg layer from `input` into `output`.
pub fn reorg<T: Element>(
    arena: &mut Arena<T>,
    layer: &ReorgLayer,
    input: Span,
    output: Span,
) -> Result<(), RuntimeError> {
    let (shape, stride) = (layer.input, layer.stride);
    if stride == 0 || (shape.h * shape.c) % (stride * stride) != 0 {
        return Err(RuntimeError::Config(format!(
            "reorg /{stride} cannot fold {shape} into {} planes",
            stride * stride
        )));
    }
    let dense = strip(arena.span(input)?, shape);
    let shuffled = space_to_depth(&dense, shape, stride);
    repad(&shuffled, layer.output, arena.span_mut(output)?);
    Ok(())
}

/// Copies `inputs` back-to-back into `output`, in order.
pub fn concat<T: Element>(
    arena: &mut Arena<T>,
    inputs: &[Span],
    output: Span,
) -> Result<(), RuntimeError> {
    let total: usize = inputs.iter().map(|s| s.len).sum();
    if total != output.len {
        return Err(RuntimeError::Config(format!(
            "concat of {} elements into a {}-element region {output}",
            total, output.len
        )));
    }
    let mut dst = output.offset;
    for span in inputs {
        arena.copy_within(*span, dst)?;
        dst += span.len;
    }
    Ok(())
}

/// Rescales every element of `span` down by `shift` fractional bits.
pub fn shift_down<T: Element>(
    arena: &mut Arena<T>,
    span: Span,
    shift: i32,
) -> Result<(), RuntimeError> {
    if shift == 0 {
        return Ok(());
    }
    for v in arena.span_mut(span)? {
        *v = v.shift_down(shift);
    }
    Ok(())
}

/// Reads a padded map out of the arena as dense `f32`, dequantized at `q`.
pub fn extract<T: Element>(
    arena: &Arena<T>,
    span: Span,
    shape: FeatureShape,
    q: i32,
) -> Result<Vec<f32>, RuntimeError> {
    let padded = arena.span(span)?;
    if padded.len() < shape.aligned_len() {
        return Err(RuntimeError::Config(format!(
            "output region {span} is smaller than {shape} ({} elements)",
            shape.aligned_len()
        )));
    }
    Ok(strip(padded, shape)
        .into_iter()
        .map(|v| v.dequantize(q))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use arena::ArenaBudget;

    #[test]
    fn test_strip_and_repad() {
        // 2 channels of 2x3, rows padded to 8.
        let shape = FeatureShape::new(2, 2, 3);
        let mut padded = vec![-1i16; shape.aligned_len()];
        let dense: Vec<i16> = (0..12).collect();
        repad(&dense, shape, &mut padded);
        assert_eq!(&padded[..8], &[0, 1, 2, -1, -1, -1, -1, -1]);
        assert_eq!(&padded[24..27], &[9, 10, 11]);
        assert_eq!(strip(&padded, shape), dense);
    }

    /// Darknet's `reorg_cpu(x, w, h, c, stride, forward = 0)`, loop for loop.
    fn darknet_reorg(x: &[u32], w: usize, h: usize, c: usize, stride: usize) -> Vec<u32> {
        let out_c = c / (stride * stride);
        let mut out = vec![0; x.len()];
        for k in 0..c {
            for j in 0..h {
                for i in 0..w {
                    let in_index = i + w * (j + h * k);
                    let c2 = k % out_c;
                    let offset = k / out_c;
                    let w2 = i * stride + offset % stride;
                    let h2 = j * stride + offset / stride;
                    out[in_index] = x[w2 + w * stride * (h2 + h * stride * c2)];
                }
            }
        }
        out
    }

    #[test]
    fn test_space_to_depth_phases() {
        // One 4x4 channel: each plane takes one phase of two rows at a time.
        let input: Vec<u32> = (0..16).collect();
        let out = space_to_depth(&input, FeatureShape::new(1, 4, 4), 2);
        assert_eq!(
            out,
            vec![0, 2, 4, 6, 1, 3, 5, 7, 8, 10, 12, 14, 9, 11, 13, 15]
        );
    }

    #[test]
    fn test_space_to_depth_yolov2_passthrough() {
        // 64x26x26 conv output folded as w=26, h=26*64/4, c=4.
        let shape = FeatureShape::new(64, 26, 26);
        let input: Vec<u32> = (0..shape.dense_len() as u32).collect();
        let out = space_to_depth(&input, shape, 2);
        assert_eq!(&out[13..16], &[26, 28, 30]);
        assert_eq!(out, darknet_reorg(&input, 26, 26 * 64 / 4, 4, 2));
        assert_eq!(out.len(), FeatureShape::new(256, 13, 13).dense_len());
    }

    #[test]
    fn test_space_to_depth_small_map_matches_darknet() {
        let shape = FeatureShape::new(6, 4, 2);
        let input: Vec<u32> = (0..shape.dense_len() as u32).collect();
        let out = space_to_depth(&input, shape, 2);
        assert_eq!(out, darknet_reorg(&input, 2, 4 * 6 / 4, 4, 2));
    }

    #[test]
    fn test_reorg_rejects_unfoldable_map() {
        let mut arena = Arena::<f32>::new(ArenaBudget::new(256).with_guard(8)).unwrap();
        let layer = ReorgLayer {
            input: FeatureShape::new(1, 2, 2),
            output: FeatureShape::new(4, 1, 1),
            stride: 2,
        };
        let err = reorg(&mut arena, &layer, Span::new(8, 16), Span::new(40, 32)).unwrap_err();
        assert!(err.is_config_fault());
    }

    #[test]
    fn test_concat_and_shift() {
        let mut arena = Arena::<i16>::new(ArenaBudget::new(64).with_guard(8)).unwrap();
        arena.span_mut(Span::new(8, 4)).unwrap().copy_from_slice(&[4, 8, 12, 16]);
        arena.span_mut(Span::new(20, 2)).unwrap().copy_from_slice(&[-8, 32]);

        let out = Span::new(40, 6);
        concat(&mut arena, &[Span::new(8, 4), Span::new(20, 2)], out).unwrap();
        shift_down(&mut arena, out.slice(0, 4), 2).unwrap();
        assert_eq!(arena.span(out).unwrap(), &[1, 2, 3, 4, -8, 32]);
        assert_eq!(arena.stats().copies, 2);
        assert!(arena.guards_intact());

        let err = concat(&mut arena, &[Span::new(8, 4)], out).unwrap_err();
        assert!(err.is_config_fault());
    }

    #[test]
    fn test_extract_dequantizes() {
        let shape = FeatureShape::new(1, 2, 2);
        let mut arena = Arena::<i16>::new(ArenaBudget::new(32).with_guard(4)).unwrap();
        let span = Span::new(4, shape.aligned_len());
        repad(&[256, -128, 64, 0], shape, arena.span_mut(span).unwrap());
        let values = extract(&arena, span, shape, 8).unwrap();
        assert_eq!(values, vec![1.0, -0.5, 0.25, 0.0]);
    }
}
