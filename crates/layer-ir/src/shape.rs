// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Feature-map shapes and the padded row layout used in the arena.
//!
//! Activations are stored channel-major, `[c][h][w_align]`, where every row
//! is padded up to [`ROW_ALIGN`] elements. The accelerator's memory port
//! moves whole bursts, so a ragged row would spill into its neighbour.

use std::fmt;

/// Row width alignment in elements.
pub const ROW_ALIGN: usize = 8;

/// Rounds `n` up to the next multiple of [`ROW_ALIGN`].
pub const fn align_row(n: usize) -> usize {
    n.div_ceil(ROW_ALIGN) * ROW_ALIGN
}

/// Channel / height / width of one feature map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct FeatureShape {
    pub c: usize,
    pub h: usize,
    pub w: usize,
}

impl FeatureShape {
    pub const fn new(c: usize, h: usize, w: usize) -> Self {
        Self { c, h, w }
    }

    /// Row width after padding to the burst alignment.
    pub const fn aligned_w(&self) -> usize {
        align_row(self.w)
    }

    /// Distance in elements between two consecutive channels.
    pub const fn channel_stride(&self) -> usize {
        self.h * self.aligned_w()
    }

    /// Elements occupied in the arena (padded rows).
    pub const fn aligned_len(&self) -> usize {
        self.c * self.channel_stride()
    }

    /// Elements of the dense, unpadded representation.
    pub const fn dense_len(&self) -> usize {
        self.c * self.h * self.w
    }

    /// Arena-relative index of `(ch, row, col)` in the padded layout.
    #[inline]
    pub const fn offset(&self, ch: usize, row: usize, col: usize) -> usize {
        ch * self.channel_stride() + row * self.aligned_w() + col
    }

    /// Returns `true` if any dimension is zero.
    pub const fn is_empty(&self) -> bool {
        self.c == 0 || self.h == 0 || self.w == 0
    }
}

impl fmt::Display for FeatureShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}x{}", self.w, self.h, self.c)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_align_row() {
        assert_eq!(align_row(1), 8);
        assert_eq!(align_row(8), 8);
        assert_eq!(align_row(13), 16);
        assert_eq!(align_row(26), 32);
        assert_eq!(align_row(416), 416);
    }

    #[test]
    fn test_aligned_len_pads_rows_only() {
        let s = FeatureShape::new(512, 26, 26);
        assert_eq!(s.aligned_w(), 32);
        assert_eq!(s.aligned_len(), 26 * 32 * 512);
        assert_eq!(s.dense_len(), 26 * 26 * 512);
    }

    #[test]
    fn test_offset() {
        let s = FeatureShape::new(4, 13, 13);
        assert_eq!(s.offset(0, 0, 0), 0);
        assert_eq!(s.offset(0, 1, 0), 16);
        assert_eq!(s.offset(1, 0, 3), 13 * 16 + 3);
    }

    #[test]
    fn test_display() {
        assert_eq!(FeatureShape::new(3, 416, 416).to_string(), "416x416x3");
    }
}
