// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Fixed on-chip capacities of the accelerator.

use crate::{LayerRequest, TileError};

/// Capacities baked into the accelerator bitstream.
///
/// `tm`/`tn` are the output/input channel tile widths, `tr`/`tc` the output
/// row/column tile sizes. The input buffer must hold one tile's receptive
/// field: `(tr - 1) * max_stride + max_kernel` rows by default.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct HwLimits {
    pub tm: usize,
    pub tn: usize,
    pub tr: usize,
    pub tc: usize,
    pub max_kernel: usize,
    pub max_stride: usize,
    pub input_buffer_rows: usize,
    pub input_buffer_cols: usize,
    pub max_channels: usize,
    pub max_extent: usize,
    pub max_padding: usize,
}

impl Default for HwLimits {
    fn default() -> Self {
        Self {
            tm: 32,
            tn: 4,
            tr: 26,
            tc: 26,
            max_kernel: 3,
            max_stride: 2,
            input_buffer_rows: (26 - 1) * 2 + 3,
            input_buffer_cols: (26 - 1) * 2 + 3,
            max_channels: 2048,
            max_extent: 1024,
            max_padding: 4,
        }
    }
}

fn in_range(name: &'static str, value: usize, min: usize, max: usize) -> Result<(), TileError> {
    if value < min || value > max {
        return Err(TileError::OutOfRange {
            name,
            value,
            min,
            max,
        });
    }
    Ok(())
}

impl HwLimits {
    /// Same capacities with the output-channel tile capped at `tm`.
    pub fn with_max_tm(mut self, tm: usize) -> Self {
        self.tm = tm;
        self
    }

    /// Checks the description is self-consistent.
    pub fn validate(&self) -> Result<(), TileError> {
        let fields = [
            ("tm", self.tm),
            ("tn", self.tn),
            ("tr", self.tr),
            ("tc", self.tc),
            ("max_kernel", self.max_kernel),
            ("max_stride", self.max_stride),
            ("max_channels", self.max_channels),
            ("max_extent", self.max_extent),
        ];
        if let Some((name, _)) = fields.iter().find(|(_, v)| *v == 0) {
            return Err(TileError::InvalidLimits(format!("{name} must be non-zero")));
        }
        if self.input_buffer_rows < self.max_kernel || self.input_buffer_cols < self.max_kernel {
            return Err(TileError::InvalidLimits(format!(
                "input buffer {}x{} smaller than kernel {}",
                self.input_buffer_rows, self.input_buffer_cols, self.max_kernel
            )));
        }
        Ok(())
    }

    /// Rejects a request the hardware could not execute.
    ///
    /// Run before every dispatch so a bad layer fails before any tile is
    /// written.
    pub fn check(&self, req: &LayerRequest) -> Result<(), TileError> {
        let t = &req.tiles;
        in_range("OFM", req.ofm, 1, self.max_channels)?;
        in_range("IFM", req.ifm, 1, self.max_channels)?;
        in_range("ksize", req.ksize, 1, self.max_kernel)?;
        in_range("stride", req.stride, 1, self.max_stride)?;
        in_range("in_w", req.in_w, 1, self.max_extent)?;
        in_range("in_h", req.in_h, 1, self.max_extent)?;
        in_range("out_w", req.out_w, 1, self.max_extent)?;
        in_range("out_h", req.out_h, 1, self.max_extent)?;
        in_range("padding", req.padding, 0, self.max_padding)?;
        in_range("TM", t.tm, 1, self.tm)?;
        in_range("TN", t.tn, 0, self.tn)?;
        in_range("TR", t.tr, 1, self.tr)?;
        in_range("TC", t.tc, 1, self.tc)?;

        let rows = (t.tr - 1) * req.stride + req.ksize;
        let cols = (t.tc - 1) * req.stride + req.ksize;
        if rows > self.input_buffer_rows || cols > self.input_buffer_cols {
            return Err(TileError::InputTileOverflow {
                rows,
                cols,
                max_rows: self.input_buffer_rows,
                max_cols: self.input_buffer_cols,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_buffer_holds_stride2_tile() {
        let hw = HwLimits::default();
        assert_eq!(hw.input_buffer_rows, 53);
        hw.validate().unwrap();
    }

    #[test]
    fn test_zero_field_rejected() {
        let hw = HwLimits {
            tn: 0,
            ..HwLimits::default()
        };
        assert!(matches!(hw.validate(), Err(TileError::InvalidLimits(_))));
    }

    #[test]
    fn test_with_max_tm() {
        assert_eq!(HwLimits::default().with_max_tm(1).tm, 1);
    }

    #[test]
    fn test_partial_toml_style_defaults() {
        let hw: HwLimits = serde_json::from_str(r#"{"tm": 16}"#).unwrap();
        assert_eq!(hw.tm, 16);
        assert_eq!(hw.tn, 4);
    }
}
