// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Per-network memory constants.
//!
//! [`ModelLayout`] is the static half of a model configuration: how large
//! the arena is, which long-lived regions the network needs, and how the
//! flat weight/bias files are sliced per convolution.

use crate::{ConvLayer, LayerError, LayerTable, Validated};

/// Default boundary slack on each end of the arena, in elements.
pub const DEFAULT_GUARD_MARGIN: usize = 512;

fn default_guard_margin() -> usize {
    DEFAULT_GUARD_MARGIN
}

/// A named long-lived region the planner is expected to carve out.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ReservedRegion {
    /// Label used in logs and plan dumps (e.g. `"route_hold"`).
    pub name: String,
    /// Layer whose output occupies the region.
    pub layer: usize,
    /// Size in elements.
    pub len: usize,
}

/// Arena geometry and weight slicing for one network.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ModelLayout {
    /// Usable arena length in elements, excluding both guard margins.
    pub arena_len: usize,
    /// Slack kept free before and after the usable arena.
    #[serde(default = "default_guard_margin")]
    pub guard_margin: usize,
    /// Scratch appended to the final compute layer's raw output for the
    /// downstream decoder.
    #[serde(default)]
    pub detection_workspace: usize,
    /// Standing reservations the plan must reproduce exactly. Empty means
    /// "accept whatever the planner derives".
    #[serde(default)]
    pub reserved: Vec<ReservedRegion>,
    /// Weight elements per convolution, in traversal order.
    pub weight_offsets: Vec<usize>,
    /// Bias elements per convolution, in traversal order.
    pub bias_offsets: Vec<usize>,
}

impl ModelLayout {
    /// Derives a layout whose offset tables match `table` exactly.
    pub fn for_table(table: &LayerTable<Validated>, arena_len: usize) -> Self {
        Self {
            arena_len,
            guard_margin: DEFAULT_GUARD_MARGIN,
            detection_workspace: 0,
            reserved: Vec::new(),
            weight_offsets: table.conv_layers().map(|(_, c)| c.weight_count()).collect(),
            bias_offsets: table.conv_layers().map(|(_, c)| c.bias_count()).collect(),
        }
    }

    /// Total arena allocation including both guard margins.
    pub fn total_len(&self) -> usize {
        self.arena_len + 2 * self.guard_margin
    }

    pub fn weight_total(&self) -> usize {
        self.weight_offsets.iter().sum()
    }

    pub fn bias_total(&self) -> usize {
        self.bias_offsets.iter().sum()
    }

    pub fn reservation_for(&self, layer: usize) -> Option<&ReservedRegion> {
        self.reserved.iter().find(|r| r.layer == layer)
    }

    /// Checks the offset tables against the convolutions of `table`.
    ///
    /// Entry `k` must equal the element count of the `k`-th convolution.
    /// Entries past the last convolution must be zero.
    pub fn check_offsets(&self, table: &LayerTable<Validated>) -> Result<(), LayerError> {
        if self.arena_len == 0 {
            return Err(LayerError::LayoutMismatch("arena length is zero".into()));
        }
        let convs: Vec<(usize, &ConvLayer)> = table.conv_layers().collect();
        let tables: [(&str, &[usize], fn(&ConvLayer) -> usize); 2] = [
            ("weight", &self.weight_offsets, ConvLayer::weight_count),
            ("bias", &self.bias_offsets, ConvLayer::bias_count),
        ];

        for (name, offsets, count) in tables {
            if offsets.len() < convs.len() {
                return Err(LayerError::LayoutMismatch(format!(
                    "{name} offset table has {} entries for {} convolutions",
                    offsets.len(),
                    convs.len()
                )));
            }
            for (k, &(layer, conv)) in convs.iter().enumerate() {
                let expected = count(conv);
                if offsets[k] != expected {
                    return Err(LayerError::LayoutMismatch(format!(
                        "{name} offset {k} is {} but layer {layer} consumes {expected}",
                        offsets[k]
                    )));
                }
            }
            if let Some(extra) = offsets[convs.len()..].iter().position(|&v| v != 0) {
                return Err(LayerError::LayoutMismatch(format!(
                    "{name} offset {} is non-zero but there are only {} convolutions",
                    convs.len() + extra,
                    convs.len()
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Activation, FeatureShape, NetworkBuilder};

    fn table() -> LayerTable<Validated> {
        NetworkBuilder::new("t", FeatureShape::new(3, 8, 8))
            .conv(4, 3, 1, true, Activation::Leaky, false)
            .maxpool(2, 2)
            .conv(2, 1, 1, false, Activation::Linear, false)
            .build()
            .unwrap()
            .validate()
            .unwrap()
    }

    #[test]
    fn test_for_table_matches() {
        let t = table();
        let layout = ModelLayout::for_table(&t, 1024);
        assert_eq!(layout.weight_offsets, vec![108, 8]);
        assert_eq!(layout.bias_offsets, vec![4, 2]);
        assert_eq!(layout.weight_total(), 116);
        assert_eq!(layout.total_len(), 1024 + 2 * DEFAULT_GUARD_MARGIN);
        layout.check_offsets(&t).unwrap();
    }

    #[test]
    fn test_trailing_zero_entries_accepted() {
        let t = table();
        let mut layout = ModelLayout::for_table(&t, 1024);
        layout.weight_offsets.extend([0, 0, 0]);
        layout.bias_offsets.push(0);
        layout.check_offsets(&t).unwrap();
    }

    #[test]
    fn test_wrong_entry_rejected() {
        let t = table();
        let mut layout = ModelLayout::for_table(&t, 1024);
        layout.weight_offsets[1] -= 1;
        assert!(matches!(
            layout.check_offsets(&t),
            Err(LayerError::LayoutMismatch(_))
        ));
    }

    #[test]
    fn test_short_table_rejected() {
        let t = table();
        let mut layout = ModelLayout::for_table(&t, 1024);
        layout.bias_offsets.pop();
        assert!(layout.check_offsets(&t).is_err());
    }

    #[test]
    fn test_serde_defaults() {
        let json = r#"{"arena_len": 4096, "weight_offsets": [108, 8], "bias_offsets": [4, 2]}"#;
        let layout: ModelLayout = serde_json::from_str(json).unwrap();
        assert_eq!(layout.guard_margin, DEFAULT_GUARD_MARGIN);
        assert_eq!(layout.detection_workspace, 0);
        assert!(layout.reserved.is_empty());
    }
}
