// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! JSON network manifest parsing.
//!
//! The manifest is the scheduler's view of an externally parsed network
//! configuration: the input shape, the layer list in darknet terms, and the
//! model layout constants.
//!
//! # Format
//! ```json
//! {
//!   "name": "toy",
//!   "input": { "c": 3, "h": 16, "w": 16 },
//!   "layers": [
//!     { "type": "convolutional", "filters": 8, "size": 3, "stride": 1, "pad": true },
//!     { "type": "maxpool", "size": 2, "stride": 2 },
//!     { "type": "route", "layers": [-1, -2] }
//!   ],
//!   "layout": { "arena_len": 2816, "weight_offsets": [216], "bias_offsets": [8] }
//! }
//! ```

use crate::{Activation, FeatureShape, LayerError, ModelLayout, Network, NetworkBuilder};
use std::path::Path;

fn default_stride() -> usize {
    1
}

/// A single layer entry in the manifest.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ManifestLayer {
    #[serde(alias = "convolutional")]
    Conv {
        filters: usize,
        size: usize,
        #[serde(default = "default_stride")]
        stride: usize,
        #[serde(default)]
        pad: bool,
        #[serde(default)]
        activation: Activation,
        #[serde(default, alias = "batch_normalize")]
        batch_norm: bool,
    },
    #[serde(alias = "max", alias = "max_pool")]
    Maxpool {
        size: usize,
        #[serde(default = "default_stride")]
        stride: usize,
    },
    Reorg {
        #[serde(default = "default_stride")]
        stride: usize,
    },
    Route { layers: Vec<isize> },
    Region {
        classes: usize,
        coords: usize,
        num: usize,
    },
}

/// Top-level network manifest, deserialized from JSON.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct NetworkManifest {
    pub name: String,
    pub input: FeatureShape,
    pub layers: Vec<ManifestLayer>,
    pub layout: ModelLayout,
}

impl NetworkManifest {
    /// Loads a manifest from a JSON file path.
    pub fn from_file(path: &Path) -> Result<Self, LayerError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Parses a manifest from a JSON string.
    pub fn from_json(json: &str) -> Result<Self, LayerError> {
        let manifest: Self = serde_json::from_str(json)?;
        Ok(manifest)
    }

    /// Resolves shapes and route indices, validates the table and pairs
    /// it with the layout.
    pub fn into_network(self) -> Result<Network, LayerError> {
        let mut builder = NetworkBuilder::new(self.name, self.input);
        for layer in self.layers {
            builder = match layer {
                ManifestLayer::Conv {
                    filters,
                    size,
                    stride,
                    pad,
                    activation,
                    batch_norm,
                } => builder.conv(filters, size, stride, pad, activation, batch_norm),
                ManifestLayer::Maxpool { size, stride } => builder.maxpool(size, stride),
                ManifestLayer::Reorg { stride } => builder.reorg(stride),
                ManifestLayer::Route { layers } => builder.route(&layers),
                ManifestLayer::Region {
                    classes,
                    coords,
                    num,
                } => builder.region(classes, coords, num),
            };
        }
        let table = builder.build()?.validate()?;
        Ok(Network {
            table,
            layout: self.layout,
        })
    }
}
