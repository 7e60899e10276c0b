// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Layer descriptors.
//!
//! A [`LayerDescriptor`] is a tagged variant over the five layer kinds the
//! scheduler understands. Each variant carries only the fields that kind
//! actually uses; shapes are resolved once, at table construction.

use crate::FeatureShape;

/// The kind of a layer, without its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayerKind {
    Conv,
    MaxPool,
    Reorg,
    Route,
    Region,
}

impl LayerKind {
    /// Parses a layer kind from a manifest or darknet section name.
    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "conv" | "convolutional" | "convolution" => Some(Self::Conv),
            "maxpool" | "max_pool" | "max" | "pool" => Some(Self::MaxPool),
            "reorg" | "space_to_depth" => Some(Self::Reorg),
            "route" | "concat" => Some(Self::Route),
            "region" | "detection" => Some(Self::Region),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Conv => "conv",
            Self::MaxPool => "maxpool",
            Self::Reorg => "reorg",
            Self::Route => "route",
            Self::Region => "region",
        }
    }

    /// Layers executed by the accelerator (everything else runs on the CPU).
    pub fn is_accelerated(&self) -> bool {
        matches!(self, Self::Conv | Self::MaxPool)
    }
}

impl std::fmt::Display for LayerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Nonlinearity applied when a convolution's result is written back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Activation {
    Linear,
    /// Leaky ReLU with slope 0.1.
    #[default]
    Leaky,
}

impl Activation {
    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "linear" | "none" | "identity" => Some(Self::Linear),
            "leaky" | "leaky_relu" | "lrelu" => Some(Self::Leaky),
            _ => None,
        }
    }
}

/// Convolution with square kernel.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ConvLayer {
    pub input: FeatureShape,
    pub output: FeatureShape,
    pub size: usize,
    pub stride: usize,
    /// Leading zero padding on each spatial edge.
    pub padding: usize,
    pub activation: Activation,
    /// Batch-norm flag as declared by the network. Scales are expected to
    /// be folded into the weight and bias files.
    pub batch_norm: bool,
}

impl ConvLayer {
    pub fn filters(&self) -> usize {
        self.output.c
    }

    /// Weight elements consumed by this layer, `[ofm][ifm][k][k]`.
    pub fn weight_count(&self) -> usize {
        self.output.c * self.input.c * self.size * self.size
    }

    pub fn bias_count(&self) -> usize {
        self.output.c
    }

    /// Output edge length for one spatial dimension.
    pub fn output_extent(input: usize, size: usize, stride: usize, padding: usize) -> Option<usize> {
        let padded = input + 2 * padding;
        if stride == 0 || padded < size {
            return None;
        }
        Some((padded - size) / stride + 1)
    }
}

/// Max pooling. Channel count is preserved.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PoolLayer {
    pub input: FeatureShape,
    pub output: FeatureShape,
    pub size: usize,
    pub stride: usize,
    /// Total extra rows/cols covered by windows. Only `padding / 2` of it
    /// sits before the first input element; the rest trails.
    pub padding: usize,
}

impl PoolLayer {
    pub fn leading_padding(&self) -> usize {
        self.padding / 2
    }

    pub fn output_extent(input: usize, size: usize, stride: usize, padding: usize) -> Option<usize> {
        let padded = input + padding;
        if stride == 0 || padded < size {
            return None;
        }
        Some((padded - size) / stride + 1)
    }
}

/// Space-to-depth reorganisation.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ReorgLayer {
    pub input: FeatureShape,
    pub output: FeatureShape,
    pub stride: usize,
}

/// Alias (one input) or channel concatenation (several inputs) of earlier layers.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct RouteLayer {
    /// Absolute indices of the source layers, in concatenation order.
    pub inputs: Vec<usize>,
    pub output: FeatureShape,
}

impl RouteLayer {
    pub fn is_concat(&self) -> bool {
        self.inputs.len() > 1
    }
}

/// Terminal detection layer. Its input is handed to post-processing.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct RegionLayer {
    pub input: FeatureShape,
    pub classes: usize,
    pub coords: usize,
    pub num: usize,
}

/// One entry of the layer descriptor table.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LayerDescriptor {
    Conv(ConvLayer),
    MaxPool(PoolLayer),
    Reorg(ReorgLayer),
    Route(RouteLayer),
    Region(RegionLayer),
}

impl LayerDescriptor {
    pub fn kind(&self) -> LayerKind {
        match self {
            Self::Conv(_) => LayerKind::Conv,
            Self::MaxPool(_) => LayerKind::MaxPool,
            Self::Reorg(_) => LayerKind::Reorg,
            Self::Route(_) => LayerKind::Route,
            Self::Region(_) => LayerKind::Region,
        }
    }

    /// Shape of the data this layer reads. For a route this is its
    /// (concatenated) output, which is what a consumer sees.
    pub fn input_shape(&self) -> FeatureShape {
        match self {
            Self::Conv(l) => l.input,
            Self::MaxPool(l) => l.input,
            Self::Reorg(l) => l.input,
            Self::Route(l) => l.output,
            Self::Region(l) => l.input,
        }
    }

    /// Shape of the data this layer produces. A region layer produces its
    /// input unchanged (dense, after extraction).
    pub fn output_shape(&self) -> FeatureShape {
        match self {
            Self::Conv(l) => l.output,
            Self::MaxPool(l) => l.output,
            Self::Reorg(l) => l.output,
            Self::Route(l) => l.output,
            Self::Region(l) => l.input,
        }
    }

    /// Weight elements consumed from the weight table (zero for non-conv).
    pub fn weight_count(&self) -> usize {
        match self {
            Self::Conv(l) => l.weight_count(),
            _ => 0,
        }
    }

    /// Bias elements consumed from the bias table (zero for non-conv).
    pub fn bias_count(&self) -> usize {
        match self {
            Self::Conv(l) => l.bias_count(),
            _ => 0,
        }
    }

    /// Returns a one-line human-readable summary.
    pub fn summary(&self) -> String {
        match self {
            Self::Conv(l) => format!(
                "conv    {:>4} {}x{}/{} {:>12} -> {:>12}",
                l.output.c, l.size, l.size, l.stride, l.input, l.output
            ),
            Self::MaxPool(l) => format!(
                "max          {}x{}/{} {:>12} -> {:>12}",
                l.size, l.size, l.stride, l.input, l.output
            ),
            Self::Reorg(l) => format!(
                "reorg           /{} {:>12} -> {:>12}",
                l.stride, l.input, l.output
            ),
            Self::Route(l) => {
                let inputs: Vec<String> = l.inputs.iter().map(|i| i.to_string()).collect();
                format!("route   {:<24} -> {:>12}", inputs.join(" "), l.output)
            }
            Self::Region(l) => format!(
                "region  classes={} coords={} num={} {:>12}",
                l.classes, l.coords, l.num, l.input
            ),
        }
    }
}
