// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Layer descriptor table: the network as an ordered list of layers.
//!
//! # Type-State Pattern
//!
//! ```text
//! LayerTable<Loaded>     : descriptors built, not yet checked.
//!       │  .validate()
//!       ▼
//! LayerTable<Validated>  : shape chain and route indices verified.
//! ```
//!
//! The layout planner and the executor only accept a validated table.

use crate::{
    Activation, ConvLayer, FeatureShape, LayerDescriptor, LayerError, PoolLayer, ReorgLayer,
    RegionLayer, RouteLayer,
};
use std::fmt;

// ── Type-state markers ─────────────────────────────────────────────

/// Marker: table has been built but not validated.
#[derive(Debug, Clone)]
pub struct Loaded;

/// Marker: table has been validated and is ready for planning.
#[derive(Debug, Clone)]
pub struct Validated;

/// Sealed trait for table states.
pub trait TableState: fmt::Debug + Clone {}
impl TableState for Loaded {}
impl TableState for Validated {}

// ── LayerTable ─────────────────────────────────────────────────────

/// The complete network as an ordered sequence of layer descriptors.
#[derive(Debug, Clone)]
pub struct LayerTable<S: TableState = Loaded> {
    /// Human-readable network name (e.g., `"yolov2"`).
    pub name: String,
    /// Shape of the network input image.
    pub input: FeatureShape,
    layers: Vec<LayerDescriptor>,
    _state: std::marker::PhantomData<S>,
}

impl<S: TableState> LayerTable<S> {
    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    pub fn layers(&self) -> &[LayerDescriptor] {
        &self.layers
    }

    pub fn layer(&self, index: usize) -> Option<&LayerDescriptor> {
        self.layers.get(index)
    }

    /// Indices of the layers whose outputs layer `index` reads.
    ///
    /// An empty list means the layer reads the network input.
    pub fn sources(&self, index: usize) -> Vec<usize> {
        match self.layers.get(index) {
            Some(LayerDescriptor::Route(r)) => r.inputs.clone(),
            Some(_) if index > 0 => vec![index - 1],
            _ => Vec::new(),
        }
    }
}

// ── Loaded state ───────────────────────────────────────────────────

impl LayerTable<Loaded> {
    /// Creates a new table in the `Loaded` state.
    pub fn new(name: String, input: FeatureShape, layers: Vec<LayerDescriptor>) -> Self {
        Self {
            name,
            input,
            layers,
            _state: std::marker::PhantomData,
        }
    }

    /// Validates the table and transitions to the `Validated` state.
    ///
    /// # Checks
    /// - The table is non-empty and the network input is non-degenerate.
    /// - Every non-route layer reads exactly what its predecessor produces.
    /// - Conv/pool/reorg output shapes agree with their shape arithmetic.
    /// - Route inputs point backwards; concatenated inputs share h/w.
    /// - A region layer, if present, is the last layer.
    pub fn validate(self) -> Result<LayerTable<Validated>, LayerError> {
        if self.layers.is_empty() {
            return Err(LayerError::InvalidTable("layer table contains no layers".into()));
        }
        if self.input.is_empty() {
            return Err(LayerError::InvalidTable(format!(
                "network input shape {} has a zero dimension",
                self.input
            )));
        }

        for (i, layer) in self.layers.iter().enumerate() {
            let invalid = |detail: String| LayerError::InvalidLayer {
                index: i,
                kind: layer.kind().as_str(),
                detail,
            };

            if layer.output_shape().is_empty() {
                return Err(invalid(format!(
                    "output shape {} has a zero dimension",
                    layer.output_shape()
                )));
            }

            let expected_input = if i == 0 {
                self.input
            } else {
                self.layers[i - 1].output_shape()
            };

            match layer {
                LayerDescriptor::Conv(l) => {
                    if l.input != expected_input {
                        return Err(invalid(format!(
                            "input {} does not match predecessor output {}",
                            l.input, expected_input
                        )));
                    }
                    if l.size == 0 || l.stride == 0 {
                        return Err(invalid("kernel size and stride must be >= 1".into()));
                    }
                    let oh = ConvLayer::output_extent(l.input.h, l.size, l.stride, l.padding);
                    let ow = ConvLayer::output_extent(l.input.w, l.size, l.stride, l.padding);
                    if oh != Some(l.output.h) || ow != Some(l.output.w) {
                        return Err(invalid(format!(
                            "output {} inconsistent with kernel {}/{} pad {}",
                            l.output, l.size, l.stride, l.padding
                        )));
                    }
                }
                LayerDescriptor::MaxPool(l) => {
                    if l.input != expected_input {
                        return Err(invalid(format!(
                            "input {} does not match predecessor output {}",
                            l.input, expected_input
                        )));
                    }
                    if l.size == 0 || l.stride == 0 {
                        return Err(invalid("window size and stride must be >= 1".into()));
                    }
                    let oh = PoolLayer::output_extent(l.input.h, l.size, l.stride, l.padding);
                    let ow = PoolLayer::output_extent(l.input.w, l.size, l.stride, l.padding);
                    if l.output.c != l.input.c || oh != Some(l.output.h) || ow != Some(l.output.w)
                    {
                        return Err(invalid(format!(
                            "output {} inconsistent with window {}/{}",
                            l.output, l.size, l.stride
                        )));
                    }
                }
                LayerDescriptor::Reorg(l) => {
                    if l.input != expected_input {
                        return Err(invalid(format!(
                            "input {} does not match predecessor output {}",
                            l.input, expected_input
                        )));
                    }
                    let s = l.stride;
                    if s == 0 || l.input.h % s != 0 || l.input.w % s != 0 {
                        return Err(invalid(format!(
                            "input {} not divisible by stride {s}",
                            l.input
                        )));
                    }
                    let want = FeatureShape::new(l.input.c * s * s, l.input.h / s, l.input.w / s);
                    if l.output != want {
                        return Err(invalid(format!("output {} should be {want}", l.output)));
                    }
                }
                LayerDescriptor::Route(r) => {
                    if r.inputs.is_empty() {
                        return Err(invalid("route has no inputs".into()));
                    }
                    if let Some(&bad) = r.inputs.iter().find(|&&src| src >= i) {
                        return Err(invalid(format!("route input {bad} does not precede it")));
                    }
                    if r
                        .inputs
                        .iter()
                        .any(|&src| matches!(self.layers[src], LayerDescriptor::Region(_)))
                    {
                        return Err(invalid("route cannot read a region layer".into()));
                    }
                    let first = self.layers[r.inputs[0]].output_shape();
                    let mut channels = 0;
                    for &src in &r.inputs {
                        let s = self.layers[src].output_shape();
                        if s.h != first.h || s.w != first.w {
                            return Err(invalid(format!(
                                "concatenated inputs disagree on spatial size ({} vs {})",
                                s, first
                            )));
                        }
                        channels += s.c;
                    }
                    let want = FeatureShape::new(channels, first.h, first.w);
                    if r.output != want {
                        return Err(invalid(format!("output {} should be {want}", r.output)));
                    }
                }
                LayerDescriptor::Region(g) => {
                    if i + 1 != self.layers.len() {
                        return Err(invalid("region layer must be the last layer".into()));
                    }
                    if g.input != expected_input {
                        return Err(invalid(format!(
                            "input {} does not match predecessor output {}",
                            g.input, expected_input
                        )));
                    }
                    if g.input.c != g.num * (g.classes + g.coords + 1) {
                        return Err(invalid(format!(
                            "{} channels cannot hold {} anchors of {} classes",
                            g.input.c, g.num, g.classes
                        )));
                    }
                }
            }
        }

        tracing::debug!(
            "validated layer table '{}' ({} layers)",
            self.name,
            self.layers.len()
        );

        Ok(LayerTable {
            name: self.name,
            input: self.input,
            layers: self.layers,
            _state: std::marker::PhantomData,
        })
    }
}

// ── Validated state ────────────────────────────────────────────────

impl LayerTable<Validated> {
    /// Returns an iterator over the layers in execution order.
    pub fn iter_layers(&self) -> impl Iterator<Item = &LayerDescriptor> {
        self.layers.iter()
    }

    /// Convolution layers with their table index, in traversal order.
    pub fn conv_layers(&self) -> impl Iterator<Item = (usize, &ConvLayer)> {
        self.layers.iter().enumerate().filter_map(|(i, l)| match l {
            LayerDescriptor::Conv(c) => Some((i, c)),
            _ => None,
        })
    }

    /// Indices of every layer that reads the output of layer `index`.
    pub fn consumers(&self, index: usize) -> Vec<usize> {
        (index + 1..self.layers.len())
            .filter(|&j| self.sources(j).contains(&index))
            .collect()
    }

    pub fn total_weight_count(&self) -> usize {
        self.layers.iter().map(|l| l.weight_count()).sum()
    }

    pub fn total_bias_count(&self) -> usize {
        self.layers.iter().map(|l| l.bias_count()).sum()
    }

    /// Returns a summary string describing the network.
    pub fn summary(&self) -> String {
        format!(
            "Network '{}': {} layers ({} conv), input {}, {} weights, {} biases",
            self.name,
            self.layers.len(),
            self.conv_layers().count(),
            self.input,
            self.total_weight_count(),
            self.total_bias_count(),
        )
    }
}

// ── Builder ────────────────────────────────────────────────────────

/// Builds a layer table while tracking the running feature-map shape,
/// the same way a darknet cfg is read top to bottom.
///
/// The first error is kept and returned by [`NetworkBuilder::build`].
#[derive(Debug)]
pub struct NetworkBuilder {
    name: String,
    input: FeatureShape,
    layers: Vec<LayerDescriptor>,
    error: Option<LayerError>,
}

impl NetworkBuilder {
    pub fn new(name: impl Into<String>, input: FeatureShape) -> Self {
        Self {
            name: name.into(),
            input,
            layers: Vec::new(),
            error: None,
        }
    }

    fn current(&self) -> FeatureShape {
        self.layers
            .last()
            .map(|l| l.output_shape())
            .unwrap_or(self.input)
    }

    fn fail(&mut self, kind: &'static str, detail: String) {
        if self.error.is_none() {
            self.error = Some(LayerError::InvalidLayer {
                index: self.layers.len(),
                kind,
                detail,
            });
        }
    }

    /// Appends a convolution. `pad` selects "same" padding (`size / 2`).
    pub fn conv(
        mut self,
        filters: usize,
        size: usize,
        stride: usize,
        pad: bool,
        activation: Activation,
        batch_norm: bool,
    ) -> Self {
        let input = self.current();
        let padding = if pad { size / 2 } else { 0 };
        let h = ConvLayer::output_extent(input.h, size, stride, padding);
        let w = ConvLayer::output_extent(input.w, size, stride, padding);
        match (h, w) {
            (Some(h), Some(w)) if filters > 0 => {
                self.layers.push(LayerDescriptor::Conv(ConvLayer {
                    input,
                    output: FeatureShape::new(filters, h, w),
                    size,
                    stride,
                    padding,
                    activation,
                    batch_norm,
                }));
            }
            _ => self.fail(
                "conv",
                format!("{filters} filters {size}x{size}/{stride} cannot apply to {input}"),
            ),
        }
        self
    }

    /// Appends a max pool with darknet's default padding of `size - 1`.
    pub fn maxpool(mut self, size: usize, stride: usize) -> Self {
        let input = self.current();
        let padding = size.saturating_sub(1);
        let h = PoolLayer::output_extent(input.h, size, stride, padding);
        let w = PoolLayer::output_extent(input.w, size, stride, padding);
        match (h, w) {
            (Some(h), Some(w)) if size > 0 => {
                self.layers.push(LayerDescriptor::MaxPool(PoolLayer {
                    input,
                    output: FeatureShape::new(input.c, h, w),
                    size,
                    stride,
                    padding,
                }));
            }
            _ => self.fail(
                "maxpool",
                format!("window {size}/{stride} cannot apply to {input}"),
            ),
        }
        self
    }

    pub fn reorg(mut self, stride: usize) -> Self {
        let input = self.current();
        if stride == 0 || input.h % stride != 0 || input.w % stride != 0 {
            self.fail("reorg", format!("stride {stride} does not divide {input}"));
            return self;
        }
        if (input.h * input.c) % (stride * stride) != 0 {
            self.fail("reorg", format!("{input} does not fold into {} planes", stride * stride));
            return self;
        }
        self.layers.push(LayerDescriptor::Reorg(ReorgLayer {
            input,
            output: FeatureShape::new(input.c * stride * stride, input.h / stride, input.w / stride),
            stride,
        }));
        self
    }

    /// Appends a route. Negative entries are relative to this layer
    /// (`-1` is the previous layer), non-negative entries are absolute.
    pub fn route(mut self, inputs: &[isize]) -> Self {
        let index = self.layers.len() as isize;
        let mut resolved = Vec::with_capacity(inputs.len());
        for &raw in inputs {
            let abs = if raw < 0 { index + raw } else { raw };
            if abs < 0 || abs >= index {
                self.fail("route", format!("input {raw} resolves outside 0..{index}"));
                return self;
            }
            resolved.push(abs as usize);
        }
        if resolved.is_empty() {
            self.fail("route", "route has no inputs".into());
            return self;
        }
        let first = self.layers[resolved[0]].output_shape();
        let channels = resolved
            .iter()
            .map(|&i| self.layers[i].output_shape().c)
            .sum();
        self.layers.push(LayerDescriptor::Route(RouteLayer {
            inputs: resolved,
            output: FeatureShape::new(channels, first.h, first.w),
        }));
        self
    }

    pub fn region(mut self, classes: usize, coords: usize, num: usize) -> Self {
        let input = self.current();
        self.layers.push(LayerDescriptor::Region(RegionLayer {
            input,
            classes,
            coords,
            num,
        }));
        self
    }

    /// Finishes the table. Shape errors recorded while building surface here.
    pub fn build(self) -> Result<LayerTable<Loaded>, LayerError> {
        if let Some(err) = self.error {
            return Err(err);
        }
        Ok(LayerTable::new(self.name, self.input, self.layers))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::LayerKind;

    fn small() -> LayerTable<Validated> {
        NetworkBuilder::new("small", FeatureShape::new(3, 16, 16))
            .conv(8, 3, 1, true, Activation::Leaky, true)
            .maxpool(2, 2)
            .conv(16, 3, 1, true, Activation::Leaky, true)
            .maxpool(2, 2)
            .route(&[-3])
            .reorg(2)
            .route(&[-1, -3])
            .build()
            .unwrap()
            .validate()
            .unwrap()
    }

    #[test]
    fn test_builder_shapes() {
        let t = small();
        assert_eq!(t.len(), 7);
        assert_eq!(t.layers()[0].output_shape(), FeatureShape::new(8, 16, 16));
        assert_eq!(t.layers()[1].output_shape(), FeatureShape::new(8, 8, 8));
        assert_eq!(t.layers()[3].output_shape(), FeatureShape::new(16, 4, 4));
        assert_eq!(t.layers()[4].output_shape(), FeatureShape::new(8, 8, 8));
        assert_eq!(t.layers()[5].output_shape(), FeatureShape::new(32, 4, 4));
    }

    #[test]
    fn test_relative_route_resolution() {
        let t = small();
        match &t.layers()[6] {
            LayerDescriptor::Route(r) => {
                assert_eq!(r.inputs, vec![5, 3]);
                assert_eq!(r.output, FeatureShape::new(48, 4, 4));
            }
            other => panic!("expected route, got {:?}", other.kind()),
        }
    }

    #[test]
    fn test_sources_and_consumers() {
        let t = small();
        assert!(t.sources(0).is_empty());
        assert_eq!(t.sources(2), vec![1]);
        assert_eq!(t.sources(4), vec![1]);
        assert_eq!(t.consumers(1), vec![2, 4]);
        assert_eq!(t.consumers(3), vec![6]);
    }

    #[test]
    fn test_route_mismatched_spatial_rejected() {
        let t = NetworkBuilder::new("bad", FeatureShape::new(3, 16, 16))
            .conv(8, 3, 1, true, Activation::Leaky, false)
            .maxpool(2, 2)
            .route(&[-1, -2])
            .build()
            .unwrap();
        assert!(matches!(
            t.validate(),
            Err(LayerError::InvalidLayer { index: 2, .. })
        ));
    }

    #[test]
    fn test_route_forward_reference_rejected_by_builder() {
        let err = NetworkBuilder::new("bad", FeatureShape::new(3, 8, 8))
            .conv(4, 3, 1, true, Activation::Leaky, false)
            .route(&[3])
            .build()
            .unwrap_err();
        assert!(matches!(err, LayerError::InvalidLayer { kind: "route", .. }));
    }

    #[test]
    fn test_reorg_unfoldable_rejected_by_builder() {
        let err = NetworkBuilder::new("bad", FeatureShape::new(3, 2, 2))
            .conv(1, 3, 1, true, Activation::Leaky, false)
            .reorg(2)
            .build()
            .unwrap_err();
        assert!(matches!(err, LayerError::InvalidLayer { kind: "reorg", .. }));
    }

    #[test]
    fn test_broken_chain_rejected() {
        let conv = |c_in, c_out| {
            LayerDescriptor::Conv(ConvLayer {
                input: FeatureShape::new(c_in, 8, 8),
                output: FeatureShape::new(c_out, 8, 8),
                size: 3,
                stride: 1,
                padding: 1,
                activation: Activation::Leaky,
                batch_norm: false,
            })
        };
        let t = LayerTable::new("chain".into(), FeatureShape::new(3, 8, 8), vec![conv(3, 8), conv(4, 2)]);
        assert!(t.validate().is_err());
    }

    #[test]
    fn test_region_must_be_last() {
        let t = NetworkBuilder::new("r", FeatureShape::new(3, 8, 8))
            .conv(25, 1, 1, false, Activation::Linear, false)
            .region(0, 4, 5)
            .conv(4, 1, 1, false, Activation::Linear, false)
            .build()
            .unwrap();
        assert!(t.validate().is_err());
    }

    #[test]
    fn test_empty_table_rejected() {
        let t = LayerTable::new("empty".into(), FeatureShape::new(3, 8, 8), vec![]);
        assert!(matches!(t.validate(), Err(LayerError::InvalidTable(_))));
    }

    #[test]
    fn test_summary() {
        let t = small();
        let s = t.summary();
        assert!(s.contains("small"));
        assert!(s.contains("7 layers"));
        assert_eq!(t.layers()[6].kind(), LayerKind::Route);
    }
}
