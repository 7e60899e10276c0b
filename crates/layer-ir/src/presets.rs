// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Built-in networks.
//!
//! - [`yolov2`]: the 32-layer YOLOv2 detector (416x416 input, 80 classes)
//!   with its fixed arena and offset tables.
//! - [`toy`]: a 3-layer conv/pool/conv network whose arena is exactly the
//!   sum of its layers' aligned outputs.

use crate::{
    Activation, FeatureShape, LayerError, LayerTable, ModelLayout, NetworkBuilder, ReservedRegion,
    Validated, DEFAULT_GUARD_MARGIN,
};

/// A validated layer table paired with its layout constants.
#[derive(Debug, Clone)]
pub struct Network {
    pub table: LayerTable<Validated>,
    pub layout: ModelLayout,
}

/// Names accepted by [`by_name`].
pub const PRESET_NAMES: &[&str] = &["yolov2", "toy"];

/// Looks up a built-in network by name.
pub fn by_name(name: &str) -> Option<Result<Network, LayerError>> {
    match name.to_lowercase().as_str() {
        "yolov2" | "yolov2-416" | "yolo2" => Some(yolov2()),
        "toy" | "toy3" => Some(toy()),
        _ => None,
    }
}

pub const YOLOV2_ARENA_LEN: usize = 416 * 416 * 32 + 208 * 208 * 32;
pub const YOLOV2_ROUTE_HOLD: usize = 26 * 32 * 512;
pub const YOLOV2_CONV24_LEN: usize = 13 * 16 * 1024;
pub const YOLOV2_CONV27_LEN: usize = 13 * 16 * 256;
pub const YOLOV2_DETECTION_WORKSPACE: usize = 3 * 13 * 425;

pub const YOLOV2_WEIGHT_OFFSETS: [usize; 32] = [
    864, 18432, 73728, 8192, 73728, 294912, 32768, 294912, 1179648, 131072, 1179648, 131072,
    1179648, 4718592, 524288, 4718592, 524288, 4718592, 9437184, 9437184, 32768, 11796480, 435200,
    0, 0, 0, 0, 0, 0, 0, 0, 0,
];

pub const YOLOV2_BIAS_OFFSETS: [usize; 32] = [
    32, 64, 128, 64, 128, 256, 128, 256, 512, 256, 512, 256, 512, 1024, 512, 1024, 512, 1024,
    1024, 1024, 64, 1024, 425, 0, 0, 0, 0, 0, 0, 0, 0, 0,
];

/// YOLOv2, 416x416x3 input, 80 classes, 5 anchors.
pub fn yolov2() -> Result<Network, LayerError> {
    use Activation::{Leaky, Linear};

    let table = NetworkBuilder::new("yolov2", FeatureShape::new(3, 416, 416))
        .conv(32, 3, 1, true, Leaky, true) // 0
        .maxpool(2, 2)
        .conv(64, 3, 1, true, Leaky, true)
        .maxpool(2, 2)
        .conv(128, 3, 1, true, Leaky, true)
        .conv(64, 1, 1, true, Leaky, true) // 5
        .conv(128, 3, 1, true, Leaky, true)
        .maxpool(2, 2)
        .conv(256, 3, 1, true, Leaky, true)
        .conv(128, 1, 1, true, Leaky, true)
        .conv(256, 3, 1, true, Leaky, true) // 10
        .maxpool(2, 2)
        .conv(512, 3, 1, true, Leaky, true)
        .conv(256, 1, 1, true, Leaky, true)
        .conv(512, 3, 1, true, Leaky, true)
        .conv(256, 1, 1, true, Leaky, true) // 15
        .conv(512, 3, 1, true, Leaky, true)
        .maxpool(2, 2)
        .conv(1024, 3, 1, true, Leaky, true)
        .conv(512, 1, 1, true, Leaky, true)
        .conv(1024, 3, 1, true, Leaky, true) // 20
        .conv(512, 1, 1, true, Leaky, true)
        .conv(1024, 3, 1, true, Leaky, true)
        .conv(1024, 3, 1, true, Leaky, true)
        .conv(1024, 3, 1, true, Leaky, true)
        .route(&[-9]) // 25
        .conv(64, 1, 1, true, Leaky, true)
        .reorg(2)
        .route(&[-1, -4])
        .conv(1024, 3, 1, true, Leaky, true)
        .conv(425, 1, 1, true, Linear, false) // 30
        .region(80, 4, 5)
        .build()?
        .validate()?;

    let layout = ModelLayout {
        arena_len: YOLOV2_ARENA_LEN,
        guard_margin: DEFAULT_GUARD_MARGIN,
        detection_workspace: YOLOV2_DETECTION_WORKSPACE,
        reserved: vec![
            ReservedRegion {
                name: "route_hold".into(),
                layer: 16,
                len: YOLOV2_ROUTE_HOLD,
            },
            ReservedRegion {
                name: "conv24".into(),
                layer: 24,
                len: YOLOV2_CONV24_LEN,
            },
            ReservedRegion {
                name: "conv27".into(),
                layer: 27,
                len: YOLOV2_CONV27_LEN,
            },
        ],
        weight_offsets: YOLOV2_WEIGHT_OFFSETS.to_vec(),
        bias_offsets: YOLOV2_BIAS_OFFSETS.to_vec(),
    };

    Ok(Network { table, layout })
}

/// CONV 3->8, MAXPOOL 8, CONV 8->4 on a 16x16 image.
pub fn toy() -> Result<Network, LayerError> {
    let table = NetworkBuilder::new("toy", FeatureShape::new(3, 16, 16))
        .conv(8, 3, 1, true, Activation::Leaky, true)
        .maxpool(2, 2)
        .conv(4, 3, 1, true, Activation::Leaky, true)
        .build()?
        .validate()?;
    let arena_len = table
        .iter_layers()
        .map(|l| l.output_shape().aligned_len())
        .sum();
    let layout = ModelLayout::for_table(&table, arena_len);
    Ok(Network { table, layout })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{LayerDescriptor, LayerKind};

    #[test]
    fn test_yolov2_shapes() {
        let net = yolov2().unwrap();
        let t = &net.table;
        assert_eq!(t.len(), 32);
        assert_eq!(t.layers()[16].output_shape(), FeatureShape::new(512, 26, 26));
        assert_eq!(t.layers()[24].output_shape(), FeatureShape::new(1024, 13, 13));
        assert_eq!(t.layers()[27].output_shape(), FeatureShape::new(256, 13, 13));
        assert_eq!(t.layers()[28].output_shape(), FeatureShape::new(1280, 13, 13));
        assert_eq!(t.layers()[30].output_shape(), FeatureShape::new(425, 13, 13));
        assert_eq!(t.layers()[31].kind(), LayerKind::Region);
        match &t.layers()[25] {
            LayerDescriptor::Route(r) => assert_eq!(r.inputs, vec![16]),
            other => panic!("layer 25 is {:?}", other.kind()),
        }
        match &t.layers()[28] {
            LayerDescriptor::Route(r) => assert_eq!(r.inputs, vec![27, 24]),
            other => panic!("layer 28 is {:?}", other.kind()),
        }
    }

    #[test]
    fn test_yolov2_offsets_consistent() {
        let net = yolov2().unwrap();
        net.layout.check_offsets(&net.table).unwrap();
        assert_eq!(net.layout.weight_total(), net.table.total_weight_count());
        assert_eq!(net.layout.bias_total(), net.table.total_bias_count());
    }

    #[test]
    fn test_yolov2_reservations_match_shapes() {
        let net = yolov2().unwrap();
        for r in &net.layout.reserved {
            assert_eq!(net.table.layers()[r.layer].output_shape().aligned_len(), r.len);
        }
        assert_eq!(YOLOV2_ARENA_LEN, 6_922_240);
    }

    #[test]
    fn test_toy_arena_is_sum_of_outputs() {
        let net = toy().unwrap();
        assert_eq!(net.layout.arena_len, 2048 + 512 + 256);
        assert_eq!(net.layout.weight_offsets, vec![216, 288]);
    }

    #[test]
    fn test_by_name() {
        assert!(by_name("YOLOv2").is_some());
        assert!(by_name("toy").is_some());
        assert!(by_name("resnet").is_none());
    }
}
