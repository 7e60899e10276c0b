// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Liveness and sizing shared by all strategies.

use layer_ir::{LayerDescriptor, LayerKind, LayerTable, ModelLayout, Validated};

/// Last layer index at which each layer's output is read.
///
/// Routes are treated as pass-through: whoever reads a route also reads
/// the route's inputs. A layer nobody reads is live only at its own index.
pub fn last_uses(table: &LayerTable<Validated>) -> Vec<usize> {
    let n = table.len();
    let mut last: Vec<usize> = (0..n).collect();
    for i in (0..n).rev() {
        for j in table.consumers(i) {
            let through = match table.layers()[j] {
                LayerDescriptor::Route(_) => last[j],
                _ => j,
            };
            last[i] = last[i].max(through);
        }
    }
    last
}

/// A layer whose output must outlive the next layer.
pub fn is_held(last: &[usize], index: usize) -> bool {
    last[index] > index + 1
}

/// Elements reserved for layer `index`'s output region.
///
/// The layer feeding a REGION layer also carries the detection scratch.
pub fn output_len(table: &LayerTable<Validated>, layout: &ModelLayout, index: usize) -> usize {
    let shape = table.layers()[index].output_shape();
    let feeds_region = table
        .consumers(index)
        .iter()
        .any(|&j| table.layers()[j].kind() == LayerKind::Region);
    if feeds_region {
        shape
            .aligned_len()
            .max(shape.dense_len() + layout.detection_workspace)
    } else {
        shape.aligned_len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use layer_ir::presets;

    #[test]
    fn test_chain_lives_one_step() {
        let net = presets::toy().unwrap();
        let last = last_uses(&net.table);
        assert_eq!(last, vec![1, 2, 2]);
        assert!(!(0..3).any(|i| is_held(&last, i)));
    }

    #[test]
    fn test_yolov2_held_layers() {
        let net = presets::yolov2().unwrap();
        let last = last_uses(&net.table);
        // 16 is read through route 25 by layer 26
        assert_eq!(last[16], 26);
        // 24 and 27 are read through route 28 by layer 29
        assert_eq!(last[24], 29);
        assert_eq!(last[27], 29);
        let held: Vec<usize> = (0..net.table.len()).filter(|&i| is_held(&last, i)).collect();
        assert_eq!(held, vec![16, 24, 27]);
    }

    #[test]
    fn test_detection_output_len() {
        let net = presets::yolov2().unwrap();
        assert_eq!(output_len(&net.table, &net.layout, 30), 88400);
        assert_eq!(output_len(&net.table, &net.layout, 29), 1024 * 13 * 16);
    }
}
