// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Fixed-point scale tables.
//!
//! Three tables of little-endian `i32`, indexed by convolution order:
//! weight Q, bias Q and activation Q. Activation entry `k` is the Q of
//! convolution `k`'s input and entry `k + 1` the Q of its output, so the
//! activation table has one more entry than there are convolutions.

use crate::config::QFiles;
use crate::weight_loader::read_le;
use crate::RuntimeError;
use accel_core::QScales;

/// Per-convolution Q exponents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QTables {
    weight: Vec<i32>,
    bias: Vec<i32>,
    activation: Vec<i32>,
}

impl QTables {
    /// Builds tables for `convs` convolutions, checking their lengths.
    pub fn new(
        weight: Vec<i32>,
        bias: Vec<i32>,
        activation: Vec<i32>,
        convs: usize,
    ) -> Result<Self, RuntimeError> {
        let short = |name: &str, have: usize, need: usize| {
            RuntimeError::Config(format!(
                "{name} Q table has {have} entries, network needs {need}"
            ))
        };
        if weight.len() < convs {
            return Err(short("weight", weight.len(), convs));
        }
        if bias.len() < convs {
            return Err(short("bias", bias.len(), convs));
        }
        if activation.len() < convs + 1 {
            return Err(short("activation", activation.len(), convs + 1));
        }
        Ok(Self {
            weight,
            bias,
            activation,
        })
    }

    /// Reads all three tables from disk.
    pub fn load(files: &QFiles, convs: usize) -> Result<Self, RuntimeError> {
        let decode = |b: &[u8]| i32::from_le_bytes([b[0], b[1], b[2], b[3]]);
        let tables = Self::new(
            read_le(&files.weight, 4, decode)?,
            read_le(&files.bias, 4, decode)?,
            read_le(&files.activation, 4, decode)?,
            convs,
        )?;
        tracing::info!(
            "Q tables: {} convolutions, input Q {}",
            convs,
            tables.input_q()
        );
        Ok(tables)
    }

    /// Uniform scales that suit synthetic weights.
    ///
    /// Weights carry 14 fractional bits, bias 12 and activations 9.
    pub fn synthetic(convs: usize) -> Self {
        Self {
            weight: vec![14; convs],
            bias: vec![12; convs],
            activation: vec![9; convs + 1],
        }
    }

    /// Q of the network input.
    pub fn input_q(&self) -> i32 {
        self.activation[0]
    }

    pub fn weight_q(&self, conv: usize) -> Result<i32, RuntimeError> {
        lookup("weight", &self.weight, conv)
    }

    pub fn bias_q(&self, conv: usize) -> Result<i32, RuntimeError> {
        lookup("bias", &self.bias, conv)
    }

    /// Q of convolution `conv`'s output.
    pub fn output_q(&self, conv: usize) -> Result<i32, RuntimeError> {
        lookup("activation", &self.activation, conv + 1)
    }

    /// Scales for convolution `conv` reading an input held at `act_in`.
    pub fn scales(&self, conv: usize, act_in: i32) -> Result<QScales, RuntimeError> {
        Ok(QScales {
            weight: self.weight_q(conv)?,
            bias: self.bias_q(conv)?,
            act_in,
            act_out: self.output_q(conv)?,
        })
    }
}

fn lookup(name: &str, table: &[i32], index: usize) -> Result<i32, RuntimeError> {
    table.get(index).copied().ok_or_else(|| {
        RuntimeError::Config(format!(
            "{name} Q table has no entry {index} ({} entries)",
            table.len()
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_i32(name: &str, values: &[i32]) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(name);
        let bytes: Vec<u8> = values.iter().flat_map(|v| v.to_le_bytes()).collect();
        std::fs::write(&path, bytes).unwrap();
        path
    }

    #[test]
    fn test_scales_follow_activation_chain() {
        let q = QTables::new(vec![15, 14], vec![13, 12], vec![14, 11, 10], 2).unwrap();
        let s = q.scales(1, 11).unwrap();
        assert_eq!(
            s,
            QScales {
                weight: 14,
                bias: 12,
                act_in: 11,
                act_out: 10
            }
        );
        assert_eq!(s.output_shift(), 15);
        assert_eq!(q.input_q(), 14);
    }

    #[test]
    fn test_short_activation_table_rejected() {
        let err = QTables::new(vec![1, 1], vec![1, 1], vec![1, 1], 2).unwrap_err();
        assert!(err.to_string().contains("activation Q table has 2 entries"));
    }

    #[test]
    fn test_load_from_files() {
        let files = QFiles {
            weight: write_i32("accel_sched_wq.bin", &[15, 14]),
            bias: write_i32("accel_sched_bq.bin", &[13, 12]),
            activation: write_i32("accel_sched_aq.bin", &[14, 11, -2]),
        };
        let q = QTables::load(&files, 2).unwrap();
        assert_eq!(q.output_q(1).unwrap(), -2);
        assert!(q.weight_q(2).is_err());
    }
}
