// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Weight and bias loading from flat little-endian element files.
//!
//! [`WeightStore`] provides two modes:
//!
//! 1. **File-backed**: memory-maps the weight and bias files and decodes
//!    them into the session's element type. Lengths are checked against the
//!    model's offset tables before anything is dispatched.
//! 2. **Synthetic**: generates a deterministic pattern with the right
//!    element counts, for testing and benchmarking without model files.

use crate::config::WeightFiles;
use crate::quant::QTables;
use crate::RuntimeError;
use accel_core::Element;
use layer_ir::{LayerTable, ModelLayout, Validated};
use std::path::Path;

/// Read-only weight and bias tables for one session.
///
/// Convolution `k` reads its weights starting at the sum of the first `k`
/// weight offsets, in `[ofm][ifm][k][k]` order.
///
/// Fixed-point stores also carry the [`QTables`] their values were
/// quantized with.
pub struct WeightStore<T> {
    weights: Vec<T>,
    bias: Vec<T>,
    q: Option<QTables>,
    source: String,
}

impl<T: Element> WeightStore<T> {
    /// Loads both files and checks them against `layout`.
    ///
    /// Fails with a configuration fault when the offset tables disagree with
    /// the network's convolutions or when either file's element count differs
    /// from its table's sum. Fixed-point element types also read the Q
    /// tables, which are then required.
    pub fn load(
        files: &WeightFiles,
        table: &LayerTable<Validated>,
        layout: &ModelLayout,
    ) -> Result<Self, RuntimeError> {
        layout
            .check_offsets(table)
            .map_err(|e| RuntimeError::Config(e.to_string()))?;

        let width = T::PRECISION.size_bytes();
        let weights = read_le(&files.weights, width, T::from_le_slice)?;
        let bias = read_le(&files.bias, width, T::from_le_slice)?;
        check_total("weight", &files.weights, weights.len(), layout.weight_total())?;
        check_total("bias", &files.bias, bias.len(), layout.bias_total())?;

        let q = if T::PRECISION.is_fixed_point() {
            let q_files = files.q.as_ref().ok_or_else(|| {
                RuntimeError::Config(format!("{} weights need Q tables", T::PRECISION))
            })?;
            Some(QTables::load(q_files, table.conv_layers().count())?)
        } else {
            None
        };

        tracing::info!(
            "weight store: {} weights from '{}', {} bias from '{}' ({})",
            weights.len(),
            files.weights.display(),
            bias.len(),
            files.bias.display(),
            T::PRECISION,
        );
        Ok(Self {
            weights,
            bias,
            q,
            source: files.weights.display().to_string(),
        })
    }

    /// Generates deterministic weights sized by `layout`'s offset tables.
    ///
    /// Weights of a convolution with fan-in `n` are spread over
    /// `±sqrt(6 / n)` so activations keep roughly unit scale through deep
    /// networks. Fixed-point values use [`QTables::synthetic`].
    pub fn synthetic(
        table: &LayerTable<Validated>,
        layout: &ModelLayout,
    ) -> Result<Self, RuntimeError> {
        layout
            .check_offsets(table)
            .map_err(|e| RuntimeError::Config(e.to_string()))?;
        let convs = table.conv_layers().count();
        let q = T::PRECISION
            .is_fixed_point()
            .then(|| QTables::synthetic(convs));

        let mut weights = Vec::with_capacity(layout.weight_total());
        let mut bias = Vec::with_capacity(layout.bias_total());
        for (k, (_, conv)) in table.conv_layers().enumerate() {
            let fan_in = (conv.input.c * conv.size * conv.size).max(1);
            let amplitude = (6.0 / fan_in as f32).sqrt();
            let (qw, qb) = match &q {
                Some(t) => (t.weight_q(k)?, t.bias_q(k)?),
                None => (0, 0),
            };
            let seed = 0x5EED_0000 + k as u64;
            weights.extend(
                (0..conv.weight_count())
                    .map(|j| T::quantize(amplitude * unit_noise(seed, j), qw)),
            );
            bias.extend(
                (0..conv.bias_count()).map(|j| T::quantize(0.1 * unit_noise(!seed, j), qb)),
            );
        }

        tracing::info!(
            "weight store: {} synthetic weights, {} bias ({})",
            weights.len(),
            bias.len(),
            T::PRECISION,
        );
        Ok(Self {
            weights,
            bias,
            q,
            source: "<synthetic>".to_string(),
        })
    }

    /// Wraps tables that are already in memory.
    pub fn from_vecs(weights: Vec<T>, bias: Vec<T>) -> Self {
        Self {
            weights,
            bias,
            q: None,
            source: "<memory>".to_string(),
        }
    }

    pub fn with_q(mut self, q: QTables) -> Self {
        self.q = Some(q);
        self
    }

    /// Checks the table lengths against `layout`, and that fixed-point
    /// stores have scales.
    pub fn check(&self, layout: &ModelLayout) -> Result<(), RuntimeError> {
        let mismatch = |name: &str, found: usize, expected: usize| {
            RuntimeError::Config(format!(
                "{name} table holds {found} elements but the offset table sums to {expected}"
            ))
        };
        if self.weights.len() != layout.weight_total() {
            return Err(mismatch("weight", self.weights.len(), layout.weight_total()));
        }
        if self.bias.len() != layout.bias_total() {
            return Err(mismatch("bias", self.bias.len(), layout.bias_total()));
        }
        if T::PRECISION.is_fixed_point() && self.q.is_none() {
            return Err(RuntimeError::Config(format!(
                "{} weights need Q tables",
                T::PRECISION
            )));
        }
        Ok(())
    }
}

impl<T> WeightStore<T> {
    pub fn weights(&self) -> &[T] {
        &self.weights
    }

    pub fn bias(&self) -> &[T] {
        &self.bias
    }

    pub fn q(&self) -> Option<&QTables> {
        self.q.as_ref()
    }

    /// Where the tables came from, for logs.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Returns `true` if the tables were generated rather than read.
    pub fn is_synthetic(&self) -> bool {
        self.source == "<synthetic>"
    }
}

impl<T> std::fmt::Debug for WeightStore<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WeightStore")
            .field("source", &self.source)
            .field("weights", &self.weights.len())
            .field("bias", &self.bias.len())
            .field("fixed_point", &self.q.is_some())
            .finish()
    }
}

// ── File helpers ─────────────────────────────────────────────

/// Memory-maps `path` and decodes it in `width`-byte little-endian chunks.
pub(crate) fn read_le<V>(
    path: &Path,
    width: usize,
    decode: impl Fn(&[u8]) -> V,
) -> Result<Vec<V>, RuntimeError> {
    let file = std::fs::File::open(path).map_err(|e| RuntimeError::io(path, e))?;
    let len = file.metadata().map_err(|e| RuntimeError::io(path, e))?.len() as usize;
    if len % width != 0 {
        return Err(RuntimeError::Config(format!(
            "'{}' is {len} bytes, not a whole number of {width}-byte elements",
            path.display()
        )));
    }
    if len == 0 {
        return Ok(Vec::new());
    }
    // SAFETY: the mapping is read-only and fully copied out before it drops.
    let mmap = unsafe { memmap2::Mmap::map(&file) }.map_err(|e| RuntimeError::io(path, e))?;
    tracing::debug!(
        "mmap'd {} ({:.2} MB)",
        path.display(),
        mmap.len() as f64 / (1024.0 * 1024.0)
    );
    Ok(mmap.chunks_exact(width).map(decode).collect())
}

fn check_total(name: &str, path: &Path, found: usize, expected: usize) -> Result<(), RuntimeError> {
    if found != expected {
        return Err(RuntimeError::Config(format!(
            "{name} file '{}' holds {found} elements but the offset table sums to {expected}",
            path.display()
        )));
    }
    Ok(())
}

/// Deterministic value in `[-1, 1)` for `(seed, index)`.
fn unit_noise(seed: u64, index: usize) -> f32 {
    let mut z = seed ^ (index as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^= z >> 31;
    (z >> 40) as f32 / (1u64 << 23) as f32 - 1.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use layer_ir::presets;
    use std::path::PathBuf;

    fn write_f32(name: &str, values: &[f32]) -> PathBuf {
        let path = std::env::temp_dir().join(name);
        let bytes: Vec<u8> = values.iter().flat_map(|v| v.to_le_bytes()).collect();
        std::fs::write(&path, bytes).unwrap();
        path
    }

    fn toy_files(tag: &str, extra_weight: usize) -> WeightFiles {
        let net = presets::toy().unwrap();
        let w = vec![0.5f32; net.layout.weight_total() + extra_weight];
        let b = vec![0.25f32; net.layout.bias_total()];
        WeightFiles {
            weights: write_f32(&format!("accel_sched_{tag}_w.bin"), &w),
            bias: write_f32(&format!("accel_sched_{tag}_b.bin"), &b),
            q: None,
        }
    }

    #[test]
    fn test_load_toy_files() {
        let net = presets::toy().unwrap();
        let files = toy_files("load", 0);
        let store = WeightStore::<f32>::load(&files, &net.table, &net.layout).unwrap();
        assert_eq!(store.weights().len(), 216 + 288);
        assert_eq!(store.bias().len(), 8 + 4);
        assert_eq!(store.weights()[0], 0.5);
        assert!(!store.is_synthetic());
    }

    #[test]
    fn test_file_longer_than_offsets_rejected() {
        let net = presets::toy().unwrap();
        let files = toy_files("long", 1);
        let err = WeightStore::<f32>::load(&files, &net.table, &net.layout).unwrap_err();
        assert!(matches!(err, RuntimeError::Config(_)));
        assert!(err.to_string().contains("sums to 504"));
    }

    #[test]
    fn test_fixed_point_load_needs_q_files() {
        let net = presets::toy().unwrap();
        let dir = std::env::temp_dir();
        let files = WeightFiles {
            weights: dir.join("accel_sched_noq_w.bin"),
            bias: dir.join("accel_sched_noq_b.bin"),
            q: None,
        };
        std::fs::write(&files.weights, vec![0u8; 504 * 2]).unwrap();
        std::fs::write(&files.bias, vec![0u8; 12 * 2]).unwrap();
        let err = WeightStore::<i16>::load(&files, &net.table, &net.layout).unwrap_err();
        assert!(err.to_string().contains("Q tables"));
    }

    #[test]
    fn test_check_against_layout() {
        let net = presets::toy().unwrap();
        let short = WeightStore::from_vecs(vec![0.0f32; 503], vec![0.0; 12]);
        assert!(short.check(&net.layout).unwrap_err().to_string().contains("503"));
        let fixed = WeightStore::from_vecs(vec![0i16; 504], vec![0; 12]);
        assert!(fixed.check(&net.layout).is_err());
        fixed.with_q(QTables::synthetic(2)).check(&net.layout).unwrap();
    }

    #[test]
    fn test_ragged_file_rejected() {
        let path = std::env::temp_dir().join("accel_sched_ragged.bin");
        std::fs::write(&path, [0u8; 6]).unwrap();
        let err = read_le(&path, 4, |b| b[0]).unwrap_err();
        assert!(err.is_config_fault());
    }

    #[test]
    fn test_missing_file_reports_path() {
        let net = presets::toy().unwrap();
        let files = WeightFiles {
            weights: PathBuf::from("/nonexistent/accel/weights.bin"),
            bias: PathBuf::from("/nonexistent/accel/bias.bin"),
            q: None,
        };
        match WeightStore::<f32>::load(&files, &net.table, &net.layout) {
            Err(RuntimeError::Io { path, .. }) => {
                assert_eq!(path, PathBuf::from("/nonexistent/accel/weights.bin"))
            }
            other => panic!("expected Io, got {other:?}"),
        }
    }

    #[test]
    fn test_synthetic_is_deterministic() {
        let net = presets::toy().unwrap();
        let a = WeightStore::<f32>::synthetic(&net.table, &net.layout).unwrap();
        let b = WeightStore::<f32>::synthetic(&net.table, &net.layout).unwrap();
        assert_eq!(a.weights(), b.weights());
        assert_eq!(a.weights().len(), net.layout.weight_total());
        assert!(a.is_synthetic());
        assert!(a.q().is_none());
        a.check(&net.layout).unwrap();
        // Fan-in 27 bounds the first conv's weights.
        let bound = (6.0f32 / 27.0).sqrt();
        assert!(a.weights()[..216].iter().all(|w| w.abs() <= bound));
        assert!(a.weights()[..216].iter().any(|w| *w != 0.0));
    }

    #[test]
    fn test_synthetic_fixed_point() {
        let net = presets::toy().unwrap();
        let store = WeightStore::<i16>::synthetic(&net.table, &net.layout).unwrap();
        assert_eq!(store.bias().len(), 12);
        assert_eq!(store.q().unwrap().output_q(1).unwrap(), 9);
        assert!(store.weights().iter().any(|w| *w != 0));
    }

    #[test]
    fn test_unit_noise_range() {
        for i in 0..1000 {
            let v = unit_noise(7, i);
            assert!((-1.0..1.0).contains(&v));
        }
    }
}
