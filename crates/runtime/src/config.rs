// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Runtime configuration loaded from TOML files or constructed programmatically.
//!
//! # TOML Format
//! ```toml
//! network = "yolov2"            # preset name or path to a JSON manifest
//! precision = "int16"
//! layout = "ping-pong"
//! layer_timeout_ms = 2000
//! synthetic_weights = false
//! enable_profiling = true
//!
//! [weights]
//! weights = "./weights/weights_reorg.bin"
//! bias = "./weights/bias.bin"
//!
//! [weights.q]
//! weight = "./weights/weight_q.bin"
//! bias = "./weights/bias_q.bin"
//! activation = "./weights/act_q.bin"
//!
//! [hw]
//! tm = 32
//! tn = 4
//! ```
//!
//! `ACCEL_LAYER_TIMEOUT_MS` overrides `layer_timeout_ms` when it holds a
//! positive integer.

use crate::RuntimeError;
use accel_core::{HwLimits, Precision};
use layer_ir::{presets, Network, NetworkManifest};
use layout_planner::LayoutStrategy;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable overriding the per-layer driver timeout.
pub const TIMEOUT_ENV: &str = "ACCEL_LAYER_TIMEOUT_MS";

/// Fixed-point scale tables, one little-endian `i32` per entry.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct QFiles {
    /// Weight Q per convolution.
    pub weight: PathBuf,
    /// Bias Q per convolution.
    pub bias: PathBuf,
    /// Activation Q: entry `k` is convolution `k`'s input, `k + 1` its output.
    pub activation: PathBuf,
}

/// Flat weight and bias element files.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct WeightFiles {
    pub weights: PathBuf,
    pub bias: PathBuf,
    /// Required for `int16` precision unless weights are synthetic.
    #[serde(default)]
    pub q: Option<QFiles>,
}

/// Configuration for the inference runtime.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct RuntimeConfig {
    /// Preset name (`"yolov2"`, `"toy"`) or path to a JSON network manifest.
    pub network: String,
    /// Datapath precision: `"fp32"` or `"int16"`.
    #[serde(default = "default_precision")]
    pub precision: String,
    /// Layout strategy name: `"ping-pong"` or `"disjoint"`.
    #[serde(default = "default_layout")]
    pub layout: String,
    /// Bound on waiting for any single tile, in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub layer_timeout_ms: u64,
    /// Generate deterministic weights instead of reading files.
    #[serde(default)]
    pub synthetic_weights: bool,
    /// Whether to record per-layer metrics.
    #[serde(default = "default_true")]
    pub enable_profiling: bool,
    /// Weight files. Ignored when `synthetic_weights` is set.
    #[serde(default)]
    pub weights: Option<WeightFiles>,
    /// Accelerator capacities.
    #[serde(default)]
    pub hw: HwLimits,
}

fn default_precision() -> String {
    "fp32".to_string()
}

fn default_layout() -> String {
    "ping-pong".to_string()
}

fn default_timeout_ms() -> u64 {
    1000
}

fn default_true() -> bool {
    true
}

impl RuntimeConfig {
    /// Loads configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, RuntimeError> {
        let content = std::fs::read_to_string(path).map_err(|e| RuntimeError::io(path, e))?;
        Self::from_toml(&content)
    }

    /// Parses configuration from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self, RuntimeError> {
        toml::from_str(toml_str)
            .map_err(|e| RuntimeError::Config(format!("TOML parse error: {e}")))
    }

    /// Serialises configuration to TOML.
    pub fn to_toml(&self) -> Result<String, RuntimeError> {
        toml::to_string_pretty(self)
            .map_err(|e| RuntimeError::Config(format!("TOML serialise error: {e}")))
    }

    /// A synthetic-weight config for a built-in network.
    pub fn synthetic(network: &str) -> Self {
        Self {
            network: network.to_string(),
            synthetic_weights: true,
            ..Default::default()
        }
    }

    /// Parses the precision string.
    pub fn parse_precision(&self) -> Result<Precision, RuntimeError> {
        Precision::from_str_loose(&self.precision).ok_or_else(|| {
            RuntimeError::Config(format!(
                "unknown precision '{}'; expected 'fp32' or 'int16'",
                self.precision
            ))
        })
    }

    /// The per-layer timeout after applying [`TIMEOUT_ENV`].
    pub fn layer_timeout(&self) -> Duration {
        self.resolve_timeout(std::env::var(TIMEOUT_ENV).ok().as_deref())
    }

    fn resolve_timeout(&self, env: Option<&str>) -> Duration {
        let configured = Duration::from_millis(self.layer_timeout_ms);
        match env.map(|v| v.trim().parse::<u64>()) {
            None => configured,
            Some(Ok(ms)) if ms > 0 => Duration::from_millis(ms),
            Some(_) => {
                tracing::warn!(
                    "ignoring {TIMEOUT_ENV}={:?}: expected a positive integer",
                    env.unwrap_or_default()
                );
                configured
            }
        }
    }

    /// Creates the layout strategy specified by this config.
    pub fn create_strategy(&self) -> Result<Box<dyn LayoutStrategy>, RuntimeError> {
        Ok(layout_planner::strategy::by_name(&self.layout)?)
    }

    /// Resolves `network` to a built-in preset or a manifest on disk.
    pub fn load_network(&self) -> Result<Network, RuntimeError> {
        if let Some(net) = presets::by_name(&self.network) {
            return Ok(net?);
        }
        let path = Path::new(&self.network);
        let json = std::fs::read_to_string(path).map_err(|e| RuntimeError::io(path, e))?;
        Ok(NetworkManifest::from_json(&json)?.into_network()?)
    }

    /// Checks fields that do not need any file access.
    pub fn validate(&self) -> Result<(), RuntimeError> {
        let precision = self.parse_precision()?;
        self.hw.validate().map_err(|e| RuntimeError::Config(e.to_string()))?;
        if self.layer_timeout_ms == 0 {
            return Err(RuntimeError::Config("layer_timeout_ms must be positive".into()));
        }
        if !self.synthetic_weights {
            let files = self.weights.as_ref().ok_or_else(|| {
                RuntimeError::Config("no [weights] table and synthetic_weights is off".into())
            })?;
            if precision.is_fixed_point() && files.q.is_none() {
                return Err(RuntimeError::Config(
                    "int16 precision needs a [weights.q] table".into(),
                ));
            }
        }
        Ok(())
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            network: "yolov2".to_string(),
            weights: None,
            precision: default_precision(),
            layout: default_layout(),
            layer_timeout_ms: default_timeout_ms(),
            hw: HwLimits::default(),
            synthetic_weights: false,
            enable_profiling: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default() {
        let c = RuntimeConfig::default();
        assert_eq!(c.network, "yolov2");
        assert_eq!(c.layout, "ping-pong");
        assert_eq!(c.parse_precision().unwrap(), Precision::Fp32);
        assert!(c.enable_profiling);
    }

    #[test]
    fn test_from_toml() {
        let toml = r#"
network = "toy"
precision = "fixed"
layout = "disjoint"
layer_timeout_ms = 250

[weights]
weights = "/tmp/w.bin"
bias = "/tmp/b.bin"

[weights.q]
weight = "/tmp/wq.bin"
bias = "/tmp/bq.bin"
activation = "/tmp/aq.bin"

[hw]
tm = 8
"#;
        let c = RuntimeConfig::from_toml(toml).unwrap();
        assert_eq!(c.network, "toy");
        assert_eq!(c.parse_precision().unwrap(), Precision::Int16);
        assert_eq!(c.hw.tm, 8);
        assert_eq!(c.hw.tn, 4);
        assert_eq!(c.create_strategy().unwrap().name(), "disjoint");
        let files = c.weights.as_ref().unwrap();
        assert_eq!(files.q.as_ref().unwrap().activation, PathBuf::from("/tmp/aq.bin"));
        c.validate().unwrap();
    }

    #[test]
    fn test_to_toml_roundtrip() {
        let c = RuntimeConfig::synthetic("toy");
        let back = RuntimeConfig::from_toml(&c.to_toml().unwrap()).unwrap();
        assert_eq!(back.network, "toy");
        assert!(back.synthetic_weights);
        assert_eq!(back.hw, c.hw);
    }

    #[test]
    fn test_timeout_env_override() {
        let c = RuntimeConfig::default();
        assert_eq!(c.resolve_timeout(None), Duration::from_millis(1000));
        assert_eq!(c.resolve_timeout(Some("25")), Duration::from_millis(25));
        assert_eq!(c.resolve_timeout(Some("0")), Duration::from_millis(1000));
        assert_eq!(c.resolve_timeout(Some("soon")), Duration::from_millis(1000));
    }

    #[test]
    fn test_validate_rejects_missing_weights() {
        let c = RuntimeConfig::default();
        assert!(matches!(c.validate(), Err(RuntimeError::Config(_))));
        let c = RuntimeConfig {
            precision: "int16".into(),
            weights: Some(WeightFiles {
                weights: "/w".into(),
                bias: "/b".into(),
                q: None,
            }),
            ..Default::default()
        };
        assert!(c.validate().unwrap_err().to_string().contains("weights.q"));
    }

    #[test]
    fn test_unknown_precision_and_layout() {
        let c = RuntimeConfig {
            precision: "bf16".into(),
            layout: "greedy".into(),
            ..Default::default()
        };
        assert!(c.parse_precision().is_err());
        assert!(c.create_strategy().is_err());
    }

    #[test]
    fn test_load_network() {
        assert_eq!(RuntimeConfig::synthetic("toy").load_network().unwrap().table.len(), 3);
        let missing = RuntimeConfig::synthetic("/nonexistent/net.json");
        assert!(matches!(missing.load_network(), Err(RuntimeError::Io { .. })));
    }
}
