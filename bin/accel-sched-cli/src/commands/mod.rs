// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Subcommand implementations and the arguments they share.

pub mod bench;
pub mod plan;
pub mod run;
pub mod tiles;

use anyhow::{bail, Context};
use layer_ir::FeatureShape;
use runtime::{QFiles, RuntimeConfig, WeightFiles};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

/// Installs the global subscriber. `RUST_LOG` wins over `-v` when set.
pub fn init_tracing(verbosity: u8) {
    let level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

/// Network, weight and layout selection shared by every subcommand.
#[derive(clap::Args, Debug, Clone)]
pub struct NetworkArgs {
    /// Built-in network (yolov2, toy) or path to a JSON manifest.
    #[arg(short = 'N', long, default_value = "toy")]
    pub network: String,

    /// Datapath precision: fp32, int16.
    #[arg(short, long, default_value = "fp32")]
    pub precision: String,

    /// Arena layout strategy: ping-pong, disjoint.
    #[arg(short, long, default_value = "ping-pong")]
    pub layout: String,

    /// Weight file (little-endian, precision-sized elements).
    #[arg(long, requires = "bias")]
    pub weights: Option<PathBuf>,

    /// Bias file (little-endian, precision-sized elements).
    #[arg(long, requires = "weights")]
    pub bias: Option<PathBuf>,

    /// Weight Q table (little-endian i32 per conv).
    #[arg(long)]
    pub q_weight: Option<PathBuf>,

    /// Bias Q table (little-endian i32 per conv).
    #[arg(long)]
    pub q_bias: Option<PathBuf>,

    /// Activation Q table (little-endian i32, one more entry than convs).
    #[arg(long)]
    pub q_activation: Option<PathBuf>,

    /// Cap on the output-channel tile.
    #[arg(long)]
    pub tm: Option<usize>,

    /// Per-layer driver timeout in milliseconds.
    #[arg(long)]
    pub timeout_ms: Option<u64>,
}

impl NetworkArgs {
    /// Builds the runtime config, from `config_path` when given.
    pub fn resolve(&self, config_path: Option<&Path>) -> anyhow::Result<RuntimeConfig> {
        if let Some(path) = config_path {
            return RuntimeConfig::from_file(path)
                .with_context(|| format!("failed to load config '{}'", path.display()));
        }

        let mut config = RuntimeConfig {
            network: self.network.clone(),
            precision: self.precision.clone(),
            layout: self.layout.clone(),
            ..RuntimeConfig::default()
        };
        if let Some(tm) = self.tm {
            config.hw = config.hw.with_max_tm(tm);
        }
        if let Some(ms) = self.timeout_ms {
            config.layer_timeout_ms = ms;
        }

        match (&self.weights, &self.bias) {
            (Some(weights), Some(bias)) => {
                config.weights = Some(WeightFiles {
                    weights: weights.clone(),
                    bias: bias.clone(),
                    q: self.q_files()?,
                });
            }
            _ => config.synthetic_weights = true,
        }
        Ok(config)
    }

    fn q_files(&self) -> anyhow::Result<Option<QFiles>> {
        match (&self.q_weight, &self.q_bias, &self.q_activation) {
            (None, None, None) => Ok(None),
            (Some(weight), Some(bias), Some(activation)) => Ok(Some(QFiles {
                weight: weight.clone(),
                bias: bias.clone(),
                activation: activation.clone(),
            })),
            _ => bail!("--q-weight, --q-bias and --q-activation must be given together"),
        }
    }
}

/// Reads a dense little-endian f32 input, or builds a ramp when no file is given.
pub fn load_input(path: Option<&Path>, shape: FeatureShape) -> anyhow::Result<Vec<f32>> {
    let Some(path) = path else {
        return Ok((0..shape.dense_len())
            .map(|i| (i % 251) as f32 / 251.0)
            .collect());
    };
    let bytes = std::fs::read(path)
        .with_context(|| format!("failed to read input '{}'", path.display()))?;
    if bytes.len() % 4 != 0 {
        bail!(
            "input '{}' is {} bytes, not a whole number of f32 values",
            path.display(),
            bytes.len()
        );
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect())
}

/// Truncates a string with ellipsis.
pub fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{head}...")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args() -> NetworkArgs {
        NetworkArgs {
            network: "toy".into(),
            precision: "int16".into(),
            layout: "disjoint".into(),
            weights: None,
            bias: None,
            q_weight: None,
            q_bias: None,
            q_activation: None,
            tm: Some(4),
            timeout_ms: Some(250),
        }
    }

    #[test]
    fn test_resolve_without_weights_is_synthetic() {
        let config = args().resolve(None).unwrap();
        assert!(config.synthetic_weights);
        assert!(config.weights.is_none());
        assert_eq!(config.hw.tm, 4);
        assert_eq!(config.layer_timeout_ms, 250);
        assert_eq!(config.layout, "disjoint");
    }

    #[test]
    fn test_resolve_partial_q_rejected() {
        let mut a = args();
        a.weights = Some("w.bin".into());
        a.bias = Some("b.bin".into());
        a.q_weight = Some("qw.bin".into());
        assert!(a.resolve(None).is_err());
    }

    #[test]
    fn test_ramp_input_matches_shape() {
        let input = load_input(None, FeatureShape::new(3, 16, 16)).unwrap();
        assert_eq!(input.len(), 3 * 16 * 16);
        assert!(input.iter().all(|v| (0.0..1.0).contains(v)));
    }
}
