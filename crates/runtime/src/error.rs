// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for the inference runtime.
//!
//! Four classes matter to a caller:
//!
//! | class | variants | retry? |
//! |---|---|---|
//! | configuration fault | `Config`, `Layer`, `Planner`, `Arena` | never |
//! | precondition violation | `Precondition` | never |
//! | driver timeout | `DriverTimeout` | the whole run, at caller discretion |
//! | driver fault | `DriverFault` | never |
//!
//! `Io` covers unreadable input files and is reported with the path.

use accel_core::{DriverError, TileError};
use std::path::PathBuf;
use std::time::Duration;

/// Errors that can occur while loading, planning or running a network.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    /// The network, layout and weight files do not belong together.
    #[error("configuration fault: {0}")]
    Config(String),

    /// A layer's operands fall outside what the accelerator accepts.
    #[error("layer {layer}: precondition violated: {source}")]
    Precondition {
        layer: usize,
        #[source]
        source: TileError,
    },

    /// The accelerator did not finish a tile in time. The run is abandoned.
    #[error("layer {layer}: accelerator timed out after {timeout:?}")]
    DriverTimeout { layer: usize, timeout: Duration },

    /// The accelerator reported a failure.
    #[error("layer {layer}: accelerator fault: {detail}")]
    DriverFault { layer: usize, detail: String },

    /// A file could not be opened or mapped.
    #[error("cannot read '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The layer table or manifest is malformed.
    #[error("layer table error: {0}")]
    Layer(#[from] layer_ir::LayerError),

    /// No arena layout satisfies the table.
    #[error("layout error: {0}")]
    Planner(#[from] layout_planner::PlannerError),

    /// The arena could not be allocated or accessed.
    #[error("arena error: {0}")]
    Arena(#[from] arena::ArenaError),
}

impl RuntimeError {
    /// Only a driver timeout may be worth retrying, and only as a whole run.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::DriverTimeout { .. })
    }

    /// True for every error that points at a mismatched model/config pair.
    pub fn is_config_fault(&self) -> bool {
        matches!(
            self,
            Self::Config(_) | Self::Layer(_) | Self::Planner(_) | Self::Arena(_)
        )
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Classifies a driver error raised while running `layer`.
    pub(crate) fn from_driver(layer: usize, err: DriverError) -> Self {
        match err {
            DriverError::Timeout(timeout) => Self::DriverTimeout { layer, timeout },
            DriverError::Rejected(source) => Self::Precondition { layer, source },
            DriverError::OutOfBounds { .. } => {
                Self::Config(format!("layer {layer}: {err}"))
            }
            DriverError::Fault(detail) => Self::DriverFault { layer, detail },
        }
    }
}
