// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for layer tables, manifests and model layouts.

/// Errors that can occur when building or loading a network description.
#[derive(Debug, thiserror::Error)]
pub enum LayerError {
    /// The network manifest file could not be read.
    #[error("failed to read manifest: {0}")]
    ManifestReadError(#[from] std::io::Error),

    /// The manifest JSON is malformed.
    #[error("failed to parse manifest: {0}")]
    ManifestParseError(#[from] serde_json::Error),

    /// A layer descriptor is inconsistent (shape arithmetic, bad route index, ...).
    #[error("invalid layer {index} ({kind}): {detail}")]
    InvalidLayer {
        index: usize,
        kind: &'static str,
        detail: String,
    },

    /// The table as a whole is malformed.
    #[error("invalid layer table: {0}")]
    InvalidTable(String),

    /// The model layout does not agree with the layer table.
    #[error("model layout mismatch: {0}")]
    LayoutMismatch(String),
}
