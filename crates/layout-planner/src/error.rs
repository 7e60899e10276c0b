// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for the layout planner.
//!
//! Every variant is a configuration fault: the layer table and the model
//! layout do not belong together.

/// Errors that can occur during layout planning or plan validation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlannerError {
    /// The layer table has no layers.
    #[error("cannot plan an empty layer table")]
    EmptyTable,

    /// A layer's region does not fit between the live regions around it.
    #[error("arena overflow at layer {layer}: needs {needed} elements, {available} free")]
    ArenaOverflow {
        layer: usize,
        needed: usize,
        available: usize,
    },

    /// The derived standing reservations differ from the declared ones.
    #[error("reservation mismatch: {0}")]
    ReservationMismatch(String),

    /// A finished plan breaks one of its invariants.
    #[error("strategy '{strategy}' produced an invalid plan: {detail}")]
    InvalidPlan { strategy: String, detail: String },

    /// No strategy is registered under this name.
    #[error("unknown layout strategy '{0}' (expected ping-pong or disjoint)")]
    UnknownStrategy(String),
}
