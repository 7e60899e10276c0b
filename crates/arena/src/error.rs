// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for arena sizing and access.

/// Errors raised by [`crate::Arena`] and [`crate::ArenaBudget`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ArenaError {
    /// An access falls partly or wholly outside the allocation.
    #[error("span [{offset}, {end}) outside arena of {total} elements")]
    OutOfBounds {
        offset: usize,
        end: usize,
        total: usize,
    },

    /// A span reaches into a guard margin.
    #[error("span [{offset}, {end}) crosses guard margin (usable [{lo}, {hi}))")]
    GuardViolation {
        offset: usize,
        end: usize,
        lo: usize,
        hi: usize,
    },

    /// The usable length is zero.
    #[error("arena length must be non-zero")]
    ZeroSized,

    /// A budget string could not be parsed.
    #[error("invalid arena budget '{0}': expected a number with optional K or M suffix")]
    InvalidBudget(String),
}
