// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Arena sizing.
//!
//! An [`ArenaBudget`] is the usable arena length plus the guard margin kept
//! free on each end. All sizes are in elements, not bytes: the same budget
//! describes an `f32` and an `i16` arena.

use crate::ArenaError;
use layer_ir::{ModelLayout, DEFAULT_GUARD_MARGIN};
use std::fmt;

/// Usable arena length and guard margin, in elements.
///
/// # Parsing
/// - `"6922240"` → 6 922 240 elements
/// - `"64K"` → 64 × 1024 elements
/// - `"7M"` → 7 × 1024² elements
///
/// # Examples
/// ```
/// use arena::ArenaBudget;
///
/// let b = ArenaBudget::parse("64K").unwrap();
/// assert_eq!(b.len(), 65536);
/// assert_eq!(b.total_len(), 65536 + 2 * 512);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ArenaBudget {
    len: usize,
    guard: usize,
}

impl ArenaBudget {
    /// A budget of `len` usable elements with the default guard margin.
    pub fn new(len: usize) -> Self {
        Self {
            len,
            guard: DEFAULT_GUARD_MARGIN,
        }
    }

    pub fn with_guard(mut self, guard: usize) -> Self {
        self.guard = guard;
        self
    }

    /// The budget a network's layout asks for.
    pub fn from_layout(layout: &ModelLayout) -> Self {
        Self {
            len: layout.arena_len,
            guard: layout.guard_margin,
        }
    }

    /// Usable length, excluding both guard margins.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn guard(&self) -> usize {
        self.guard
    }

    /// Allocation length: usable length plus both margins.
    pub fn total_len(&self) -> usize {
        self.len + 2 * self.guard
    }

    /// Size of the allocation in bytes for elements of `elem_bytes`.
    pub fn total_bytes(&self, elem_bytes: usize) -> usize {
        self.total_len() * elem_bytes
    }

    /// Parses an element count with an optional `K` or `M` suffix.
    /// Case-insensitive; surrounding whitespace is ignored.
    pub fn parse(s: &str) -> Result<Self, ArenaError> {
        let trimmed = s.trim();
        let upper = trimmed.to_uppercase();
        let (digits, multiplier) = match upper.as_bytes().last() {
            Some(b'K') => (&trimmed[..trimmed.len() - 1], 1024),
            Some(b'M') => (&trimmed[..trimmed.len() - 1], 1024 * 1024),
            Some(_) => (trimmed, 1),
            None => return Err(ArenaError::InvalidBudget(s.to_string())),
        };
        let value: usize = digits
            .trim()
            .parse()
            .map_err(|_| ArenaError::InvalidBudget(s.to_string()))?;
        let len = value
            .checked_mul(multiplier)
            .ok_or_else(|| ArenaError::InvalidBudget(s.to_string()))?;
        if len == 0 {
            return Err(ArenaError::ZeroSized);
        }
        Ok(Self::new(len))
    }
}

impl fmt::Display for ArenaBudget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.len >= 1024 * 1024 && self.len % (1024 * 1024) == 0 {
            write!(f, "{}M", self.len / (1024 * 1024))?;
        } else if self.len >= 1024 && self.len % 1024 == 0 {
            write!(f, "{}K", self.len / 1024)?;
        } else {
            write!(f, "{}", self.len)?;
        }
        write!(f, " elements (+{} guard)", self.guard)
    }
}
