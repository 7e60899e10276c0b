// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Half-open element ranges inside an arena.

use std::fmt;
use std::ops::Range;

/// `[offset, offset + len)` in arena elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, serde::Serialize, serde::Deserialize)]
pub struct Span {
    pub offset: usize,
    pub len: usize,
}

impl Span {
    pub fn new(offset: usize, len: usize) -> Self {
        Self { offset, len }
    }

    pub fn end(&self) -> usize {
        self.offset + self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn range(&self) -> Range<usize> {
        self.offset..self.end()
    }

    /// True when the two spans share at least one element.
    pub fn overlaps(&self, other: &Span) -> bool {
        !self.is_empty() && !other.is_empty() && self.offset < other.end() && other.offset < self.end()
    }

    /// True when `other` lies entirely inside `self`.
    pub fn contains(&self, other: &Span) -> bool {
        other.offset >= self.offset && other.end() <= self.end()
    }

    /// Sub-span starting `at` elements in.
    pub fn slice(&self, at: usize, len: usize) -> Span {
        Span::new(self.offset + at, len)
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.offset, self.end())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overlap_is_half_open() {
        let a = Span::new(0, 10);
        assert!(a.overlaps(&Span::new(9, 1)));
        assert!(!a.overlaps(&Span::new(10, 5)));
        assert!(!a.overlaps(&Span::new(3, 0)));
    }

    #[test]
    fn test_contains() {
        let a = Span::new(100, 50);
        assert!(a.contains(&Span::new(100, 50)));
        assert!(a.contains(&a.slice(10, 5)));
        assert!(!a.contains(&Span::new(140, 11)));
        assert_eq!(a.to_string(), "[100, 150)");
    }
}
