// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The owned arena buffer.
//!
//! One [`Arena`] backs every activation of a network run. Layout is
//!
//! ```text
//!  0        guard                    guard + len         total
//!  │ margin │ usable (planner-owned) │ margin │
//! ```
//!
//! Offsets used everywhere (planner, requests, spans) are absolute, so the
//! first usable element lives at `guard`.

use crate::{ArenaBudget, ArenaError, ArenaStats, Span};

/// A fixed-size, zero-initialized element buffer with guard margins.
#[derive(Debug, Clone)]
pub struct Arena<T> {
    data: Vec<T>,
    budget: ArenaBudget,
    stats: ArenaStats,
}

impl<T: Copy + Default> Arena<T> {
    /// Allocates the whole arena up front.
    pub fn new(budget: ArenaBudget) -> Result<Self, ArenaError> {
        if budget.is_empty() {
            return Err(ArenaError::ZeroSized);
        }
        tracing::debug!(%budget, "allocating arena");
        Ok(Self {
            data: vec![T::default(); budget.total_len()],
            budget,
            stats: ArenaStats::default(),
        })
    }

    pub fn budget(&self) -> ArenaBudget {
        self.budget
    }

    pub fn stats(&self) -> &ArenaStats {
        &self.stats
    }

    /// The region between the two guard margins.
    pub fn usable(&self) -> Span {
        Span::new(self.budget.guard(), self.budget.len())
    }

    pub fn total_len(&self) -> usize {
        self.data.len()
    }

    /// Fails unless `span` lies inside the allocation.
    pub fn check(&self, span: Span) -> Result<(), ArenaError> {
        match span.offset.checked_add(span.len) {
            Some(end) if end <= self.data.len() => Ok(()),
            other => Err(ArenaError::OutOfBounds {
                offset: span.offset,
                end: other.unwrap_or(usize::MAX),
                total: self.data.len(),
            }),
        }
    }

    /// Fails unless `span` lies inside the usable region.
    pub fn check_usable(&self, span: Span) -> Result<(), ArenaError> {
        let usable = self.usable();
        if !usable.contains(&span) {
            return Err(ArenaError::GuardViolation {
                offset: span.offset,
                end: span.end(),
                lo: usable.offset,
                hi: usable.end(),
            });
        }
        Ok(())
    }

    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    /// The whole allocation, guard margins included. This is the view an
    /// accelerator receives.
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.data
    }

    pub fn span(&self, span: Span) -> Result<&[T], ArenaError> {
        self.check(span)?;
        Ok(&self.data[span.range()])
    }

    pub fn span_mut(&mut self, span: Span) -> Result<&mut [T], ArenaError> {
        self.check(span)?;
        self.stats.record_write(span.len);
        Ok(&mut self.data[span.range()])
    }

    /// Copies `src` to `dst_offset`. The ranges may overlap.
    pub fn copy_within(&mut self, src: Span, dst_offset: usize) -> Result<(), ArenaError> {
        self.check(src)?;
        self.check(Span::new(dst_offset, src.len))?;
        self.data.copy_within(src.range(), dst_offset);
        self.stats.record_copy(src.len);
        Ok(())
    }

    /// Fills the usable region with `value`, leaving the margins untouched.
    pub fn fill_usable(&mut self, value: T) {
        let usable = self.usable();
        self.data[usable.range()].fill(value);
    }

    /// Zeroes the whole allocation, margins included, and resets statistics.
    pub fn reset(&mut self) {
        self.data.fill(T::default());
        self.stats = ArenaStats::default();
    }
}

impl<T: Copy + Default + PartialEq> Arena<T> {
    /// True while both guard margins still hold their initial value.
    pub fn guards_intact(&self) -> bool {
        let g = self.budget.guard();
        let zero = T::default();
        let tail = self.data.len() - g;
        self.data[..g].iter().all(|v| *v == zero) && self.data[tail..].iter().all(|v| *v == zero)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn arena() -> Arena<f32> {
        Arena::new(ArenaBudget::new(64).with_guard(8)).unwrap()
    }

    #[test]
    fn test_layout() {
        let a = arena();
        assert_eq!(a.total_len(), 80);
        assert_eq!(a.usable(), Span::new(8, 64));
        assert!(a.guards_intact());
    }

    #[test]
    fn test_zero_sized_rejected() {
        let r = Arena::<i16>::new(ArenaBudget::new(0));
        assert_eq!(r.unwrap_err(), ArenaError::ZeroSized);
    }

    #[test]
    fn test_span_bounds() {
        let mut a = arena();
        assert!(a.span(Span::new(70, 10)).is_ok());
        assert!(matches!(
            a.span(Span::new(75, 10)),
            Err(ArenaError::OutOfBounds { end: 85, total: 80, .. })
        ));
        assert!(a.span_mut(Span::new(usize::MAX, 2)).is_err());
    }

    #[test]
    fn test_usable_check() {
        let a = arena();
        assert!(a.check_usable(Span::new(8, 64)).is_ok());
        assert!(matches!(
            a.check_usable(Span::new(4, 8)),
            Err(ArenaError::GuardViolation { lo: 8, hi: 72, .. })
        ));
        assert!(a.check_usable(Span::new(70, 4)).is_err());
    }

    #[test]
    fn test_copy_within_and_stats() {
        let mut a = arena();
        a.span_mut(Span::new(8, 4)).unwrap().copy_from_slice(&[1.0, 2.0, 3.0, 4.0]);
        a.copy_within(Span::new(8, 4), 20).unwrap();
        assert_eq!(a.span(Span::new(20, 4)).unwrap(), &[1.0, 2.0, 3.0, 4.0]);
        assert_eq!(a.stats().copies, 1);
        assert_eq!(a.stats().elements_copied, 4);
        assert_eq!(a.stats().elements_written, 4);
    }

    #[test]
    fn test_guard_corruption_detected() {
        let mut a = arena();
        a.as_mut_slice()[79] = 1.0;
        assert!(!a.guards_intact());
        a.reset();
        assert!(a.guards_intact());
    }

    #[test]
    fn test_fill_usable_keeps_guards() {
        let mut a = arena();
        a.fill_usable(7.0);
        assert!(a.guards_intact());
        assert_eq!(a.as_slice()[8], 7.0);
        assert_eq!(a.as_slice()[71], 7.0);
    }
}
