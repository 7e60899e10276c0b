// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Host-side traffic counters for one arena.
//!
//! Only CPU-side access through [`crate::Arena`] is counted. Accelerator
//! traffic goes through the raw slice and is reported by the dispatcher.

/// Cumulative host access statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct ArenaStats {
    /// Mutable span borrows handed out.
    pub writes: u64,
    /// Elements covered by those borrows.
    pub elements_written: u64,
    /// `copy_within` calls.
    pub copies: u64,
    pub elements_copied: u64,
}

impl ArenaStats {
    pub(crate) fn record_write(&mut self, len: usize) {
        self.writes += 1;
        self.elements_written += len as u64;
    }

    pub(crate) fn record_copy(&mut self, len: usize) {
        self.copies += 1;
        self.elements_copied += len as u64;
    }

    pub fn summary(&self) -> String {
        format!(
            "Host arena traffic: {} writes ({} elements), {} copies ({} elements)",
            self.writes, self.elements_written, self.copies, self.elements_copied
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary() {
        let mut s = ArenaStats::default();
        s.record_write(100);
        s.record_copy(40);
        s.record_copy(2);
        let text = s.summary();
        assert!(text.contains("1 writes (100 elements)"));
        assert!(text.contains("2 copies (42 elements)"));
    }
}
