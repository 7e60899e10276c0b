// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Stage-enable flags for one output-channel step.

use crate::{OpKind, TileParams};

/// Which of the three pipeline stages run at step `m`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StageFlags {
    pub load: bool,
    pub compute: bool,
    pub write: bool,
}

impl StageFlags {
    /// Flags for the step starting at output channel `m`.
    ///
    /// Convolution loads and computes tile `m` in the same step and flushes
    /// it one step later. Pooling computes one step after the load and
    /// flushes one step after that, hence its extra drain step.
    pub fn at(m: usize, t: &TileParams) -> Self {
        match t.op {
            OpKind::Conv => {
                let live = m != t.mloops_bound;
                Self {
                    load: live,
                    compute: live,
                    write: m != 0,
                }
            }
            OpKind::MaxPool => Self {
                load: m != t.mloops_bound && m != t.drain_bound,
                compute: m != 0 && m != t.drain_bound,
                write: m != 0 && m != t.tm,
            },
        }
    }

    pub fn idle(&self) -> bool {
        !(self.load || self.compute || self.write)
    }
}
