// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Two-slot bank rotation.
//!
//! Each pair has an `active` bank (being filled this step) and a
//! `draining` bank (filled last step, being consumed this step). Rotating
//! swaps the two, so no stage ever touches the bank another stage owns.

use super::TileRef;
use std::mem;

/// Physical bank identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BankId {
    A,
    B,
}

impl BankId {
    pub fn index(self) -> usize {
        match self {
            Self::A => 0,
            Self::B => 1,
        }
    }
}

/// A bank handle and the tile it currently holds, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bank {
    pub id: BankId,
    pub tile: Option<TileRef>,
}

impl Bank {
    fn empty(id: BankId) -> Self {
        Self { id, tile: None }
    }
}

/// Active/draining pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PingPong {
    pub active: Bank,
    pub draining: Bank,
}

impl Default for PingPong {
    fn default() -> Self {
        Self {
            active: Bank::empty(BankId::A),
            draining: Bank::empty(BankId::B),
        }
    }
}

impl PingPong {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hands the active bank to the draining side and vice versa.
    pub fn rotate(&mut self) {
        mem::swap(&mut self.active, &mut self.draining);
    }
}
