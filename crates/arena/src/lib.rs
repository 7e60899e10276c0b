// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # arena
//!
//! The single scratch region every layer of a network run reads from and
//! writes to.
//!
//! # Key Components
//!
//! - [`ArenaBudget`]: usable length plus guard margin, with `"64K"` style
//!   parsing for the CLI.
//! - [`Arena`]: the owned element buffer. Allocated once, never resized.
//! - [`Span`]: a half-open element range; what the layout planner hands out.
//! - [`ArenaStats`]: host-side copy and write counters.
//!
//! # Ownership Model
//!
//! ```text
//! InferenceSession ──owns──► Arena<T>
//!        │
//!        │ per layer: &mut [T] (whole allocation)
//!        ▼
//!   Accelerator::execute   (exclusive for the call)
//! ```
//!
//! Only one borrower exists at a time, so no locking is involved.
//!
//! # Example
//! ```
//! use arena::{Arena, ArenaBudget, Span};
//!
//! let mut a: Arena<f32> = Arena::new(ArenaBudget::new(1024)).unwrap();
//! let out = Span::new(a.usable().offset, 16);
//! a.span_mut(out).unwrap().fill(1.0);
//! assert!(a.guards_intact());
//! ```

#[allow(clippy::module_inception)]
mod arena;
mod budget;
mod error;
mod span;
mod stats;

pub use arena::Arena;
pub use budget::ArenaBudget;
pub use error::ArenaError;
pub use span::Span;
pub use stats::ArenaStats;
