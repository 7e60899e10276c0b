// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # layout-planner
//!
//! Assigns every layer's input and output region inside one shared arena.
//!
//! # Strategies
//!
//! | Strategy | Reuse | Arena needed |
//! |---|---|---|
//! | [`PingPongLayout`] | Alternates ends, holds skip connections | Peak live set |
//! | [`DisjointLayout`] | None | Sum of all regions |
//!
//! # Trait-Based Extensibility
//!
//! All strategies implement [`LayoutStrategy`]:
//!
//! ```ignore
//! struct MyLayout;
//! impl LayoutStrategy for MyLayout {
//!     fn name(&self) -> &str { "mine" }
//!     fn plan(&self, table: &LayerTable<Validated>, layout: &ModelLayout)
//!         -> Result<BufferMap, PlannerError> { /* ... */ }
//! }
//! ```
//!
//! # Example
//! ```
//! use layout_planner::{LayoutStrategy, PingPongLayout};
//!
//! let net = layer_ir::presets::toy().unwrap();
//! let map = PingPongLayout::new().plan(&net.table, &net.layout).unwrap();
//! assert_eq!(map.input_ptr(1), map.output_ptr(0));
//! println!("{}", map.summary());
//! ```

mod error;
mod liveness;
mod map;
pub mod strategy;

pub use error::PlannerError;
pub use liveness::{is_held, last_uses, output_len};
pub use map::{BufferMap, BufferSlot, Placement, Storage};
pub use strategy::disjoint::DisjointLayout;
pub use strategy::ping_pong::PingPongLayout;
pub use strategy::LayoutStrategy;

use layer_ir::{LayerTable, ModelLayout, Validated};

/// Plans `table` with the strategy registered under `name`.
pub fn plan_with(
    name: &str,
    table: &LayerTable<Validated>,
    layout: &ModelLayout,
) -> Result<BufferMap, PlannerError> {
    let strategy = strategy::by_name(name)?;
    tracing::info!(strategy = strategy.name(), network = %table.name, "planning arena layout");
    strategy.plan(table, layout)
}
