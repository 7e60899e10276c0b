// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # layer-ir
//!
//! The layer descriptor table consumed by the accelerator scheduler.
//!
//! - [`LayerDescriptor`]: tagged variant over CONV, MAXPOOL, REORG, ROUTE, REGION.
//! - [`LayerTable`]: the ordered table, with a **type-state pattern**
//!   (`Loaded` → `Validated`).
//! - [`NetworkBuilder`]: shape inference while appending layers.
//! - [`ModelLayout`]: arena length, guard margin, reservations and
//!   weight/bias offset tables.
//! - [`NetworkManifest`]: JSON description of a network plus layout.
//! - [`presets`]: built-in networks.
//!
//! # Example
//! ```
//! let net = layer_ir::presets::toy().unwrap();
//! println!("{}", net.table.summary());
//! for layer in net.table.iter_layers() {
//!     println!("  {}", layer.summary());
//! }
//! ```

mod error;
mod layer;
mod layout;
mod manifest;
pub mod presets;
mod shape;
pub mod table;

pub use error::LayerError;
pub use layer::{
    Activation, ConvLayer, LayerDescriptor, LayerKind, PoolLayer, RegionLayer, ReorgLayer,
    RouteLayer,
};
pub use layout::{ModelLayout, ReservedRegion, DEFAULT_GUARD_MARGIN};
pub use manifest::{ManifestLayer, NetworkManifest};
pub use presets::Network;
pub use shape::{align_row, FeatureShape, ROW_ALIGN};
pub use table::{LayerTable, Loaded, NetworkBuilder, Validated};
