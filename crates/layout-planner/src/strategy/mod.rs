// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The [`LayoutStrategy`] trait and strategy implementations.

pub mod disjoint;
pub mod ping_pong;

use crate::{BufferMap, BufferSlot, PlannerError};
use arena::Span;
use layer_ir::{LayerTable, ModelLayout, Validated};

/// Trait for layout strategies.
///
/// Each strategy takes a validated layer table and its model layout and
/// produces a [`BufferMap`] that fits the arena. Strategies are purely
/// algorithmic: no I/O and no arena access.
pub trait LayoutStrategy: Send + Sync {
    /// Human-readable name of this strategy.
    fn name(&self) -> &str;

    /// Produces a validated buffer map.
    fn plan(
        &self,
        table: &LayerTable<Validated>,
        layout: &ModelLayout,
    ) -> Result<BufferMap, PlannerError>;
}

/// Looks up a strategy by its config name.
pub fn by_name(name: &str) -> Result<Box<dyn LayoutStrategy>, PlannerError> {
    match name.to_lowercase().as_str() {
        "ping-pong" | "pingpong" | "ping_pong" | "alternating" => {
            Ok(Box::new(ping_pong::PingPongLayout::new()))
        }
        "disjoint" | "stacked" => Ok(Box::new(disjoint::DisjointLayout::new())),
        _ => Err(PlannerError::UnknownStrategy(name.to_string())),
    }
}

/// Spans layer `index` reads: its sources' outputs, or the network input.
pub(crate) fn source_spans(
    table: &LayerTable<Validated>,
    index: usize,
    input: Span,
    slots: &[BufferSlot],
) -> Result<Vec<Span>, PlannerError> {
    let sources = table.sources(index);
    if sources.is_empty() {
        return Ok(vec![input]);
    }
    sources
        .iter()
        .map(|&s| {
            slots[s].output.ok_or_else(|| PlannerError::InvalidPlan {
                strategy: "planner".into(),
                detail: format!("layer {index} reads layer {s}, which has no output"),
            })
        })
        .collect()
}

/// The combined span when `spans` are back-to-back in order.
pub(crate) fn fused_span(spans: &[Span]) -> Option<Span> {
    let first = spans.first()?;
    if spans.windows(2).all(|w| w[0].end() == w[1].offset) {
        Some(Span::new(first.offset, spans.iter().map(|s| s.len).sum()))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_by_name() {
        assert_eq!(by_name("Ping-Pong").unwrap().name(), "ping-pong");
        assert_eq!(by_name("disjoint").unwrap().name(), "disjoint");
        assert!(matches!(by_name("greedy"), Err(PlannerError::UnknownStrategy(_))));
    }

    #[test]
    fn test_fused_span() {
        let a = Span::new(100, 20);
        let b = Span::new(120, 30);
        assert_eq!(fused_span(&[a, b]), Some(Span::new(100, 50)));
        assert_eq!(fused_span(&[b, a]), None);
        assert_eq!(fused_span(&[]), None);
    }
}
