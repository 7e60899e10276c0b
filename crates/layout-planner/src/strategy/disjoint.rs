// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Disjoint layout strategy.
//!
//! Every layer gets a fresh region stacked after the previous one; nothing
//! is ever reused. The arena must hold the input plus every output at once.
//!
//! # When to use
//! - Debugging: a corrupted output can be traced to the layer that wrote it.
//! - Baseline for checking that ping-pong reuse does not change results.

use crate::liveness::{last_uses, output_len};
use crate::strategy::{fused_span, source_spans, LayoutStrategy};
use crate::{BufferMap, BufferSlot, Placement, PlannerError};
use arena::{ArenaBudget, Span};
use layer_ir::{LayerDescriptor, LayerTable, ModelLayout, Validated};

/// One region per layer, no reuse.
#[derive(Debug, Clone, Default)]
pub struct DisjointLayout;

impl DisjointLayout {
    pub fn new() -> Self {
        Self
    }
}

impl LayoutStrategy for DisjointLayout {
    fn name(&self) -> &str {
        "disjoint"
    }

    fn plan(
        &self,
        table: &LayerTable<Validated>,
        layout: &ModelLayout,
    ) -> Result<BufferMap, PlannerError> {
        if table.is_empty() {
            return Err(PlannerError::EmptyTable);
        }
        let budget = ArenaBudget::from_layout(layout);
        let end = budget.guard() + budget.len();
        let last = last_uses(table);

        let mut cursor = budget.guard();
        let mut stack = |layer: usize, len: usize| -> Result<Span, PlannerError> {
            if cursor + len > end {
                return Err(PlannerError::ArenaOverflow {
                    layer,
                    needed: len,
                    available: end.saturating_sub(cursor),
                });
            }
            let span = Span::new(cursor, len);
            cursor += len;
            Ok(span)
        };

        let input = stack(0, table.input.aligned_len())?;
        let mut slots: Vec<BufferSlot> = Vec::with_capacity(table.len());
        for (i, desc) in table.layers().iter().enumerate() {
            let inputs = source_spans(table, i, input, &slots)?;
            let (output, placement) = match desc {
                LayerDescriptor::Region(_) => (None, Placement::Sink),
                LayerDescriptor::Route(r) if !r.is_concat() => {
                    (Some(inputs[0]), Placement::Alias { source: r.inputs[0] })
                }
                LayerDescriptor::Route(_) => match fused_span(&inputs) {
                    Some(span) => (Some(span), Placement::FusedConcat),
                    None => (Some(stack(i, output_len(table, layout, i))?), Placement::CopyConcat),
                },
                _ => (Some(stack(i, output_len(table, layout, i))?), Placement::Stacked),
            };
            slots.push(BufferSlot {
                layer: i,
                kind: desc.kind(),
                inputs,
                output,
                placement,
                live_until: last[i],
            });
        }

        let map = BufferMap {
            strategy: self.name().to_string(),
            budget,
            input,
            slots,
        };
        map.validate(table)?;
        tracing::info!("{}", map.summary());
        Ok(map)
    }
}
