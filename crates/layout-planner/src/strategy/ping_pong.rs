// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Ping-pong layout.
//!
//! Outputs alternate between the two ends of the arena so that a layer's
//! input (the previous output) and its own output never collide, while
//! the output of layer `i - 2` is overwritten freely.
//!
//! ```text
//!  guard ┃ top ──►                          ◄── bottom ┃ guard
//!        ┃ L1  L3  ...        ... R27 R24 R16   L0  L2 ┃
//! ```
//!
//! Outputs still needed beyond the next layer (skip connections) are
//! standing reservations: they go to the bottom below every live bottom
//! region and stay put until their last reader has run.

use crate::liveness::{is_held, last_uses, output_len};
use crate::strategy::{fused_span, source_spans, LayoutStrategy};
use crate::{BufferMap, BufferSlot, Placement, PlannerError};
use arena::{ArenaBudget, Span};
use layer_ir::{LayerDescriptor, LayerTable, ModelLayout, Validated};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Top,
    Bottom,
}

#[derive(Debug, Clone, Copy)]
struct Live {
    span: Span,
    until: usize,
}

/// Regions live at the current layer, split by which end they grow from.
struct Cursor {
    top: usize,
    bottom: usize,
    top_live: Vec<Live>,
    bottom_live: Vec<Live>,
}

impl Cursor {
    fn retire(&mut self, layer: usize) {
        self.top_live.retain(|l| l.until >= layer);
        self.bottom_live.retain(|l| l.until >= layer);
    }

    /// First free element after the live top regions.
    fn ceiling(&self) -> usize {
        self.top_live
            .iter()
            .map(|l| l.span.end())
            .max()
            .unwrap_or(self.top)
    }

    /// Start of the lowest live bottom region.
    fn floor(&self) -> usize {
        self.bottom_live
            .iter()
            .map(|l| l.span.offset)
            .min()
            .unwrap_or(self.bottom)
    }

    fn overflow(&self, layer: usize, len: usize) -> PlannerError {
        PlannerError::ArenaOverflow {
            layer,
            needed: len,
            available: self.floor().saturating_sub(self.ceiling()),
        }
    }

    fn place(&mut self, layer: usize, len: usize, side: Side, until: usize) -> Result<Span, PlannerError> {
        let (ceiling, floor) = (self.ceiling(), self.floor());
        let span = match side {
            Side::Top if ceiling + len <= floor => Span::new(ceiling, len),
            Side::Bottom if floor >= ceiling + len => Span::new(floor - len, len),
            _ => return Err(self.overflow(layer, len)),
        };
        self.claim(span, side, until);
        Ok(span)
    }

    /// Places `len` elements to end exactly at `anchor`, if that space is free.
    fn place_at(&mut self, anchor: usize, len: usize, until: usize) -> Option<Span> {
        let start = anchor.checked_sub(len)?;
        let span = Span::new(start, len);
        let clear = start >= self.ceiling()
            && self
                .top_live
                .iter()
                .chain(&self.bottom_live)
                .all(|l| !l.span.overlaps(&span));
        if !clear {
            return None;
        }
        self.claim(span, Side::Bottom, until);
        Some(span)
    }

    fn claim(&mut self, span: Span, side: Side, until: usize) {
        let live = Live { span, until };
        match side {
            Side::Top => self.top_live.push(live),
            Side::Bottom => self.bottom_live.push(live),
        }
    }
}

/// End offset for a held output that leads a concatenating route whose
/// remaining inputs are already placed back-to-back.
fn concat_anchor(table: &LayerTable<Validated>, index: usize, slots: &[BufferSlot]) -> Option<usize> {
    table.consumers(index).into_iter().find_map(|j| match &table.layers()[j] {
        LayerDescriptor::Route(r) if r.is_concat() && r.inputs[0] == index => {
            let rest: Option<Vec<Span>> = r.inputs[1..]
                .iter()
                .map(|&s| slots.get(s).and_then(|slot| slot.output))
                .collect();
            fused_span(&rest?).map(|s| s.offset)
        }
        _ => None,
    })
}

fn check_reservations(layout: &ModelLayout, derived: &[(usize, usize)]) -> Result<(), PlannerError> {
    if layout.reserved.is_empty() {
        return Ok(());
    }
    for r in &layout.reserved {
        match derived.iter().find(|(l, _)| *l == r.layer) {
            Some(&(_, len)) if len == r.len => {}
            Some(&(_, len)) => {
                return Err(PlannerError::ReservationMismatch(format!(
                    "'{}' declares {} elements for layer {} but its output needs {len}",
                    r.name, r.len, r.layer
                )))
            }
            None => {
                return Err(PlannerError::ReservationMismatch(format!(
                    "'{}' declares layer {}, whose output is not held",
                    r.name, r.layer
                )))
            }
        }
    }
    if let Some((layer, len)) = derived
        .iter()
        .find(|(l, _)| layout.reservation_for(*l).is_none())
    {
        return Err(PlannerError::ReservationMismatch(format!(
            "layer {layer} holds {len} elements but no reservation is declared for it"
        )));
    }
    Ok(())
}

/// Top/bottom alternation with standing reservations.
#[derive(Debug, Clone, Default)]
pub struct PingPongLayout;

impl PingPongLayout {
    pub fn new() -> Self {
        Self
    }
}

impl LayoutStrategy for PingPongLayout {
    fn name(&self) -> &str {
        "ping-pong"
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
        let last = last_uses(table);
        let mut cursor = Cursor {
            top: budget.guard(),
            bottom: budget.guard() + budget.len(),
            top_live: Vec::new(),
            bottom_live: Vec::new(),
        };
        let input = cursor.place(0, table.input.aligned_len(), Side::Top, 0)?;

        let mut sides: Vec<Side> = Vec::with_capacity(table.len());
        let mut slots: Vec<BufferSlot> = Vec::with_capacity(table.len());

        for (i, desc) in table.layers().iter().enumerate() {
            cursor.retire(i);
            let inputs = source_spans(table, i, input, &slots)?;
            let input_side = table
                .sources(i)
                .first()
                .map(|&s| sides[s])
                .unwrap_or(Side::Top);

            let (output, placement, side) = match desc {
                LayerDescriptor::Region(_) => (None, Placement::Sink, input_side),
                LayerDescriptor::Route(r) if !r.is_concat() => (
                    Some(inputs[0]),
                    Placement::Alias { source: r.inputs[0] },
                    input_side,
                ),
                LayerDescriptor::Route(_) if fused_span(&inputs).is_some() => {
                    (fused_span(&inputs), Placement::FusedConcat, input_side)
                }
                _ => {
                    let len = output_len(table, layout, i);
                    let held = is_held(&last, i);
                    let side = if held || input_side == Side::Top {
                        Side::Bottom
                    } else {
                        Side::Top
                    };
                    let anchored = if held {
                        concat_anchor(table, i, &slots)
                            .and_then(|anchor| cursor.place_at(anchor, len, last[i]))
                    } else {
                        None
                    };
                    let span = match anchored {
                        Some(span) => span,
                        None => cursor.place(i, len, side, last[i])?,
                    };
                    let placement = match (desc, held, side) {
                        (LayerDescriptor::Route(_), _, _) => Placement::CopyConcat,
                        (_, true, _) => Placement::Reserved,
                        (_, false, Side::Top) => Placement::Top,
                        (_, false, Side::Bottom) => Placement::Bottom,
                    };
                    (Some(span), placement, side)
                }
            };

            tracing::debug!(
                layer = i,
                kind = %desc.kind(),
                placement = placement.as_str(),
                output = ?output,
                "placed layer"
            );
            sides.push(side);
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
        check_reservations(layout, &map.reservations())?;
        map.validate(table)?;
        tracing::info!("{}", map.summary());
        Ok(map)
    }
}
