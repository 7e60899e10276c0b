// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The buffer map: output of the layout planner.
//!
//! One [`BufferSlot`] per layer holds the arena spans the layer reads and
//! the span it writes. The map is computed once per network load and is
//! read-only afterwards; it is the contract between the planner and the
//! executor.

use crate::PlannerError;
use arena::{ArenaBudget, Span};
use layer_ir::{LayerKind, LayerTable, Validated};

/// How a slot's output region was chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Placement {
    /// Front of the arena, growing up.
    Top,
    /// Back of the arena, growing down.
    Bottom,
    /// Back of the arena, kept across more than one following layer.
    Reserved,
    /// Fresh region stacked after every earlier one (no reuse).
    Stacked,
    /// Same region as an earlier layer's output.
    Alias { source: usize },
    /// Route over back-to-back inputs; the inputs already form the output.
    FusedConcat,
    /// Route whose inputs are copied into a fresh region.
    CopyConcat,
    /// No output (detection layer).
    Sink,
}

impl Placement {
    /// Whether the slot's output is its own storage rather than a view.
    pub fn owns_storage(&self) -> bool {
        !matches!(self, Self::Alias { .. } | Self::FusedConcat | Self::Sink)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Top => "top",
            Self::Bottom => "bottom",
            Self::Reserved => "reserved",
            Self::Stacked => "stacked",
            Self::Alias { .. } => "alias",
            Self::FusedConcat => "fused-concat",
            Self::CopyConcat => "copy-concat",
            Self::Sink => "sink",
        }
    }
}

/// Input and output regions of one layer.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct BufferSlot {
    pub layer: usize,
    pub kind: LayerKind,
    /// One span per source, in source order.
    pub inputs: Vec<Span>,
    pub output: Option<Span>,
    pub placement: Placement,
    /// Last layer index that reads the output (through routes).
    pub live_until: usize,
}

/// A region some layer physically owns, with its live interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Storage {
    /// `None` for the network input.
    pub owner: Option<usize>,
    pub span: Span,
    pub from: usize,
    pub until: usize,
}

impl Storage {
    pub fn live_at(&self, layer: usize) -> bool {
        self.from <= layer && layer <= self.until
    }

    fn lifetimes_meet(&self, other: &Storage) -> bool {
        self.from <= other.until && other.from <= self.until
    }
}

/// The complete layout produced by a [`crate::LayoutStrategy`].
#[derive(Debug, Clone, serde::Serialize)]
pub struct BufferMap {
    pub strategy: String,
    pub budget: ArenaBudget,
    /// Where the network input is staged.
    pub input: Span,
    pub slots: Vec<BufferSlot>,
}

impl BufferMap {
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn slot(&self, layer: usize) -> Option<&BufferSlot> {
        self.slots.get(layer)
    }

    /// Arena offset of the first input of `layer`.
    pub fn input_ptr(&self, layer: usize) -> Option<usize> {
        self.slot(layer)?.inputs.first().map(|s| s.offset)
    }

    /// Arena offset of the output of `layer`.
    pub fn output_ptr(&self, layer: usize) -> Option<usize> {
        self.slot(layer)?.output.map(|s| s.offset)
    }

    /// `(layer, len)` of every standing reservation.
    pub fn reservations(&self) -> Vec<(usize, usize)> {
        self.slots
            .iter()
            .filter(|s| s.placement == Placement::Reserved)
            .filter_map(|s| s.output.map(|o| (s.layer, o.len)))
            .collect()
    }

    /// Every physically owned region, network input first.
    pub fn storages(&self) -> Vec<Storage> {
        let mut out = vec![Storage {
            owner: None,
            span: self.input,
            from: 0,
            until: 0,
        }];
        for slot in &self.slots {
            if let (true, Some(span)) = (slot.placement.owns_storage(), slot.output) {
                out.push(Storage {
                    owner: Some(slot.layer),
                    span,
                    from: slot.layer,
                    until: slot.live_until,
                });
            }
        }
        out
    }

    /// Largest number of elements live at any one layer.
    pub fn peak_live(&self) -> usize {
        let storages = self.storages();
        (0..self.slots.len())
            .map(|t| {
                storages
                    .iter()
                    .filter(|s| s.live_at(t))
                    .map(|s| s.span.len)
                    .sum::<usize>()
            })
            .max()
            .unwrap_or(0)
    }

    fn invalid(&self, detail: String) -> PlannerError {
        PlannerError::InvalidPlan {
            strategy: self.strategy.clone(),
            detail,
        }
    }

    /// Validates the map against its table.
    ///
    /// Checks:
    /// - One slot per layer.
    /// - Each input span is exactly its source's output span (aliasing).
    /// - Alias and fused-concat outputs are views of their inputs.
    /// - No owned region reaches into a guard margin.
    /// - No two owned regions with overlapping lifetimes share an element.
    pub fn validate(&self, table: &LayerTable<Validated>) -> Result<(), PlannerError> {
        if self.slots.len() != table.len() {
            return Err(self.invalid(format!(
                "{} slots for {} layers",
                self.slots.len(),
                table.len()
            )));
        }

        for (i, slot) in self.slots.iter().enumerate() {
            if slot.layer != i {
                return Err(self.invalid(format!("slot {i} is labelled layer {}", slot.layer)));
            }
            let sources = table.sources(i);
            let expected: Vec<Option<Span>> = if sources.is_empty() {
                vec![Some(self.input)]
            } else {
                sources.iter().map(|&s| self.slots[s].output).collect()
            };
            let actual: Vec<Option<Span>> = slot.inputs.iter().copied().map(Some).collect();
            if expected != actual {
                return Err(self.invalid(format!(
                    "layer {i} input does not alias its source output(s) {sources:?}"
                )));
            }

            match slot.placement {
                Placement::Sink => {
                    if slot.output.is_some() {
                        return Err(self.invalid(format!("sink layer {i} has an output")));
                    }
                }
                Placement::Alias { source } => {
                    if slot.output != self.slots[source].output || slot.inputs.len() != 1 {
                        return Err(self.invalid(format!("layer {i} does not alias layer {source}")));
                    }
                }
                Placement::FusedConcat => {
                    let contiguous = slot.inputs.windows(2).all(|w| w[0].end() == w[1].offset);
                    let total: usize = slot.inputs.iter().map(|s| s.len).sum();
                    let expected = slot.inputs.first().map(|s| Span::new(s.offset, total));
                    if !contiguous || slot.output != expected {
                        return Err(self.invalid(format!("layer {i} inputs are not back-to-back")));
                    }
                }
                _ => {
                    if slot.output.is_none() {
                        return Err(self.invalid(format!("layer {i} has no output region")));
                    }
                }
            }
        }

        let usable = Span::new(self.budget.guard(), self.budget.len());
        let storages = self.storages();
        for s in &storages {
            if !usable.contains(&s.span) {
                return Err(self.invalid(format!(
                    "region {} of {} crosses the guard margin (usable {usable})",
                    s.span,
                    owner_label(s.owner)
                )));
            }
        }
        for (k, a) in storages.iter().enumerate() {
            for b in &storages[k + 1..] {
                if a.lifetimes_meet(b) && a.span.overlaps(&b.span) {
                    return Err(self.invalid(format!(
                        "{} {} overlaps {} {} while both are live",
                        owner_label(a.owner),
                        a.span,
                        owner_label(b.owner),
                        b.span
                    )));
                }
            }
        }
        Ok(())
    }

    /// Returns a human-readable summary of the map.
    pub fn summary(&self) -> String {
        let peak = self.peak_live();
        format!(
            "Layout '{}': {} layers, {} reservations, peak live {}/{} elements ({:.0}%)",
            self.strategy,
            self.slots.len(),
            self.reservations().len(),
            peak,
            self.budget.len(),
            peak as f64 / self.budget.len().max(1) as f64 * 100.0,
        )
    }
}

fn owner_label(owner: Option<usize>) -> String {
    match owner {
        Some(l) => format!("layer {l}"),
        None => "network input".to_string(),
    }
}
