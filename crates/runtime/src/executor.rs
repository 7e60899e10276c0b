// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The layer executor.
//!
//! Walks the layer table once, in order. Conv and pool layers are checked
//! against the hardware limits and dispatched; reorg, route and region run
//! on the host. A layer starts only after the previous one returned.
//!
//! ```text
//! Idle ──step(i)──▶ Dispatching { i } ──▶ Idle ──▶ … ──finish()──▶ Done
//! ```
//!
//! In fixed-point mode the executor tracks the activation Q of every
//! layer output: convolutions take theirs from the Q tables, pool and
//! reorg keep their input's, and a concatenating route rescales all
//! branches down to the smallest.

use crate::metrics::LayerMetrics;
use crate::{cpu, RuntimeError, WeightStore};
use accel_core::{
    tile_params, Accelerator, DeviceMemory, DispatchStats, Element, HwLimits, LayerRequest,
    Operands,
};
use arena::{Arena, Span};
use layer_ir::{FeatureShape, LayerDescriptor, LayerTable, ModelLayout, RouteLayer, Validated};
use layout_planner::{BufferMap, BufferSlot, Placement};
use std::time::{Duration, Instant};

/// Where a run is in its layer walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Dispatching { layer: usize },
    Done,
}

/// Everything a run reads but never writes.
#[derive(Debug)]
pub struct ExecContext<'a, T> {
    pub table: &'a LayerTable<Validated>,
    pub layout: &'a ModelLayout,
    pub map: &'a BufferMap,
    pub hw: &'a HwLimits,
    pub store: &'a WeightStore<T>,
    pub timeout: Duration,
}

impl<T> Clone for ExecContext<'_, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for ExecContext<'_, T> {}

/// Drives one network run over an arena.
pub struct LayerExecutor<'a, T: Element> {
    ctx: ExecContext<'a, T>,
    state: RunState,
    /// Convolutions dispatched so far.
    conv: usize,
    weight_offset: usize,
    bias_offset: usize,
    input_q: i32,
    /// Activation Q of each finished layer's output.
    act_q: Vec<i32>,
    output: Option<(Vec<f32>, FeatureShape)>,
}

impl<'a, T: Element> LayerExecutor<'a, T> {
    pub fn new(ctx: ExecContext<'a, T>) -> Self {
        Self {
            ctx,
            state: RunState::Idle,
            conv: 0,
            weight_offset: 0,
            bias_offset: 0,
            input_q: 0,
            act_q: Vec::with_capacity(ctx.table.len()),
            output: None,
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    /// Index of the next layer to run.
    pub fn next_layer(&self) -> usize {
        self.act_q.len()
    }

    fn fixed_point(&self) -> Option<&'a crate::QTables> {
        if T::PRECISION.is_fixed_point() {
            self.ctx.store.q()
        } else {
            None
        }
    }

    /// Quantizes a dense `[c][h][w]` input into the network input region.
    pub fn load_input(&mut self, arena: &mut Arena<T>, input: &[f32]) -> Result<(), RuntimeError> {
        let shape = self.ctx.table.input;
        if input.len() != shape.dense_len() {
            return Err(RuntimeError::Config(format!(
                "input has {} values, network '{}' expects {shape} ({})",
                input.len(),
                self.ctx.table.name,
                shape.dense_len()
            )));
        }
        self.input_q = self.fixed_point().map_or(0, |q| q.input_q());
        let q = self.input_q;
        let dense: Vec<T> = input.iter().map(|&v| T::quantize(v, q)).collect();
        cpu::repad(&dense, shape, arena.span_mut(self.ctx.map.input)?);
        tracing::debug!(span = %self.ctx.map.input, q, "input loaded");
        Ok(())
    }

    /// Runs layer `index`, which must be the next one in table order.
    pub fn step<A>(
        &mut self,
        index: usize,
        arena: &mut Arena<T>,
        accel: &mut A,
    ) -> Result<LayerMetrics, RuntimeError>
    where
        A: Accelerator<T> + ?Sized,
    {
        let ctx = self.ctx;
        if self.state == RunState::Done || index != self.next_layer() {
            return Err(RuntimeError::Config(format!(
                "layer {index} requested out of order (next is {}, state {:?})",
                self.next_layer(),
                self.state
            )));
        }
        let desc = ctx.table.layer(index).ok_or_else(|| {
            RuntimeError::Config(format!("layer {index} is not in the table"))
        })?;
        let slot = ctx.map.slot(index).ok_or_else(|| {
            RuntimeError::Config(format!("buffer map has no slot for layer {index}"))
        })?;

        self.state = RunState::Dispatching { layer: index };
        let started = Instant::now();
        let in_q = self.input_q_of(index);

        let (out_q, dispatch) = match desc {
            LayerDescriptor::Conv(_) | LayerDescriptor::MaxPool(_) => {
                let (q, stats) = self.accelerate(index, desc, slot, in_q, arena, accel)?;
                (q, Some(stats))
            }
            LayerDescriptor::Reorg(r) => {
                cpu::reorg(arena, r, first_input(slot)?, output_span(slot)?)?;
                (in_q, None)
            }
            LayerDescriptor::Route(r) => (self.route(r, slot, arena)?, None),
            LayerDescriptor::Region(r) => {
                let values = cpu::extract(arena, first_input(slot)?, r.input, in_q)?;
                self.output = Some((values, r.input));
                (in_q, None)
            }
        };

        self.act_q.push(out_q);
        self.state = RunState::Idle;
        let duration = started.elapsed();
        tracing::debug!(
            layer = index,
            kind = %desc.kind(),
            placement = slot.placement.as_str(),
            q = out_q,
            ?duration,
            "layer done"
        );
        Ok(LayerMetrics {
            layer: index,
            kind: desc.kind(),
            duration,
            dispatch,
        })
    }

    /// Hands back the network output and marks the run done.
    ///
    /// The region layer's extraction when the table has one, otherwise the
    /// last layer's output read out of the arena.
    pub fn finish(&mut self, arena: &Arena<T>) -> Result<(Vec<f32>, FeatureShape), RuntimeError> {
        let ctx = self.ctx;
        if self.next_layer() != ctx.table.len() {
            return Err(RuntimeError::Config(format!(
                "run stopped after {} of {} layers",
                self.next_layer(),
                ctx.table.len()
            )));
        }
        let out = match self.output.take() {
            Some(out) => out,
            None => {
                let last = ctx
                    .table
                    .len()
                    .checked_sub(1)
                    .ok_or_else(|| RuntimeError::Config("empty layer table".into()))?;
                let shape = ctx
                    .table
                    .layer(last)
                    .map(|d| d.output_shape())
                    .ok_or_else(|| RuntimeError::Config(format!("layer {last} is not in the table")))?;
                let span = ctx.map.slot(last).map(output_span).transpose()?.ok_or_else(|| {
                    RuntimeError::Config(format!("buffer map has no slot for layer {last}"))
                })?;
                (cpu::extract(arena, span, shape, self.act_q[last])?, shape)
            }
        };
        self.state = RunState::Done;
        Ok(out)
    }

    fn input_q_of(&self, index: usize) -> i32 {
        match self.ctx.table.sources(index).first() {
            Some(&s) => self.act_q[s],
            None => self.input_q,
        }
    }

    // ── Accelerated layers ─────────────────────────────────────

    fn accelerate<A>(
        &mut self,
        index: usize,
        desc: &LayerDescriptor,
        slot: &BufferSlot,
        in_q: i32,
        arena: &mut Arena<T>,
        accel: &mut A,
    ) -> Result<(i32, DispatchStats), RuntimeError>
    where
        A: Accelerator<T> + ?Sized,
    {
        let ctx = self.ctx;
        let precondition = |source| RuntimeError::Precondition {
            layer: index,
            source,
        };
        let is_conv = matches!(desc, LayerDescriptor::Conv(_));

        let tiles = tile_params(desc, ctx.hw).map_err(precondition)?;
        let (weights, bias) = if is_conv {
            (self.weight_offset, self.bias_offset)
        } else {
            (0, 0)
        };
        let operands = Operands {
            input: first_input(slot)?.offset,
            output: output_span(slot)?.offset,
            weights,
            bias,
        };
        let mut req = LayerRequest::from_layer(index, desc, tiles, operands, ctx.timeout)
            .map_err(precondition)?;

        let mut out_q = in_q;
        if let (true, Some(q)) = (is_conv, self.fixed_point()) {
            let scales = q.scales(self.conv, in_q)?;
            out_q = scales.act_out;
            req = req.with_q(scales);
        }
        ctx.hw.check(&req).map_err(precondition)?;

        tracing::debug!(
            layer = index,
            op = req.op().as_str(),
            tm = tiles.tm,
            tn = tiles.tn,
            tr = tiles.tr,
            tc = tiles.tc,
            m_loops = tiles.m_loops,
            "dispatching to {}",
            accel.name()
        );
        let stats = {
            let mut mem =
                DeviceMemory::new(arena.as_mut_slice(), ctx.store.weights(), ctx.store.bias());
            accel
                .execute(&req, &mut mem)
                .map_err(|e| RuntimeError::from_driver(index, e))?
        };

        if is_conv {
            self.weight_offset += ctx.layout.weight_offsets.get(self.conv).copied().unwrap_or(0);
            self.bias_offset += ctx.layout.bias_offsets.get(self.conv).copied().unwrap_or(0);
            self.conv += 1;
        }
        Ok((out_q, stats))
    }

    // ── Host layers ────────────────────────────────────────────

    fn route(
        &mut self,
        route: &RouteLayer,
        slot: &BufferSlot,
        arena: &mut Arena<T>,
    ) -> Result<i32, RuntimeError> {
        let qs: Vec<i32> = route.inputs.iter().map(|&s| self.act_q[s]).collect();
        let target = qs.iter().copied().min().unwrap_or(self.input_q);
        let output = output_span(slot)?;

        match &slot.placement {
            Placement::CopyConcat => cpu::concat(arena, &slot.inputs, output)?,
            Placement::Alias { .. } | Placement::FusedConcat => {}
            other => {
                return Err(RuntimeError::Config(format!(
                    "route placed as {}",
                    other.as_str()
                )))
            }
        }

        if route.is_concat() {
            let in_place = slot.placement == Placement::FusedConcat;
            let mut at = 0;
            for (span, q) in slot.inputs.iter().zip(&qs) {
                let shift = q - target;
                cpu::shift_down(arena, output.slice(at, span.len), shift)?;
                if in_place && shift != 0 {
                    self.rescaled(slot.layer, *span, target)?;
                }
                at += span.len;
            }
        }
        Ok(target)
    }

    /// Records that `span` was shifted in place to Q `q` by layer `index`.
    ///
    /// Every earlier layer whose output is exactly that region now reads at
    /// `q`. A still-live output that only partly overlaps it would be left
    /// at two scales at once.
    fn rescaled(&mut self, index: usize, span: Span, q: i32) -> Result<(), RuntimeError> {
        for (j, slot) in self.ctx.map.slots.iter().enumerate().take(index) {
            let Some(out) = slot.output else { continue };
            if out == span {
                self.act_q[j] = q;
            } else if out.overlaps(&span) && slot.live_until > index {
                return Err(RuntimeError::Config(format!(
                    "layer {index} rescales {span} in place, which splits layer {j}'s output {out}"
                )));
            }
        }
        Ok(())
    }
}

fn first_input(slot: &BufferSlot) -> Result<Span, RuntimeError> {
    slot.inputs.first().copied().ok_or_else(|| {
        RuntimeError::Config(format!("layer {} has no input region", slot.layer))
    })
}

fn output_span(slot: &BufferSlot) -> Result<Span, RuntimeError> {
    slot.output.ok_or_else(|| {
        RuntimeError::Config(format!("layer {} has no output region", slot.layer))
    })
}
