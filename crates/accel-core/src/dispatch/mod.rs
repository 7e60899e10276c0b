// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Pipelined tile dispatch.
//!
//! One layer runs as a walk over (row tile, column tile, output-channel
//! step). Inside each spatial tile the output-channel loop is software
//! pipelined:
//!
//! ```text
//!  step m:   load(m) ──► compute ──► output.active
//!                                    output.draining ──► write
//!  rotate both ping-pong pairs
//! ```
//!
//! Which stages run at step `m` comes from [`StageFlags::at`]; the stages
//! themselves are supplied by a [`TileEngine`].

mod bank;
mod flags;

pub use bank::{Bank, BankId, PingPong};
pub use flags::StageFlags;

use crate::{DriverError, LayerRequest, OpKind, TileParams};
use std::time::Instant;

/// One tile: a spatial block and a run of output channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileRef {
    /// First output row.
    pub row: usize,
    /// First output column.
    pub col: usize,
    /// Rows actually covered (clamped at the bottom edge).
    pub rows: usize,
    /// Columns actually covered (clamped at the right edge).
    pub cols: usize,
    /// First output channel.
    pub m: usize,
    /// Channels actually covered (clamped at the last channel tile).
    pub channels: usize,
}

/// The three hardware stages, addressed by bank.
pub trait TileEngine {
    /// Brings the operands of `tile` into input bank `bank`.
    fn load(&mut self, bank: BankId, tile: &TileRef) -> Result<(), DriverError>;

    /// Computes `tile` from input bank `src` into output bank `dst`.
    fn compute(&mut self, src: BankId, dst: BankId, tile: &TileRef) -> Result<(), DriverError>;

    /// Flushes output bank `bank`, which holds `tile`, to memory.
    fn write(&mut self, bank: BankId, tile: &TileRef) -> Result<(), DriverError>;

    /// Blocks until output bank `bank` is complete, failing past `deadline`.
    ///
    /// Engines without timing behaviour never block.
    fn wait(&mut self, _bank: BankId, _deadline: Instant) -> Result<(), DriverError> {
        Ok(())
    }
}

/// Per-invocation pipeline bookkeeping.
#[derive(Debug, Clone)]
pub struct PipelineState {
    tiles: TileParams,
    pub flags: StageFlags,
    pub inputs: PingPong,
    pub outputs: PingPong,
}

impl PipelineState {
    pub fn new(tiles: TileParams) -> Self {
        Self {
            tiles,
            flags: StageFlags::default(),
            inputs: PingPong::new(),
            outputs: PingPong::new(),
        }
    }

    /// Recomputes the stage flags for step `m`.
    pub fn advance(&mut self, m: usize) -> StageFlags {
        self.flags = StageFlags::at(m, &self.tiles);
        self.flags
    }

    /// Input bank the compute stage reads this step.
    pub fn compute_source(&self) -> Bank {
        match self.tiles.op {
            OpKind::Conv => self.inputs.active,
            OpKind::MaxPool => self.inputs.draining,
        }
    }

    pub fn rotate(&mut self) {
        self.inputs.rotate();
        self.outputs.rotate();
    }
}

/// Stage counts from one dispatch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct DispatchStats {
    pub spatial_tiles: usize,
    pub steps: usize,
    pub loads: usize,
    pub computes: usize,
    pub writes: usize,
}

impl DispatchStats {
    pub fn merge(&mut self, other: &DispatchStats) {
        self.spatial_tiles += other.spatial_tiles;
        self.steps += other.steps;
        self.loads += other.loads;
        self.computes += other.computes;
        self.writes += other.writes;
    }
}

/// Runs one layer through `engine`, returning once every output tile has
/// been written.
pub fn dispatch<E: TileEngine + ?Sized>(
    req: &LayerRequest,
    engine: &mut E,
) -> Result<DispatchStats, DriverError> {
    let t = req.tiles;
    if t.tm == 0 || t.tr == 0 || t.tc == 0 {
        return Err(DriverError::Fault(format!(
            "layer {}: degenerate tile {}x{}x{}",
            req.layer, t.tm, t.tr, t.tc
        )));
    }
    let deadline = Instant::now() + req.timeout;
    let mut stats = DispatchStats::default();

    for row in (0..req.out_h).step_by(t.tr) {
        let rows = t.tr.min(req.out_h - row);
        for col in (0..req.out_w).step_by(t.tc) {
            let cols = t.tc.min(req.out_w - col);
            let mut state = PipelineState::new(t);
            stats.spatial_tiles += 1;

            for m in (0..t.ofm_bound).step_by(t.tm) {
                let flags = state.advance(m);
                stats.steps += 1;

                if flags.load {
                    let tile = TileRef {
                        row,
                        col,
                        rows,
                        cols,
                        m,
                        channels: t.tm.min(req.ofm.saturating_sub(m)),
                    };
                    engine.load(state.inputs.active.id, &tile)?;
                    state.inputs.active.tile = Some(tile);
                    stats.loads += 1;
                }

                if flags.compute {
                    let src = state.compute_source();
                    let tile = src.tile.ok_or_else(|| {
                        DriverError::Fault(format!(
                            "layer {}: compute at m={m} found input bank {:?} empty",
                            req.layer, src.id
                        ))
                    })?;
                    let dst = state.outputs.active.id;
                    engine.compute(src.id, dst, &tile)?;
                    engine.wait(dst, deadline)?;
                    state.outputs.active.tile = Some(tile);
                    stats.computes += 1;
                }

                if flags.write {
                    let bank = state.outputs.draining;
                    let tile = bank.tile.ok_or_else(|| {
                        DriverError::Fault(format!(
                            "layer {}: write at m={m} found output bank {:?} empty",
                            req.layer, bank.id
                        ))
                    })?;
                    engine.write(bank.id, &tile)?;
                    state.outputs.draining.tile = None;
                    stats.writes += 1;
                }

                state.rotate();
            }
        }
    }

    tracing::trace!(layer = req.layer, ?stats, "dispatch complete");
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{tile_params, HwLimits, LayerRequest, Operands};
    use layer_ir::{Activation, FeatureShape, NetworkBuilder};
    use std::collections::HashMap;
    use std::time::Duration;

    #[derive(Debug, Clone, PartialEq)]
    enum Event {
        Load(BankId, TileRef),
        Compute(BankId, BankId, TileRef),
        Write(BankId, TileRef),
    }

    /// Records stage calls and checks bank ownership.
    #[derive(Default)]
    struct Recorder {
        events: Vec<Event>,
        input_banks: HashMap<BankId, TileRef>,
    }

    impl TileEngine for Recorder {
        fn load(&mut self, bank: BankId, tile: &TileRef) -> Result<(), DriverError> {
            self.input_banks.insert(bank, *tile);
            self.events.push(Event::Load(bank, *tile));
            Ok(())
        }

        fn compute(&mut self, src: BankId, dst: BankId, tile: &TileRef) -> Result<(), DriverError> {
            assert_eq!(self.input_banks.get(&src), Some(tile));
            self.events.push(Event::Compute(src, dst, *tile));
            Ok(())
        }

        fn write(&mut self, bank: BankId, tile: &TileRef) -> Result<(), DriverError> {
            self.events.push(Event::Write(bank, *tile));
            Ok(())
        }
    }

    struct Stall;

    impl TileEngine for Stall {
        fn load(&mut self, _: BankId, _: &TileRef) -> Result<(), DriverError> {
            Ok(())
        }
        fn compute(&mut self, _: BankId, _: BankId, _: &TileRef) -> Result<(), DriverError> {
            Ok(())
        }
        fn write(&mut self, _: BankId, _: &TileRef) -> Result<(), DriverError> {
            Ok(())
        }
        fn wait(&mut self, _: BankId, _: Instant) -> Result<(), DriverError> {
            Err(DriverError::Timeout(Duration::from_millis(1)))
        }
    }

    fn request(
        input: FeatureShape,
        hw: &HwLimits,
        f: impl FnOnce(NetworkBuilder) -> NetworkBuilder,
    ) -> LayerRequest {
        let table = f(NetworkBuilder::new("t", input))
            .build()
            .unwrap()
            .validate()
            .unwrap();
        let desc = &table.layers()[0];
        let tiles = tile_params(desc, hw).unwrap();
        LayerRequest::from_layer(0, desc, tiles, Operands::default(), Duration::from_secs(1)).unwrap()
    }

    fn written(events: &[Event]) -> Vec<TileRef> {
        events
            .iter()
            .filter_map(|e| match e {
                Event::Write(_, t) => Some(*t),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_every_output_element_written_once() {
        let hw = HwLimits {
            tm: 8,
            tr: 5,
            tc: 6,
            ..HwLimits::default()
        };
        let req = request(FeatureShape::new(4, 13, 11), &hw, |b| {
            b.conv(20, 3, 1, true, Activation::Leaky, false)
        });
        let mut rec = Recorder::default();
        dispatch(&req, &mut rec).unwrap();

        let mut hits = vec![0u32; 20 * 13 * 11];
        for t in written(&rec.events) {
            for ch in t.m..t.m + t.channels {
                for r in t.row..t.row + t.rows {
                    for c in t.col..t.col + t.cols {
                        hits[(ch * 13 + r) * 11 + c] += 1;
                    }
                }
            }
        }
        assert!(hits.iter().all(|&h| h == 1));
    }

    #[test]
    fn test_boundary_tiles_are_clamped() {
        let hw = HwLimits {
            tm: 8,
            tr: 5,
            tc: 6,
            ..HwLimits::default()
        };
        let req = request(FeatureShape::new(4, 13, 11), &hw, |b| {
            b.conv(20, 3, 1, true, Activation::Leaky, false)
        });
        let mut rec = Recorder::default();
        dispatch(&req, &mut rec).unwrap();
        let w = written(&rec.events);
        assert!(w.iter().any(|t| t.rows == 3 && t.row == 10));
        assert!(w.iter().any(|t| t.cols == 5 && t.col == 6));
        assert!(w.iter().any(|t| t.channels == 4 && t.m == 16));
        assert!(w.iter().all(|t| t.channels > 0));
    }

    #[test]
    fn test_exact_multiple_runs_mloops_computes() {
        let hw = HwLimits {
            tm: 8,
            ..HwLimits::default()
        };
        let req = request(FeatureShape::new(4, 8, 8), &hw, |b| {
            b.conv(32, 3, 1, true, Activation::Leaky, false)
        });
        assert_eq!(req.tiles.m_loops, 4);
        let mut rec = Recorder::default();
        let stats = dispatch(&req, &mut rec).unwrap();
        assert_eq!(stats.spatial_tiles, 1);
        assert_eq!(stats.steps, 5);
        assert_eq!(stats.computes, 4);
        assert_eq!(stats.writes, 4);
        // the final step only flushes
        assert!(matches!(rec.events.last(), Some(Event::Write(_, t)) if t.m == 24));
    }

    #[test]
    fn test_conv_write_uses_previous_bank() {
        let hw = HwLimits {
            tm: 8,
            ..HwLimits::default()
        };
        let req = request(FeatureShape::new(4, 8, 8), &hw, |b| {
            b.conv(16, 3, 1, true, Activation::Leaky, false)
        });
        let mut rec = Recorder::default();
        dispatch(&req, &mut rec).unwrap();
        let ops: Vec<(char, BankId, usize)> = rec
            .events
            .iter()
            .map(|e| match e {
                Event::Load(b, t) => ('L', *b, t.m),
                Event::Compute(_, d, t) => ('C', *d, t.m),
                Event::Write(b, t) => ('W', *b, t.m),
            })
            .collect();
        assert_eq!(
            ops,
            vec![
                ('L', BankId::A, 0),
                ('C', BankId::A, 0),
                ('L', BankId::B, 8),
                ('C', BankId::B, 8),
                ('W', BankId::A, 0),
                ('W', BankId::B, 8),
            ]
        );
    }

    #[test]
    fn test_pool_computes_from_draining_input() {
        let hw = HwLimits::default();
        let req = request(FeatureShape::new(8, 8, 8), &hw, |b| b.maxpool(2, 2));
        assert_eq!(req.tiles.tm, 4);
        let mut rec = Recorder::default();
        let stats = dispatch(&req, &mut rec).unwrap();
        assert_eq!(stats.steps, 4);
        assert_eq!((stats.loads, stats.computes, stats.writes), (2, 2, 2));
        match (&rec.events[0], &rec.events[1]) {
            (Event::Load(lb, lt), Event::Load(_, _)) => {
                assert_eq!(*lb, BankId::A);
                assert_eq!(lt.m, 0);
            }
            other => panic!("unexpected prefix {other:?}"),
        }
        assert!(rec
            .events
            .iter()
            .any(|e| matches!(e, Event::Compute(BankId::A, _, t) if t.m == 0)));
        assert_eq!(written(&rec.events).iter().map(|t| t.m).collect::<Vec<_>>(), vec![0, 4]);
    }

    #[test]
    fn test_timeout_fails_the_layer() {
        let hw = HwLimits::default();
        let req = request(FeatureShape::new(4, 8, 8), &hw, |b| {
            b.conv(8, 3, 1, true, Activation::Leaky, false)
        });
        assert!(matches!(dispatch(&req, &mut Stall), Err(DriverError::Timeout(_))));
    }
}
