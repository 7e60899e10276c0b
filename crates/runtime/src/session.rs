// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The inference session with a type-state lifecycle.
//!
//! ```text
//! InferenceSession<Idle>
//!     │  .plan()
//!     ▼
//! InferenceSession<Planned>
//!     │  .prepare::<T>()  /  .prepare_with(store)
//!     ▼
//! InferenceSession<Ready<T>>  ──.run(input)──▶ InferenceOutput
//!     │  .release()
//!     ▼
//! InferenceSession<Planned>
//! ```
//!
//! Each transition consumes the old value and returns a new one, so a run
//! on an unplanned session or a second `prepare` is a compile error. The
//! state type owns what exists in that state: the buffer map once planned,
//! the weights, arena and accelerator once ready.

use crate::executor::{ExecContext, LayerExecutor};
use crate::{InferenceMetrics, RuntimeConfig, RuntimeError, WeightStore};
use accel_core::{tile_table, Accelerator, Element, ReferenceAccelerator, TileParams};
use arena::{Arena, ArenaBudget, ArenaStats};
use layer_ir::{FeatureShape, Network};
use layout_planner::BufferMap;
use std::time::Instant;

// ── Type-state markers ─────────────────────────────────────────

/// Session is created but nothing is loaded.
#[derive(Debug)]
pub struct Idle;

/// Network is loaded and its buffer map planned.
#[derive(Debug)]
pub struct Planned {
    network: Network,
    map: BufferMap,
}

/// Weights are loaded and the arena allocated.
pub struct Ready<T: Element> {
    network: Network,
    map: BufferMap,
    store: WeightStore<T>,
    arena: Arena<T>,
    accel: Box<dyn Accelerator<T>>,
}

impl<T: Element> std::fmt::Debug for Ready<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ready")
            .field("network", &self.network.table.name)
            .field("store", &self.store)
            .field("arena", &self.arena.budget())
            .field("accelerator", &self.accel.name())
            .finish()
    }
}

/// Sealed trait for session states.
pub trait SessionState: std::fmt::Debug {}
impl SessionState for Idle {}
impl SessionState for Planned {}
impl<T: Element> SessionState for Ready<T> {}

// ── Inference output ───────────────────────────────────────────

/// The result of a single inference run.
#[derive(Debug)]
pub struct InferenceOutput {
    /// Dense `[c][h][w]` values of the network output, dequantized.
    pub output: Vec<f32>,
    pub shape: FeatureShape,
    /// Per-layer and overall timing metrics.
    pub metrics: InferenceMetrics,
}

// ── Session ────────────────────────────────────────────────────

/// One network, its arena and its weights, from load to release.
///
/// # Example
/// ```no_run
/// use runtime::{InferenceSession, RuntimeConfig};
///
/// # async fn example() -> Result<(), runtime::RuntimeError> {
/// let mut session = InferenceSession::new(RuntimeConfig::synthetic("toy"))
///     .plan()?
///     .prepare::<f32>()?;
/// let output = session.run(&vec![0.5; 3 * 16 * 16]).await?;
/// println!("{}", output.metrics.summary());
/// # Ok(())
/// # }
/// ```
pub struct InferenceSession<S: SessionState = Idle> {
    config: RuntimeConfig,
    state: S,
}

impl<S: SessionState> InferenceSession<S> {
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }
}

// ── Idle → Planned ─────────────────────────────────────────────

impl InferenceSession<Idle> {
    /// Creates a new session from the given configuration.
    pub fn new(config: RuntimeConfig) -> Self {
        tracing::info!(
            "session created: network '{}', precision '{}', layout '{}'",
            config.network,
            config.precision,
            config.layout
        );
        Self { config, state: Idle }
    }

    /// Loads the network and plans its buffer map.
    ///
    /// Steps:
    /// 1. Validate the configuration.
    /// 2. Resolve the network preset or manifest.
    /// 3. Plan the arena with the configured layout strategy.
    pub fn plan(self) -> Result<InferenceSession<Planned>, RuntimeError> {
        self.config.validate()?;
        let network = self.config.load_network()?;
        Self::plan_network(self.config, network)
    }

    /// Plans a network built in code; only the precision, layout and
    /// timeout settings of `config` are used.
    pub fn from_network(
        config: RuntimeConfig,
        network: Network,
    ) -> Result<InferenceSession<Planned>, RuntimeError> {
        config.parse_precision()?;
        Self::plan_network(config, network)
    }

    fn plan_network(
        config: RuntimeConfig,
        network: Network,
    ) -> Result<InferenceSession<Planned>, RuntimeError> {
        tracing::info!("{}", network.table.summary());
        let strategy = config.create_strategy()?;
        tracing::info!("using layout strategy: {}", strategy.name());
        let map = strategy.plan(&network.table, &network.layout)?;
        Ok(InferenceSession {
            config,
            state: Planned { network, map },
        })
    }
}

// ── Planned → Ready ────────────────────────────────────────────

impl InferenceSession<Planned> {
    pub fn network(&self) -> &Network {
        &self.state.network
    }

    pub fn map(&self) -> &BufferMap {
        &self.state.map
    }

    /// Tile parameters of every accelerated layer under the configured
    /// hardware limits.
    pub fn tile_table(&self) -> Result<Vec<(usize, TileParams)>, RuntimeError> {
        tile_table(self.state.network.table.layers(), &self.config.hw)
            .map_err(|(layer, source)| RuntimeError::Precondition { layer, source })
    }

    /// Reads (or generates) the weights this config names.
    pub fn load_weights<T: Element>(&self) -> Result<WeightStore<T>, RuntimeError> {
        let Network { table, layout } = &self.state.network;
        if self.config.synthetic_weights {
            return WeightStore::synthetic(table, layout);
        }
        let files = self.config.weights.as_ref().ok_or_else(|| {
            RuntimeError::Config("no [weights] table and synthetic_weights is off".into())
        })?;
        WeightStore::load(files, table, layout)
    }

    /// Loads the configured weights and allocates the arena.
    pub fn prepare<T: Element>(self) -> Result<InferenceSession<Ready<T>>, RuntimeError> {
        let store = self.load_weights()?;
        self.prepare_with(store)
    }

    /// Allocates the arena around weights supplied by the caller.
    ///
    /// The session starts with a [`ReferenceAccelerator`]; see
    /// [`InferenceSession::with_accelerator`].
    pub fn prepare_with<T: Element>(
        self,
        store: WeightStore<T>,
    ) -> Result<InferenceSession<Ready<T>>, RuntimeError> {
        let precision = self.config.parse_precision()?;
        if precision != T::PRECISION {
            return Err(RuntimeError::Config(format!(
                "config asks for {precision} but weights are {}",
                T::PRECISION
            )));
        }
        let Planned { network, map } = self.state;
        store.check(&network.layout)?;

        let budget = ArenaBudget::from_layout(&network.layout);
        let arena = Arena::new(budget)?;
        tracing::info!(
            "arena allocated: {budget}, {:.2} MB of {precision}",
            budget.total_bytes(precision.size_bytes()) as f64 / (1024.0 * 1024.0)
        );

        Ok(InferenceSession {
            config: self.config,
            state: Ready {
                network,
                map,
                store,
                arena,
                accel: Box::new(ReferenceAccelerator::new()),
            },
        })
    }
}

// ── Ready: run inference ───────────────────────────────────────

impl<T: Element> InferenceSession<Ready<T>> {
    /// Replaces the accelerator layers are dispatched to.
    pub fn with_accelerator(mut self, accel: impl Accelerator<T> + 'static) -> Self {
        tracing::info!("accelerator: {}", accel.name());
        self.state.accel = Box::new(accel);
        self
    }

    pub fn accelerator_name(&self) -> &str {
        self.state.accel.name()
    }

    pub fn network(&self) -> &Network {
        &self.state.network
    }

    pub fn map(&self) -> &BufferMap {
        &self.state.map
    }

    pub fn weights(&self) -> &WeightStore<T> {
        &self.state.store
    }

    /// Host access counters of the arena since the last run started.
    pub fn arena_stats(&self) -> &ArenaStats {
        self.state.arena.stats()
    }

    /// Runs the network on a dense `[c][h][w]` input.
    ///
    /// Layers run strictly in order. The task yields between layers, so
    /// dropping the future abandons the run at a layer boundary; the next
    /// run starts from a cleared arena either way.
    pub async fn run(&mut self, input: &[f32]) -> Result<InferenceOutput, RuntimeError> {
        let run_start = Instant::now();
        let timeout = self.config.layer_timeout();
        let profiling = self.config.enable_profiling;
        let state = &mut self.state;
        state.arena.reset();

        let ctx = ExecContext {
            table: &state.network.table,
            layout: &state.network.layout,
            map: &state.map,
            hw: &self.config.hw,
            store: &state.store,
            timeout,
        };
        let mut metrics = InferenceMetrics::new(state.accel.name());
        let mut exec = LayerExecutor::new(ctx);

        tracing::debug!(
            "starting inference: {} layers, timeout {:?}",
            ctx.table.len(),
            timeout
        );
        exec.load_input(&mut state.arena, input)?;
        for i in 0..ctx.table.len() {
            let layer = exec.step(i, &mut state.arena, state.accel.as_mut())?;
            metrics.record_layer(layer, profiling);
            tokio::task::yield_now().await;
        }
        let (output, shape) = exec.finish(&state.arena)?;

        if !state.arena.guards_intact() {
            return Err(RuntimeError::Config(
                "a layer wrote into the arena guard margins".into(),
            ));
        }
        metrics.finalise(run_start.elapsed());
        tracing::info!("{}", metrics.summary());

        Ok(InferenceOutput {
            output,
            shape,
            metrics,
        })
    }

    /// Drops the weights and the arena, keeping the plan.
    pub fn release(self) -> InferenceSession<Planned> {
        let Ready {
            network,
            map,
            store,
            arena,
            ..
        } = self.state;
        tracing::info!(
            "session released: {} weights, {} arena elements",
            store.weights().len(),
            arena.total_len()
        );
        InferenceSession {
            config: self.config,
            state: Planned { network, map },
        }
    }
}

impl<S: SessionState> std::fmt::Debug for InferenceSession<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InferenceSession")
            .field("state", &std::any::type_name::<S>())
            .field("network", &self.config.network)
            .field("layout", &self.config.layout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toy_input() -> Vec<f32> {
        (0..3 * 16 * 16).map(|i| (i % 13) as f32 / 13.0).collect()
    }

    #[test]
    fn test_idle_to_planned() {
        let session = InferenceSession::new(RuntimeConfig::synthetic("toy"))
            .plan()
            .unwrap();
        assert_eq!(session.network().table.len(), 3);
        assert_eq!(session.map().input_ptr(1), session.map().output_ptr(0));
        let tiles = session.tile_table().unwrap();
        assert_eq!(tiles.iter().map(|(i, _)| *i).collect::<Vec<_>>(), vec![0, 1, 2]);
    }

    #[test]
    fn test_plan_surfaces_overflow() {
        let config = RuntimeConfig {
            layout: "disjoint".into(),
            ..RuntimeConfig::synthetic("toy")
        };
        let err = InferenceSession::new(config).plan().unwrap_err();
        assert!(matches!(err, RuntimeError::Planner(_)));
        assert!(err.is_config_fault());
    }

    #[test]
    fn test_precision_mismatch_rejected() {
        let session = InferenceSession::new(RuntimeConfig::synthetic("toy"))
            .plan()
            .unwrap();
        let err = session.prepare::<i16>().unwrap_err();
        assert!(err.to_string().contains("fp32"));
    }

    #[tokio::test]
    async fn test_run_release_and_prepare_again() {
        let mut session = InferenceSession::new(RuntimeConfig::synthetic("toy"))
            .plan()
            .unwrap()
            .prepare::<f32>()
            .unwrap();
        assert_eq!(session.accelerator_name(), "reference");

        let first = session.run(&toy_input()).await.unwrap();
        assert_eq!(first.shape, FeatureShape::new(4, 8, 8));
        assert_eq!(first.metrics.layers_run, 3);
        assert_eq!(first.metrics.layer_metrics.len(), 3);

        let planned = session.release();
        let mut session = planned.prepare::<f32>().unwrap();
        let second = session.run(&toy_input()).await.unwrap();
        assert_eq!(first.output, second.output);
    }

    #[tokio::test]
    async fn test_profiling_off_keeps_totals() {
        let config = RuntimeConfig {
            enable_profiling: false,
            ..RuntimeConfig::synthetic("toy")
        };
        let mut session = InferenceSession::new(config)
            .plan()
            .unwrap()
            .prepare::<f32>()
            .unwrap();
        let out = session.run(&toy_input()).await.unwrap();
        assert!(out.metrics.layer_metrics.is_empty());
        assert_eq!(out.metrics.layers_run, 3);
        assert!(out.metrics.dispatch.writes > 0);
    }

    #[test]
    fn test_debug_shows_state() {
        let session = InferenceSession::new(RuntimeConfig::synthetic("toy"));
        assert!(format!("{session:?}").contains("Idle"));
    }
}
