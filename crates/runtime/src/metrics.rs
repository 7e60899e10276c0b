// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Inference profiling metrics.
//!
//! [`InferenceMetrics`] collects per-layer wall time and pipeline stage
//! counts for one network run, split between accelerator dispatches and
//! host-side transforms.

use accel_core::DispatchStats;
use layer_ir::LayerKind;
use std::time::Duration;

/// Metrics for a single layer's execution.
#[derive(Debug, Clone, serde::Serialize)]
pub struct LayerMetrics {
    pub layer: usize,
    pub kind: LayerKind,
    /// Wall time from the layer's start until its output was complete.
    pub duration: Duration,
    /// Stage counts; `None` for layers run on the host.
    pub dispatch: Option<DispatchStats>,
}

impl LayerMetrics {
    pub fn on_accelerator(&self) -> bool {
        self.dispatch.is_some()
    }
}

/// Aggregate metrics for a complete inference run.
#[derive(Debug, Clone, serde::Serialize)]
pub struct InferenceMetrics {
    /// Accelerator the run was dispatched to.
    pub accelerator: String,
    /// Total wall-clock time for the run, input load and extraction included.
    pub total_duration: Duration,
    /// Time spent in accelerator dispatches.
    pub accel_duration: Duration,
    /// Time spent in host-side transforms.
    pub host_duration: Duration,
    /// Stage counts summed over every dispatch.
    pub dispatch: DispatchStats,
    /// Per-layer metrics. Empty when profiling is disabled.
    pub layer_metrics: Vec<LayerMetrics>,
    /// Layers executed, recorded or not.
    pub layers_run: usize,
}

impl InferenceMetrics {
    /// Creates an empty metrics container.
    pub fn new(accelerator: &str) -> Self {
        Self {
            accelerator: accelerator.to_string(),
            total_duration: Duration::ZERO,
            accel_duration: Duration::ZERO,
            host_duration: Duration::ZERO,
            dispatch: DispatchStats::default(),
            layer_metrics: Vec::new(),
            layers_run: 0,
        }
    }

    /// Adds one layer to the totals, keeping its entry when `keep` is set.
    pub fn record_layer(&mut self, layer: LayerMetrics, keep: bool) {
        self.layers_run += 1;
        match &layer.dispatch {
            Some(stats) => {
                self.accel_duration += layer.duration;
                self.dispatch.merge(stats);
            }
            None => self.host_duration += layer.duration,
        }
        if keep {
            self.layer_metrics.push(layer);
        }
    }

    /// Finalises metrics with the total wall-clock time.
    pub fn finalise(&mut self, total: Duration) {
        self.total_duration = total;
    }

    /// The slowest recorded layer.
    pub fn slowest_layer(&self) -> Option<&LayerMetrics> {
        self.layer_metrics.iter().max_by_key(|m| m.duration)
    }

    /// Returns a human-readable summary suitable for CLI output.
    pub fn summary(&self) -> String {
        let accel_pct = if self.total_duration.as_secs_f64() > 0.0 {
            self.accel_duration.as_secs_f64() / self.total_duration.as_secs_f64() * 100.0
        } else {
            0.0
        };

        format!(
            "Inference on '{}': {:.2}ms total, {} layers, \
             {:.2}ms accelerator ({:.0}%), {:.2}ms host, \
             {} spatial tiles, {} pipeline steps ({} loads / {} computes / {} writes)",
            self.accelerator,
            self.total_duration.as_secs_f64() * 1000.0,
            self.layers_run,
            self.accel_duration.as_secs_f64() * 1000.0,
            accel_pct,
            self.host_duration.as_secs_f64() * 1000.0,
            self.dispatch.spatial_tiles,
            self.dispatch.steps,
            self.dispatch.loads,
            self.dispatch.computes,
            self.dispatch.writes,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conv(layer: usize, ms: u64, steps: usize) -> LayerMetrics {
        LayerMetrics {
            layer,
            kind: LayerKind::Conv,
            duration: Duration::from_millis(ms),
            dispatch: Some(DispatchStats {
                spatial_tiles: 1,
                steps,
                loads: steps - 1,
                computes: steps - 1,
                writes: steps - 1,
            }),
        }
    }

    #[test]
    fn test_empty_metrics() {
        let m = InferenceMetrics::new("reference");
        assert_eq!(m.layers_run, 0);
        assert!(m.slowest_layer().is_none());
        assert!(m.summary().contains("0 layers"));
    }

    #[test]
    fn test_record_and_finalise() {
        let mut m = InferenceMetrics::new("reference");
        m.record_layer(conv(0, 5, 3), true);
        m.record_layer(conv(1, 10, 5), true);
        m.record_layer(
            LayerMetrics {
                layer: 2,
                kind: LayerKind::Reorg,
                duration: Duration::from_millis(2),
                dispatch: None,
            },
            true,
        );
        m.finalise(Duration::from_millis(20));

        assert_eq!(m.accel_duration, Duration::from_millis(15));
        assert_eq!(m.host_duration, Duration::from_millis(2));
        assert_eq!(m.dispatch.steps, 8);
        assert_eq!(m.dispatch.writes, 6);
        assert_eq!(m.slowest_layer().unwrap().layer, 1);
        assert!(!m.layer_metrics[2].on_accelerator());

        let s = m.summary();
        assert!(s.contains("3 layers"));
        assert!(s.contains("75%"));
    }

    #[test]
    fn test_unrecorded_layers_still_count() {
        let mut m = InferenceMetrics::new("reference");
        m.record_layer(conv(0, 1, 2), false);
        assert_eq!(m.layers_run, 1);
        assert!(m.layer_metrics.is_empty());
        assert_eq!(m.dispatch.steps, 2);
    }
}
