//! Uniform-random sampling strategy.
//!
//! The simplest useful adaptive engine: every target is drawn uniformly
//! within the configured per-axis bounds, ignoring accumulated observations.
//! Useful as a coverage baseline and as the reference implementation of the
//! [`AdaptiveEngine`](super::AdaptiveEngine) contract, including the
//! checkpointed `train` policy and the short-write-window metric update.

use rand::Rng;
use tracing::debug;

use super::AdaptiveEngine;
use crate::data::{Dataset, Position};
use crate::error::{CoreError, CoreResult};
use crate::params::{Parameter, ParameterTree};

const DEFAULT_TRAINING_INTERVAL: usize = 2000;

pub struct RandomSampler {
    dimensionality: usize,
    parameters: ParameterTree,
    /// Observation count as of the last `update_measurements`.
    observed: usize,
    /// Last training checkpoint index acted on; checkpoints never retrigger.
    trained_checkpoint: usize,
    training_interval: usize,
}

impl RandomSampler {
    /// Creates a sampler with one `(min, max)` bound per axis. Bounds are
    /// exposed on the parameter tree as `bounds/axis_<i>_min|max` and may be
    /// changed mid-run by clients.
    pub fn new(bounds: Vec<(f64, f64)>) -> Self {
        let dimensionality = bounds.len();
        let mut parameters = ParameterTree::new();
        for (axis, (min, max)) in bounds.into_iter().enumerate() {
            parameters.insert(
                format!("bounds/axis_{axis}_min"),
                Parameter::new(min).with_title(format!("Axis #{} min", axis + 1)),
            );
            parameters.insert(
                format!("bounds/axis_{axis}_max"),
                Parameter::new(max).with_title(format!("Axis #{} max", axis + 1)),
            );
        }
        Self {
            dimensionality,
            parameters,
            observed: 0,
            trained_checkpoint: 0,
            training_interval: DEFAULT_TRAINING_INTERVAL,
        }
    }

    /// Overrides the observation-count interval between training
    /// checkpoints.
    pub fn with_training_interval(mut self, interval: usize) -> Self {
        self.training_interval = interval.max(1);
        self
    }

    fn axis_bounds(&self, axis: usize) -> CoreResult<(f64, f64)> {
        let min = self.parameters.get_f64(&format!("bounds/axis_{axis}_min"))?;
        let max = self.parameters.get_f64(&format!("bounds/axis_{axis}_max"))?;
        if min > max {
            return Err(CoreError::ParameterInvalid(format!(
                "axis {axis} bounds inverted: [{min}, {max}]"
            )));
        }
        Ok((min, max))
    }
}

impl AdaptiveEngine for RandomSampler {
    fn dimensionality(&self) -> usize {
        self.dimensionality
    }

    fn reset(&mut self) {
        self.observed = 0;
        self.trained_checkpoint = 0;
    }

    fn update_measurements(&mut self, data: &Dataset) -> CoreResult<()> {
        // Random sampling keeps no model; it only tracks the observation
        // count for the training checkpoint policy.
        self.observed = data.len();
        Ok(())
    }

    fn update_metrics(&mut self, data: &Dataset) -> CoreResult<()> {
        // Copy out of the read lock, compute, then write briefly.
        let (positions, scores) = {
            let data = data.read();
            (data.positions.clone(), data.scores.clone())
        };
        let Some((index, best)) = scores
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
        else {
            return Ok(());
        };
        let summary = serde_json::json!({
            "best_score": best,
            "best_position": positions[index],
        });

        let mut data = data.write();
        data.states.insert("best_observed".into(), summary);
        data.graphics_items
            .insert("best_observed".into(), "scatter".into());
        Ok(())
    }

    fn request_targets(&mut self, _position: &Position, n: usize) -> CoreResult<Vec<Position>> {
        let mut rng = rand::thread_rng();
        let mut targets = Vec::with_capacity(n);
        for _ in 0..n {
            let mut target = Vec::with_capacity(self.dimensionality);
            for axis in 0..self.dimensionality {
                let (min, max) = self.axis_bounds(axis)?;
                target.push(rng.gen_range(min..=max));
            }
            targets.push(target);
        }
        Ok(targets)
    }

    fn train(&mut self) -> CoreResult<()> {
        let checkpoint = self.observed / self.training_interval;
        if checkpoint > self.trained_checkpoint && self.observed > 0 {
            // No hyperparameters to fit; record the checkpoint so it cannot
            // retrigger.
            self.trained_checkpoint = checkpoint;
            debug!(observed = self.observed, checkpoint, "training checkpoint crossed");
        }
        Ok(())
    }

    fn parameters(&self) -> &ParameterTree {
        &self.parameters
    }

    fn parameters_mut(&mut self) -> &mut ParameterTree {
        &mut self.parameters
    }
}
