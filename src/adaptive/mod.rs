//! Capability interface for pluggable adaptive optimizers.
//!
//! The core never knows which optimization strategy is in use; it only
//! drives this trait once per experiment iteration. Concrete strategies
//! (Gaussian-process regression, random sampling, ...) live behind it; this
//! crate ships [`random::RandomSampler`] as the in-process reference
//! strategy.
//!
//! # Lock discipline
//!
//! `update_measurements` must only read the [`Dataset`] under its read lock
//! and copy out the arrays it needs before any long model computation, so a
//! slow posterior update never starves client polls. `update_metrics` is the
//! inverse: compute outside the lock, then take the write lock only to store
//! the finished artifacts into `states`/`metrics`.

pub mod random;

pub use random::RandomSampler;

use crate::data::{Dataset, Position};
use crate::error::CoreResult;
use crate::params::ParameterTree;

/// One pluggable optimization strategy.
///
/// Errors returned from [`request_targets`](Self::request_targets),
/// [`update_measurements`](Self::update_measurements) or
/// [`train`](Self::train) during the experiment loop are captured by the
/// worker thread and pause the run; they never crash the core.
pub trait AdaptiveEngine: Send {
    /// Number of axes in parameter-bound space.
    fn dimensionality(&self) -> usize;

    /// Re-initializes internal model state. Called once on the
    /// Inactive→Starting transition; discards trained state but not the
    /// dataset.
    fn reset(&mut self);

    /// Incorporates new observations into the strategy's internal model.
    fn update_measurements(&mut self, data: &Dataset) -> CoreResult<()>;

    /// Computes derived quantities and writes them into `data.states` /
    /// `data.metrics`. Keep the write-lock window short.
    fn update_metrics(&mut self, _data: &Dataset) -> CoreResult<()> {
        Ok(())
    }

    /// Returns `n` new candidate sample positions given the current
    /// instrument position. Must respect the configured axis bounds.
    fn request_targets(&mut self, position: &Position, n: usize) -> CoreResult<Vec<Position>>;

    /// Optionally retrains hyperparameters. Called unconditionally once per
    /// iteration; implementations gate on their own observation-count
    /// checkpoints and must not retrigger for a checkpoint already trained.
    fn train(&mut self) -> CoreResult<()> {
        Ok(())
    }

    /// The strategy's tunable configuration, proxied to clients through
    /// `GetParameters`/`SetParameter`.
    fn parameters(&self) -> &ParameterTree;

    fn parameters_mut(&mut self) -> &mut ParameterTree;
}
