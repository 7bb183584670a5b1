//! Observation storage shared between the experiment worker and the
//! protocol responder.
//!
//! [`Data`] is the plain aggregate: parallel `positions`/`scores`/`variances`
//! sequences, per-observation metric columns, and whole-of-dataset `states`
//! artifacts. [`Dataset`] wraps it in an `Arc<RwLock<..>>` with a
//! single-writer/multi-reader discipline: the worker thread appends under
//! the write lock while the responder serializes snapshots under the read
//! lock. Quick client polls only contend with the short write windows.
//! Long engine computations must copy what they need out of the read lock
//! first (see [`crate::adaptive`]).
//!
//! # Metric policy
//!
//! Metric keys are dynamic and may appear mid-run. A key first seen at
//! observation `i` is backfilled with `None` for observations `0..i`, and a
//! key absent from a later observation gets `None` appended. Every metric
//! column therefore always has exactly `len()` entries.

use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

/// A point in parameter-bound space, one coordinate per axis.
pub type Position = Vec<f64>;

/// One measured observation produced by an execution backend.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    pub position: Position,
    pub score: f64,
    pub variance: f64,
    /// Side metadata keyed by metric name. Keys may differ between
    /// measurements; see the module-level metric policy.
    #[serde(default)]
    pub metrics: BTreeMap<String, f64>,
}

impl Measurement {
    pub fn new(position: Position, score: f64, variance: f64) -> Self {
        Self {
            position,
            score,
            variance,
            metrics: BTreeMap::new(),
        }
    }

    pub fn with_metric(mut self, name: impl Into<String>, value: f64) -> Self {
        self.metrics.insert(name.into(), value);
        self
    }
}

/// The accumulated observations of one experiment run.
///
/// Invariants maintained by every mutation:
/// - `positions`, `scores` and `variances` always have equal length;
/// - every metric column has exactly `len()` entries;
/// - `dimensionality` is fixed once the first observation arrives.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Data {
    pub dimensionality: Option<usize>,
    pub positions: Vec<Position>,
    pub scores: Vec<f64>,
    pub variances: Vec<f64>,
    #[serde(default)]
    pub metrics: BTreeMap<String, Vec<Option<f64>>>,
    /// Whole-of-dataset computed artifacts (posterior images, best-observed
    /// summaries). Overwritten wholesale by engines, never appended.
    #[serde(default)]
    pub states: BTreeMap<String, serde_json::Value>,
    /// Rendering-hint tags for client-side graphs; opaque to the core.
    #[serde(default)]
    pub graphics_items: BTreeMap<String, String>,
}

impl Data {
    pub fn new(dimensionality: usize) -> Self {
        Self {
            dimensionality: Some(dimensionality),
            ..Self::default()
        }
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Appends a batch of measurements. All-or-nothing: the whole batch is
    /// validated against the fixed dimensionality before anything is
    /// mutated, so a bad item never leaves a partially applied batch behind.
    pub fn inject_new(&mut self, batch: &[Measurement]) -> CoreResult<()> {
        let expected = self
            .dimensionality
            .or_else(|| batch.first().map(|m| m.position.len()));
        if let Some(expected) = expected {
            for measurement in batch {
                if measurement.position.len() != expected {
                    return Err(CoreError::Dimensionality {
                        expected,
                        actual: measurement.position.len(),
                    });
                }
            }
        }
        if self.dimensionality.is_none() {
            self.dimensionality = expected;
        }

        for measurement in batch {
            let index = self.positions.len();
            self.positions.push(measurement.position.clone());
            self.scores.push(measurement.score);
            self.variances.push(measurement.variance);
            for (name, value) in &measurement.metrics {
                // Lazily created keys are backfilled with None for all
                // earlier observations.
                let column = self
                    .metrics
                    .entry(name.clone())
                    .or_insert_with(|| vec![None; index]);
                column.push(Some(*value));
            }
            // Keys this measurement did not mention get a null entry.
            for column in self.metrics.values_mut() {
                if column.len() < self.positions.len() {
                    column.push(None);
                }
            }
        }
        Ok(())
    }

    /// Merges another dataset onto this one: sequences are concatenated,
    /// metric columns merged with null padding, `dimensionality` and
    /// `states` adopted from `other`, and `graphics_items` merged.
    pub fn extend(&mut self, other: Data) {
        let old_len = self.positions.len();
        self.positions.extend(other.positions);
        self.scores.extend(other.scores);
        self.variances.extend(other.variances);
        let new_len = self.positions.len();

        for (name, theirs) in other.metrics {
            let column = self
                .metrics
                .entry(name)
                .or_insert_with(|| vec![None; old_len]);
            column.resize(old_len, None);
            column.extend(theirs);
        }
        for column in self.metrics.values_mut() {
            column.resize(new_len, None);
        }

        self.dimensionality = other.dimensionality.or(self.dimensionality);
        self.states = other.states;
        self.graphics_items.extend(other.graphics_items);
    }

    /// Returns a new `Data` holding only observations from `start` onward.
    /// The slice owns its storage and shares nothing mutable with `self`.
    pub fn slice(&self, start: usize) -> Data {
        let start = start.min(self.len());
        Data {
            dimensionality: self.dimensionality,
            positions: self.positions[start..].to_vec(),
            scores: self.scores[start..].to_vec(),
            variances: self.variances[start..].to_vec(),
            metrics: self
                .metrics
                .iter()
                .map(|(name, column)| (name.clone(), column[start..].to_vec()))
                .collect(),
            states: self.states.clone(),
            graphics_items: self.graphics_items.clone(),
        }
    }

    /// Checks the cross-field invariants on an externally supplied dataset
    /// (a client push or a restored snapshot). Internally grown data holds
    /// these invariants by construction; pushed data must be rejected before
    /// installation, not trusted.
    pub fn validate(&self) -> CoreResult<()> {
        let len = self.positions.len();
        if self.scores.len() != len || self.variances.len() != len {
            return Err(CoreError::InvalidData(format!(
                "parallel sequences disagree: {len} positions, {} scores, {} variances",
                self.scores.len(),
                self.variances.len()
            )));
        }
        if let Some(expected) = self.dimensionality {
            if let Some(position) = self.positions.iter().find(|p| p.len() != expected) {
                return Err(CoreError::Dimensionality {
                    expected,
                    actual: position.len(),
                });
            }
        } else if !self.positions.is_empty() {
            return Err(CoreError::InvalidData(
                "dimensionality unset on a populated dataset".into(),
            ));
        }
        for (name, column) in &self.metrics {
            if column.len() > len {
                return Err(CoreError::InvalidData(format!(
                    "metric {name:?} has {} entries for {len} observations",
                    column.len()
                )));
            }
        }
        Ok(())
    }
}

/// Thread-safe handle to a [`Data`] aggregate.
///
/// Clones share the same underlying storage. The worker thread appends
/// through the write lock; the protocol responder reads consistent
/// snapshots through the read lock. Lock poisoning is recovered by
/// adopting the inner value: the invariants hold after every complete
/// mutation, and panics never leave a batch half-applied (see
/// [`Data::inject_new`]).
#[derive(Clone, Debug, Default)]
pub struct Dataset {
    inner: Arc<RwLock<Data>>,
}

impl Dataset {
    pub fn new(data: Data) -> Self {
        Self {
            inner: Arc::new(RwLock::new(data)),
        }
    }

    /// Acquires the shared read lock. Concurrent readers are allowed;
    /// holders block the writer, so keep the guard short-lived and copy out
    /// anything expensive to compute on.
    pub fn read(&self) -> RwLockReadGuard<'_, Data> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Acquires the exclusive write lock, blocking readers.
    pub fn write(&self) -> RwLockWriteGuard<'_, Data> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    pub fn dimensionality(&self) -> Option<usize> {
        self.read().dimensionality
    }

    /// Appends a batch atomically under the write lock.
    pub fn inject_new(&self, batch: &[Measurement]) -> CoreResult<()> {
        self.write().inject_new(batch)
    }

    /// Merges `other` onto this dataset under the write lock.
    pub fn extend(&self, other: Data) {
        self.write().extend(other);
    }

    /// Copy-on-slice tail view, computed under the read lock.
    pub fn slice(&self, start: usize) -> Data {
        self.read().slice(start)
    }

    /// Consistent cross-field snapshot for wire transfer or persistence.
    pub fn snapshot(&self) -> Data {
        self.read().clone()
    }

    /// Wholesale replacement (Stop reset, client data push). Returns the
    /// previous contents.
    pub fn replace(&self, data: Data) -> Data {
        std::mem::replace(&mut *self.write(), data)
    }

    pub fn clear(&self) {
        *self.write() = Data::default();
    }
}
