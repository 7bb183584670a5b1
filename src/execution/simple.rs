//! Synchronous in-process measurement backend.
//!
//! Wraps a plain measure closure: queued targets are measured one by one
//! inside [`get_measurements`](super::ExecutionEngine::get_measurements).
//! Intended for simulated surfaces and deterministic tests, where the
//! measurement is a cheap function call rather than instrument motion.

use std::collections::VecDeque;

use super::ExecutionEngine;
use crate::data::{Measurement, Position};
use crate::error::CoreResult;

/// Boxed measure function: position in, measurement out.
pub type MeasureFn = Box<dyn FnMut(&Position) -> CoreResult<Measurement> + Send>;

pub struct SimpleEngine {
    measure: MeasureFn,
    targets: VecDeque<Position>,
    position: Option<Position>,
}

impl SimpleEngine {
    pub fn new(measure: impl FnMut(&Position) -> CoreResult<Measurement> + Send + 'static) -> Self {
        Self {
            measure: Box::new(measure),
            targets: VecDeque::new(),
            position: None,
        }
    }
}

impl ExecutionEngine for SimpleEngine {
    fn get_position(&mut self) -> Option<Position> {
        self.position.clone()
    }

    fn update_targets(&mut self, targets: Vec<Position>) {
        self.targets.clear();
        self.targets.extend(targets);
    }

    fn get_measurements(&mut self) -> CoreResult<Vec<Measurement>> {
        let mut measurements = Vec::with_capacity(self.targets.len());
        while let Some(target) = self.targets.pop_front() {
            let measurement = (self.measure)(&target)?;
            self.position = Some(target);
            measurements.push(measurement);
        }
        Ok(measurements)
    }
}
