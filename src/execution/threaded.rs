//! Background-thread measurement backend.
//!
//! A dedicated OS thread consumes a target queue and appends finished
//! measurements, decoupling measurement latency from the experiment loop the
//! way a real instrument does. Each measurement is stamped with a
//! `timestamp` metric (seconds since the UNIX epoch).
//!
//! Shutdown is cooperative: dropping the engine raises the exit flag, wakes
//! the thread and joins it.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

use chrono::Utc;
use tracing::warn;

use super::ExecutionEngine;
use crate::data::{Measurement, Position};
use crate::error::{CoreError, CoreResult};

/// How long the measure thread sleeps on an empty queue before rechecking
/// the exit flag.
const IDLE_WAIT: Duration = Duration::from_millis(100);

type ThreadedMeasureFn = Box<dyn Fn(&Position) -> CoreResult<Measurement> + Send>;

struct Shared {
    targets: Mutex<VecDeque<Position>>,
    available: Condvar,
    measurements: Mutex<Vec<Measurement>>,
    position: Mutex<Option<Position>>,
    fault: Mutex<Option<String>>,
    exiting: AtomicBool,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct ThreadedEngine {
    shared: Arc<Shared>,
    handle: Option<thread::JoinHandle<()>>,
}

impl ThreadedEngine {
    pub fn new(measure: impl Fn(&Position) -> CoreResult<Measurement> + Send + 'static) -> Self {
        let shared = Arc::new(Shared {
            targets: Mutex::new(VecDeque::new()),
            available: Condvar::new(),
            measurements: Mutex::new(Vec::new()),
            position: Mutex::new(None),
            fault: Mutex::new(None),
            exiting: AtomicBool::new(false),
        });

        let worker_shared = shared.clone();
        let measure: ThreadedMeasureFn = Box::new(measure);
        let handle = thread::spawn(move || measure_loop(&worker_shared, measure));

        Self {
            shared,
            handle: Some(handle),
        }
    }
}

fn measure_loop(shared: &Shared, measure: ThreadedMeasureFn) {
    loop {
        let target = {
            let mut targets = lock(&shared.targets);
            loop {
                if shared.exiting.load(Ordering::SeqCst) {
                    return;
                }
                if let Some(target) = targets.pop_front() {
                    break target;
                }
                let (guard, _) = shared
                    .available
                    .wait_timeout(targets, IDLE_WAIT)
                    .unwrap_or_else(PoisonError::into_inner);
                targets = guard;
            }
        };

        *lock(&shared.position) = Some(target.clone());
        match measure(&target) {
            Ok(measurement) => {
                let stamped = measurement
                    .with_metric("timestamp", Utc::now().timestamp_millis() as f64 / 1000.0);
                lock(&shared.measurements).push(stamped);
            }
            Err(err) => {
                // Surface to the next get_measurements drain.
                *lock(&shared.fault) = Some(err.to_string());
            }
        }
    }
}

impl ExecutionEngine for ThreadedEngine {
    fn get_position(&mut self) -> Option<Position> {
        lock(&self.shared.position).clone()
    }

    fn update_targets(&mut self, targets: Vec<Position>) {
        // Clear-then-refill as one logical operation under the queue lock.
        let mut queue = lock(&self.shared.targets);
        queue.clear();
        queue.extend(targets);
        drop(queue);
        self.shared.available.notify_all();
    }

    fn get_measurements(&mut self) -> CoreResult<Vec<Measurement>> {
        if let Some(message) = lock(&self.shared.fault).take() {
            return Err(CoreError::Execution(message));
        }
        Ok(std::mem::take(&mut *lock(&self.shared.measurements)))
    }
}

impl Drop for ThreadedEngine {
    fn drop(&mut self) {
        self.shared.exiting.store(true, Ordering::SeqCst);
        self.shared.available.notify_all();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("measure thread panicked during shutdown");
            }
        }
    }
}
