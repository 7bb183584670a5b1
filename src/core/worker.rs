//! The experiment loop, run on its own OS thread.
//!
//! Measurement and model computation block for arbitrarily long, so they
//! live here rather than on the control loop. The thread loops while the
//! shared state reads `Running`, idles through the transient pause states
//! and exits on anything terminal; a failed iteration is queued as an
//! exception and forces `Pausing` instead of crashing the thread.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Instant;

use tracing::{error, info, trace};

use super::state::{CoreState, SharedState};
use super::{lock, panic_message, ExceptionQueue, Overrides};
use crate::adaptive::AdaptiveEngine;
use crate::config::ExperimentSettings;
use crate::data::Dataset;
use crate::error::{CoreError, CoreResult};
use crate::execution::ExecutionEngine;
use crate::graphs::GraphRegistry;

/// Everything the worker shares with the control loop.
pub(crate) struct WorkerContext {
    pub state: SharedState,
    pub data: Dataset,
    pub adaptive: Arc<Mutex<Box<dyn AdaptiveEngine>>>,
    pub execution: Arc<Mutex<Box<dyn ExecutionEngine>>>,
    pub overrides: Overrides,
    pub exceptions: ExceptionQueue,
    pub graphs: Arc<Mutex<GraphRegistry>>,
    pub settings: ExperimentSettings,
}

pub(crate) fn spawn(ctx: WorkerContext) -> CoreResult<thread::JoinHandle<()>> {
    let handle = thread::Builder::new()
        .name("experiment-worker".into())
        .spawn(move || run(ctx))?;
    Ok(handle)
}

fn run(ctx: WorkerContext) {
    info!("experiment worker started");
    loop {
        match ctx.state.load() {
            // A panicking engine must not kill the thread silently: the
            // state would read Running forever with no data arriving.
            // Panics pause the run exactly like returned errors do.
            CoreState::Running => match catch_unwind(AssertUnwindSafe(|| iterate(&ctx))) {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    error!(error = %err, "iteration failed, pausing run");
                    ctx.exceptions.push(err.to_string());
                    ctx.state.store(CoreState::Pausing);
                }
                Err(panic) => {
                    let message = panic_message(panic);
                    error!(%message, "iteration panicked, pausing run");
                    ctx.exceptions
                        .push(CoreError::WorkerPanic(message).to_string());
                    ctx.state.store(CoreState::Pausing);
                }
            },
            CoreState::Starting
            | CoreState::Pausing
            | CoreState::Paused
            | CoreState::Resuming => thread::sleep(ctx.settings.worker_idle),
            _ => break,
        }
    }
    info!("experiment worker exiting");
}

/// One experiment iteration: position, targets, measurements, model update.
///
/// Engine locks are taken per step, never across the measurement wait, so
/// the control loop can always answer parameter requests mid-iteration.
fn iterate(ctx: &WorkerContext) -> CoreResult<()> {
    let dimensionality = lock(&ctx.adaptive).dimensionality();
    let position = timed("get_position", || lock(&ctx.execution).get_position())
        .unwrap_or_else(|| vec![0.0; dimensionality]);

    // Overrides pop in lock-step: a replayed iteration carries both a
    // position and its measurement, a manual measure request only a position.
    let (forced_position, forced_measurement) = ctx.overrides.pop_pair();

    let measurements = match forced_measurement {
        Some(measurement) => vec![measurement],
        None => {
            let targets = match forced_position {
                Some(target) => vec![target],
                None => timed("request_targets", || {
                    lock(&ctx.adaptive).request_targets(&position, ctx.settings.batch_size)
                })?,
            };
            timed("update_targets", || {
                lock(&ctx.execution).update_targets(targets);
            });
            loop {
                let batch = timed("get_measurements", || {
                    lock(&ctx.execution).get_measurements()
                })?;
                if !batch.is_empty() {
                    break batch;
                }
                // Stay cooperative while the backend measures.
                if ctx.state.load() != CoreState::Running {
                    return Ok(());
                }
                thread::sleep(ctx.settings.measure_poll);
            }
        }
    };

    let last_size = ctx.data.len();
    timed("inject_new", || ctx.data.inject_new(&measurements))?;
    timed("update_measurements", || {
        lock(&ctx.adaptive).update_measurements(&ctx.data)
    })?;
    timed("update_metrics", || {
        lock(&ctx.adaptive).update_metrics(&ctx.data)
    })?;

    let snapshot = ctx.data.snapshot();
    timed("update_graphs", || {
        lock(&ctx.graphs).update_all(&snapshot, last_size);
    });

    timed("train", || lock(&ctx.adaptive).train())?;
    Ok(())
}

fn timed<T>(step: &'static str, f: impl FnOnce() -> T) -> T {
    let start = Instant::now();
    let out = f();
    trace!(step, elapsed_us = start.elapsed().as_micros() as u64, "iteration step");
    out
}
