//! The orchestrating state machine.
//!
//! One [`Core`] owns the run lifecycle. A foreground async loop resolves
//! state transitions and answers control requests; a background OS thread
//! ([`worker`]) drives experiment iterations against the same shared
//! dataset. The shared surface between the two is deliberately small: the
//! atomic state cell, the dataset's reader/writer lock and a few locked
//! queues.

pub mod state;
pub(crate) mod worker;

pub use state::{CoreState, SharedState};

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;

use tracing::{error, info, warn};
use uuid::Uuid;

use crate::adaptive::AdaptiveEngine;
use crate::config::Settings;
use crate::data::{Data, Dataset, Measurement, Position};
use crate::error::{CoreError, CoreResult};
use crate::execution::ExecutionEngine;
use crate::graphs::{GraphRegistry, GraphUpdater};
use crate::net::{CoreTransport, Incoming, Request, Response};
use crate::session::Snapshot;

pub(crate) fn lock<T: ?Sized>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn panic_message(panic: Box<dyn std::any::Any + Send>) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "worker thread panicked".into())
}

/// Forced-position/measurement override queues.
///
/// `Measure` queues a position alone; `Replay` refills both queues in
/// lock-step so each replayed iteration pops one of each.
#[derive(Clone, Default)]
pub(crate) struct Overrides {
    positions: Arc<Mutex<VecDeque<Position>>>,
    measurements: Arc<Mutex<VecDeque<Measurement>>>,
}

impl Overrides {
    pub fn queue_position(&self, position: Position) -> usize {
        let mut queue = lock(&self.positions);
        queue.push_back(position);
        queue.len()
    }

    /// Clears and refills both queues under both locks, so a concurrent
    /// iteration never observes a half-replaced replay sequence.
    pub fn replay(&self, positions: Vec<Position>, measurements: Vec<Measurement>) -> usize {
        let mut position_queue = lock(&self.positions);
        let mut measurement_queue = lock(&self.measurements);
        position_queue.clear();
        measurement_queue.clear();
        position_queue.extend(positions);
        measurement_queue.extend(measurements);
        position_queue.len().max(measurement_queue.len())
    }

    pub fn pop_pair(&self) -> (Option<Position>, Option<Measurement>) {
        let mut position_queue = lock(&self.positions);
        let mut measurement_queue = lock(&self.measurements);
        (position_queue.pop_front(), measurement_queue.pop_front())
    }
}

/// Worker-thread faults awaiting a `GetState` poll.
#[derive(Clone, Default)]
pub(crate) struct ExceptionQueue {
    inner: Arc<Mutex<VecDeque<String>>>,
}

impl ExceptionQueue {
    pub fn push(&self, message: String) {
        lock(&self.inner).push_back(message);
    }

    pub fn pop(&self) -> Option<String> {
        lock(&self.inner).pop_front()
    }
}

pub struct Core {
    settings: Settings,
    state: SharedState,
    data: Dataset,
    adaptive: Arc<Mutex<Box<dyn AdaptiveEngine>>>,
    execution: Arc<Mutex<Box<dyn ExecutionEngine>>>,
    overrides: Overrides,
    exceptions: ExceptionQueue,
    graphs: Arc<Mutex<GraphRegistry>>,
    worker: Option<thread::JoinHandle<()>>,
    run_id: Option<String>,
}

impl Core {
    /// Engines are injected, never resolved through globals.
    pub fn new(adaptive: Box<dyn AdaptiveEngine>, execution: Box<dyn ExecutionEngine>) -> Self {
        Self {
            settings: Settings::default(),
            state: SharedState::default(),
            data: Dataset::default(),
            adaptive: Arc::new(Mutex::new(adaptive)),
            execution: Arc::new(Mutex::new(execution)),
            overrides: Overrides::default(),
            exceptions: ExceptionQueue::default(),
            graphs: Arc::new(Mutex::new(GraphRegistry::default())),
            worker: None,
            run_id: None,
        }
    }

    pub fn with_settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    /// Seeds the dataset, e.g. from a restored snapshot.
    pub fn with_dataset(mut self, data: Data) -> Self {
        self.data = Dataset::new(data);
        self
    }

    pub fn register_graph(&mut self, updater: Box<dyn GraphUpdater>) {
        lock(&self.graphs).register(updater);
    }

    pub fn state(&self) -> CoreState {
        self.state.load()
    }

    /// Shared handle onto the live dataset.
    pub fn dataset(&self) -> Dataset {
        self.data.clone()
    }

    pub fn run_id(&self) -> Option<&str> {
        self.run_id.as_deref()
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Restorable snapshot of dataset plus engine parameters.
    pub fn snapshot(&self) -> Snapshot {
        let run_id = self.run_id.clone().unwrap_or_else(|| "unstarted".into());
        let parameters = lock(&self.adaptive).parameters().as_json();
        Snapshot::new(run_id, self.data.snapshot(), parameters)
    }

    /// Binds the control channel and runs the core loop until `Exit`.
    pub async fn serve(mut self) -> CoreResult<()> {
        let mut transport = CoreTransport::bind(&self.settings.server.bind_addr).await?;
        self.run(&mut transport).await
    }

    /// The foreground loop: resolve one state transition, service at most
    /// one request, repeat until `Exiting`.
    pub async fn run(&mut self, transport: &mut CoreTransport) -> CoreResult<()> {
        info!(state = %self.state.load(), "core loop running");
        loop {
            self.tick();
            match transport.poll(self.settings.server.poll_timeout).await {
                Ok(Some(Incoming::Request(request))) => {
                    // Boot state resolves once a client actually talks to us.
                    self.state.transition(CoreState::Connecting, CoreState::Inactive);
                    let response = self.dispatch(request);
                    if let Err(err) = transport.reply(&response).await {
                        warn!(error = %err, "reply failed");
                    }
                }
                Ok(Some(Incoming::Malformed(message))) => {
                    error!(%message, "unrecognized request");
                    if let Err(err) = transport.reply(&Response::Unknown { message }).await {
                        warn!(error = %err, "reply failed");
                    }
                }
                Ok(None) => {}
                Err(err) => warn!(error = %err, "transport poll failed"),
            }
            if self.state.load() == CoreState::Exiting {
                self.join_worker();
                info!("core loop exited");
                return Ok(());
            }
        }
    }

    /// Resolves transient states. Request handlers only ever enter the
    /// requesting states; this is where they land.
    fn tick(&mut self) {
        match self.state.load() {
            CoreState::Starting => {
                if self.data.is_empty() {
                    let dimensionality = lock(&self.adaptive).dimensionality();
                    self.data.replace(Data::new(dimensionality));
                }
                lock(&self.adaptive).reset();
                let run_id = self
                    .run_id
                    .get_or_insert_with(|| Uuid::new_v4().to_string())
                    .clone();
                if let Err(err) = self.spawn_worker() {
                    error!(error = %err, "worker spawn failed");
                    self.exceptions.push(err.to_string());
                    self.state.store(CoreState::Inactive);
                    return;
                }
                self.state.store(CoreState::Running);
                info!(%run_id, "run started");
            }
            // The worker may have forced Pausing itself; either way it idles
            // from here on, so the resolve is immediate.
            CoreState::Pausing => {
                self.state.transition(CoreState::Pausing, CoreState::Paused);
                info!("run paused");
            }
            CoreState::Resuming => {
                self.state.store(CoreState::Running);
                info!("run resumed");
            }
            CoreState::Stopping => {
                self.join_worker();
                self.data.clear();
                self.run_id = None;
                self.state.store(CoreState::Inactive);
                info!("run stopped, dataset reset");
            }
            CoreState::Restarting => {
                self.join_worker();
                self.state.store(CoreState::Starting);
            }
            _ => {}
        }
    }

    /// Closed dispatch table: every request kind answers with its paired
    /// response kind, errors surface as `Exception`.
    fn dispatch(&mut self, request: Request) -> Response {
        match request {
            Request::Connect => self.state_response(),
            Request::GetState => match self.exceptions.pop() {
                Some(message) => Response::Exception {
                    state: self.state.load(),
                    message,
                },
                None => self.state_response(),
            },
            Request::Start => {
                match self.state.load() {
                    CoreState::Inactive => self.state.store(CoreState::Starting),
                    CoreState::Paused => self.state.store(CoreState::Resuming),
                    // Double-start is a safe no-op.
                    _ => {}
                }
                self.state_response()
            }
            Request::Pause => {
                match self.state.load() {
                    CoreState::Starting | CoreState::Running | CoreState::Resuming => {
                        self.state.store(CoreState::Pausing);
                    }
                    _ => {}
                }
                self.state_response()
            }
            Request::Stop => {
                // No-op when no worker exists, so Stop from Inactive neither
                // errors nor wipes pushed data.
                if self.state.load().is_active() {
                    self.state.store(CoreState::Stopping);
                    self.join_worker();
                }
                self.state_response()
            }
            Request::Exit => {
                self.state.store(CoreState::Exiting);
                self.join_worker();
                self.state_response()
            }
            Request::FullData => Response::FullData {
                data: self.data.snapshot(),
            },
            Request::PartialData { start } => {
                // Refuse to serve a tail against a dataset that may be about
                // to be wiped, or from beyond the current length.
                if self.state.load() == CoreState::Running && start <= self.data.len() {
                    Response::PartialData {
                        data: self.data.slice(start),
                        start,
                    }
                } else {
                    self.state_response()
                }
            }
            Request::PushData { mut data } => match data.validate() {
                Err(err) => Response::Exception {
                    state: self.state.load(),
                    message: err.to_string(),
                },
                Ok(()) => {
                    let length = data.len();
                    // Short metric columns are legal on the wire; pad them to
                    // the null-fill invariant before installing.
                    for column in data.metrics.values_mut() {
                        column.resize(length, None);
                    }
                    self.data.replace(data);
                    if self.state.load().is_active() {
                        // Rejoin and respawn so the engines restart against
                        // the pushed dataset.
                        self.state.store(CoreState::Restarting);
                    }
                    info!(length, "dataset replaced by client push");
                    Response::Pushed { length }
                }
            },
            Request::GetParameters => Response::Parameters {
                parameters: lock(&self.adaptive).parameters().as_json(),
            },
            Request::SetParameter { path, value } => {
                match lock(&self.adaptive).parameters_mut().set(&path, value.clone()) {
                    Ok(()) => Response::ParameterSet { path, value },
                    Err(err) => Response::Exception {
                        state: self.state.load(),
                        message: err.to_string(),
                    },
                }
            }
            Request::Measure { position } => Response::Queued {
                pending: self.overrides.queue_position(position),
            },
            Request::Replay {
                positions,
                measurements,
            } => Response::Queued {
                pending: self.overrides.replay(positions, measurements),
            },
        }
    }

    fn state_response(&self) -> Response {
        Response::State {
            state: self.state.load(),
        }
    }

    fn spawn_worker(&mut self) -> CoreResult<()> {
        if self.worker.is_some() {
            return Ok(());
        }
        let ctx = worker::WorkerContext {
            state: self.state.clone(),
            data: self.data.clone(),
            adaptive: self.adaptive.clone(),
            execution: self.execution.clone(),
            overrides: self.overrides.clone(),
            exceptions: self.exceptions.clone(),
            graphs: self.graphs.clone(),
            settings: self.settings.experiment.clone(),
        };
        self.worker = Some(worker::spawn(ctx)?);
        Ok(())
    }

    /// Joins the worker if one exists. Blocking by design: Stop/Exit promise
    /// the dataset is stable once they return.
    fn join_worker(&mut self) {
        if let Some(handle) = self.worker.take() {
            let joined = tokio::task::block_in_place(|| handle.join());
            if let Err(panic) = joined {
                let message = panic_message(panic);
                error!(%message, "worker thread panicked");
                self.exceptions
                    .push(CoreError::WorkerPanic(message).to_string());
            }
        }
    }
}
