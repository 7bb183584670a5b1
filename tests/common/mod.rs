#![allow(dead_code)]

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::time::Duration;

use adex::adaptive::AdaptiveEngine;
use adex::execution::ExecutionEngine;
use adex::net::CoreTransport;
use adex::params::{Parameter, ParameterTree};
use adex::{Core, CoreError, CoreResult, Dataset, Measurement, Position, Settings};

/// Trivial optimizer: always suggests the same target. Optionally fails on
/// the n-th suggestion to exercise the worker's fault path.
pub struct FixedTarget {
    target: Position,
    parameters: ParameterTree,
    fail_on_call: Option<usize>,
    panic_on_call: Option<usize>,
    calls: usize,
}

impl FixedTarget {
    pub fn new(target: Position) -> Self {
        let mut parameters = ParameterTree::new();
        parameters.insert("speed", Parameter::new(1.0).with_range(0.0, 10.0));
        Self {
            target,
            parameters,
            fail_on_call: None,
            panic_on_call: None,
            calls: 0,
        }
    }

    pub fn failing_on(mut self, call: usize) -> Self {
        self.fail_on_call = Some(call);
        self
    }

    pub fn panicking_on(mut self, call: usize) -> Self {
        self.panic_on_call = Some(call);
        self
    }
}

impl AdaptiveEngine for FixedTarget {
    fn dimensionality(&self) -> usize {
        self.target.len()
    }

    fn reset(&mut self) {
        self.calls = 0;
    }

    fn update_measurements(&mut self, _data: &Dataset) -> CoreResult<()> {
        Ok(())
    }

    fn request_targets(&mut self, _position: &Position, n: usize) -> CoreResult<Vec<Position>> {
        self.calls += 1;
        if self.fail_on_call == Some(self.calls) {
            return Err(CoreError::Adaptive("acquisition diverged".into()));
        }
        if self.panic_on_call == Some(self.calls) {
            panic!("acquisition model corrupted");
        }
        Ok(vec![self.target.clone(); n])
    }

    fn parameters(&self) -> &ParameterTree {
        &self.parameters
    }

    fn parameters_mut(&mut self) -> &mut ParameterTree {
        &mut self.parameters
    }
}

/// Deterministic backend that measures at most `limit` targets, then keeps
/// returning empty drains so the dataset length stabilizes.
pub struct ScriptedEngine {
    measure: Box<dyn FnMut(&Position) -> Measurement + Send>,
    remaining: usize,
    targets: VecDeque<Position>,
    position: Option<Position>,
}

impl ScriptedEngine {
    pub fn new(
        limit: usize,
        measure: impl FnMut(&Position) -> Measurement + Send + 'static,
    ) -> Self {
        Self {
            measure: Box::new(measure),
            remaining: limit,
            targets: VecDeque::new(),
            position: None,
        }
    }

    pub fn constant_score(limit: usize, score: f64) -> Self {
        Self::new(limit, move |p: &Position| {
            Measurement::new(p.clone(), score, 0.0)
        })
    }
}

impl ExecutionEngine for ScriptedEngine {
    fn get_position(&mut self) -> Option<Position> {
        self.position.clone()
    }

    fn update_targets(&mut self, targets: Vec<Position>) {
        self.targets.clear();
        self.targets.extend(targets);
    }

    fn get_measurements(&mut self) -> CoreResult<Vec<Measurement>> {
        let mut out = Vec::new();
        while self.remaining > 0 {
            let Some(target) = self.targets.pop_front() else {
                break;
            };
            self.remaining -= 1;
            self.position = Some(target.clone());
            out.push((self.measure)(&target));
        }
        Ok(out)
    }
}

/// Settings tightened for tests: short poll and idle intervals.
pub fn fast_settings() -> Settings {
    let mut settings = Settings::default();
    settings.server.poll_timeout = Duration::from_millis(5);
    settings.experiment.worker_idle = Duration::from_millis(1);
    settings.experiment.measure_poll = Duration::from_millis(1);
    settings
}

/// Binds the core on an ephemeral port and runs its loop on a task.
pub async fn spawn_core(
    core: Core,
) -> (SocketAddr, tokio::task::JoinHandle<CoreResult<()>>) {
    let mut transport = CoreTransport::bind("127.0.0.1:0").await.unwrap();
    let addr = transport.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        let mut core = core;
        core.run(&mut transport).await
    });
    (addr, handle)
}

pub const DEADLINE: Duration = Duration::from_secs(10);
