//! Run lifecycle state shared between the control loop and the worker.
//!
//! Exactly one authoritative [`CoreState`] exists per core, stored in an
//! `AtomicU8` so the foreground loop and the experiment worker both read it
//! as an atomic scalar snapshot without a lock. Transitions are designed so
//! that only the intended writer moves into each target state:
//!
//! - request handlers enter the *requesting* states (`Starting`, `Pausing`,
//!   `Resuming`, `Stopping`, `Exiting`, `Restarting`);
//! - the foreground tick resolves transient states (`Starting`→`Running`,
//!   `Pausing`→`Paused`, `Stopping`→`Inactive`, ...);
//! - the worker thread only ever forces `Pausing`, on an iteration fault.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Lifecycle phase of the experiment run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum CoreState {
    /// Boot state; resolves to `Inactive` on the first serviced request.
    Connecting = 0,
    /// No run active; dataset empty or holding pushed data.
    Inactive = 1,
    /// Start requested; worker spawn pending.
    Starting = 2,
    /// Worker thread driving experiment iterations.
    Running = 3,
    /// Pause requested (by a client or by a worker fault).
    Pausing = 4,
    /// Worker idle; run resumable.
    Paused = 5,
    /// Resume requested.
    Resuming = 6,
    /// Stop requested; worker joining, dataset reset pending.
    Stopping = 7,
    /// Dataset replaced mid-run; worker rejoin and engine reset pending.
    Restarting = 8,
    /// Terminal; the control loop exits.
    Exiting = 9,
}

impl CoreState {
    fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(CoreState::Connecting),
            1 => Some(CoreState::Inactive),
            2 => Some(CoreState::Starting),
            3 => Some(CoreState::Running),
            4 => Some(CoreState::Pausing),
            5 => Some(CoreState::Paused),
            6 => Some(CoreState::Resuming),
            7 => Some(CoreState::Stopping),
            8 => Some(CoreState::Restarting),
            9 => Some(CoreState::Exiting),
            _ => None,
        }
    }

    /// True while a worker thread exists (spawned or about to be).
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            CoreState::Starting
                | CoreState::Running
                | CoreState::Pausing
                | CoreState::Paused
                | CoreState::Resuming
                | CoreState::Restarting
        )
    }
}

impl std::fmt::Display for CoreState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            CoreState::Connecting => "Connecting",
            CoreState::Inactive => "Inactive",
            CoreState::Starting => "Starting",
            CoreState::Running => "Running",
            CoreState::Pausing => "Pausing",
            CoreState::Paused => "Paused",
            CoreState::Resuming => "Resuming",
            CoreState::Stopping => "Stopping",
            CoreState::Restarting => "Restarting",
            CoreState::Exiting => "Exiting",
        };
        write!(f, "{name}")
    }
}

/// Cloneable atomic cell holding the authoritative [`CoreState`].
#[derive(Clone, Debug)]
pub struct SharedState {
    inner: Arc<AtomicU8>,
}

impl SharedState {
    pub fn new(state: CoreState) -> Self {
        Self {
            inner: Arc::new(AtomicU8::new(state as u8)),
        }
    }

    pub fn load(&self) -> CoreState {
        // Unknown discriminants cannot be stored; treat a corrupted read as
        // terminal rather than panicking in either loop.
        CoreState::from_u8(self.inner.load(Ordering::SeqCst)).unwrap_or(CoreState::Exiting)
    }

    pub fn store(&self, state: CoreState) {
        self.inner.store(state as u8, Ordering::SeqCst);
    }

    /// Transitions `from`→`to` only if the current state is `from`.
    /// Returns whether the transition happened.
    pub fn transition(&self, from: CoreState, to: CoreState) -> bool {
        self.inner
            .compare_exchange(from as u8, to as u8, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }
}

impl Default for SharedState {
    fn default() -> Self {
        Self::new(CoreState::Connecting)
    }
}
