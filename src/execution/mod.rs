//! Capability interface for pluggable measurement backends.
//!
//! The core depends only on this three-method contract; whether the backend
//! measures synchronously in-process ([`simple::SimpleEngine`]), drains a
//! queue on a background thread ([`threaded::ThreadedEngine`]) or drives a
//! physical instrument is invisible to the experiment loop.

pub mod simple;
pub mod threaded;

pub use simple::SimpleEngine;
pub use threaded::ThreadedEngine;

use crate::data::{Measurement, Position};
use crate::error::CoreResult;

/// One pluggable measurement backend.
pub trait ExecutionEngine: Send {
    /// Current instrument position, if the backend knows one. The worker
    /// falls back to a zero vector when this is `None`.
    fn get_position(&mut self) -> Option<Position>;

    /// Queues targets for measurement, atomically replacing any previously
    /// queued ones. Stale targets are meaningless once new ones are
    /// requested.
    fn update_targets(&mut self, targets: Vec<Position>);

    /// Drains and returns all measurements completed since the last call.
    /// Non-blocking; an empty vector means "no new data yet". A backend
    /// fault surfaces here as an error and pauses the run.
    fn get_measurements(&mut self) -> CoreResult<Vec<Measurement>>;
}
