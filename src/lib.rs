//! adex: adaptive experimentation core.
//!
//! A server process that repeatedly asks an adaptive optimizer where to
//! sample next, drives a measurement backend there, accumulates the results
//! in a concurrency-safe dataset and answers remote control requests over a
//! length-prefixed TCP protocol.
//!
//! The moving parts:
//!
//! - [`data::Dataset`]: reader/writer-locked observation store shared
//!   between the experiment worker and the protocol responder.
//! - [`adaptive::AdaptiveEngine`] / [`execution::ExecutionEngine`]:
//!   capability traits for pluggable optimizers and measurement backends.
//! - [`core::Core`]: the lifecycle state machine, an async control loop in
//!   the foreground with one experiment worker thread in the background.
//! - [`net`]: the request/reply wire protocol, server transport and typed
//!   client.
//!
//! ```no_run
//! use adex::{Core, RandomSampler, SimpleEngine, Measurement};
//!
//! # async fn demo() -> adex::CoreResult<()> {
//! let sampler = RandomSampler::new(vec![(0.0, 100.0), (0.0, 100.0)]);
//! let backend = SimpleEngine::new(|p| Ok(Measurement::new(p.clone(), p[0] + p[1], 1.0)));
//! Core::new(Box::new(sampler), Box::new(backend)).serve().await
//! # }
//! ```

pub mod adaptive;
pub mod config;
pub mod core;
pub mod data;
pub mod error;
pub mod execution;
pub mod graphs;
pub mod net;
pub mod params;
pub mod session;

pub use adaptive::{AdaptiveEngine, RandomSampler};
pub use config::Settings;
pub use core::{Core, CoreState};
pub use data::{Data, Dataset, Measurement, Position};
pub use error::{CoreError, CoreResult};
pub use execution::{ExecutionEngine, SimpleEngine, ThreadedEngine};
pub use graphs::{GraphRegistry, GraphUpdater};
pub use net::{CoreClient, CoreTransport, Request, Response};
pub use params::{Constraints, Parameter, ParameterTree};
pub use session::Snapshot;
