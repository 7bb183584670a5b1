//! TCP control channel: wire protocol, server transport and typed client.

pub mod client;
pub mod protocol;
pub mod transport;

pub use client::CoreClient;
pub use protocol::{Request, Response, MAX_FRAME_LEN};
pub use transport::{CoreTransport, Incoming};
