//! Request/response vocabulary and wire framing.
//!
//! Every request kind maps to exactly one response kind; [`Response::Exception`]
//! doubles as the error form of any handler, carrying the triggering error
//! message alongside the current state.
//!
//! | Request        | Response       |
//! |----------------|----------------|
//! | `Connect`      | `State`        |
//! | `GetState`     | `State` (or `Exception` if a worker fault is queued) |
//! | `Start`        | `State`        |
//! | `Pause`        | `State`        |
//! | `Stop`         | `State`        |
//! | `Exit`         | `State`        |
//! | `FullData`     | `FullData`     |
//! | `PartialData`  | `PartialData` (or `State` when not servable) |
//! | `PushData`     | `Pushed`       |
//! | `GetParameters`| `Parameters`   |
//! | `SetParameter` | `ParameterSet` (or `Exception`) |
//! | `Measure`      | `Queued`       |
//! | `Replay`       | `Queued`       |
//!
//! # Framing
//!
//! Messages travel over a reliable ordered byte stream as a 4-byte
//! little-endian length prefix followed by a JSON body. serde's externally
//! tagged enum representation is the type discriminator, so an unrecognized
//! request kind fails decoding and is answered with [`Response::Unknown`]
//! rather than dropped.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::core::CoreState;
use crate::data::{Data, Measurement, Position};
use crate::error::{CoreError, CoreResult};

/// Upper bound on one frame. Generous enough for a full dataset snapshot,
/// small enough to reject garbage length prefixes outright.
pub const MAX_FRAME_LEN: usize = 64 * 1024 * 1024;

/// Control requests accepted by the core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Request {
    /// Establish or re-establish contact; never mutates a running state.
    Connect,
    /// Poll the lifecycle state (and any pending worker exception).
    GetState,
    /// Inactive→Starting or Paused→Resuming; no-op otherwise.
    Start,
    /// Any active state →Pausing.
    Pause,
    /// Any →Stopping; blocks until the worker thread has joined.
    Stop,
    /// Terminate the core loop.
    Exit,
    /// Full dataset snapshot.
    FullData,
    /// Tail snapshot of observations from `start` onward.
    PartialData { start: usize },
    /// Wholesale dataset replacement (restore from file).
    PushData { data: Data },
    /// Serialized adaptive-engine parameter tree.
    GetParameters,
    /// Write one parameter by path.
    SetParameter {
        path: String,
        value: serde_json::Value,
    },
    /// Queue one forced position consumed by the next iteration.
    Measure { position: Position },
    /// Clear and refill both override queues in lock-step so the next
    /// iterations replay a recorded sequence deterministically.
    Replay {
        positions: Vec<Position>,
        measurements: Vec<Measurement>,
    },
}

/// Replies produced by the core, one per request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Response {
    State {
        state: CoreState,
    },
    /// A worker-thread fault surfaced through the state channel.
    Exception {
        state: CoreState,
        message: String,
    },
    FullData {
        data: Data,
    },
    PartialData {
        data: Data,
        start: usize,
    },
    Parameters {
        parameters: serde_json::Value,
    },
    ParameterSet {
        path: String,
        value: serde_json::Value,
    },
    /// Override queue depth after a `Measure`/`Replay`.
    Queued {
        pending: usize,
    },
    /// Observation count after a `PushData`.
    Pushed {
        length: usize,
    },
    /// The request could not be decoded or is not part of the vocabulary.
    Unknown {
        message: String,
    },
}

/// Writes one length-prefixed JSON frame.
pub async fn write_frame<W, T>(writer: &mut W, message: &T) -> CoreResult<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let body = serde_json::to_vec(message)?;
    if body.len() > MAX_FRAME_LEN {
        return Err(CoreError::FrameTooLarge(body.len()));
    }
    writer.write_all(&(body.len() as u32).to_le_bytes()).await?;
    writer.write_all(&body).await?;
    writer.flush().await?;
    Ok(())
}

/// Reads one frame body. Returns `Ok(None)` on a clean end-of-stream before
/// the length prefix (peer disconnected between requests).
pub async fn read_frame<R>(reader: &mut R) -> CoreResult<Option<Vec<u8>>>
where
    R: AsyncRead + Unpin,
{
    let mut prefix = [0u8; 4];
    match reader.read_exact(&mut prefix).await {
        Ok(_) => {}
        Err(err) if err.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(err) => return Err(err.into()),
    }
    let len = u32::from_le_bytes(prefix) as usize;
    if len > MAX_FRAME_LEN {
        return Err(CoreError::FrameTooLarge(len));
    }
    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await?;
    Ok(Some(body))
}

/// Reads and decodes one typed frame.
pub async fn read_message<R, T>(reader: &mut R) -> CoreResult<Option<T>>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    match read_frame(reader).await? {
        Some(body) => Ok(Some(serde_json::from_slice(&body)?)),
        None => Ok(None),
    }
}
