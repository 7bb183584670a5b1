//! Server side of the control channel.
//!
//! One listener, at most one client at a time, strict one-request-one-reply.
//! The control loop owns the transport and polls it once per tick with a
//! short timeout, so lifecycle work keeps happening while no client talks.
//!
//! Reads are buffered per client and survive the poll timeout: bytes of a
//! frame that arrive across several ticks accumulate in the connection
//! buffer until the frame is complete. Only the single `read_buf` call is
//! ever cancelled by the timeout, and that call is cancel safe.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use super::protocol::{write_frame, Request, Response, MAX_FRAME_LEN};
use crate::error::{CoreError, CoreResult};

/// One polled unit of client input.
#[derive(Debug)]
pub enum Incoming {
    /// A well-formed request awaiting exactly one [`Response`].
    Request(Request),
    /// A frame arrived but did not decode; still owed a reply
    /// ([`Response::Unknown`]) to keep the request/reply rhythm intact.
    Malformed(String),
}

struct ClientConn {
    stream: TcpStream,
    peer: SocketAddr,
    /// Raw bytes received so far, possibly holding a partial frame.
    buffer: Vec<u8>,
}

pub struct CoreTransport {
    listener: TcpListener,
    client: Option<ClientConn>,
}

impl CoreTransport {
    /// Binds the control listener. `addr` may use port 0 to let the OS pick.
    pub async fn bind(addr: &str) -> CoreResult<Self> {
        let listener = TcpListener::bind(addr).await?;
        info!(addr = %listener.local_addr()?, "control channel listening");
        Ok(Self {
            listener,
            client: None,
        })
    }

    pub fn local_addr(&self) -> CoreResult<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Polls for one request, waiting at most `wait`.
    ///
    /// With no client connected, this waits for a connection instead; a fresh
    /// connection consumes the tick and the first request arrives on a later
    /// poll. Returns `Ok(None)` whenever no complete frame is available yet;
    /// partial frames stay buffered for the next poll.
    pub async fn poll(&mut self, wait: Duration) -> CoreResult<Option<Incoming>> {
        let Some(conn) = self.client.as_mut() else {
            match timeout(wait, self.listener.accept()).await {
                Ok(Ok((stream, peer))) => {
                    info!(%peer, "client connected");
                    self.client = Some(ClientConn {
                        stream,
                        peer,
                        buffer: Vec::new(),
                    });
                }
                Ok(Err(err)) => return Err(err.into()),
                Err(_) => {}
            }
            return Ok(None);
        };

        // A complete frame may already be buffered from an earlier read.
        match extract_frame(&mut conn.buffer) {
            Ok(Some(frame)) => return Ok(Some(decode(&frame, conn.peer))),
            Ok(None) => {}
            Err(err) => {
                warn!(peer = %conn.peer, error = %err, "dropping client after framing error");
                self.client = None;
                return Err(err);
            }
        }

        match timeout(wait, conn.stream.read_buf(&mut conn.buffer)).await {
            Ok(Ok(0)) => {
                info!(peer = %conn.peer, "client disconnected");
                self.client = None;
                return Ok(None);
            }
            Ok(Ok(_)) => {}
            Ok(Err(err)) => {
                warn!(peer = %conn.peer, error = %err, "dropping client after read error");
                self.client = None;
                return Err(err.into());
            }
            // Timed out; whatever arrived stays in the buffer.
            Err(_) => return Ok(None),
        }

        match extract_frame(&mut conn.buffer) {
            Ok(Some(frame)) => Ok(Some(decode(&frame, conn.peer))),
            Ok(None) => Ok(None),
            Err(err) => {
                warn!(peer = %conn.peer, error = %err, "dropping client after framing error");
                self.client = None;
                Err(err)
            }
        }
    }

    /// Sends the reply owed for the last polled request.
    pub async fn reply(&mut self, response: &Response) -> CoreResult<()> {
        let Some(conn) = self.client.as_mut() else {
            return Err(CoreError::NotConnected);
        };
        if let Err(err) = write_frame(&mut conn.stream, response).await {
            warn!(peer = %conn.peer, error = %err, "dropping client after write error");
            self.client = None;
            return Err(err);
        }
        Ok(())
    }

    pub fn has_client(&self) -> bool {
        self.client.is_some()
    }
}

/// Pops one complete length-prefixed frame off the front of `buffer`, if one
/// has fully arrived.
fn extract_frame(buffer: &mut Vec<u8>) -> CoreResult<Option<Vec<u8>>> {
    if buffer.len() < 4 {
        return Ok(None);
    }
    let mut prefix = [0u8; 4];
    prefix.copy_from_slice(&buffer[..4]);
    let len = u32::from_le_bytes(prefix) as usize;
    if len > MAX_FRAME_LEN {
        return Err(CoreError::FrameTooLarge(len));
    }
    if buffer.len() < 4 + len {
        return Ok(None);
    }
    let body = buffer[4..4 + len].to_vec();
    buffer.drain(..4 + len);
    Ok(Some(body))
}

fn decode(frame: &[u8], peer: SocketAddr) -> Incoming {
    match serde_json::from_slice::<Request>(frame) {
        Ok(request) => {
            debug!(%peer, ?request, "request received");
            Incoming::Request(request)
        }
        Err(err) => {
            warn!(%peer, error = %err, "malformed request");
            Incoming::Malformed(err.to_string())
        }
    }
}
