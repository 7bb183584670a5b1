//! Client side of the control channel.
//!
//! Thin typed wrapper over the request/reply protocol with transparent
//! reconnect: a dropped connection is re-dialed with linear backoff and the
//! in-flight request is retried once, which is safe because every request in
//! the vocabulary is idempotent at the core.

use std::time::Duration;

use tokio::net::TcpStream;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

use super::protocol::{read_message, write_frame, Request, Response};
use crate::core::CoreState;
use crate::data::{Data, Measurement, Position};
use crate::error::{CoreError, CoreResult};

const CONNECT_ATTEMPTS: usize = 5;
const CONNECT_BACKOFF: Duration = Duration::from_millis(200);
const REPLY_TIMEOUT: Duration = Duration::from_secs(10);

pub struct CoreClient {
    addr: String,
    stream: Option<TcpStream>,
}

impl CoreClient {
    /// Dials the core and confirms the channel with a `Connect` exchange.
    pub async fn connect(addr: impl Into<String>) -> CoreResult<Self> {
        let mut client = Self {
            addr: addr.into(),
            stream: None,
        };
        client.ensure_connected().await?;
        client.request(&Request::Connect).await?;
        Ok(client)
    }

    async fn ensure_connected(&mut self) -> CoreResult<()> {
        if self.stream.is_some() {
            return Ok(());
        }
        let mut last_err = None;
        for attempt in 1..=CONNECT_ATTEMPTS {
            match TcpStream::connect(&self.addr).await {
                Ok(stream) => {
                    info!(addr = %self.addr, "connected to core");
                    self.stream = Some(stream);
                    return Ok(());
                }
                Err(err) => {
                    debug!(addr = %self.addr, attempt, error = %err, "connect failed");
                    last_err = Some(err);
                    sleep(CONNECT_BACKOFF * attempt as u32).await;
                }
            }
        }
        match last_err {
            Some(err) => Err(err.into()),
            None => Err(CoreError::NotConnected),
        }
    }

    async fn exchange(&mut self, request: &Request) -> CoreResult<Response> {
        let stream = self.stream.as_mut().ok_or(CoreError::NotConnected)?;
        write_frame(stream, request).await?;
        match timeout(REPLY_TIMEOUT, read_message::<_, Response>(stream)).await {
            Ok(Ok(Some(response))) => Ok(response),
            Ok(Ok(None)) => Err(CoreError::NotConnected),
            Ok(Err(err)) => Err(err),
            Err(_) => Err(CoreError::Timeout),
        }
    }

    /// Sends one request and awaits its reply, reconnecting once if the
    /// connection turns out to be dead.
    pub async fn request(&mut self, request: &Request) -> CoreResult<Response> {
        self.ensure_connected().await?;
        match self.exchange(request).await {
            Ok(response) => Ok(response),
            Err(err) => {
                warn!(error = %err, "request failed, reconnecting");
                self.stream = None;
                self.ensure_connected().await?;
                self.exchange(request).await
            }
        }
    }

    /// Current lifecycle state; a queued worker fault arrives here too.
    pub async fn get_state(&mut self) -> CoreResult<Response> {
        self.request(&Request::GetState).await
    }

    pub async fn start(&mut self) -> CoreResult<CoreState> {
        self.expect_state(&Request::Start).await
    }

    pub async fn pause(&mut self) -> CoreResult<CoreState> {
        self.expect_state(&Request::Pause).await
    }

    pub async fn stop(&mut self) -> CoreResult<CoreState> {
        self.expect_state(&Request::Stop).await
    }

    pub async fn exit(&mut self) -> CoreResult<CoreState> {
        self.expect_state(&Request::Exit).await
    }

    pub async fn full_data(&mut self) -> CoreResult<Data> {
        match self.request(&Request::FullData).await? {
            Response::FullData { data } => Ok(data),
            other => Err(unexpected(&other)),
        }
    }

    /// Observations from `start` onward; the reply's `start` echoes the
    /// served offset. The core only serves tails while running and for
    /// `start <= len`; outside that it answers with its state, surfaced
    /// here as an error. Callers that want the raw fallback should use
    /// [`request`](Self::request) directly.
    pub async fn partial_data(&mut self, start: usize) -> CoreResult<(Data, usize)> {
        match self.request(&Request::PartialData { start }).await? {
            Response::PartialData { data, start } => Ok((data, start)),
            other => Err(unexpected(&other)),
        }
    }

    pub async fn push_data(&mut self, data: Data) -> CoreResult<usize> {
        match self.request(&Request::PushData { data }).await? {
            Response::Pushed { length } => Ok(length),
            other => Err(unexpected(&other)),
        }
    }

    pub async fn get_parameters(&mut self) -> CoreResult<serde_json::Value> {
        match self.request(&Request::GetParameters).await? {
            Response::Parameters { parameters } => Ok(parameters),
            other => Err(unexpected(&other)),
        }
    }

    pub async fn set_parameter(
        &mut self,
        path: impl Into<String>,
        value: serde_json::Value,
    ) -> CoreResult<()> {
        let request = Request::SetParameter {
            path: path.into(),
            value,
        };
        match self.request(&request).await? {
            Response::ParameterSet { .. } => Ok(()),
            Response::Exception { message, .. } => Err(CoreError::Protocol(message)),
            other => Err(unexpected(&other)),
        }
    }

    pub async fn measure(&mut self, position: Position) -> CoreResult<usize> {
        match self.request(&Request::Measure { position }).await? {
            Response::Queued { pending } => Ok(pending),
            other => Err(unexpected(&other)),
        }
    }

    pub async fn replay(
        &mut self,
        positions: Vec<Position>,
        measurements: Vec<Measurement>,
    ) -> CoreResult<usize> {
        let request = Request::Replay {
            positions,
            measurements,
        };
        match self.request(&request).await? {
            Response::Queued { pending } => Ok(pending),
            other => Err(unexpected(&other)),
        }
    }

    async fn expect_state(&mut self, request: &Request) -> CoreResult<CoreState> {
        match self.request(request).await? {
            Response::State { state } | Response::Exception { state, .. } => Ok(state),
            other => Err(unexpected(&other)),
        }
    }
}

fn unexpected(response: &Response) -> CoreError {
    CoreError::Protocol(format!("unexpected response: {response:?}"))
}
