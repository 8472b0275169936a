//! [`RoverClient`] – one-shot RPC calls to a rover endpoint.
//!
//! Every call opens a fresh connection, sends one JSON line and reads one
//! back, all bounded by a single deadline. There is no pooling: the polling
//! cadence is slow and a fresh connection makes a dead rover indistinguishable
//! from a never-started one, which is exactly how the coordinator treats
//! both.

use std::time::Duration;

use rovos_types::RpcError;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

use crate::wire::{CoordinateReport, Request, Response};

/// Default bound on one complete RPC round trip.
pub const DEFAULT_RPC_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone)]
pub struct RoverClient {
    host: String,
    port: u16,
    timeout: Duration,
}

impl RoverClient {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            timeout: DEFAULT_RPC_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Perform one request/response exchange under the configured deadline.
    pub async fn call(&self, request: &Request) -> Result<Response, RpcError> {
        let deadline = self.timeout;
        tokio::time::timeout(deadline, self.exchange(request))
            .await
            .map_err(|_| RpcError::Timeout(deadline.as_millis() as u64))?
    }

    async fn exchange(&self, request: &Request) -> Result<Response, RpcError> {
        let stream = TcpStream::connect((self.host.as_str(), self.port))
            .await
            .map_err(|_| RpcError::Refused(self.endpoint()))?;
        let (reader, mut writer) = stream.into_split();

        let mut frame =
            serde_json::to_string(request).map_err(|e| RpcError::Protocol(e.to_string()))?;
        frame.push('\n');
        writer
            .write_all(frame.as_bytes())
            .await
            .map_err(|e| RpcError::Protocol(e.to_string()))?;

        let mut lines = BufReader::new(reader).lines();
        let line = lines
            .next_line()
            .await
            .map_err(|e| RpcError::Protocol(e.to_string()))?
            .ok_or_else(|| RpcError::Protocol("connection closed before reply".to_string()))?;
        serde_json::from_str(&line).map_err(|e| RpcError::Protocol(e.to_string()))
    }

    /// Ask the rover to begin ranging. Idempotent on the server side.
    pub async fn start_connection(&self, device_id: &str) -> Result<(), RpcError> {
        let response = self
            .call(&Request::StartConnection {
                device_id: device_id.to_string(),
            })
            .await?;
        match response {
            Response::Ack { .. } => Ok(()),
            Response::Error { message } => Err(RpcError::Protocol(message)),
            other => Err(RpcError::Protocol(format!("unexpected reply: {other:?}"))),
        }
    }

    /// Fetch the rover's latest position.
    pub async fn get_coordinates(&self) -> Result<CoordinateReport, RpcError> {
        let response = self.call(&Request::GetCoordinates).await?;
        match response {
            Response::Coordinates(report) => Ok(report),
            Response::Error { message } => Err(RpcError::Protocol(message)),
            other => Err(RpcError::Protocol(format!("unexpected reply: {other:?}"))),
        }
    }
}
