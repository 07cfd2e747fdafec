//! Ways for an orchestrator to reach agents

use crate::agent::Agent;
use crate::error::{Error, Result};
use crate::protocol::{Request, Response};
use async_net::TcpStream;
use async_trait::async_trait;
use async_tungstenite::client_async;
use async_tungstenite::tungstenite::Message;
use futures::{SinkExt, StreamExt};
use tracing::debug;

/// Delivers a request to the agent at `addr` and returns its response
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send one request to the agent listening on `addr` (`host:port`)
    async fn send(&self, addr: &str, request: Request) -> Result<Response>;
}

/// Opens a websocket per request
#[derive(Debug, Clone, Copy, Default)]
pub struct WsTransport;

impl WsTransport {
    /// Create the transport
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Transport for WsTransport {
    async fn send(&self, addr: &str, request: Request) -> Result<Response> {
        let url = format!("ws://{addr}/");
        let stream = TcpStream::connect(addr).await?;
        let (mut ws, _) = client_async(&url, stream).await?;
        debug!("Sending {} request to {}", request.name(), addr);

        let request_json = serde_json::to_string(&request)?;
        ws.send(Message::Text(request_json.into())).await?;

        let response = match ws.next().await {
            Some(Ok(Message::Text(text))) => serde_json::from_str(&text)?,
            Some(Ok(Message::Close(_))) => {
                return Err(Error::Protocol(format!("connection closed by agent {addr}")));
            }
            Some(Err(e)) => return Err(e.into()),
            None => {
                return Err(Error::Protocol(format!(
                    "connection to {addr} closed unexpectedly"
                )));
            }
            Some(Ok(_)) => {
                return Err(Error::Protocol(format!(
                    "unexpected message type from {addr}"
                )));
            }
        };

        let _ = ws.close(None).await;
        Ok(response)
    }
}

/// An in-process agent answers regardless of address
#[async_trait]
impl Transport for Agent {
    async fn send(&self, _addr: &str, request: Request) -> Result<Response> {
        Ok(self.handle(request).await)
    }
}
