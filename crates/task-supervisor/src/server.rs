//! WebSocket server exposing an [`Agent`]

use crate::agent::Agent;
use crate::error::Result;
use crate::protocol::{ErrorInfo, Request, Response};
use async_net::{TcpListener, TcpStream};
use async_tungstenite::accept_async;
use async_tungstenite::tungstenite::Message;
use futures::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{debug, error, info};

/// Listening agent endpoint
pub struct AgentServer {
    agent: Arc<Agent>,
    listener: TcpListener,
}

impl AgentServer {
    /// Bind the listener
    pub async fn bind(addr: impl AsRef<str>, agent: Arc<Agent>) -> Result<Self> {
        let listener = TcpListener::bind(addr.as_ref()).await?;
        info!("Agent listening on ws://{}", listener.local_addr()?);
        Ok(Self { agent, listener })
    }

    /// Bound address
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections forever, one task per connection
    pub async fn serve(self) -> Result<()> {
        loop {
            match self.listener.accept().await {
                Ok((stream, peer_addr)) => {
                    debug!("New connection from {}", peer_addr);
                    let agent = self.agent.clone();
                    smol::spawn(async move {
                        if let Err(e) = handle_connection(stream, agent).await {
                            error!("Connection handler error: {}", e);
                        }
                    })
                    .detach();
                }
                Err(e) => {
                    error!("Failed to accept connection: {}", e);
                }
            }
        }
    }
}

/// Answer each text message with one response
async fn handle_connection(stream: TcpStream, agent: Arc<Agent>) -> Result<()> {
    let ws_stream = accept_async(stream).await?;
    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    while let Some(msg) = ws_receiver.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                let response = match serde_json::from_str::<Request>(&text) {
                    Ok(request) => agent.handle(request).await,
                    Err(e) => {
                        error!("Failed to parse request: {}", e);
                        Response::Error {
                            error: ErrorInfo {
                                code: "protocol_error".to_string(),
                                message: format!("Invalid request format: {e}"),
                            },
                        }
                    }
                };
                let response_text = serde_json::to_string(&response)?;
                ws_sender.send(Message::Text(response_text.into())).await?;
            }
            Ok(Message::Close(_)) => {
                debug!("Client requested close");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                error!("WebSocket error: {}", e);
                break;
            }
        }
    }

    debug!("Connection closed");
    Ok(())
}
