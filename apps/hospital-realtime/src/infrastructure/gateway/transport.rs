//! WebSocket Transport
//!
//! [`Connector`] over tokio-tungstenite. Each connection gets a pump task
//! that forwards text frames between the socket and a pair of channels,
//! answers WebSocket pings, and exits on close, error, or when the session
//! drops its outbound sender.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

use super::auth::handshake_request;
use crate::application::ports::{Connector, TransportError, TransportLink};

const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Opens WebSocket connections to the gateway.
#[derive(Debug, Clone)]
pub struct WebSocketConnector {
    channel_capacity: usize,
}

impl Default for WebSocketConnector {
    fn default() -> Self {
        Self::new(DEFAULT_CHANNEL_CAPACITY)
    }
}

impl WebSocketConnector {
    /// Create a connector whose frame channels hold `channel_capacity` frames.
    #[must_use]
    pub fn new(channel_capacity: usize) -> Self {
        Self {
            channel_capacity: channel_capacity.max(1),
        }
    }
}

#[async_trait]
impl Connector for WebSocketConnector {
    async fn connect(&self, endpoint: &str, token: &str) -> Result<TransportLink, TransportError> {
        let request = handshake_request(endpoint, token)?;
        tracing::info!(url = %request.uri(), "Connecting to gateway");

        let (ws_stream, _response) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;
        let (mut write, mut read) = ws_stream.split();

        let (outbound_tx, mut outbound_rx) = mpsc::channel::<String>(self.channel_capacity);
        let (inbound_tx, inbound_rx) = mpsc::channel::<String>(self.channel_capacity);

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    outbound = outbound_rx.recv() => {
                        let Some(text) = outbound else {
                            let _ = write.send(Message::Close(None)).await;
                            break;
                        };
                        if let Err(e) = write.send(Message::Text(text.into())).await {
                            tracing::warn!(error = %e, "WebSocket send failed");
                            break;
                        }
                    }
                    inbound = read.next() => {
                        match inbound {
                            Some(Ok(Message::Text(text))) => {
                                if inbound_tx.send(text.as_str().to_owned()).await.is_err() {
                                    break;
                                }
                            }
                            Some(Ok(Message::Binary(data))) => {
                                match String::from_utf8(data.to_vec()) {
                                    Ok(text) => {
                                        if inbound_tx.send(text).await.is_err() {
                                            break;
                                        }
                                    }
                                    Err(_) => tracing::debug!("Ignoring non-UTF-8 binary frame"),
                                }
                            }
                            Some(Ok(Message::Ping(data))) => {
                                if write.send(Message::Pong(data)).await.is_err() {
                                    break;
                                }
                            }
                            Some(Ok(Message::Close(frame))) => {
                                tracing::info!(frame = ?frame, "Gateway closed the connection");
                                break;
                            }
                            Some(Ok(_)) => {}
                            Some(Err(e)) => {
                                tracing::warn!(error = %e, "WebSocket read failed");
                                break;
                            }
                            None => {
                                tracing::info!("WebSocket stream ended");
                                break;
                            }
                        }
                    }
                }
            }
        });

        Ok(TransportLink {
            outbound: outbound_tx,
            inbound: inbound_rx,
        })
    }
}
