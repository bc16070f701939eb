//! WebSocket client for connecting to a ComfyUI instance.
//!
//! [`ComfyClient`] holds the connection configuration for a single
//! ComfyUI server.  Call [`ComfyClient::connect`] with the job's
//! session id to establish a live [`ComfyConnection`] over WebSocket.

use std::time::Duration;

use tokio_tungstenite::{connect_async, MaybeTlsStream};

/// Timeout for the initial WebSocket handshake.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Configuration handle for a ComfyUI server.
///
/// Stores the WebSocket and HTTP API URLs needed to communicate with
/// one ComfyUI instance. Create a [`ComfyConnection`] by calling
/// [`connect`](Self::connect).
pub struct ComfyClient {
    ws_url: String,
    api_url: String,
}

/// A live WebSocket connection to a ComfyUI server.
///
/// Holds the underlying `WebSocketStream` plus the session id the
/// connection was opened with, so that incoming events can be
/// correlated with the HTTP submission made under the same id.
#[derive(Debug)]
pub struct ComfyConnection {
    /// Session id sent as the `clientId` query parameter.
    pub client_id: String,
    /// The raw WebSocket stream for reading/writing frames.
    pub ws_stream: tokio_tungstenite::WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>,
}

impl ComfyClient {
    /// Create a new client targeting a specific ComfyUI server.
    ///
    /// * `ws_url`  - WebSocket base URL, e.g. `ws://host:8188`.
    /// * `api_url` - HTTP base URL, e.g. `http://host:8188`.
    pub fn new(ws_url: String, api_url: String) -> Self {
        Self { ws_url, api_url }
    }

    /// WebSocket base URL (e.g. `ws://host:8188`).
    pub fn ws_url(&self) -> &str {
        &self.ws_url
    }

    /// HTTP API base URL (e.g. `http://host:8188`).
    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    /// Connect to the ComfyUI WebSocket endpoint.
    ///
    /// The caller supplies the session id (`clientId` query parameter)
    /// so that the stream receives events for the workflow submitted
    /// over HTTP under the same id.  One session id must never be
    /// shared by two concurrent jobs.
    pub async fn connect(&self, client_id: &str) -> Result<ComfyConnection, ComfyClientError> {
        let url = format!("{}/ws?clientId={}", self.ws_url, client_id);

        let (ws_stream, _response) =
            tokio::time::timeout(CONNECT_TIMEOUT, connect_async(&url))
                .await
                .map_err(|_| ComfyClientError::Timeout {
                    url: self.ws_url.clone(),
                })?
                .map_err(|e| {
                    ComfyClientError::Connection(format!(
                        "Failed to connect to ComfyUI at {}: {e}",
                        self.ws_url
                    ))
                })?;

        tracing::info!(
            client_id = %client_id,
            "Connected to ComfyUI at {}",
            self.ws_url,
        );

        Ok(ComfyConnection {
            client_id: client_id.to_string(),
            ws_stream,
        })
    }
}

impl ComfyConnection {
    /// Close the WebSocket connection.
    ///
    /// Errors are logged and swallowed: at close time the stream may
    /// already be dead, and the job result is determined elsewhere.
    pub async fn close(mut self) {
        tracing::debug!(client_id = %self.client_id, "Closing websocket connection");
        if let Err(e) = self.ws_stream.close(None).await {
            tracing::debug!(error = %e, "Websocket close failed (already closed?)");
        }
    }
}

/// Errors that can occur when working with the WebSocket client.
#[derive(Debug, thiserror::Error)]
pub enum ComfyClientError {
    /// Failed to establish the initial WebSocket connection.
    #[error("Connection error: {0}")]
    Connection(String),

    /// The WebSocket handshake did not complete in time.
    #[error("Timed out connecting to ComfyUI at {url}")]
    Timeout { url: String },
}
