//! WebSocket push channel to a ComfyUI instance.
//!
//! ComfyUI addresses progress and completion messages to the `clientId`
//! given in the connection URL. The same id must be sent with the
//! `POST /prompt` request for the messages to reach this connection.

use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

/// Raw WebSocket stream type used for the push channel.
pub type PushStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// A live push-channel connection.
pub struct PushConnection {
    /// Client session id the server will address messages to.
    pub client_id: String,
    pub stream: PushStream,
}

/// Errors that can occur while opening the push channel.
#[derive(Debug, thiserror::Error)]
pub enum PushChannelError {
    #[error("Failed to connect to {url}: {source}")]
    Connection {
        url: String,
        #[source]
        source: tokio_tungstenite::tungstenite::Error,
    },
}

/// Connect to `{ws_url}/ws?clientId={client_id}`.
///
/// * `ws_url` - WebSocket base URL, e.g. `ws://host:8188`.
pub async fn connect(ws_url: &str, client_id: &str) -> Result<PushConnection, PushChannelError> {
    let url = format!("{}/ws?clientId={}", ws_url.trim_end_matches('/'), client_id);

    let (stream, _response) = connect_async(url.as_str())
        .await
        .map_err(|source| PushChannelError::Connection {
            url: url.clone(),
            source,
        })?;

    tracing::info!(client_id, "Connected to ComfyUI push channel at {ws_url}");

    Ok(PushConnection {
        client_id: client_id.to_string(),
        stream,
    })
}
