use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, warn};

use courier_types::events::{GatewayCommand, GatewayEvent};

use crate::error::ClientError;

/// Rewrites an http(s) API base URL into the gateway's ws(s) URL with the
/// token as the handshake parameter.
pub fn gateway_url(base_url: &str, token: &str) -> String {
    let ws_base = base_url
        .replace("http://", "ws://")
        .replace("https://", "wss://");
    format!("{}/gateway?token={}", ws_base.trim_end_matches('/'), token)
}

/// One live gateway connection.
///
/// Reading is pull-based: [`next_event`](Self::next_event) yields the next
/// decoded server event and `None` once the server closes the socket.
/// Frames that do not decode as events are logged and skipped. Server pings
/// are answered by the underlying stream.
#[derive(Debug)]
pub struct GatewaySubscription {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl GatewaySubscription {
    /// Connects and immediately asks for the online snapshot, so callers
    /// can seed presence without waiting for the next change broadcast.
    pub async fn connect(base_url: &str, token: &str) -> Result<Self, ClientError> {
        let (stream, _) = connect_async(gateway_url(base_url, token)).await?;
        let mut sub = Self { stream };
        sub.request_online_users().await?;
        Ok(sub)
    }

    /// Asks the server to resend the full online snapshot.
    pub async fn request_online_users(&mut self) -> Result<(), ClientError> {
        self.send(&GatewayCommand::RequestOnlineUsers).await
    }

    /// Next server event, or `None` when the connection is gone.
    pub async fn next_event(&mut self) -> Result<Option<GatewayEvent>, ClientError> {
        while let Some(frame) = self.stream.next().await {
            match frame? {
                WsMessage::Text(text) => match serde_json::from_str(&text) {
                    Ok(event) => return Ok(Some(event)),
                    Err(err) => {
                        warn!(%err, "ignoring undecodable gateway frame");
                    }
                },
                WsMessage::Close(_) => {
                    debug!("gateway closed the connection");
                    return Ok(None);
                }
                _ => {}
            }
        }
        Ok(None)
    }

    pub async fn close(mut self) -> Result<(), ClientError> {
        self.stream.close(None).await?;
        Ok(())
    }

    async fn send(&mut self, command: &GatewayCommand) -> Result<(), ClientError> {
        let json = serde_json::to_string(command).unwrap();
        self.stream.send(WsMessage::Text(json.into())).await?;
        Ok(())
    }
}
