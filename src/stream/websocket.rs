//! WebSocket transport for the exchange relay.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, trace};

use super::transport::{SubscriptionCommand, Transport};
use crate::error::{Error, Result};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// [`Transport`] over a single WebSocket connection.
///
/// Commands go out as JSON text frames. A close frame from the server ends
/// the frame stream.
///
/// Pings are not answered from inside [`next_frame`](Transport::next_frame).
/// tungstenite queues the pong when it reads a ping and writes it on the next
/// read or send, so a read cancelled by an outbound command loses nothing.
pub struct WebSocketTransport {
    url: String,
    ws: Option<Socket>,
}

impl WebSocketTransport {
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ws: None,
        }
    }

    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn connect(&mut self) -> Result<()> {
        info!(url = %self.url, "Connecting to WebSocket");
        let (ws_stream, response) = connect_async(self.url.as_str()).await?;
        info!(status = %response.status(), "WebSocket connected");
        self.ws = Some(ws_stream);
        Ok(())
    }

    async fn send(&mut self, command: &SubscriptionCommand) -> Result<()> {
        let ws = self.ws.as_mut().ok_or(Error::NotConnected)?;
        let json = serde_json::to_string(command)?;
        trace!(payload = %json, "Sending command");
        ws.send(Message::Text(json)).await?;
        Ok(())
    }

    async fn next_frame(&mut self) -> Option<Result<String>> {
        let ws = self.ws.as_mut()?;

        loop {
            match ws.next().await? {
                Ok(Message::Text(text)) => {
                    trace!(bytes = text.len(), "Received WebSocket text frame");
                    return Some(Ok(text));
                }
                Ok(Message::Ping(_)) => trace!("Received WebSocket ping, pong queued"),
                Ok(Message::Close(frame)) => {
                    info!(frame = ?frame, "WebSocket closed by server");
                    return None;
                }
                Ok(_) => continue,
                Err(e) => return Some(Err(e.into())),
            }
        }
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(mut ws) = self.ws.take() {
            debug!("Closing WebSocket");
            // The peer may already be gone.
            if let Err(e) = ws.close(None).await {
                debug!(error = %e, "WebSocket close handshake failed");
            }
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "websocket"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Topic;

    #[tokio::test]
    async fn test_send_before_connect_fails() {
        let mut transport = WebSocketTransport::new("ws://127.0.0.1:1/ws");
        let err = transport
            .send(&SubscriptionCommand::Subscribe(Topic::Positions))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotConnected));
    }

    #[tokio::test]
    async fn test_next_frame_without_connection_is_end_of_stream() {
        let mut transport = WebSocketTransport::new("ws://127.0.0.1:1/ws");
        assert!(transport.next_frame().await.is_none());
    }

    #[tokio::test]
    async fn test_close_without_connection_is_ok() {
        let mut transport = WebSocketTransport::new("ws://127.0.0.1:1/ws");
        transport.close().await.unwrap();
        assert_eq!(transport.name(), "websocket");
        assert_eq!(transport.url(), "ws://127.0.0.1:1/ws");
    }

    #[tokio::test]
    async fn test_ping_is_answered_while_reading() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            ws.send(Message::Ping(vec![7, 7])).await.unwrap();
            ws.send(Message::Text(r#"{"type":"balance"}"#.into()))
                .await
                .unwrap();
            loop {
                match ws.next().await {
                    Some(Ok(Message::Pong(data))) => return data,
                    Some(Ok(_)) => continue,
                    other => panic!("no pong before stream ended: {other:?}"),
                }
            }
        });

        let mut transport = WebSocketTransport::new(format!("ws://{addr}/ws"));
        transport.connect().await.unwrap();
        let frame = transport.next_frame().await.unwrap().unwrap();
        assert_eq!(frame, r#"{"type":"balance"}"#);

        let pong = tokio::time::timeout(std::time::Duration::from_secs(2), server)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(pong, vec![7, 7]);
        transport.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_connect_to_closed_port_fails() {
        let mut transport = WebSocketTransport::new("ws://127.0.0.1:1/ws");
        let err = transport.connect().await.unwrap_err();
        assert!(err.is_transport());
    }
}
