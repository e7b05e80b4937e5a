//! Websocket transport abstraction for the event stream
//!
//! The connection manager's state machine talks to these traits rather
//! than a socket directly, so tests drive it with a scripted fake. A
//! connection is handed out as separate reader and writer halves: the
//! read loop and the heartbeat each own one, which keeps the two from
//! contending over a single handle.

use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use scribe_common::{Error, Result};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Opens duplex connections to the streaming endpoint
#[async_trait]
pub trait StreamTransport: Send + Sync + 'static {
    /// Perform the handshake; the credential is already attached to `url`.
    async fn connect(&self, url: &str) -> Result<(Box<dyn StreamReader>, Box<dyn StreamWriter>)>;
}

/// Inbound half of one connection
#[async_trait]
pub trait StreamReader: Send {
    /// Next inbound text frame. `None` means the remote closed cleanly;
    /// `Some(Err(_))` is a transport-level failure.
    async fn next_frame(&mut self) -> Option<Result<String>>;
}

/// Outbound half of one connection
#[async_trait]
pub trait StreamWriter: Send {
    /// Send one outbound text frame (heartbeat probes)
    async fn send_text(&mut self, text: String) -> Result<()>;

    /// Close the connection; best-effort
    async fn close(&mut self) -> Result<()>;
}

/// Production transport backed by tokio-tungstenite
pub struct TungsteniteTransport;

#[async_trait]
impl StreamTransport for TungsteniteTransport {
    async fn connect(&self, url: &str) -> Result<(Box<dyn StreamReader>, Box<dyn StreamWriter>)> {
        let (socket, response) = connect_async(url)
            .await
            .map_err(|e| Error::Connection(format!("Websocket handshake failed: {}", e)))?;

        tracing::debug!(status = %response.status(), "Websocket handshake complete");

        let (sink, stream) = socket.split();
        Ok((
            Box::new(TungsteniteReader { inner: stream }),
            Box::new(TungsteniteWriter { inner: sink }),
        ))
    }
}

struct TungsteniteReader {
    inner: SplitStream<WsStream>,
}

#[async_trait]
impl StreamReader for TungsteniteReader {
    async fn next_frame(&mut self) -> Option<Result<String>> {
        loop {
            match self.inner.next().await? {
                Ok(Message::Text(text)) => return Some(Ok(text)),
                // Control frames are handled by the library; binary frames
                // are not part of the one-JSON-object-per-frame protocol
                Ok(Message::Ping(_)) | Ok(Message::Pong(_)) | Ok(Message::Frame(_)) => continue,
                Ok(Message::Binary(bytes)) => {
                    tracing::debug!(len = bytes.len(), "Ignoring binary frame");
                    continue;
                }
                Ok(Message::Close(_)) => return None,
                Err(e) => return Some(Err(Error::Connection(e.to_string()))),
            }
        }
    }
}

struct TungsteniteWriter {
    inner: SplitSink<WsStream, Message>,
}

#[async_trait]
impl StreamWriter for TungsteniteWriter {
    async fn send_text(&mut self, text: String) -> Result<()> {
        self.inner
            .send(Message::Text(text))
            .await
            .map_err(|e| Error::Connection(format!("Websocket send failed: {}", e)))
    }

    async fn close(&mut self) -> Result<()> {
        self.inner
            .close()
            .await
            .map_err(|e| Error::Connection(format!("Websocket close failed: {}", e)))
    }
}
