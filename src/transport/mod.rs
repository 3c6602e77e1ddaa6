//! WebSocket transport
//!
//! Thin wrapper around `tokio-tungstenite` that hands out independent
//! writer and reader halves, so the inbound drain and the sender task can
//! each own one side of the connection.

use anyhow::{Context, Result};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite;

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// A received WebSocket frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WsMessage {
    /// UTF-8 text frame
    Text(String),
    /// Binary frame
    Binary(Vec<u8>),
    /// Ping or pong; tungstenite answers pings on its own
    Control,
    /// Close frame from the peer
    Close { code: u16, reason: String },
}

impl WsMessage {
    /// Payload as text, if this frame carries one
    pub fn into_text(self) -> Option<String> {
        match self {
            WsMessage::Text(text) => Some(text),
            WsMessage::Binary(data) => Some(String::from_utf8_lossy(&data).into_owned()),
            WsMessage::Control | WsMessage::Close { .. } => None,
        }
    }
}

/// Write half of a connection
pub struct WsWriter {
    sink: SplitSink<WsStream, tungstenite::Message>,
}

impl WsWriter {
    /// Send a text frame
    pub async fn send_text(&mut self, text: &str) -> Result<()> {
        self.sink
            .send(tungstenite::Message::Text(text.to_string()))
            .await
            .context("WebSocket send failed")
    }

    /// Send a close frame and flush the sink
    ///
    /// The peer's acknowledgement arrives on the reader half.
    pub async fn close(&mut self) -> Result<()> {
        self.sink.close().await.context("WebSocket close failed")
    }
}

/// Read half of a connection
pub struct WsReader {
    stream: SplitStream<WsStream>,
}

impl WsReader {
    /// Receive the next frame, returning `None` once the stream has ended
    pub async fn recv(&mut self) -> Option<Result<WsMessage>> {
        loop {
            let msg = match self.stream.next().await? {
                Ok(msg) => msg,
                Err(e) => return Some(Err(anyhow::anyhow!("WebSocket read error: {e}"))),
            };
            return Some(Ok(match msg {
                tungstenite::Message::Text(text) => WsMessage::Text(text),
                tungstenite::Message::Binary(data) => WsMessage::Binary(data),
                tungstenite::Message::Ping(_) | tungstenite::Message::Pong(_) => {
                    WsMessage::Control
                }
                tungstenite::Message::Close(frame) => {
                    let (code, reason) = frame
                        .map(|f| (u16::from(f.code), f.reason.to_string()))
                        .unwrap_or((1005, String::new()));
                    WsMessage::Close { code, reason }
                }
                tungstenite::Message::Frame(_) => continue,
            }));
        }
    }
}

/// Connect to a WebSocket URI, returning split writer and reader halves
pub async fn connect(uri: &str) -> Result<(WsWriter, WsReader)> {
    let (stream, response) = tokio_tungstenite::connect_async(uri)
        .await
        .with_context(|| format!("WebSocket handshake with {uri} failed"))?;
    tracing::debug!("Connected to {} (HTTP {})", uri, response.status());

    let (sink, stream) = stream.split();
    Ok((WsWriter { sink }, WsReader { stream }))
}
