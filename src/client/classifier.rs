//! Server type detection
//!
//! A channel server greets new connections with `request_info`. Anything
//! else arriving first, silence, or a transport error means the endpoint is
//! treated as a generic streaming API.

use crate::client::commands::OutboundAction;
use crate::client::console::{Console, LineKind, OutputLine};
use crate::client::input::LineInput;
use crate::client::session::{Session, SessionError, SessionMode};
use crate::protocol::{decode_server_message, ServerMessage};
use crate::transport::{WsMessage, WsReader};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{timeout_at, Instant};

/// Outcome of waiting for the server's first message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Probe {
    /// `request_info` greeting, with its message body
    RequestInfo(String),
    /// Some other first message
    Other(String),
    /// Nothing arrived before the deadline
    Silent,
    /// Peer closed the connection
    Closed,
    /// Transport error while waiting
    Failed(String),
}

impl Probe {
    /// Classify a first message
    pub fn from_first_message(text: String) -> Self {
        match decode_server_message(&text) {
            Ok(ServerMessage::RequestInfo { message }) => Probe::RequestInfo(message),
            _ => Probe::Other(text),
        }
    }

    /// Server dialect implied by this probe
    pub fn mode(&self) -> SessionMode {
        match self {
            Probe::RequestInfo(_) => SessionMode::ChannelServer,
            _ => SessionMode::GenericEndpoint,
        }
    }
}

/// One-shot handshake that picks the session mode
pub struct Classifier {
    timeout: Duration,
    username: Option<String>,
    default_username: String,
}

impl Classifier {
    pub fn new(timeout: Duration, default_username: impl Into<String>) -> Self {
        Self {
            timeout,
            username: None,
            default_username: default_username.into(),
        }
    }

    /// Use this identity instead of prompting for one
    pub fn with_username(mut self, username: Option<String>) -> Self {
        self.username = username.filter(|u| !u.trim().is_empty());
        self
    }

    /// Wait up to the timeout for the first data frame
    pub async fn probe(&self, reader: &mut WsReader) -> Probe {
        let deadline = Instant::now() + self.timeout;
        loop {
            match timeout_at(deadline, reader.recv()).await {
                Err(_) => return Probe::Silent,
                Ok(None) | Ok(Some(Ok(WsMessage::Close { .. }))) => return Probe::Closed,
                Ok(Some(Err(e))) => return Probe::Failed(format!("{e:#}")),
                Ok(Some(Ok(msg))) => match msg.into_text() {
                    Some(text) => return Probe::from_first_message(text),
                    None => continue,
                },
            }
        }
    }

    /// Probe the server, record the mode and, for a channel server, queue
    /// the operator's identity
    pub async fn run(
        &self,
        session: &mut Session,
        reader: &mut WsReader,
        input: &mut LineInput,
        console: &Console,
        actions: &mpsc::Sender<OutboundAction>,
    ) -> Result<SessionMode, SessionError> {
        console.notice("Detecting server type...");
        let probe = self.probe(reader).await;
        tracing::debug!("Classification probe: {:?}", probe);

        let mode = probe.mode();
        session.set_mode(mode)?;

        match probe {
            Probe::RequestInfo(message) => {
                console.notice("Detected custom channel server");
                if !message.is_empty() {
                    console.line(OutputLine::new(LineKind::Server, format!("Server: {message}")));
                }
                let username = match &self.username {
                    Some(username) => username.trim().to_string(),
                    None => {
                        input
                            .prompt(console, "Enter your username: ", &self.default_username)
                            .await
                    }
                };
                if actions
                    .send(OutboundAction::Identify { username })
                    .await
                    .is_err()
                {
                    tracing::warn!("Sender stopped before identity could be queued");
                    console.error("Connection lost before identifying");
                }
            }
            Probe::Other(text) => {
                console.notice("Detected external WebSocket API");
                console.line(OutputLine::new(LineKind::Raw, format!("Received: {text}")));
                console.notice("");
                console.notice("This appears to be an external API. Raw message mode enabled.");
                console.notice("You can send JSON messages directly, or type /quit to exit");
            }
            Probe::Silent => {
                console.notice("No initial message received - assuming external API");
                console.notice("Raw message mode enabled. Type /quit to exit");
            }
            Probe::Closed => {
                console.error("Error detecting server type: connection closed");
                console.notice("Raw message mode enabled.");
            }
            Probe::Failed(e) => {
                console.error(format!("Error detecting server type: {e}"));
                console.notice("Raw message mode enabled.");
            }
        }

        Ok(mode)
    }
}
