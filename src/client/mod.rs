//! Client - interactive session against a channel server or streaming API
//!
//! A session runs `Connecting → Classifying → Active → Closing → Closed`.
//! While active, three tasks run side by side:
//! - the inbound drain reads frames and renders them through the dispatcher
//! - the outbound drain reads operator lines and queues protocol actions
//! - the sender owns the write half and transmits queued actions in order
//!
//! The write half returns from the sender once its queue closes, so the
//! connection is only closed after both drains have stopped using it.

pub mod address;
pub mod classifier;
pub mod commands;
pub mod console;
pub mod events;
pub mod hints;
pub mod input;
pub mod session;

use crate::client::classifier::Classifier;
use crate::client::commands::{CommandInterpreter, CommandResult, OutboundAction};
use crate::client::console::Console;
use crate::client::events::EventDispatcher;
use crate::client::hints::StreamingApiHints;
use crate::client::input::LineInput;
use crate::client::session::{Session, SessionError, SessionMode, SessionState};
use crate::config::Config;
use crate::transport::{self, WsMessage, WsReader, WsWriter};
use anyhow::Result;
use std::collections::BTreeSet;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::Instrument;
use uuid::Uuid;

/// Read errors in a row after which the inbound drain gives up
const MAX_CONSECUTIVE_READ_ERRORS: u32 = 3;

/// Capacity of the outbound action queue
const ACTION_QUEUE_SIZE: usize = 64;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Connection to {uri} failed: {source:#}")]
    Connect {
        uri: String,
        #[source]
        source: anyhow::Error,
    },

    #[error(transparent)]
    Session(#[from] SessionError),
}

/// Settings for one session
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// How long to wait for the server's first message
    pub handshake_timeout: Duration,
    /// How long to wait for the peer to acknowledge a close after `/quit`
    pub close_grace: Duration,
    /// Identity to send without prompting
    pub username: Option<String>,
    /// Identity used when the prompt is left empty
    pub default_username: String,
    /// Register the streaming API hints on the dispatcher
    pub api_hints: bool,
}

impl SessionOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            handshake_timeout: config.handshake_timeout(),
            close_grace: config.close_grace(),
            username: None,
            default_username: config.general.default_username.clone(),
            api_hints: config.appearance.api_hints,
        }
    }
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Why a session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// The server closed the connection
    ServerClosed,
    /// The operator typed `/quit` or input ended
    OperatorQuit,
    /// The operator interrupted the client
    Interrupted,
}

/// What a finished session looked like
#[derive(Debug, Clone)]
pub struct SessionSummary {
    pub id: Uuid,
    pub mode: SessionMode,
    pub subscribed: BTreeSet<String>,
    pub end: SessionEnd,
}

/// Run one session against `uri` until it closes
///
/// `interrupt` resolving aborts both drains and closes the connection.
/// Only a failed connection attempt is returned as an error; everything
/// after that is reported on the console.
pub async fn run_session<F>(
    uri: &str,
    options: &SessionOptions,
    input: LineInput,
    console: &Console,
    interrupt: F,
) -> Result<SessionSummary>
where
    F: Future<Output = ()>,
{
    let session = Session::new(uri);
    let span = tracing::info_span!("session", id = %session.id());
    drive_session(session, options, input, console, interrupt)
        .instrument(span)
        .await
}

async fn drive_session<F>(
    mut session: Session,
    options: &SessionOptions,
    mut input: LineInput,
    console: &Console,
    interrupt: F,
) -> Result<SessionSummary>
where
    F: Future<Output = ()>,
{
    tokio::pin!(interrupt);
    let uri = session.uri().to_string();

    // Connecting
    let (writer, mut reader) = match transport::connect(&uri).await {
        Ok(halves) => halves,
        Err(source) => {
            console.error(format!("Connection failed: {source:#}"));
            session.transition(SessionState::Closed)?;
            return Err(ClientError::Connect { uri, source }.into());
        }
    };
    console.notice(format!("Connected to {uri}"));
    tracing::info!("Connected to {}", uri);

    let (action_tx, action_rx) = mpsc::channel(ACTION_QUEUE_SIZE);
    let mut sender =
        tokio::spawn(sender_task(writer, action_rx, console.clone()).in_current_span());

    // Classifying
    session.transition(SessionState::Classifying)?;
    let classifier = Classifier::new(options.handshake_timeout, &options.default_username)
        .with_username(options.username.clone());
    let classified = tokio::select! {
        mode = classifier.run(&mut session, &mut reader, &mut input, console, &action_tx) => Some(mode?),
        _ = &mut interrupt => None,
    };

    let Some(mode) = classified else {
        console.notice("\nDisconnecting...");
        session.transition(SessionState::Closing)?;
        drop(action_tx);
        close_writer_within(&mut sender, options.close_grace).await;
        session.transition(SessionState::Closed)?;
        return Ok(SessionSummary {
            id: session.id(),
            mode: session.mode(),
            subscribed: BTreeSet::new(),
            end: SessionEnd::Interrupted,
        });
    };

    // Active
    session.transition(SessionState::Active)?;
    print_mode_hints(mode, console);

    let mut dispatcher = EventDispatcher::new();
    if options.api_hints {
        dispatcher = dispatcher.with_hook(StreamingApiHints);
    }
    let subscriptions = dispatcher.subscriptions();
    let interpreter = CommandInterpreter::new(mode).with_subscriptions(subscriptions.clone());

    let mut inbound =
        tokio::spawn(inbound_drain(reader, dispatcher, console.clone()).in_current_span());
    let mut outbound = tokio::spawn(
        outbound_drain(input, interpreter, action_tx, console.clone()).in_current_span(),
    );

    let end = tokio::select! {
        _ = &mut interrupt => SessionEnd::Interrupted,
        _ = &mut inbound => SessionEnd::ServerClosed,
        _ = &mut outbound => SessionEnd::OperatorQuit,
    };
    tracing::info!("Session ending: {:?}", end);

    // Closing
    session.transition(SessionState::Closing)?;
    let end = match end {
        SessionEnd::OperatorQuit => {
            // The outbound drain dropped the action queue, so the sender
            // hands back the writer once pending actions are flushed.
            let closed = tokio::select! {
                _ = close_writer(&mut sender) => true,
                _ = &mut interrupt => false,
            };
            if closed {
                let grace = tokio::time::sleep(options.close_grace);
                tokio::select! {
                    _ = &mut inbound => SessionEnd::OperatorQuit,
                    _ = grace => {
                        tracing::debug!("Peer did not acknowledge close in time");
                        inbound.abort();
                        SessionEnd::OperatorQuit
                    }
                    _ = &mut interrupt => {
                        console.notice("\nDisconnecting...");
                        inbound.abort();
                        SessionEnd::Interrupted
                    }
                }
            } else {
                console.notice("\nDisconnecting...");
                tracing::debug!("Interrupted while flushing outbound actions");
                sender.abort();
                inbound.abort();
                SessionEnd::Interrupted
            }
        }
        SessionEnd::ServerClosed => {
            console.notice("Connection closed by server");
            outbound.abort();
            let _ = (&mut outbound).await;
            close_writer(&mut sender).await;
            SessionEnd::ServerClosed
        }
        SessionEnd::Interrupted => {
            console.notice("\nDisconnecting...");
            outbound.abort();
            inbound.abort();
            let _ = (&mut outbound).await;
            close_writer_within(&mut sender, options.close_grace).await;
            SessionEnd::Interrupted
        }
    };

    session.transition(SessionState::Closed)?;
    let subscribed = subscriptions.borrow().clone();
    Ok(SessionSummary {
        id: session.id(),
        mode,
        subscribed,
        end,
    })
}

fn print_mode_hints(mode: SessionMode, console: &Console) {
    if mode == SessionMode::ChannelServer {
        console.notice("\nConnected to custom server! Type /help for commands.");
        console.notice("Example: /subscribe general");
        console.notice("Example: #general Hello everyone!");
    } else {
        console.notice("\nConnected to external API! Type /help for commands.");
        console.notice("Send JSON messages directly to interact with the API.");
    }
}

/// Wait for the sender to drain its queue and return the write half
async fn finish_sender(sender: &mut JoinHandle<WsWriter>) -> Option<WsWriter> {
    match sender.await {
        Ok(writer) => Some(writer),
        Err(e) => {
            tracing::error!("Sender task failed: {}", e);
            None
        }
    }
}

async fn close_writer(sender: &mut JoinHandle<WsWriter>) {
    if let Some(mut writer) = finish_sender(sender).await {
        if let Err(e) = writer.close().await {
            tracing::debug!("Close failed: {:#}", e);
        }
    }
}

/// Close the writer, giving up after `limit` if the peer stops reading
async fn close_writer_within(sender: &mut JoinHandle<WsWriter>, limit: Duration) {
    if tokio::time::timeout(limit, close_writer(sender)).await.is_err() {
        tracing::debug!("Close did not complete within {:?}", limit);
        sender.abort();
    }
}

/// Transmit queued actions in order until the queue closes
async fn sender_task(
    mut writer: WsWriter,
    mut actions: mpsc::Receiver<OutboundAction>,
    console: Console,
) -> WsWriter {
    while let Some(action) = actions.recv().await {
        let wire = match action.to_wire() {
            Ok(wire) => wire,
            Err(e) => {
                tracing::error!("Failed to encode {:?}: {:#}", action, e);
                console.error(format!("Could not encode message: {e}"));
                continue;
            }
        };
        tracing::debug!("Sending {}", wire);
        if let Err(e) = writer.send_text(&wire).await {
            tracing::error!("Failed to send message: {:#}", e);
            console.error(format!("Failed to send message: {e}"));
            break;
        }
    }

    tracing::debug!("Sender task finished");
    writer
}

/// Render inbound frames until the connection ends
async fn inbound_drain(mut reader: WsReader, mut dispatcher: EventDispatcher, console: Console) {
    let mut consecutive_errors = 0;

    while let Some(frame) = reader.recv().await {
        match frame {
            Ok(WsMessage::Close { code, reason }) => {
                tracing::info!("Peer closed connection ({}): {}", code, reason);
                break;
            }
            Ok(msg) => {
                consecutive_errors = 0;
                if let Some(text) = msg.into_text() {
                    console.lines(dispatcher.dispatch_text(&text));
                }
            }
            Err(e) => {
                consecutive_errors += 1;
                tracing::warn!("Error reading from server: {:#}", e);
                console.error(format!("Error listening for messages: {e}"));
                if consecutive_errors >= MAX_CONSECUTIVE_READ_ERRORS {
                    break;
                }
            }
        }
    }

    tracing::debug!("Inbound drain finished");
}

/// Interpret operator lines until `/quit` or end of input
async fn outbound_drain(
    mut input: LineInput,
    interpreter: CommandInterpreter,
    actions: mpsc::Sender<OutboundAction>,
    console: Console,
) {
    while let Some(line) = input.next_line().await {
        match interpreter.interpret(&line) {
            CommandResult::Ignored => {}
            CommandResult::Exit => {
                tracing::debug!("Operator quit");
                return;
            }
            CommandResult::Show(lines) => console.lines(lines),
            CommandResult::Send(action) => {
                if actions.send(action).await.is_err() {
                    console.error("Not connected: message was not sent");
                }
            }
        }
    }

    tracing::debug!("End of input");
}
