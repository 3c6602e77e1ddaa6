//! Command handling - turn operator lines into protocol actions
//!
//! The grammar depends on the session mode. A channel server gets slash
//! commands and `#channel message` posts; a generic endpoint gets raw JSON.

use crate::client::console::OutputLine;
use crate::client::input::{parse_input, ParsedInput};
use crate::client::session::SessionMode;
use crate::protocol::{encode, validate_payload, ClientMessage, EXAMPLE_PAYLOAD};
use anyhow::Result;
use std::collections::BTreeSet;
use tokio::sync::watch;

const UNKNOWN_COMMAND: &str = "Unknown command. Type /help for available commands.";

/// A protocol action queued for the sender task
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundAction {
    Identify { username: String },
    Subscribe { channel: String },
    Unsubscribe { channel: String },
    Publish { channel: String, body: String },
    ListChannels,
    /// Operator-supplied JSON, sent exactly as typed
    RawPassthrough { wire: String },
}

impl OutboundAction {
    /// Wire form of the action
    pub fn to_wire(&self) -> Result<String> {
        let msg = match self {
            OutboundAction::RawPassthrough { wire } => return Ok(wire.clone()),
            OutboundAction::Identify { username } => ClientMessage::UserInfo {
                username: username.clone(),
            },
            OutboundAction::Subscribe { channel } => ClientMessage::subscribe(channel.as_str()),
            OutboundAction::Unsubscribe { channel } => ClientMessage::unsubscribe(channel.as_str()),
            OutboundAction::Publish { channel, body } => ClientMessage::Message {
                channel: channel.clone(),
                message: body.clone(),
            },
            OutboundAction::ListChannels => ClientMessage::ListChannels,
        };
        encode(&msg)
    }
}

/// What to do with one line of input
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandResult {
    /// Nothing to do
    Ignored,
    /// Stop reading input
    Exit,
    /// Queue an action for sending
    Send(OutboundAction),
    /// Print lines locally, send nothing
    Show(Vec<OutputLine>),
}

/// Interprets operator lines according to the session mode
pub struct CommandInterpreter {
    mode: SessionMode,
    subscriptions: Option<watch::Receiver<BTreeSet<String>>>,
}

impl CommandInterpreter {
    pub fn new(mode: SessionMode) -> Self {
        Self {
            mode,
            subscriptions: None,
        }
    }

    /// Attach the dispatcher's subscription snapshots for `/subscriptions`
    pub fn with_subscriptions(mut self, rx: watch::Receiver<BTreeSet<String>>) -> Self {
        self.subscriptions = Some(rx);
        self
    }

    fn channel_server(&self) -> bool {
        self.mode == SessionMode::ChannelServer
    }

    /// Interpret one line of input
    pub fn interpret(&self, line: &str) -> CommandResult {
        match parse_input(line) {
            ParsedInput::Empty => CommandResult::Ignored,
            ParsedInput::Command { name, args } => self.command(&name, &args),
            ParsedInput::ChannelPost { channel, body } if self.channel_server() => {
                match body {
                    Some(body) if !channel.is_empty() => {
                        CommandResult::Send(OutboundAction::Publish { channel, body })
                    }
                    _ => notice("Usage: #<channel> <message>"),
                }
            }
            ParsedInput::ChannelPost { .. } | ParsedInput::Text(_) if !self.channel_server() => {
                self.raw_payload(line)
            }
            _ => notice(
                "Invalid input. Use /help for commands or #<channel> <message> to send messages.",
            ),
        }
    }

    fn command(&self, name: &str, args: &[String]) -> CommandResult {
        match name {
            "quit" => return CommandResult::Exit,
            "help" => return CommandResult::Show(help_text(self.mode)),
            _ => {}
        }

        if !self.channel_server() {
            return notice(UNKNOWN_COMMAND);
        }

        match (name, args.first()) {
            ("subscribe", Some(channel)) => CommandResult::Send(OutboundAction::Subscribe {
                channel: channel.clone(),
            }),
            ("unsubscribe", Some(channel)) => CommandResult::Send(OutboundAction::Unsubscribe {
                channel: channel.clone(),
            }),
            ("channels", _) => CommandResult::Send(OutboundAction::ListChannels),
            ("subscriptions", _) => notice(format!(
                "Current subscriptions: {}",
                self.subscription_summary()
            )),
            _ => notice(UNKNOWN_COMMAND),
        }
    }

    fn raw_payload(&self, line: &str) -> CommandResult {
        match validate_payload(line) {
            Ok(()) => CommandResult::Send(OutboundAction::RawPassthrough {
                wire: line.to_string(),
            }),
            Err(e) => {
                tracing::debug!("Rejected payload: {}", e);
                CommandResult::Show(vec![
                    OutputLine::error("Invalid JSON. Please send valid JSON messages."),
                    OutputLine::notice(format!("Example: {EXAMPLE_PAYLOAD}")),
                ])
            }
        }
    }

    fn subscription_summary(&self) -> String {
        let snapshot = self
            .subscriptions
            .as_ref()
            .map(|rx| rx.borrow().clone())
            .unwrap_or_default();
        if snapshot.is_empty() {
            "none".to_string()
        } else {
            snapshot
                .iter()
                .map(|c| format!("#{c}"))
                .collect::<Vec<_>>()
                .join(", ")
        }
    }
}

fn notice(text: impl Into<String>) -> CommandResult {
    CommandResult::Show(vec![OutputLine::notice(text)])
}

/// Usage text for the given mode
pub fn help_text(mode: SessionMode) -> Vec<OutputLine> {
    let mut lines: Vec<String> = if mode == SessionMode::ChannelServer {
        vec![
            "Custom Server Commands:".to_string(),
            "  /subscribe <channel>   - Subscribe to a channel".to_string(),
            "  /unsubscribe <channel> - Unsubscribe from channel".to_string(),
            "  /channels              - List available channels".to_string(),
            "  /subscriptions         - Show channels you are subscribed to".to_string(),
            "  #<channel> <message>   - Send message to channel".to_string(),
        ]
    } else {
        vec![
            "External API Commands:".to_string(),
            "  Send JSON messages directly to interact with the API".to_string(),
            format!("  Example: {EXAMPLE_PAYLOAD}"),
        ]
    };
    lines.push("  /help - Show this help".to_string());
    lines.push("  /quit - Exit".to_string());
    lines.into_iter().map(OutputLine::notice).collect()
}
