//! Event dispatch - render inbound events and track subscriptions

use crate::client::console::{LineKind, OutputLine};
use crate::client::hints::FallbackHook;
use crate::protocol::{decode, InboundEvent, ServerMessage};
use chrono::Local;
use std::collections::BTreeSet;
use tokio::sync::watch;

/// Renders inbound events and owns the local view of subscribed channels
///
/// The subscription set is only mutated here, in response to server
/// acknowledgements. Other tasks observe it through [`watch`] snapshots.
pub struct EventDispatcher {
    subscribed: BTreeSet<String>,
    snapshot_tx: watch::Sender<BTreeSet<String>>,
    hooks: Vec<Box<dyn FallbackHook>>,
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl EventDispatcher {
    pub fn new() -> Self {
        let (snapshot_tx, _) = watch::channel(BTreeSet::new());
        Self {
            subscribed: BTreeSet::new(),
            snapshot_tx,
            hooks: Vec::new(),
        }
    }

    /// Register an annotation hook for unrecognized JSON
    pub fn with_hook(mut self, hook: impl FallbackHook + 'static) -> Self {
        self.hooks.push(Box::new(hook));
        self
    }

    /// Receiver of subscription snapshots
    pub fn subscriptions(&self) -> watch::Receiver<BTreeSet<String>> {
        self.snapshot_tx.subscribe()
    }

    /// Channels currently believed subscribed
    pub fn subscribed(&self) -> &BTreeSet<String> {
        &self.subscribed
    }

    /// Decode a text frame and dispatch it
    pub fn dispatch_text(&mut self, text: &str) -> Vec<OutputLine> {
        self.dispatch(decode(text))
    }

    /// Dispatch one event, returning the lines to render
    pub fn dispatch(&mut self, event: InboundEvent) -> Vec<OutputLine> {
        match event {
            InboundEvent::Server(msg) => self.dispatch_server(msg),
            InboundEvent::Unrecognized(value) => self.render_structured(&value),
            InboundEvent::Undecodable(text) => vec![OutputLine::new(LineKind::Raw, text)],
        }
    }

    fn dispatch_server(&mut self, msg: ServerMessage) -> Vec<OutputLine> {
        match msg {
            ServerMessage::RequestInfo { message } => {
                vec![OutputLine::new(LineKind::Server, format!("Server: {message}"))]
            }
            ServerMessage::ChannelList { message, channels } => {
                let mut lines = vec![OutputLine::new(
                    LineKind::Server,
                    format!("Server: {message}"),
                )];
                lines.extend(channels.iter().enumerate().map(|(i, channel)| {
                    OutputLine::new(LineKind::Server, format!("  {}. #{}", i + 1, channel))
                }));
                lines
            }
            ServerMessage::SubscriptionSuccess { channel, message } => {
                match channel {
                    Some(channel) => {
                        tracing::debug!("Subscribed to #{}", channel);
                        self.subscribed.insert(channel);
                        self.publish_snapshot();
                    }
                    None => tracing::debug!("Subscription ack without a channel"),
                }
                vec![OutputLine::new(LineKind::Success, format!("✓ {message}"))]
            }
            ServerMessage::UnsubscriptionSuccess { channel, message } => {
                if let Some(channel) = channel {
                    tracing::debug!("Unsubscribed from #{}", channel);
                    if self.subscribed.remove(&channel) {
                        self.publish_snapshot();
                    }
                }
                vec![OutputLine::new(LineKind::Success, format!("✓ {message}"))]
            }
            ServerMessage::ChannelMessage {
                channel,
                username,
                message,
            } => vec![OutputLine::new(
                LineKind::ChannelMessage,
                format!("#{channel} <{username}> {message}"),
            )],
            ServerMessage::UserJoined { message } => {
                vec![OutputLine::new(LineKind::Joined, format!("📥 {message}"))]
            }
            ServerMessage::UserLeft { message } => {
                vec![OutputLine::new(LineKind::Left, format!("📤 {message}"))]
            }
            ServerMessage::Error { message } => {
                vec![OutputLine::new(
                    LineKind::ServerError,
                    format!("❌ Error: {message}"),
                )]
            }
        }
    }

    fn render_structured(&self, value: &serde_json::Value) -> Vec<OutputLine> {
        let pretty = serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string());
        let timestamp = Local::now().format("%H:%M:%S");
        let mut lines = vec![OutputLine::new(
            LineKind::Structured,
            format!("[{timestamp}] {pretty}"),
        )];
        for hook in &self.hooks {
            hook.annotate(value, &mut lines);
        }
        lines
    }

    fn publish_snapshot(&self) {
        self.snapshot_tx.send_replace(self.subscribed.clone());
    }
}
