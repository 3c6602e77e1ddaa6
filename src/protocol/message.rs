//! Message types for the channel server protocol
//!
//! Records are JSON objects discriminated by their `type` field.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Records sent from client to a channel server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Identify the operator in reply to `request_info`
    UserInfo { username: String },

    /// Join a channel
    Subscribe { action: String, channel: String },

    /// Leave a channel
    Unsubscribe { action: String, channel: String },

    /// Publish a message to a channel
    Message { channel: String, message: String },

    /// Request the list of available channels
    ListChannels,
}

impl ClientMessage {
    pub fn subscribe(channel: impl Into<String>) -> Self {
        ClientMessage::Subscribe {
            action: "subscribe".to_string(),
            channel: channel.into(),
        }
    }

    pub fn unsubscribe(channel: impl Into<String>) -> Self {
        ClientMessage::Unsubscribe {
            action: "unsubscribe".to_string(),
            channel: channel.into(),
        }
    }
}

/// Records sent from a channel server to the client
///
/// Only the `type` field selects the record. Every other field is read
/// leniently: a missing or `null` field renders as empty text and any
/// non-string value renders as compact JSON.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Handshake greeting asking the client to identify itself
    RequestInfo {
        #[serde(default, deserialize_with = "text")]
        message: String,
    },

    /// Response to `list_channels`
    ChannelList {
        #[serde(default, deserialize_with = "text")]
        message: String,
        #[serde(default, deserialize_with = "text_list")]
        channels: Vec<String>,
    },

    /// Subscription confirmed
    SubscriptionSuccess {
        #[serde(default, deserialize_with = "optional_text")]
        channel: Option<String>,
        #[serde(default, deserialize_with = "text")]
        message: String,
    },

    /// Unsubscription confirmed
    UnsubscriptionSuccess {
        #[serde(default, deserialize_with = "optional_text")]
        channel: Option<String>,
        #[serde(default, deserialize_with = "text")]
        message: String,
    },

    /// A message published to a subscribed channel
    ChannelMessage {
        #[serde(default, deserialize_with = "text")]
        channel: String,
        #[serde(default, deserialize_with = "text")]
        username: String,
        #[serde(default, deserialize_with = "text")]
        message: String,
    },

    /// Another user joined a channel
    UserJoined {
        #[serde(default, deserialize_with = "text")]
        message: String,
    },

    /// Another user left a channel
    UserLeft {
        #[serde(default, deserialize_with = "text")]
        message: String,
    },

    /// Error reported by the server
    Error {
        #[serde(default, deserialize_with = "text")]
        message: String,
    },
}

/// Display text for an arbitrary JSON value
fn render_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(render_value(&Value::deserialize(deserializer)?))
}

fn optional_text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::Null => None,
        value => Some(render_value(&value)),
    })
}

fn text_list<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::Null => Vec::new(),
        Value::Array(items) => items.iter().map(render_value).collect(),
        other => vec![render_value(&other)],
    })
}

/// A decoded inbound frame, ready for dispatch
#[derive(Debug, Clone, PartialEq)]
pub enum InboundEvent {
    /// A record from the channel server dialect
    Server(ServerMessage),

    /// Valid JSON that matches no known record
    Unrecognized(Value),

    /// Payload that is not JSON at all
    Undecodable(String),
}
