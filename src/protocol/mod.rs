//! Protocol definitions for client-server communication
//!
//! Uses JSON text frames. Channel server records are tagged by `type`;
//! anything else is carried through as a raw [`serde_json::Value`].

mod message;

pub use message::{ClientMessage, InboundEvent, ServerMessage};

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Example payload shown when a literal JSON payload is rejected
pub const EXAMPLE_PAYLOAD: &str = r#"{"channel": "heartbeat", "event": "subscribe"}"#;

/// Protocol-specific errors
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Malformed message: {0}")]
    MalformedMessage(String),

    #[error("Invalid JSON payload: {0}")]
    InvalidPayload(#[from] serde_json::Error),

    #[error("Failed to encode message: {0}")]
    Encode(String),
}

/// Serialize a record to its JSON wire form
pub fn encode<T: Serialize>(msg: &T) -> Result<String> {
    serde_json::to_string(msg).map_err(|e| anyhow!(ProtocolError::Encode(e.to_string())))
}

/// Decode an inbound text frame
///
/// Never fails: non-JSON text and unknown records are returned as
/// [`InboundEvent::Undecodable`] and [`InboundEvent::Unrecognized`].
pub fn decode(text: &str) -> InboundEvent {
    let value: serde_json::Value = match serde_json::from_str(text) {
        Ok(value) => value,
        Err(e) => {
            tracing::debug!("Inbound frame is not JSON: {}", e);
            return InboundEvent::Undecodable(text.to_string());
        }
    };

    match ServerMessage::deserialize(&value) {
        Ok(msg) => InboundEvent::Server(msg),
        Err(e) => {
            tracing::trace!("Inbound JSON is not a channel server record: {}", e);
            InboundEvent::Unrecognized(value)
        }
    }
}

/// Decode an inbound frame strictly as a channel server record
pub fn decode_server_message(text: &str) -> Result<ServerMessage, ProtocolError> {
    serde_json::from_str(text).map_err(|e| ProtocolError::MalformedMessage(e.to_string()))
}

/// Check that an operator-supplied payload is well-formed JSON
pub fn validate_payload(payload: &str) -> Result<(), ProtocolError> {
    serde_json::from_str::<serde::de::IgnoredAny>(payload)?;
    Ok(())
}
